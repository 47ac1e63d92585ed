use super::*;
use crate::parser::parse_module;

fn rewrite_class_src(src: &str) -> (String, Vec<String>) {
    let mut tree = parse_module(src).expect("parse failed");
    let mut flags = UsageFlags::new();
    let rule_names = {
        let mut rw = Rewriter::new(&mut tree.arena, tree.root, &mut flags);
        rw.rewrite_module(tree.root).expect("rewrite failed");
        std::mem::take(&mut rw.rule_names)
    };
    (tree.arena.to_source(tree.root), rule_names)
}

const RULE_WITH_APPLY: &str = "class SIRSRule(Rule):\n\
    \x20   def __init__(self):\n\
    \x20       super().__init__('sirs')\n\
    \n\
    \x20   def apply(self, pop, group, iter, t):\n\
    \x20       return None\n";

#[test]
fn test_bases_dropped_when_transition_method_is_local() {
    let (src, names) = rewrite_class_src(RULE_WITH_APPLY);
    assert!(src.starts_with("class SIRSRule:\n"));
    assert!(!src.contains("(Rule)"));
    assert_eq!(names, vec!["SIRSRule".to_string()]);
}

#[test]
fn test_bases_kept_when_transition_method_is_inherited() {
    let (src, _) = rewrite_class_src(
        "class Child(Parent):\n\
         \x20   def __init__(self):\n\
         \x20       super().__init__('child')\n",
    );
    assert!(src.starts_with("class Child(Parent):\n"));
    // the dispatch method is synthesized regardless
    assert!(src.contains("def __call__(self):\n"));
}

#[test]
fn test_constructor_replaced_with_record_loader() {
    let (src, _) = rewrite_class_src(RULE_WITH_APPLY);
    assert!(src.contains("def __init__(self, agent):\n"));
    assert!(src.contains("        self.agent = agent\n"));
    assert!(src.contains("        self.model = agent.model\n"));
    assert!(src.contains("        with open(rule_file, 'r') as file:\n"));
    assert!(src.contains("            j = json.load(file)\n"));
    assert!(src.contains(
        "            data = next((d for d in j if d['rule_type'] == type(self).__name__), {})\n"
    ));
    assert!(src.contains("                gq = data['group_qry']\n"));
    assert!(src.contains(
        "data['group_qry'] = GroupQry(gq['attr'], gq['rel'], dill.loads(bytes.fromhex(gq['cond'])), gq['full'])\n"
    ));
    assert!(src.contains("            self.__dict__.update(data)\n"));
    // the original constructor body is gone
    assert!(!src.contains("super().__init__"));
}

#[test]
fn test_dispatch_checks_query_then_gate() {
    let (src, _) = rewrite_class_src(RULE_WITH_APPLY);
    assert!(src.contains("    def __call__(self):\n"));
    assert!(src.contains("        if not self.agent.matches_qry(self.group_qry):\n"));
    assert!(src.contains("            return\n"));
    // gate shapes, in dispatch order
    assert!(src.contains("        if not self.i:\n"));
    assert!(src.contains("        elif isinstance(self.i, int) and self.model.time == self.i:\n"));
    assert!(src.contains("        elif isinstance(self.i, list):\n"));
    assert!(src.contains("            if self.i[1] == 0 and self.model.time <= self.i[0]:\n"));
    assert!(src.contains("            elif self.i[0] <= self.model.time <= self.i[1]:\n"));
    assert!(src.contains("        elif isinstance(self.i, set) and self.model.time in self.i:\n"));
}

#[test]
fn test_transition_invoked_with_twin_iteration_arguments() {
    let (src, _) = rewrite_class_src(RULE_WITH_APPLY);
    assert!(src
        .contains("self.apply(self.model, self.agent, self.model.time, self.model.time)\n"));
}

#[test]
fn test_stored_time_gate_is_never_consulted() {
    // the t gate is parsed and stored with the record, but the
    // synthesized dispatch only ever reads self.i
    let (src, _) = rewrite_class_src(RULE_WITH_APPLY);
    assert!(!src.contains("self.t"));
}

#[test]
fn test_method_bodies_are_rewritten() {
    let (src, _) = rewrite_class_src(
        "class MoveRule(Rule):\n\
         \x20   def apply(self, pop, group, iter, t):\n\
         \x20       m = site.get_mass(qry)\n\
         \x20       return [\n\
         \x20           GroupSplitSpec(p=0.3, rel_set={'@': site}),\n\
         \x20           GroupSplitSpec(p=0.7),\n\
         \x20       ]\n",
    );
    assert!(src.contains("        m = pop.get_mass(site, qry)\n"));
    assert!(src.contains("        _x = pop.random.random()\n"));
    assert!(src.contains("        if _x < 0.3:\n"));
    assert!(src.contains("            pop.grid.move_agent(group, site)\n"));
}

#[test]
fn test_multiple_classes_all_recorded() {
    let two = format!(
        "{RULE_WITH_APPLY}\n\
         class Second(Rule):\n\
         \x20   def apply(self, pop, group, iter, t):\n\
         \x20       return None\n"
    );
    let (src, names) = rewrite_class_src(&two);
    assert_eq!(names, vec!["SIRSRule".to_string(), "Second".to_string()]);
    assert_eq!(src.matches("def __call__(self):").count(), 2);
}
