// End-to-end translation of a small rule set: base-class recursion,
// outcome restructuring, helper gating, and import consolidation all in
// one pass over the assembled artifacts.

use disagg_core::{AssemblyOptions, Helper, RuleSource, Translator};
use pretty_assertions::assert_eq;

const FLU_MODULE: &str = r#"from pram.entity import Site, GroupQry, GroupSplitSpec
from pram.rule import Rule
import random

class FluProgressRule(Rule):
    def __init__(self):
        super().__init__('flu-progress')

    def apply(self, pop, group, iter, t):
        if group.get_attr('flu') == 's':
            at = group.get_rel('@')
            n = at.get_mass()
            p_infection = at.get_mass(GroupQry(attr={'flu': 'i'})) / n
            return [
                GroupSplitSpec(p=p_infection, attr_set={'flu': 'i'}),
                GroupSplitSpec(p=1 - p_infection, attr_set={'flu': 's'}),
            ]
        return None
"#;

const MOVE_MODULE: &str = r#"from pram.rule import Rule
from pram.entity import GroupSplitSpec
import supramolecular

class MoveBase(Rule):
    def apply(self, pop, group, iter, t):
        return [GroupSplitSpec(p=1.0, rel_set={'@': group.get_rel('school')})]
"#;

const MOVE_CHILD: &str = r#"from .local_helpers import shuffle
from pram.rule import Rule

class SchoolMoveRule(MoveBase):
    def __init__(self):
        super().__init__('school-move')
"#;

fn fixture() -> Translator {
    let mut translator = Translator::new();
    translator.register(
        RuleSource::new(
            "FluProgressRule",
            extract_class(FLU_MODULE, "FluProgressRule"),
        )
        .with_module_source(FLU_MODULE),
    );
    translator.register(
        RuleSource::new("MoveBase", extract_class(MOVE_MODULE, "MoveBase"))
            .with_module_source(MOVE_MODULE),
    );
    translator.register(
        RuleSource::new("SchoolMoveRule", extract_class(MOVE_CHILD, "SchoolMoveRule"))
            .with_module_source(MOVE_CHILD),
    );
    translator
}

// pull one class definition out of a module fixture
fn extract_class(module: &str, name: &str) -> String {
    let start = module
        .find(&format!("class {name}"))
        .expect("class in fixture");
    let rest = &module[start..];
    let mut out = String::new();
    for (i, line) in rest.lines().enumerate() {
        if i > 0 && !line.is_empty() && !line.starts_with(' ') {
            break;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[test]
fn test_full_translation_shape() {
    let translator = fixture();
    let opts = AssemblyOptions::new("Flu");
    let result = translator
        .translate(&["FluProgressRule", "SchoolMoveRule"], &opts)
        .unwrap();

    assert_eq!(result.agent_file, "FluAgent.py");
    assert_eq!(result.model_file, "FluModel.py");
    assert_eq!(result.support_file, "make_python_identifier.py");
    assert_eq!(
        result.rule_names,
        vec!["FluProgressRule".to_string(), "SchoolMoveRule".to_string()]
    );
    // the base class is translated too, before its subclass
    assert_eq!(
        result.all_rules,
        vec![
            "FluProgressRule".to_string(),
            "MoveBase".to_string(),
            "SchoolMoveRule".to_string()
        ]
    );
}

#[test]
fn test_rule_with_local_transition_loses_bases() {
    let translator = fixture();
    let opts = AssemblyOptions::new("Flu");
    let result = translator.translate(&["FluProgressRule"], &opts).unwrap();

    assert!(result.agent_source.contains("class FluProgressRule:"));
    assert!(!result.agent_source.contains("class FluProgressRule(Rule):"));
    assert!(result.agent_source.contains("def __call__(self):"));
}

#[test]
fn test_inheriting_rule_keeps_base_and_base_is_emitted_first() {
    let translator = fixture();
    let opts = AssemblyOptions::new("Flu");
    let result = translator.translate(&["SchoolMoveRule"], &opts).unwrap();

    let src = &result.agent_source;
    assert!(src.contains("class SchoolMoveRule(MoveBase):"));
    let base_pos = src.find("class MoveBase:").expect("base class emitted");
    let child_pos = src.find("class SchoolMoveRule").unwrap();
    assert!(base_pos < child_pos);
}

#[test]
fn test_rules_translated_once_despite_duplication() {
    let translator = fixture();
    let opts = AssemblyOptions::new("Flu");
    let result = translator
        .translate(&["SchoolMoveRule", "SchoolMoveRule"], &opts)
        .unwrap();
    assert_eq!(
        result.agent_source.matches("class SchoolMoveRule").count(),
        1
    );
    assert_eq!(result.agent_source.matches("class MoveBase:").count(), 1);
}

#[test]
fn test_outcome_chain_shape_in_emitted_code() {
    let translator = fixture();
    let opts = AssemblyOptions::new("Flu");
    let result = translator.translate(&["FluProgressRule"], &opts).unwrap();

    let src = &result.agent_source;
    assert!(src.contains("_x = pop.random.random()"));
    assert!(src.contains("if _x < p_infection:"));
    // the last outcome rides the else branch with no probability check
    assert!(src.contains("else:"));
    assert!(!src.contains("_x < p_infection + (1 - p_infection)"));
    assert!(!src.contains("break"));
}

#[test]
fn test_query_and_mass_rewrites_in_emitted_code() {
    let translator = fixture();
    let opts = AssemblyOptions::new("Flu");
    let result = translator.translate(&["FluProgressRule"], &opts).unwrap();

    let src = &result.agent_source;
    assert!(src.contains("pop.get_attr(group, 'flu')"));
    assert!(src.contains("pop.get_mass(at, None)"));
    assert!(src.contains("pop.get_mass(at, GroupQry(attr={'flu': 'i'}))"));
}

#[test]
fn test_helper_gating_follows_usage() {
    let translator = fixture();
    let opts = AssemblyOptions::new("Flu");
    let result = translator.translate(&["FluProgressRule"], &opts).unwrap();

    assert!(result.flags.contains(Helper::GetAttr));
    assert!(result.flags.contains(Helper::GetMass));
    assert!(result.flags.contains(Helper::GetGroups));
    assert!(!result.flags.contains(Helper::Copy));

    assert!(result.model_source.contains("def get_attr"));
    assert!(result.model_source.contains("def get_mass"));
    assert!(result.model_source.contains("def get_groups"));
    assert!(!result.model_source.contains("def get_groups_mass_prop"));
    assert!(!result.agent_source.contains("def copy"));
    // the dispatch method depends on matches_qry unconditionally
    assert!(result.agent_source.contains("def matches_qry"));
}

#[test]
fn test_import_consolidation() {
    let translator = fixture();
    let opts = AssemblyOptions::new("Flu");
    let result = translator
        .translate(&["FluProgressRule", "SchoolMoveRule"], &opts)
        .unwrap();

    let src = &result.agent_source;
    // framework and relative imports dropped, look-alike kept, dedup'd
    assert!(src.contains("import random"));
    assert!(src.contains("import supramolecular"));
    assert!(!src.contains("from pram"));
    assert!(!src.contains("local_helpers"));
    assert_eq!(src.matches("import random").count(), 1);
}

#[test]
fn test_gateless_rule_dispatch_is_unconditional_each_step() {
    // with no query descriptor and a falsy gate the dispatch runs the
    // transition method every step: matching None always passes and the
    // `not self.i` branch applies directly
    let translator = fixture();
    let opts = AssemblyOptions::new("Flu");
    let result = translator.translate(&["FluProgressRule"], &opts).unwrap();

    let src = &result.agent_source;
    assert!(src.contains("if not self.i:"));
    assert!(src
        .contains("self.apply(self.model, self.agent, self.model.time, self.model.time)"));
}

#[test]
fn test_stored_time_field_is_inert_in_dispatch() {
    let translator = fixture();
    let opts = AssemblyOptions::new("Flu");
    let result = translator
        .translate(&["FluProgressRule", "SchoolMoveRule"], &opts)
        .unwrap();

    // the records carry a t gate, but no emitted dispatch ever reads it
    let call_sections: Vec<&str> = result
        .agent_source
        .split("def __call__(self):")
        .skip(1)
        .collect();
    assert!(!call_sections.is_empty());
    for section in call_sections {
        let gate = section.split("\n\n").next().unwrap_or(section);
        assert!(gate.contains("self.i"));
        assert!(!gate.contains("self.t"));
    }
}

#[test]
fn test_artifacts_write_cleanly() {
    let translator = fixture();
    let opts = AssemblyOptions::new("Flu");
    let result = translator
        .translate(&["FluProgressRule", "SchoolMoveRule"], &opts)
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    for (file, source) in [
        (&result.agent_file, &result.agent_source),
        (&result.model_file, &result.model_source),
        (&result.support_file, &result.support_source),
    ] {
        let path = dir.path().join(file);
        std::fs::write(&path, source).unwrap();
        let read_back = std::fs::read_to_string(&path).unwrap();
        assert_eq!(&read_back, source);
    }
}

#[test]
fn test_unregistered_top_level_rule_is_an_error() {
    let translator = fixture();
    let opts = AssemblyOptions::new("Flu");
    assert!(translator.translate(&["NoSuchRule"], &opts).is_err());
}

#[test]
fn test_diagnostics_accumulate_without_stopping() {
    let mut translator = Translator::new();
    translator.register(RuleSource::new(
        "NoisyRule",
        "class NoisyRule(Rule):\n\
         \x20   def apply(self, pop, group, iter, t):\n\
         \x20       group.split()\n\
         \x20       r.allocate(1)\n\
         \x20       return None\n",
    ));
    let opts = AssemblyOptions::new("Noisy");
    let result = translator.translate(&["NoisyRule"], &opts).unwrap();
    assert!(result.diagnostics.len() >= 2);
    assert!(result.agent_source.contains("group.split()"));
}
