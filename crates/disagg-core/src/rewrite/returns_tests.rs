use super::*;
use crate::parser::parse_module;
use crate::TranslateError;

fn rewrite_apply(body_src: &str) -> crate::Result<String> {
    let src = format!("def apply(self, pop, group, iter, t):\n{body_src}");
    let mut tree = parse_module(&src).expect("parse failed");
    let mut flags = UsageFlags::new();
    {
        let mut rw = Rewriter::new(&mut tree.arena, tree.root, &mut flags);
        rw.rewrite_module(tree.root)?;
    }
    Ok(tree.arena.to_source(tree.root))
}

#[test]
fn test_return_none_becomes_bare_return() {
    let src = rewrite_apply("    return None\n").unwrap();
    assert!(src.contains("\n    return\n"));
    assert!(!src.contains("return None"));
}

#[test]
fn test_single_outcome_is_unconditional() {
    let src = rewrite_apply("    return [GroupSplitSpec(p=1.0, attr_set={'flu': 'i'})]\n").unwrap();
    // probability is moot: no draw, no conditional
    assert!(!src.contains("_x"));
    assert!(src.contains("    setattr(group, 'flu', 'i')\n    return\n"));
}

#[test]
fn test_two_outcomes_draw_and_implicit_else() {
    let src = rewrite_apply(
        "    return [\n\
         \x20       GroupSplitSpec(p=0.3, attr_set={'flu': 'i'}),\n\
         \x20       GroupSplitSpec(p=0.7, attr_set={'flu': 's'}),\n\
         \x20   ]\n",
    )
    .unwrap();
    assert!(src.contains("    _x = pop.random.random()\n"));
    assert!(src.contains("    if _x < 0.3:\n"));
    // the final outcome is never probability-checked
    assert!(!src.contains("_x < 0.7"));
    assert!(!src.contains("0.3 + 0.7"));
    assert!(src.contains("    else:\n        setattr(group, 'flu', 's')\n        return\n"));
}

#[test]
fn test_cumulative_thresholds_over_three_outcomes() {
    let src = rewrite_apply(
        "    return [\n\
         \x20       GroupSplitSpec(p=0.1, attr_set={'s': 1}),\n\
         \x20       GroupSplitSpec(p=0.2, attr_set={'s': 2}),\n\
         \x20       GroupSplitSpec(attr_set={'s': 3}),\n\
         \x20   ]\n",
    )
    .unwrap();
    assert!(src.contains("if _x < 0.1:\n"));
    assert!(src.contains("if _x < 0.1 + 0.2:\n"));
    // directives always end in a return, so the flat chain dispatches
    // at most one branch
    assert!(src.contains("else:\n"));
    assert!(src.contains("setattr(group, 's', 3)"));
}

#[test]
fn test_relocation_and_delete_directives() {
    let src = rewrite_apply(
        "    return [\n\
         \x20       GroupSplitSpec(p=0.1, attr_set={'foo': 1}, rel_set={Site.AT: site}, attr_del=['d'], rel_del={'origin'}),\n\
         \x20       GroupSplitSpec(p=0.9),\n\
         \x20   ]\n",
    )
    .unwrap();
    assert!(src.contains("pop.grid.move_agent(group, site)\n"));
    assert!(src.contains("setattr(group, 'foo', 1)\n"));
    assert!(src.contains("delattr(group, 'd')\n"));
    assert!(src.contains("delattr(group, 'origin')\n"));
}

#[test]
fn test_relocation_string_key_and_canonical_names() {
    let src = rewrite_apply(
        "    return [\n\
         \x20       GroupSplitSpec(p=0.5, rel_set={'@': site, 'Home Base': h}),\n\
         \x20       GroupSplitSpec(p=0.5),\n\
         \x20   ]\n",
    )
    .unwrap();
    assert!(src.contains("pop.grid.move_agent(group, site)\n"));
    // constant keys are canonicalized at translation time
    assert!(src.contains("setattr(group, 'home_base', h)\n"));
}

#[test]
fn test_void_marker_becomes_field_map() {
    let src = rewrite_apply(
        "    return [\n\
         \x20       GroupSplitSpec(p=0.2, attr_set=Group.VOID),\n\
         \x20       GroupSplitSpec(p=0.8),\n\
         \x20   ]\n",
    )
    .unwrap();
    assert!(src.contains("setattr(group, '__void__', True)\n"));
}

#[test]
fn test_comprehension_outcome_loop() {
    let src = rewrite_apply(
        "    return [GroupSplitSpec(p=pop.get_mass(s) / total, attr_set={'at': s}) for s in sites if s != here]\n",
    )
    .unwrap();
    assert!(src.contains("    _cml_prob = 0.0\n"));
    assert!(src.contains("    _x = pop.random.random()\n"));
    assert!(src.contains("    for s in sites:\n"));
    assert!(src.contains("        if s != here:\n"));
    assert!(src.contains("_cml_prob += pop.get_mass(pop, s) / total\n"));
    assert!(src.contains("if _x < _cml_prob:\n"));
    // no early exit: later iterations keep re-firing once matched
    assert!(!src.contains("break"));
}

#[test]
fn test_mixed_outcome_list_is_fatal() {
    let err = rewrite_apply(
        "    return [GroupSplitSpec(p=0.5), make_something_else()]\n",
    )
    .unwrap_err();
    assert!(matches!(err, TranslateError::MixedOutcomeList(_)));
}

#[test]
fn test_unrecognized_shape_in_transition_method_is_fatal() {
    let err = rewrite_apply("    return outcome_object\n").unwrap_err();
    assert!(matches!(err, TranslateError::MalformedReturn(_)));
}

#[test]
fn test_unrecognized_shape_outside_transition_method_passes() {
    let src = "def helper(self):\n    return outcome_object\n";
    let mut tree = parse_module(src).unwrap();
    let mut flags = UsageFlags::new();
    {
        let mut rw = Rewriter::new(&mut tree.arena, tree.root, &mut flags);
        rw.rewrite_module(tree.root).unwrap();
    }
    assert_eq!(
        tree.arena.to_source(tree.root),
        "def helper(self):\n    return outcome_object\n"
    );
}

#[test]
fn test_non_outcome_list_passes_through() {
    let src = rewrite_apply("    return [1, 2, 3]\n").unwrap();
    assert!(src.contains("return [1, 2, 3]\n"));
}

#[test]
fn test_missing_probability_before_final_outcome_is_fatal() {
    let err = rewrite_apply(
        "    return [\n\
         \x20       GroupSplitSpec(attr_set={'a': 1}),\n\
         \x20       GroupSplitSpec(attr_set={'a': 2}),\n\
         \x20       GroupSplitSpec(attr_set={'a': 3}),\n\
         \x20   ]\n",
    )
    .unwrap_err();
    assert!(matches!(err, TranslateError::MalformedReturn(_)));
}
