use super::{parse_module, ParseTree};
use crate::ast::{CmpOp, Node, NodeId};

fn parse(src: &str) -> ParseTree {
    parse_module(src).expect("parse failed")
}

fn module_body(tree: &ParseTree) -> Vec<NodeId> {
    match tree.arena.node(tree.root) {
        Node::Module { body } => body.clone(),
        other => panic!("expected module, got {other:?}"),
    }
}

#[test]
fn test_parse_class_with_bases_and_method() {
    let tree = parse(
        "class FluRule(Rule):\n\
         \x20   def apply(self, pop, group, iter, t):\n\
         \x20       return None\n",
    );
    let body = module_body(&tree);
    assert_eq!(body.len(), 1);
    match tree.arena.node(body[0]) {
        Node::ClassDef { name, bases, body } => {
            assert_eq!(name, "FluRule");
            assert_eq!(bases.len(), 1);
            assert_eq!(body.len(), 1);
            match tree.arena.node(body[0]) {
                Node::FunctionDef { name, params, .. } => {
                    assert_eq!(name, "apply");
                    assert_eq!(params, &["self", "pop", "group", "iter", "t"]);
                }
                other => panic!("expected function def, got {other:?}"),
            }
        }
        other => panic!("expected class def, got {other:?}"),
    }
}

#[test]
fn test_parse_call_with_keyword_arguments() {
    let tree = parse("GroupSplitSpec(p=0.3, attr_set={'flu': 's'})\n");
    let body = module_body(&tree);
    let expr = match tree.arena.node(body[0]) {
        Node::ExprStmt(e) => *e,
        other => panic!("expected expression statement, got {other:?}"),
    };
    match tree.arena.node(expr) {
        Node::Call { args, kwargs, .. } => {
            assert!(args.is_empty());
            assert_eq!(kwargs.len(), 2);
            assert_eq!(kwargs[0].0, "p");
            assert_eq!(kwargs[1].0, "attr_set");
        }
        other => panic!("expected call, got {other:?}"),
    }
}

#[test]
fn test_parse_multiline_return_list() {
    let tree = parse(
        "def apply(self, pop, group, iter, t):\n\
         \x20   return [\n\
         \x20       GroupSplitSpec(p=0.3, attr_set={'flu': 'i'}),\n\
         \x20       GroupSplitSpec(p=0.7),\n\
         \x20   ]\n",
    );
    let body = module_body(&tree);
    let fbody = match tree.arena.node(body[0]) {
        Node::FunctionDef { body, .. } => body.clone(),
        other => panic!("expected function def, got {other:?}"),
    };
    match tree.arena.node(fbody[0]) {
        Node::Return { value: Some(v) } => match tree.arena.node(*v) {
            Node::ListLit { elts } => assert_eq!(elts.len(), 2),
            other => panic!("expected list literal, got {other:?}"),
        },
        other => panic!("expected return, got {other:?}"),
    }
}

#[test]
fn test_parse_lambda_and_comprehension() {
    let tree = parse("qry = GroupQry(cond=[lambda g: g.get_attr('a') > 0])\n");
    let src = tree.arena.to_source(tree.root);
    assert_eq!(
        src,
        "qry = GroupQry(cond=[lambda g: g.get_attr('a') > 0])\n"
    );

    let tree = parse("return [GroupSplitSpec(p=w) for w in weights if w > 0]\n");
    let body = module_body(&tree);
    match tree.arena.node(body[0]) {
        Node::Return { value: Some(v) } => {
            assert!(matches!(tree.arena.node(*v), Node::ListComp { .. }))
        }
        other => panic!("expected return, got {other:?}"),
    }
}

#[test]
fn test_parse_chained_comparison_roundtrip() {
    let tree = parse("x = 0 <= t <= 10\n");
    let body = module_body(&tree);
    match tree.arena.node(body[0]) {
        Node::Assign { value, .. } => match tree.arena.node(*value) {
            Node::Compare { ops, .. } => assert_eq!(ops, &[CmpOp::LtE, CmpOp::LtE]),
            other => panic!("expected comparison, got {other:?}"),
        },
        other => panic!("expected assignment, got {other:?}"),
    }
}

#[test]
fn test_parse_if_elif_else() {
    let tree = parse(
        "if a:\n\
         \x20   pass\n\
         elif b:\n\
         \x20   pass\n\
         else:\n\
         \x20   pass\n",
    );
    let body = module_body(&tree);
    match tree.arena.node(body[0]) {
        Node::If { orelse, .. } => {
            assert_eq!(orelse.len(), 1);
            match tree.arena.node(orelse[0]) {
                Node::If { orelse, .. } => assert_eq!(orelse.len(), 1),
                other => panic!("expected nested if, got {other:?}"),
            }
        }
        other => panic!("expected if, got {other:?}"),
    }
}

#[test]
fn test_parse_for_tuple_target() {
    let tree = parse(
        "for name, value in attrs.items():\n\
         \x20   setattr(g, name, value)\n",
    );
    let body = module_body(&tree);
    match tree.arena.node(body[0]) {
        Node::For { target, .. } => {
            assert!(matches!(tree.arena.node(*target), Node::TupleLit { .. }))
        }
        other => panic!("expected for, got {other:?}"),
    }
}

#[test]
fn test_parse_imports_kept_raw() {
    let tree = parse("from pram.entity import GroupQry\nimport random\n");
    let body = module_body(&tree);
    assert_eq!(body.len(), 2);
    match tree.arena.node(body[0]) {
        Node::Import { raw } => assert_eq!(raw, "from pram.entity import GroupQry"),
        other => panic!("expected import, got {other:?}"),
    }
    match tree.arena.node(body[1]) {
        Node::Import { raw } => assert_eq!(raw, "import random"),
        other => panic!("expected import, got {other:?}"),
    }
}

#[test]
fn test_parse_docstring_statement() {
    let tree = parse(
        "def apply(self, pop, group, iter, t):\n\
         \x20   \"\"\"Transition logic.\"\"\"\n\
         \x20   return None\n",
    );
    let body = module_body(&tree);
    match tree.arena.node(body[0]) {
        Node::FunctionDef { body, .. } => assert_eq!(body.len(), 2),
        other => panic!("expected function def, got {other:?}"),
    }
}

#[test]
fn test_parse_error_on_garbage() {
    assert!(parse_module("def f(:\n").is_err());
    assert!(parse_module("class :\n").is_err());
}
