use super::*;

fn arena() -> Arena {
    Arena::new()
}

#[test]
fn test_literal_rendering() {
    let mut a = arena();
    let n = a.alloc(Node::Int(42));
    assert_eq!(a.to_source(n), "42");
    let f = a.alloc(Node::Float(0.5));
    assert_eq!(a.to_source(f), "0.5");
    let w = a.alloc(Node::Float(2.0));
    assert_eq!(a.to_source(w), "2.0");
    let s = a.alloc(Node::Str("it's".to_string()));
    assert_eq!(a.to_source(s), "'it\\'s'");
    let t = a.alloc(Node::Bool(true));
    assert_eq!(a.to_source(t), "True");
    let none = a.alloc(Node::NoneLit);
    assert_eq!(a.to_source(none), "None");
}

#[test]
fn test_call_with_kwargs() {
    let mut a = arena();
    let f = a.alloc(Node::Name("f".to_string()));
    let one = a.alloc(Node::Int(1));
    let two = a.alloc(Node::Int(2));
    let call = a.alloc(Node::Call {
        func: f,
        args: vec![one],
        kwargs: vec![("p".to_string(), two)],
    });
    assert_eq!(a.to_source(call), "f(1, p=2)");
}

#[test]
fn test_binop_precedence_parens() {
    let mut a = arena();
    let one = a.alloc(Node::Int(1));
    let two = a.alloc(Node::Int(2));
    let three = a.alloc(Node::Int(3));
    let sum = a.alloc(Node::BinOp {
        op: BinOp::Add,
        left: one,
        right: two,
    });
    let prod = a.alloc(Node::BinOp {
        op: BinOp::Mul,
        left: sum,
        right: three,
    });
    assert_eq!(a.to_source(prod), "(1 + 2) * 3");

    // left-assoc chain needs no parens
    let a2 = a.alloc(Node::Int(4));
    let chain = a.alloc(Node::BinOp {
        op: BinOp::Add,
        left: prod,
        right: a2,
    });
    assert_eq!(a.to_source(chain), "(1 + 2) * 3 + 4");
}

#[test]
fn test_chained_comparison() {
    let mut a = arena();
    let lo = a.alloc(Node::Int(0));
    let x = a.alloc(Node::Name("x".to_string()));
    let hi = a.alloc(Node::Int(10));
    let cmp = a.alloc(Node::Compare {
        left: lo,
        ops: vec![CmpOp::LtE, CmpOp::LtE],
        comparators: vec![x, hi],
    });
    assert_eq!(a.to_source(cmp), "0 <= x <= 10");
}

#[test]
fn test_if_orelse_collapses_to_elif() {
    let mut a = arena();
    let t1 = a.alloc(Node::Name("a".to_string()));
    let t2 = a.alloc(Node::Name("b".to_string()));
    let p1 = a.alloc(Node::Pass);
    let p2 = a.alloc(Node::Pass);
    let p3 = a.alloc(Node::Pass);
    let inner = a.alloc(Node::If {
        test: t2,
        body: vec![p2],
        orelse: vec![p3],
    });
    let outer = a.alloc(Node::If {
        test: t1,
        body: vec![p1],
        orelse: vec![inner],
    });
    let src = a.to_source(outer);
    assert_eq!(src, "if a:\n    pass\nelif b:\n    pass\nelse:\n    pass\n");
}

#[test]
fn test_function_def_and_return() {
    let mut a = arena();
    let ret = a.alloc(Node::Return { value: None });
    let f = a.alloc(Node::FunctionDef {
        name: "step".to_string(),
        params: vec!["self".to_string()],
        body: vec![ret],
    });
    assert_eq!(a.to_source(f), "def step(self):\n    return\n");
}

#[test]
fn test_dict_and_set_literals() {
    let mut a = arena();
    let k = a.alloc(Node::Str("flu".to_string()));
    let v = a.alloc(Node::Str("s".to_string()));
    let d = a.alloc(Node::DictLit {
        keys: vec![k],
        values: vec![v],
    });
    assert_eq!(a.to_source(d), "{'flu': 's'}");

    let e = a.alloc(Node::SetLit { elts: vec![] });
    assert_eq!(a.to_source(e), "set()");
}

#[test]
fn test_comprehension_rendering() {
    let mut a = arena();
    let uid = {
        let an = a.alloc(Node::Name("a".to_string()));
        a.alloc(Node::Attribute {
            value: an,
            attr: "unique_id".to_string(),
        })
    };
    let val = a.alloc(Node::Name("a".to_string()));
    let target = a.alloc(Node::Name("a".to_string()));
    let iter = {
        let pop = a.alloc(Node::Name("pop".to_string()));
        let sched = a.alloc(Node::Attribute {
            value: pop,
            attr: "schedule".to_string(),
        });
        a.alloc(Node::Attribute {
            value: sched,
            attr: "agents".to_string(),
        })
    };
    let comp = a.alloc(Node::DictComp {
        key: uid,
        value: val,
        target,
        iter,
        ifs: vec![],
    });
    assert_eq!(
        a.to_source(comp),
        "{a.unique_id: a for a in pop.schedule.agents}"
    );
}

#[test]
fn test_with_statement() {
    let mut a = arena();
    let open = a.alloc(Node::Name("open".to_string()));
    let fname = a.alloc(Node::Name("rule_file".to_string()));
    let mode = a.alloc(Node::Str("r".to_string()));
    let call = a.alloc(Node::Call {
        func: open,
        args: vec![fname, mode],
        kwargs: vec![],
    });
    let p = a.alloc(Node::Pass);
    let w = a.alloc(Node::With {
        context: call,
        binding: Some("file".to_string()),
        body: vec![p],
    });
    assert_eq!(
        a.to_source(w),
        "with open(rule_file, 'r') as file:\n    pass\n"
    );
}
