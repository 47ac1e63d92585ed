// Restructures declarative weighted-outcome returns into procedural
// branch code: one uniform draw, then cumulative-probability dispatch.
//
// Recognized shapes inside a transition method:
//   return None                      -> bare return
//   return [Outcome(...), ...]       -> draw + chained conditionals
//   return [Outcome(...) for x in s] -> draw + accumulator loop
// Anything else inside the transition method is a fatal translation
// error; outside it, returns pass through untouched.

use super::{idents, DiagnosticKind, Rewriter};
use crate::ast::{BinOp, BoolOpKind, CmpOp, Node, NodeId};
use crate::{Result, TranslateError};

/// Name of the weighted-outcome constructor in rule sources.
pub const OUTCOME_CTOR: &str = "GroupSplitSpec";

/// Name of the transition method on every rule class.
pub const TRANSITION_METHOD: &str = "apply";

pub(crate) fn restructure_return(rw: &mut Rewriter, ret: NodeId) -> Result<Vec<NodeId>> {
    let Node::Return { value } = rw.arena.node(ret).clone() else {
        return Ok(vec![ret]);
    };
    let Some(v) = value else {
        return Ok(vec![ret]);
    };

    match rw.arena.node(v).clone() {
        Node::NoneLit => {
            rw.arena.replace(ret, Node::Return { value: None });
            Ok(vec![ret])
        }
        // other literal constants pass through
        Node::Int(_) | Node::Float(_) | Node::Str(_) | Node::Bool(_) => Ok(vec![ret]),

        Node::ListLit { elts } | Node::TupleLit { elts } => {
            restructure_fixed_list(rw, ret, &elts)
        }

        Node::ListComp {
            elt,
            target,
            iter,
            ifs,
        } => {
            if !is_outcome_call(rw, elt) {
                return Ok(vec![ret]);
            }
            restructure_comprehension(rw, elt, target, iter, &ifs)
        }

        _ => {
            if inside_transition_method(rw, ret) {
                Err(TranslateError::MalformedReturn(
                    "a transition method may only return None, a sequence of weighted-outcome \
                     constructors, or a comprehension over one"
                        .to_string(),
                ))
            } else {
                Ok(vec![ret])
            }
        }
    }
}

fn restructure_fixed_list(rw: &mut Rewriter, ret: NodeId, elts: &[NodeId]) -> Result<Vec<NodeId>> {
    let outcome_flags: Vec<bool> = elts.iter().map(|e| is_outcome_call(rw, *e)).collect();
    if !outcome_flags.iter().all(|b| *b) {
        if outcome_flags.iter().any(|b| *b) {
            return Err(TranslateError::MixedOutcomeList(
                "a returned sequence contains both weighted-outcome constructors and other \
                 values"
                    .to_string(),
            ));
        }
        // a list of something else entirely; not ours to touch
        return Ok(vec![ret]);
    }

    // probability is moot for a single outcome
    if elts.len() == 1 {
        let (stmts, _) = parse_outcome(rw, elts[0])?;
        return Ok(stmts);
    }

    let mut out = vec![draw_assign(rw)];
    if elts.is_empty() {
        return Ok(out);
    }

    let last = elts.len() - 1;
    let mut cumulative: Vec<NodeId> = Vec::new();
    for (k, elt) in elts[..last].iter().enumerate() {
        let (stmts, p) = parse_outcome(rw, *elt)?;
        let p = p.ok_or_else(|| {
            TranslateError::MalformedReturn(
                "a weighted outcome before the final one is missing its probability".to_string(),
            )
        })?;
        cumulative.push(p);
        let threshold = sum_nodes(rw, &cumulative);

        // the final outcome never gets a probability test; it rides as
        // the else branch of the second-to-last conditional and absorbs
        // whatever probability mass remains
        let orelse = if k == last - 1 {
            parse_outcome(rw, elts[last])?.0
        } else {
            vec![]
        };

        let x = rw.nm("_x");
        let test = rw.alloc(Node::Compare {
            left: x,
            ops: vec![CmpOp::Lt],
            comparators: vec![threshold],
        });
        out.push(rw.alloc(Node::If {
            test,
            body: stmts,
            orelse,
        }));
    }
    Ok(out)
}

fn restructure_comprehension(
    rw: &mut Rewriter,
    elt: NodeId,
    target: NodeId,
    iter: NodeId,
    ifs: &[NodeId],
) -> Result<Vec<NodeId>> {
    let (stmts, p) = parse_outcome(rw, elt)?;
    let p = p.ok_or_else(|| {
        TranslateError::MalformedReturn(
            "a weighted outcome inside a comprehension is missing its probability".to_string(),
        )
    })?;

    // _cml_prob = 0.0
    let zero = rw.alloc(Node::Float(0.0));
    let acc_target = rw.nm("_cml_prob");
    let init = rw.alloc(Node::Assign {
        target: acc_target,
        value: zero,
    });
    let draw = draw_assign(rw);

    // _cml_prob += p
    // if _x < _cml_prob: <directives>
    let aug_target = rw.nm("_cml_prob");
    let aug = rw.alloc(Node::AugAssign {
        target: aug_target,
        op: BinOp::Add,
        value: p,
    });
    let x = rw.nm("_x");
    let acc = rw.nm("_cml_prob");
    let test = rw.alloc(Node::Compare {
        left: x,
        ops: vec![CmpOp::Lt],
        comparators: vec![acc],
    });
    // the accumulator only grows, so later iterations keep satisfying
    // the test; no early exit is emitted
    let inner = rw.alloc(Node::If {
        test,
        body: stmts,
        orelse: vec![],
    });

    let loop_body = if ifs.is_empty() {
        vec![aug, inner]
    } else {
        let cond = if ifs.len() == 1 {
            ifs[0]
        } else {
            rw.alloc(Node::BoolOp {
                op: BoolOpKind::And,
                values: ifs.to_vec(),
            })
        };
        vec![rw.alloc(Node::If {
            test: cond,
            body: vec![aug, inner],
            orelse: vec![],
        })]
    };

    let for_loop = rw.alloc(Node::For {
        target,
        iter,
        body: loop_body,
    });
    Ok(vec![init, draw, for_loop])
}

/// Extract the mutation directives and probability from one
/// weighted-outcome constructor call.
///
/// Field-set maps emit one setattr per entry, except the relocation
/// sentinel entry which moves the agent instead; field-delete
/// collections emit delattr calls. A trailing bare return is always
/// appended.
pub(crate) fn parse_outcome(
    rw: &mut Rewriter,
    call: NodeId,
) -> Result<(Vec<NodeId>, Option<NodeId>)> {
    let Node::Call { kwargs, .. } = rw.arena.node(call).clone() else {
        return Err(TranslateError::MalformedReturn(
            "expected a weighted-outcome constructor call".to_string(),
        ));
    };

    let mut stmts = Vec::new();
    let mut probability = None;

    for (kw, mut value) in kwargs {
        if kw == "p" {
            probability = Some(value);
        }
        if kw.ends_with("set") {
            // the void marker is an attribute constant, not a map
            if is_void_marker(rw, value) {
                let key = rw.str_of("__void__");
                let val = rw.alloc(Node::Bool(true));
                value = rw.alloc(Node::DictLit {
                    keys: vec![key],
                    values: vec![val],
                });
            }
            let Node::DictLit {
                mut keys,
                mut values,
            } = rw.arena.node(value).clone()
            else {
                rw.diag(
                    DiagnosticKind::Advisory,
                    format!("outcome argument {kw} is not a field map; entry skipped"),
                );
                continue;
            };

            // relocation entry first: it becomes a move, not a setattr
            if let Some(idx) = keys.iter().position(|k| is_relocation_key(rw, *k)) {
                keys.remove(idx);
                let dest = values.remove(idx);
                let mover = rw.attr_path(&["pop", "grid", "move_agent"]);
                let group = rw.nm("group");
                let call = rw.call_n(mover, vec![group, dest]);
                stmts.push(rw.expr_stmt(call));
            }

            for (k, val) in keys.into_iter().zip(values.into_iter()) {
                let key = canonical_key(rw, k);
                let setattr_fn = rw.nm("setattr");
                let group = rw.nm("group");
                let call = rw.call_n(setattr_fn, vec![group, key, val]);
                stmts.push(rw.expr_stmt(call));
            }
        }
        if kw.ends_with("del") {
            let elts = match rw.arena.node(value).clone() {
                Node::SetLit { elts } | Node::ListLit { elts } | Node::TupleLit { elts } => elts,
                _ => {
                    rw.diag(
                        DiagnosticKind::Advisory,
                        format!("outcome argument {kw} is not a key collection; entry skipped"),
                    );
                    continue;
                }
            };
            for k in elts {
                let key = canonical_key(rw, k);
                let delattr_fn = rw.nm("delattr");
                let group = rw.nm("group");
                let call = rw.call_n(delattr_fn, vec![group, key]);
                stmts.push(rw.expr_stmt(call));
            }
        }
    }

    stmts.push(rw.alloc(Node::Return { value: None }));
    Ok((stmts, probability))
}

/// `_x = pop.random.random()`
fn draw_assign(rw: &mut Rewriter) -> NodeId {
    let target = rw.nm("_x");
    let rng = rw.attr_path(&["pop", "random", "random"]);
    let value = rw.call_n(rng, vec![]);
    rw.alloc(Node::Assign { target, value })
}

/// Left-associated sum of the probability expressions seen so far.
fn sum_nodes(rw: &mut Rewriter, nodes: &[NodeId]) -> NodeId {
    let mut acc = nodes[0];
    for n in &nodes[1..] {
        acc = rw.alloc(Node::BinOp {
            op: BinOp::Add,
            left: acc,
            right: *n,
        });
    }
    acc
}

fn canonical_key(rw: &mut Rewriter, key: NodeId) -> NodeId {
    let resolved = match rw.arena.node(key) {
        Node::Str(s) => Some(idents::resolve(s)),
        _ => None,
    };
    match resolved {
        Some(r) => rw.str_of(&r),
        None => key,
    }
}

fn is_outcome_call(rw: &Rewriter, id: NodeId) -> bool {
    if let Node::Call { func, .. } = rw.arena.node(id) {
        matches!(rw.arena.node(*func), Node::Name(n) if n == OUTCOME_CTOR)
    } else {
        false
    }
}

fn is_relocation_key(rw: &Rewriter, id: NodeId) -> bool {
    match rw.arena.node(id) {
        Node::Str(s) => s == idents::RELOCATION_KEY,
        Node::Attribute { value, attr } => {
            attr == "AT" && matches!(rw.arena.node(*value), Node::Name(n) if n == "Site")
        }
        _ => false,
    }
}

fn is_void_marker(rw: &Rewriter, id: NodeId) -> bool {
    match rw.arena.node(id) {
        Node::Attribute { value, attr } => {
            attr == "VOID" && matches!(rw.arena.node(*value), Node::Name(n) if n == "Group")
        }
        _ => false,
    }
}

fn inside_transition_method(rw: &Rewriter, id: NodeId) -> bool {
    rw.parents
        .ancestor(
            &*rw.arena,
            id,
            |n| matches!(n, Node::FunctionDef { name, .. } if name == TRANSITION_METHOD),
        )
        .is_some()
}
