// Arena-allocated syntax tree for the rule-source dialect.
// Both the parser and the rewrite passes target this tree; generated
// artifacts are rendered from it by `source_gen`.

pub mod source_gen;

#[cfg(test)]
mod source_gen_tests;

use serde::{Deserialize, Serialize};

/// Index of a node inside an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}

/// Comparison operators, including the membership tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

/// Short-circuiting boolean operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoolOpKind {
    And,
    Or,
}

/// A single syntax node. Statements and expressions share one enum;
/// children are arena ids, never owned boxes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    // Literals
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    NoneLit,

    // Names and access paths
    Name(String),
    Attribute {
        value: NodeId,
        attr: String,
    },
    Subscript {
        value: NodeId,
        index: NodeId,
    },

    // Calls carry positional and keyword arguments separately; the
    // rewrite table's argument-resolution precedence depends on it.
    Call {
        func: NodeId,
        args: Vec<NodeId>,
        kwargs: Vec<(String, NodeId)>,
    },

    BinOp {
        op: BinOp,
        left: NodeId,
        right: NodeId,
    },
    UnaryOp {
        op: UnaryOp,
        operand: NodeId,
    },
    BoolOp {
        op: BoolOpKind,
        values: Vec<NodeId>,
    },
    // Chained comparison: left ops[0] comparators[0] ops[1] comparators[1] ...
    Compare {
        left: NodeId,
        ops: Vec<CmpOp>,
        comparators: Vec<NodeId>,
    },
    IfExp {
        test: NodeId,
        body: NodeId,
        orelse: NodeId,
    },
    Lambda {
        params: Vec<String>,
        body: NodeId,
    },

    // Collection literals
    ListLit {
        elts: Vec<NodeId>,
    },
    TupleLit {
        elts: Vec<NodeId>,
    },
    SetLit {
        elts: Vec<NodeId>,
    },
    DictLit {
        keys: Vec<NodeId>,
        values: Vec<NodeId>,
    },

    // Comprehensions are restricted to a single generator.
    ListComp {
        elt: NodeId,
        target: NodeId,
        iter: NodeId,
        ifs: Vec<NodeId>,
    },
    GeneratorExp {
        elt: NodeId,
        target: NodeId,
        iter: NodeId,
        ifs: Vec<NodeId>,
    },
    DictComp {
        key: NodeId,
        value: NodeId,
        target: NodeId,
        iter: NodeId,
        ifs: Vec<NodeId>,
    },

    // Statements
    Module {
        body: Vec<NodeId>,
    },
    ClassDef {
        name: String,
        bases: Vec<NodeId>,
        body: Vec<NodeId>,
    },
    FunctionDef {
        name: String,
        params: Vec<String>,
        body: Vec<NodeId>,
    },
    Assign {
        target: NodeId,
        value: NodeId,
    },
    AugAssign {
        target: NodeId,
        op: BinOp,
        value: NodeId,
    },
    ExprStmt(NodeId),
    Return {
        value: Option<NodeId>,
    },
    If {
        test: NodeId,
        body: Vec<NodeId>,
        orelse: Vec<NodeId>,
    },
    For {
        target: NodeId,
        iter: NodeId,
        body: Vec<NodeId>,
    },
    While {
        test: NodeId,
        body: Vec<NodeId>,
    },
    With {
        context: NodeId,
        binding: Option<String>,
        body: Vec<NodeId>,
    },
    // Import statements are carried verbatim; consolidation happens at
    // the text level in the import extractor, not on the tree.
    Import {
        raw: String,
    },
    Pass,
}

/// Append-only node storage. Rewrites either allocate fresh nodes or
/// replace a node in place, which keeps every pre-existing id (and the
/// parent side-table built over them) valid for ancestor queries.
#[derive(Debug, Clone, Default)]
pub struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Swap the node stored at `id`. The id itself stays valid, so any
    /// parent relationships recorded for it survive the replacement.
    pub fn replace(&mut self, id: NodeId, node: Node) {
        self.nodes[id.index()] = node;
    }

    /// Direct children of a node, in syntactic order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        match self.node(id) {
            Node::Int(_)
            | Node::Float(_)
            | Node::Str(_)
            | Node::Bool(_)
            | Node::NoneLit
            | Node::Name(_)
            | Node::Import { .. }
            | Node::Pass => {}
            Node::Attribute { value, .. } => out.push(*value),
            Node::Subscript { value, index } => {
                out.push(*value);
                out.push(*index);
            }
            Node::Call { func, args, kwargs } => {
                out.push(*func);
                out.extend(args.iter().copied());
                out.extend(kwargs.iter().map(|(_, v)| *v));
            }
            Node::BinOp { left, right, .. } => {
                out.push(*left);
                out.push(*right);
            }
            Node::UnaryOp { operand, .. } => out.push(*operand),
            Node::BoolOp { values, .. } => out.extend(values.iter().copied()),
            Node::Compare {
                left, comparators, ..
            } => {
                out.push(*left);
                out.extend(comparators.iter().copied());
            }
            Node::IfExp { test, body, orelse } => {
                out.push(*test);
                out.push(*body);
                out.push(*orelse);
            }
            Node::Lambda { body, .. } => out.push(*body),
            Node::ListLit { elts } | Node::TupleLit { elts } | Node::SetLit { elts } => {
                out.extend(elts.iter().copied())
            }
            Node::DictLit { keys, values } => {
                out.extend(keys.iter().copied());
                out.extend(values.iter().copied());
            }
            Node::ListComp {
                elt,
                target,
                iter,
                ifs,
            }
            | Node::GeneratorExp {
                elt,
                target,
                iter,
                ifs,
            } => {
                out.push(*elt);
                out.push(*target);
                out.push(*iter);
                out.extend(ifs.iter().copied());
            }
            Node::DictComp {
                key,
                value,
                target,
                iter,
                ifs,
            } => {
                out.push(*key);
                out.push(*value);
                out.push(*target);
                out.push(*iter);
                out.extend(ifs.iter().copied());
            }
            Node::Module { body } => out.extend(body.iter().copied()),
            Node::ClassDef { bases, body, .. } => {
                out.extend(bases.iter().copied());
                out.extend(body.iter().copied());
            }
            Node::FunctionDef { body, .. } => out.extend(body.iter().copied()),
            Node::Assign { target, value } => {
                out.push(*target);
                out.push(*value);
            }
            Node::AugAssign { target, value, .. } => {
                out.push(*target);
                out.push(*value);
            }
            Node::ExprStmt(e) => out.push(*e),
            Node::Return { value } => {
                if let Some(v) = value {
                    out.push(*v);
                }
            }
            Node::If { test, body, orelse } => {
                out.push(*test);
                out.extend(body.iter().copied());
                out.extend(orelse.iter().copied());
            }
            Node::For { target, iter, body } => {
                out.push(*target);
                out.push(*iter);
                out.extend(body.iter().copied());
            }
            Node::While { test, body } => {
                out.push(*test);
                out.extend(body.iter().copied());
            }
            Node::With { context, body, .. } => {
                out.push(*context);
                out.extend(body.iter().copied());
            }
        }
        out
    }
}

/// Parent side-table: node id -> parent id, built once after parsing.
/// Never used for mutation, only for ancestor lookup.
#[derive(Debug, Clone)]
pub struct ParentMap {
    parents: Vec<Option<NodeId>>,
}

impl ParentMap {
    /// Walk the tree under `root` and record each node's parent. The
    /// root itself has no parent.
    pub fn build(arena: &Arena, root: NodeId) -> Self {
        let mut parents = vec![None; arena.len()];
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            for child in arena.children(id) {
                parents[child.index()] = Some(id);
                stack.push(child);
            }
        }
        Self { parents }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(id.index()).copied().flatten()
    }

    /// First ancestor of `id` satisfying `pred`, or `None` once the root
    /// is passed. The node itself is not considered.
    pub fn ancestor(
        &self,
        arena: &Arena,
        id: NodeId,
        pred: impl Fn(&Node) -> bool,
    ) -> Option<NodeId> {
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            if pred(arena.node(p)) {
                return Some(p);
            }
            cur = self.parent(p);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_map_ancestor() {
        let mut arena = Arena::new();
        let name = arena.alloc(Node::Name("x".to_string()));
        let body = arena.alloc(Node::Return { value: Some(name) });
        let f = arena.alloc(Node::FunctionDef {
            name: "apply".to_string(),
            params: vec!["self".to_string()],
            body: vec![body],
        });
        let root = arena.alloc(Node::Module { body: vec![f] });

        let parents = ParentMap::build(&arena, root);
        assert_eq!(parents.parent(name), Some(body));
        assert_eq!(parents.parent(root), None);

        let anc = parents.ancestor(&arena, name, |n| matches!(n, Node::FunctionDef { .. }));
        assert_eq!(anc, Some(f));
        let none = parents.ancestor(&arena, name, |n| matches!(n, Node::Lambda { .. }));
        assert_eq!(none, None);
    }

    #[test]
    fn test_replace_keeps_ids_stable() {
        let mut arena = Arena::new();
        let a = arena.alloc(Node::Int(1));
        let b = arena.alloc(Node::Int(2));
        let op = arena.alloc(Node::BinOp {
            op: BinOp::Add,
            left: a,
            right: b,
        });
        arena.replace(a, Node::Int(10));
        assert_eq!(arena.node(a), &Node::Int(10));
        assert!(matches!(arena.node(op), Node::BinOp { .. }));
    }
}
