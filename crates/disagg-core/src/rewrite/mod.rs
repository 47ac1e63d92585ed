// The rewrite engine: restructures rule class definitions from the
// group-model source into transition logic for the agent-model runtime.
//
// The pass is bottom-up and in-place: child expressions are rewritten
// before their parents, and replacements reuse the original node ids so
// the parent side-table built at ingestion stays valid for ancestor
// queries throughout the pass.

pub mod calls;
pub mod flags;
pub mod idents;
pub mod returns;

#[cfg(test)]
mod class_tests;
#[cfg(test)]
mod returns_tests;

pub use calls::{CallRewrite, RewriteClass, SourcePrimitive};
pub use flags::{Helper, UsageFlags};

use tracing::warn;

use crate::ast::{Arena, BoolOpKind, CmpOp, Node, NodeId, ParentMap, UnaryOp};
use crate::Result;

/// A non-fatal translation finding. Diagnostics accumulate over the pass
/// and never stop it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A recognized source primitive the engine cannot express in the
    /// target runtime; the call is left unrewritten.
    Unsupported,
    /// A primitive that should not appear inside a rule body.
    Unexpected,
    /// Anything else worth surfacing without failing the run.
    Advisory,
}

/// Tree rewriter for one rule-source module.
pub struct Rewriter<'a> {
    pub(crate) arena: &'a mut Arena,
    pub(crate) parents: ParentMap,
    pub(crate) flags: &'a mut UsageFlags,
    pub diagnostics: Vec<Diagnostic>,
    pub rule_names: Vec<String>,
}

impl<'a> Rewriter<'a> {
    pub fn new(arena: &'a mut Arena, root: NodeId, flags: &'a mut UsageFlags) -> Self {
        let parents = ParentMap::build(arena, root);
        Self {
            arena,
            parents,
            flags,
            diagnostics: Vec::new(),
            rule_names: Vec::new(),
        }
    }

    pub(crate) fn diag(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.diagnostics.push(Diagnostic { kind, message });
    }

    // ---- small node builders ----

    pub(crate) fn alloc(&mut self, node: Node) -> NodeId {
        self.arena.alloc(node)
    }

    pub(crate) fn nm(&mut self, name: &str) -> NodeId {
        self.alloc(Node::Name(name.to_string()))
    }

    pub(crate) fn str_of(&mut self, s: &str) -> NodeId {
        self.alloc(Node::Str(s.to_string()))
    }

    pub(crate) fn attr_of(&mut self, base: NodeId, attr: &str) -> NodeId {
        self.alloc(Node::Attribute {
            value: base,
            attr: attr.to_string(),
        })
    }

    /// `attr_path(&["self", "model", "time"])` -> `self.model.time`
    pub(crate) fn attr_path(&mut self, parts: &[&str]) -> NodeId {
        let mut id = self.nm(parts[0]);
        for part in &parts[1..] {
            id = self.attr_of(id, part);
        }
        id
    }

    pub(crate) fn call_n(&mut self, func: NodeId, args: Vec<NodeId>) -> NodeId {
        self.alloc(Node::Call {
            func,
            args,
            kwargs: vec![],
        })
    }

    pub(crate) fn expr_stmt(&mut self, expr: NodeId) -> NodeId {
        self.alloc(Node::ExprStmt(expr))
    }

    /// Positional-then-keyword argument resolution used by every call
    /// handler; absent arguments become a literal `None`.
    pub(crate) fn call_argument(&mut self, call: NodeId, pos: usize, name: &str) -> NodeId {
        if let Node::Call { args, kwargs, .. } = self.arena.node(call) {
            if pos < args.len() {
                return args[pos];
            }
            for (k, v) in kwargs {
                if k == name {
                    return *v;
                }
            }
        }
        self.alloc(Node::NoneLit)
    }

    /// The implicit population receiver. Inside a single-parameter
    /// anonymous function (a query-descriptor predicate) the receiver is
    /// that parameter's owning model instead of the outer population.
    pub(crate) fn pop_receiver(&mut self, at: NodeId) -> NodeId {
        let lambda = self
            .parents
            .ancestor(&*self.arena, at, |n| matches!(n, Node::Lambda { .. }));
        if let Some(l) = lambda {
            if let Node::Lambda { params, .. } = self.arena.node(l) {
                if params.len() == 1 {
                    let param = params[0].clone();
                    let base = self.nm(&param);
                    return self.attr_of(base, "model");
                }
            }
        }
        self.nm("pop")
    }

    // ---- pass entry points ----

    /// Rewrite a parsed rule-source module in place.
    pub fn rewrite_module(&mut self, root: NodeId) -> Result<()> {
        let Node::Module { body } = self.arena.node(root).clone() else {
            return Ok(());
        };
        let mut new_body = Vec::new();
        for stmt in body {
            if matches!(self.arena.node(stmt), Node::ClassDef { .. }) {
                self.rewrite_class(stmt)?;
                new_body.push(stmt);
            } else {
                new_body.extend(self.rewrite_stmt(stmt)?);
            }
        }
        self.arena.replace(root, Node::Module { body: new_body });
        Ok(())
    }

    /// Per rule class: rewrite method bodies, replace the constructor,
    /// decide base retention, and append the dispatch method.
    fn rewrite_class(&mut self, id: NodeId) -> Result<()> {
        let Node::ClassDef { name, bases, body } = self.arena.node(id).clone() else {
            return Ok(());
        };

        let has_local_apply = body.iter().any(|s| {
            matches!(self.arena.node(*s), Node::FunctionDef { name, .. } if name == "apply")
        });

        let mut new_body = Vec::new();
        for stmt in body {
            match self.arena.node(stmt).clone() {
                Node::FunctionDef { name: fname, .. } if fname == "__init__" => {
                    new_body.push(self.synthesize_init());
                }
                Node::FunctionDef {
                    name: fname,
                    params,
                    body: fbody,
                } => {
                    let fbody = self.rewrite_stmts(fbody)?;
                    self.arena.replace(
                        stmt,
                        Node::FunctionDef {
                            name: fname,
                            params,
                            body: fbody,
                        },
                    );
                    new_body.push(stmt);
                }
                _ => new_body.extend(self.rewrite_stmt(stmt)?),
            }
        }

        self.rule_names.push(name.clone());

        // inheritance is only load-bearing when the transition method
        // must come from a base class
        let bases = if has_local_apply { vec![] } else { bases };

        new_body.push(self.synthesize_dispatch());
        self.arena.replace(id, Node::ClassDef { name, bases, body: new_body });
        Ok(())
    }

    pub(crate) fn rewrite_stmts(&mut self, stmts: Vec<NodeId>) -> Result<Vec<NodeId>> {
        let mut out = Vec::new();
        for stmt in stmts {
            out.extend(self.rewrite_stmt(stmt)?);
        }
        Ok(out)
    }

    /// Rewrite one statement; restructured returns and expanded calls
    /// may replace it with several.
    pub(crate) fn rewrite_stmt(&mut self, id: NodeId) -> Result<Vec<NodeId>> {
        match self.arena.node(id).clone() {
            Node::Return { value } => {
                if let Some(v) = value {
                    self.rewrite_expr(v)?;
                }
                returns::restructure_return(self, id)
            }
            Node::ExprStmt(e) => {
                if matches!(self.arena.node(e), Node::Call { .. }) {
                    self.rewrite_call_children(e)?;
                    match calls::rewrite_call(self, e)? {
                        CallRewrite::Unchanged => Ok(vec![id]),
                        CallRewrite::Expr(n) => {
                            self.arena.replace(e, n);
                            Ok(vec![id])
                        }
                        CallRewrite::Stmts(stmts) => Ok(stmts),
                    }
                } else {
                    self.rewrite_expr(e)?;
                    Ok(vec![id])
                }
            }
            Node::Assign { target, value } => {
                self.rewrite_expr(target)?;
                self.rewrite_expr(value)?;
                Ok(vec![id])
            }
            Node::AugAssign { target, value, .. } => {
                self.rewrite_expr(target)?;
                self.rewrite_expr(value)?;
                Ok(vec![id])
            }
            Node::If { test, body, orelse } => {
                self.rewrite_expr(test)?;
                let body = self.rewrite_stmts(body)?;
                let orelse = self.rewrite_stmts(orelse)?;
                self.arena.replace(id, Node::If { test, body, orelse });
                Ok(vec![id])
            }
            Node::For { target, iter, body } => {
                self.rewrite_expr(iter)?;
                let body = self.rewrite_stmts(body)?;
                self.arena.replace(id, Node::For { target, iter, body });
                Ok(vec![id])
            }
            Node::While { test, body } => {
                self.rewrite_expr(test)?;
                let body = self.rewrite_stmts(body)?;
                self.arena.replace(id, Node::While { test, body });
                Ok(vec![id])
            }
            Node::With {
                context,
                binding,
                body,
            } => {
                self.rewrite_expr(context)?;
                let body = self.rewrite_stmts(body)?;
                self.arena.replace(
                    id,
                    Node::With {
                        context,
                        binding,
                        body,
                    },
                );
                Ok(vec![id])
            }
            Node::FunctionDef { name, params, body } => {
                let body = self.rewrite_stmts(body)?;
                self.arena
                    .replace(id, Node::FunctionDef { name, params, body });
                Ok(vec![id])
            }
            Node::ClassDef { .. } => {
                self.rewrite_class(id)?;
                Ok(vec![id])
            }
            Node::Import { .. } | Node::Pass => Ok(vec![id]),
            _ => {
                self.rewrite_expr(id)?;
                Ok(vec![id])
            }
        }
    }

    /// Rewrite an expression in place. The returned id equals the input
    /// id; replacements happen inside the arena.
    pub(crate) fn rewrite_expr(&mut self, id: NodeId) -> Result<NodeId> {
        match self.arena.node(id).clone() {
            Node::Call { .. } => {
                self.rewrite_call_children(id)?;
                match calls::rewrite_call(self, id)? {
                    CallRewrite::Unchanged => {}
                    CallRewrite::Expr(n) => self.arena.replace(id, n),
                    CallRewrite::Stmts(_) => {
                        self.diag(
                            DiagnosticKind::Advisory,
                            "call expanding to statements used in expression position; \
                             left unrewritten",
                        );
                    }
                }
            }
            Node::Attribute { value, .. } => {
                self.rewrite_expr(value)?;
                self.rewrite_attribute(id);
            }
            Node::Int(_)
            | Node::Float(_)
            | Node::Str(_)
            | Node::Bool(_)
            | Node::NoneLit
            | Node::Name(_) => {}
            _ => {
                for child in self.arena.children(id) {
                    self.rewrite_expr(child)?;
                }
            }
        }
        Ok(id)
    }

    fn rewrite_call_children(&mut self, call: NodeId) -> Result<()> {
        let Node::Call { func, args, kwargs } = self.arena.node(call).clone() else {
            return Ok(());
        };
        // rewrite the receiver chain but not a plain callee name
        if let Node::Attribute { value, .. } = self.arena.node(func).clone() {
            self.rewrite_expr(value)?;
        }
        for a in args {
            self.rewrite_expr(a)?;
        }
        for (_, v) in kwargs {
            self.rewrite_expr(v)?;
        }
        Ok(())
    }

    /// Bare attribute reads of the population's site and group tables
    /// have no call primitive; rewrite the two supported spellings.
    fn rewrite_attribute(&mut self, id: NodeId) {
        let Node::Attribute { value, attr } = self.arena.node(id).clone() else {
            return;
        };
        if !matches!(self.arena.node(value), Node::Name(n) if n == "pop") {
            return;
        }
        match attr.as_str() {
            "sites" => {
                self.arena.replace(
                    id,
                    Node::Attribute {
                        value,
                        attr: "site_hashes".to_string(),
                    },
                );
            }
            "groups" => {
                // {a.unique_id: a for a in pop.schedule.agents}
                let a1 = self.nm("a");
                let key = self.attr_of(a1, "unique_id");
                let val = self.nm("a");
                let target = self.nm("a");
                let iter = self.attr_path(&["pop", "schedule", "agents"]);
                self.arena.replace(
                    id,
                    Node::DictComp {
                        key,
                        value: val,
                        target,
                        iter,
                        ifs: vec![],
                    },
                );
            }
            _ => {}
        }
    }

    // ---- synthesized members ----

    /// `self.apply(self.model, self.agent, self.model.time, self.model.time)`;
    /// iteration and time are the same value for now.
    fn apply_invocation(&mut self) -> NodeId {
        let func = self.attr_path(&["self", "apply"]);
        let model = self.attr_path(&["self", "model"]);
        let agent = self.attr_path(&["self", "agent"]);
        let iter_arg = self.attr_path(&["self", "model", "time"]);
        let time_arg = self.attr_path(&["self", "model", "time"]);
        let call = self.call_n(func, vec![model, agent, iter_arg, time_arg]);
        self.expr_stmt(call)
    }

    /// The zero-argument dispatch method deciding, each step, whether
    /// the transition logic fires: first the query-descriptor match,
    /// then the iteration gate.
    fn synthesize_dispatch(&mut self) -> NodeId {
        // if not self.agent.matches_qry(self.group_qry): return
        let agent = self.attr_path(&["self", "agent"]);
        let mq = self.attr_of(agent, "matches_qry");
        let gq = self.attr_path(&["self", "group_qry"]);
        let mq_call = self.call_n(mq, vec![gq]);
        let negated = self.alloc(Node::UnaryOp {
            op: UnaryOp::Not,
            operand: mq_call,
        });
        let ret = self.alloc(Node::Return { value: None });
        let guard = self.alloc(Node::If {
            test: negated,
            body: vec![ret],
            orelse: vec![],
        });

        // if not self.i: apply  (no iteration restriction)
        let i_attr = self.attr_path(&["self", "i"]);
        let always_test = self.alloc(Node::UnaryOp {
            op: UnaryOp::Not,
            operand: i_attr,
        });
        let always_body = self.apply_invocation();

        // elif isinstance(self.i, int) and self.model.time == self.i
        let point_test = {
            let isinstance = self.nm("isinstance");
            let i_attr = self.attr_path(&["self", "i"]);
            let int_ty = self.nm("int");
            let is_int = self.call_n(isinstance, vec![i_attr, int_ty]);
            let time = self.attr_path(&["self", "model", "time"]);
            let i_attr = self.attr_path(&["self", "i"]);
            let eq = self.alloc(Node::Compare {
                left: time,
                ops: vec![CmpOp::Eq],
                comparators: vec![i_attr],
            });
            self.alloc(Node::BoolOp {
                op: BoolOpKind::And,
                values: vec![is_int, eq],
            })
        };
        let point_body = self.apply_invocation();

        // elif isinstance(self.i, list): interval forms
        let list_test = {
            let isinstance = self.nm("isinstance");
            let i_attr = self.attr_path(&["self", "i"]);
            let list_ty = self.nm("list");
            self.call_n(isinstance, vec![i_attr, list_ty])
        };
        // if self.i[1] == 0 and self.model.time <= self.i[0]: apply
        let open_test = {
            let i_attr = self.attr_path(&["self", "i"]);
            let one = self.alloc(Node::Int(1));
            let upper = self.alloc(Node::Subscript {
                value: i_attr,
                index: one,
            });
            let zero = self.alloc(Node::Int(0));
            let sentinel = self.alloc(Node::Compare {
                left: upper,
                ops: vec![CmpOp::Eq],
                comparators: vec![zero],
            });
            let time = self.attr_path(&["self", "model", "time"]);
            let i_attr = self.attr_path(&["self", "i"]);
            let zero_idx = self.alloc(Node::Int(0));
            let lower = self.alloc(Node::Subscript {
                value: i_attr,
                index: zero_idx,
            });
            let below = self.alloc(Node::Compare {
                left: time,
                ops: vec![CmpOp::LtE],
                comparators: vec![lower],
            });
            self.alloc(Node::BoolOp {
                op: BoolOpKind::And,
                values: vec![sentinel, below],
            })
        };
        let open_body = self.apply_invocation();
        // elif self.i[0] <= self.model.time <= self.i[1]: apply
        let closed_test = {
            let i_attr = self.attr_path(&["self", "i"]);
            let zero_idx = self.alloc(Node::Int(0));
            let lower = self.alloc(Node::Subscript {
                value: i_attr,
                index: zero_idx,
            });
            let time = self.attr_path(&["self", "model", "time"]);
            let i_attr = self.attr_path(&["self", "i"]);
            let one_idx = self.alloc(Node::Int(1));
            let upper = self.alloc(Node::Subscript {
                value: i_attr,
                index: one_idx,
            });
            self.alloc(Node::Compare {
                left: lower,
                ops: vec![CmpOp::LtE, CmpOp::LtE],
                comparators: vec![time, upper],
            })
        };
        let closed_body = self.apply_invocation();
        let closed_if = self.alloc(Node::If {
            test: closed_test,
            body: vec![closed_body],
            orelse: vec![],
        });
        let interval_if = self.alloc(Node::If {
            test: open_test,
            body: vec![open_body],
            orelse: vec![closed_if],
        });

        // elif isinstance(self.i, set) and self.model.time in self.i
        let discrete_test = {
            let isinstance = self.nm("isinstance");
            let i_attr = self.attr_path(&["self", "i"]);
            let set_ty = self.nm("set");
            let is_set = self.call_n(isinstance, vec![i_attr, set_ty]);
            let time = self.attr_path(&["self", "model", "time"]);
            let i_attr = self.attr_path(&["self", "i"]);
            let member = self.alloc(Node::Compare {
                left: time,
                ops: vec![CmpOp::In],
                comparators: vec![i_attr],
            });
            self.alloc(Node::BoolOp {
                op: BoolOpKind::And,
                values: vec![is_set, member],
            })
        };
        let discrete_body = self.apply_invocation();
        let discrete_if = self.alloc(Node::If {
            test: discrete_test,
            body: vec![discrete_body],
            orelse: vec![],
        });

        let list_if = self.alloc(Node::If {
            test: list_test,
            body: vec![interval_if],
            orelse: vec![discrete_if],
        });
        let point_if = self.alloc(Node::If {
            test: point_test,
            body: vec![point_body],
            orelse: vec![list_if],
        });
        let gate = self.alloc(Node::If {
            test: always_test,
            body: vec![always_body],
            orelse: vec![point_if],
        });

        self.alloc(Node::FunctionDef {
            name: "__call__".to_string(),
            params: vec!["self".to_string()],
            body: vec![guard, gate],
        })
    }

    /// The synthesized constructor: binds the agent/model
    /// cross-references and loads this rule type's parameter record from
    /// the external store, rebuilding the query descriptor if present.
    fn synthesize_init(&mut self) -> NodeId {
        // self.agent = agent
        let agent_target = self.attr_path(&["self", "agent"]);
        let agent_value = self.nm("agent");
        let bind_agent = self.alloc(Node::Assign {
            target: agent_target,
            value: agent_value,
        });
        // self.model = agent.model
        let model_target = self.attr_path(&["self", "model"]);
        let model_value = self.attr_path(&["agent", "model"]);
        let bind_model = self.alloc(Node::Assign {
            target: model_target,
            value: model_value,
        });

        // j = json.load(file)
        let json_load = self.attr_path(&["json", "load"]);
        let file_arg = self.nm("file");
        let load_call = self.call_n(json_load, vec![file_arg]);
        let j_target = self.nm("j");
        let load = self.alloc(Node::Assign {
            target: j_target,
            value: load_call,
        });

        // data = next((d for d in j if d['rule_type'] == type(self).__name__), {})
        let record = {
            let elt = self.nm("d");
            let target = self.nm("d");
            let iter = self.nm("j");
            let d = self.nm("d");
            let key = self.str_of("rule_type");
            let sub = self.alloc(Node::Subscript {
                value: d,
                index: key,
            });
            let type_fn = self.nm("type");
            let self_arg = self.nm("self");
            let type_call = self.call_n(type_fn, vec![self_arg]);
            let type_name = self.attr_of(type_call, "__name__");
            let cond = self.alloc(Node::Compare {
                left: sub,
                ops: vec![CmpOp::Eq],
                comparators: vec![type_name],
            });
            let gen = self.alloc(Node::GeneratorExp {
                elt,
                target,
                iter,
                ifs: vec![cond],
            });
            let empty = self.alloc(Node::DictLit {
                keys: vec![],
                values: vec![],
            });
            let next_fn = self.nm("next");
            let next_call = self.call_n(next_fn, vec![gen, empty]);
            let data_target = self.nm("data");
            self.alloc(Node::Assign {
                target: data_target,
                value: next_call,
            })
        };

        // if data: gq = data['group_qry']; if gq: data['group_qry'] = GroupQry(...)
        let qry_fixup = {
            let data = self.nm("data");
            let key = self.str_of("group_qry");
            let read = self.alloc(Node::Subscript {
                value: data,
                index: key,
            });
            let gq_target = self.nm("gq");
            let assign_gq = self.alloc(Node::Assign {
                target: gq_target,
                value: read,
            });

            let rebuild = {
                let attr = {
                    let gq = self.nm("gq");
                    let k = self.str_of("attr");
                    self.alloc(Node::Subscript { value: gq, index: k })
                };
                let rel = {
                    let gq = self.nm("gq");
                    let k = self.str_of("rel");
                    self.alloc(Node::Subscript { value: gq, index: k })
                };
                // dill.loads(bytes.fromhex(gq['cond']))
                let cond = {
                    let gq = self.nm("gq");
                    let k = self.str_of("cond");
                    let hex = self.alloc(Node::Subscript { value: gq, index: k });
                    let fromhex = self.attr_path(&["bytes", "fromhex"]);
                    let raw = self.call_n(fromhex, vec![hex]);
                    let loads = self.attr_path(&["dill", "loads"]);
                    self.call_n(loads, vec![raw])
                };
                let full = {
                    let gq = self.nm("gq");
                    let k = self.str_of("full");
                    self.alloc(Node::Subscript { value: gq, index: k })
                };
                let ctor = self.nm("GroupQry");
                let call = self.call_n(ctor, vec![attr, rel, cond, full]);
                let data = self.nm("data");
                let k = self.str_of("group_qry");
                let target = self.alloc(Node::Subscript {
                    value: data,
                    index: k,
                });
                self.alloc(Node::Assign {
                    target,
                    value: call,
                })
            };
            let gq_test = self.nm("gq");
            let inner = self.alloc(Node::If {
                test: gq_test,
                body: vec![rebuild],
                orelse: vec![],
            });
            let data_test = self.nm("data");
            self.alloc(Node::If {
                test: data_test,
                body: vec![assign_gq, inner],
                orelse: vec![],
            })
        };

        // self.__dict__.update(data): record fields become same-named
        // rule parameters
        let merge = {
            let dict = self.attr_path(&["self", "__dict__", "update"]);
            let data = self.nm("data");
            let call = self.call_n(dict, vec![data]);
            self.expr_stmt(call)
        };

        // with open(rule_file, 'r') as file:
        let open_fn = self.nm("open");
        let rule_file = self.nm("rule_file");
        let mode = self.str_of("r");
        let open_call = self.call_n(open_fn, vec![rule_file, mode]);
        let with = self.alloc(Node::With {
            context: open_call,
            binding: Some("file".to_string()),
            body: vec![load, record, qry_fixup, merge],
        });

        self.alloc(Node::FunctionDef {
            name: "__init__".to_string(),
            params: vec!["self".to_string(), "agent".to_string()],
            body: vec![bind_agent, bind_model, with],
        })
    }
}
