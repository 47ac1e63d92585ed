// The call-rewrite table: a closed mapping from source-model primitives
// to handlers emitting the target runtime's primitives.
//
// Lookup is by the plain callee name, resolved into `SourcePrimitive`
// at this one boundary; names outside the table pass through untouched.
// Each primitive carries an explicit classification: a direct expression
// rewrite, a multi-statement expansion, a no-op that only records a
// usage flag, or a diagnostic-only entry.

use super::{DiagnosticKind, Helper, Rewriter};
use crate::ast::{CmpOp, Node, NodeId};
use crate::Result;

/// How a recognized primitive is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteClass {
    /// Replaced by an equivalent expression.
    Direct,
    /// Replaced by one or more statements; only valid in statement
    /// position.
    Expansion,
    /// Left unchanged; records a usage flag.
    Marker,
    /// Left unchanged; surfaces a diagnostic.
    Diagnostic,
}

/// The closed set of recognized source-call names. Adding a new source
/// primitive means adding exactly one classified entry here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePrimitive {
    // group functions
    Copy,
    GetAttr,
    GetAttrs,
    GetHash,
    GetMass,
    GetSiteAt,
    GetRel,
    GetRels,
    Ha,
    HasAttr,
    HasRel,
    HasSites,
    Hr,
    IsAtSite,
    IsAtSiteName,
    IsVoid,
    MatchesQry,
    SetAttr,
    SetAttrs,
    SetRel,
    SetRels,
    // site functions
    GetGroups,
    GetMassProp,
    GetMassAndProp,
    // population functions
    AddGroup,
    AddGroups,
    AddVitaGroup,
    GetGroup,
    GetGroupCnt,
    GetGroupsMass,
    GetGroupsMassProp,
    GetGroupsMassAndProp,
    GetSiteCnt,
    // known names that are invalid inside a rule body
    Unexpected,
    // resource management is not supported by this engine
    Resource,
}

const UNEXPECTED_NAMES: &[&str] = &[
    "_has_attr",
    "_has_rel",
    "apply_rules",
    "done",
    "gen_from_db",
    "gen_from_db_tmp1",
    "gen_from_db_tmp2",
    "gen_dict",
    "gen_hash",
    "link_to_site_at",
    "matches_qry_full_cond0",
    "matches_qry_full_cond1",
    "matches_qry_part_cond0",
    "matches_qry_part_cond1",
    "split",
    "__key",
    "add_group_link",
    "reset_group_links",
    "add_resource",
    "add_resources",
    "add_site",
    "add_sites",
    "archive",
    "compact",
    "do_post_iter",
    "freeze",
    "gen_agent_pop",
    "get_next_group_name",
    "transfer_mass",
];

const RESOURCE_NAMES: &[&str] = &[
    "allocate",
    "allocate_any",
    "allocate_all",
    "can_accommodate_all",
    "can_accommodate_any",
    "can_accommodate_one",
    "get_capacity",
    "get_capacity_left",
    "get_capacity_max",
    "release",
    "toJson",
];

impl SourcePrimitive {
    pub fn from_name(name: &str) -> Option<Self> {
        use SourcePrimitive::*;
        let prim = match name {
            "copy" => Copy,
            "get_attr" | "ga" => GetAttr,
            "get_attrs" => GetAttrs,
            "get_hash" => GetHash,
            "get_mass" => GetMass,
            "get_site_at" => GetSiteAt,
            "get_rel" | "gr" => GetRel,
            "get_rels" => GetRels,
            "ha" => Ha,
            "has_attr" => HasAttr,
            "has_rel" => HasRel,
            "has_sites" => HasSites,
            "hr" => Hr,
            "is_at_site" => IsAtSite,
            "is_at_site_name" => IsAtSiteName,
            "is_void" => IsVoid,
            "matches_qry" => MatchesQry,
            "set_attr" => SetAttr,
            "set_attrs" => SetAttrs,
            "set_rel" => SetRel,
            "set_rels" => SetRels,
            "get_groups" => GetGroups,
            "get_mass_prop" => GetMassProp,
            "get_mass_and_prop" => GetMassAndProp,
            "add_group" => AddGroup,
            "add_groups" => AddGroups,
            "add_vita_group" => AddVitaGroup,
            "get_group" => GetGroup,
            "get_group_cnt" => GetGroupCnt,
            "get_groups_mass" => GetGroupsMass,
            "get_groups_mass_prop" => GetGroupsMassProp,
            "get_groups_mass_and_prop" => GetGroupsMassAndProp,
            "get_site_cnt" => GetSiteCnt,
            n if UNEXPECTED_NAMES.contains(&n) => Unexpected,
            n if RESOURCE_NAMES.contains(&n) => Resource,
            _ => return None,
        };
        Some(prim)
    }

    pub fn class(self) -> RewriteClass {
        use SourcePrimitive::*;
        match self {
            GetAttr | GetAttrs | GetMass | GetSiteAt | GetRel | GetRels | Ha | Hr | HasSites
            | IsAtSite | IsAtSiteName | IsVoid | SetAttr | GetGroups | GetMassProp
            | GetMassAndProp | AddVitaGroup | GetGroup | GetGroupCnt | GetGroupsMass
            | GetSiteCnt => RewriteClass::Direct,
            SetAttrs | SetRel | SetRels => RewriteClass::Expansion,
            Copy | HasAttr | HasRel | MatchesQry | GetGroupsMassProp | GetGroupsMassAndProp => {
                RewriteClass::Marker
            }
            GetHash | AddGroup | AddGroups | Unexpected | Resource => RewriteClass::Diagnostic,
        }
    }
}

/// Result of running one call through the table.
#[derive(Debug)]
pub enum CallRewrite {
    Unchanged,
    Expr(Node),
    Stmts(Vec<NodeId>),
}

fn callee_name(rw: &Rewriter, call: NodeId) -> Option<String> {
    let Node::Call { func, .. } = rw.arena.node(call) else {
        return None;
    };
    match rw.arena.node(*func) {
        Node::Name(n) => Some(n.clone()),
        Node::Attribute { attr, .. } => Some(attr.clone()),
        _ => None,
    }
}

fn receiver(rw: &Rewriter, call: NodeId) -> Option<NodeId> {
    let Node::Call { func, .. } = rw.arena.node(call) else {
        return None;
    };
    match rw.arena.node(*func) {
        Node::Attribute { value, .. } => Some(*value),
        _ => None,
    }
}

fn func_of(rw: &Rewriter, call: NodeId) -> NodeId {
    match rw.arena.node(call) {
        Node::Call { func, .. } => *func,
        _ => unreachable!("func_of on non-call"),
    }
}

fn call_parts(rw: &Rewriter, call: NodeId) -> (Vec<NodeId>, Vec<(String, NodeId)>) {
    match rw.arena.node(call) {
        Node::Call { args, kwargs, .. } => (args.clone(), kwargs.clone()),
        _ => (vec![], vec![]),
    }
}

fn is_none(rw: &Rewriter, id: NodeId) -> bool {
    matches!(rw.arena.node(id), Node::NoneLit)
}

/// Look the call up in the table and run its handler. Calls to names
/// outside the table are returned unchanged.
pub(crate) fn rewrite_call(rw: &mut Rewriter, call: NodeId) -> Result<CallRewrite> {
    let Some(name) = callee_name(rw, call) else {
        return Ok(CallRewrite::Unchanged);
    };
    let Some(prim) = SourcePrimitive::from_name(&name) else {
        return Ok(CallRewrite::Unchanged);
    };
    dispatch(rw, call, prim, &name)
}

fn dispatch(
    rw: &mut Rewriter,
    call: NodeId,
    prim: SourcePrimitive,
    name: &str,
) -> Result<CallRewrite> {
    use SourcePrimitive::*;
    let rewrite = match prim {
        // ---- markers: no rewrite, flag only ----
        Copy => {
            rw.flags.record(Helper::Copy);
            CallRewrite::Unchanged
        }
        HasAttr => {
            rw.flags.record(Helper::HasAttr);
            CallRewrite::Unchanged
        }
        HasRel => {
            rw.flags.record(Helper::HasRel);
            CallRewrite::Unchanged
        }
        MatchesQry => {
            rw.flags.record(Helper::MatchesQry);
            CallRewrite::Unchanged
        }
        GetGroupsMassProp => {
            rw.flags.record(Helper::GetGroupsMassProp);
            CallRewrite::Unchanged
        }
        GetGroupsMassAndProp => {
            rw.flags.record(Helper::GetGroupsMassAndProp);
            CallRewrite::Unchanged
        }

        // ---- diagnostics: no rewrite ----
        GetHash => {
            rw.diag(
                DiagnosticKind::Unsupported,
                "agent hashes are unique per instance and cannot be compared the way \
                 group hashes are; calls to get_hash will not be translated",
            );
            CallRewrite::Unchanged
        }
        AddGroup | AddGroups => {
            rw.diag(
                DiagnosticKind::Unsupported,
                format!("adding groups in a rule using {name} is not supported; try add_vita_group instead"),
            );
            CallRewrite::Unchanged
        }
        Unexpected => {
            rw.diag(
                DiagnosticKind::Unexpected,
                format!("unexpected function call {name} in a rule body; call will not be modified"),
            );
            CallRewrite::Unchanged
        }
        Resource => {
            rw.diag(
                DiagnosticKind::Unsupported,
                format!(
                    "translating resources is not supported; the call {name} will not be \
                     modified. Perhaps you want to use a site?"
                ),
            );
            CallRewrite::Unchanged
        }

        // ---- everything below needs the method receiver ----
        _ => {
            let Some(recv) = receiver(rw, call) else {
                rw.diag(
                    DiagnosticKind::Advisory,
                    format!("call to {name} without a receiver; call will not be modified"),
                );
                return Ok(CallRewrite::Unchanged);
            };
            handle_with_receiver(rw, call, prim, recv)
        }
    };
    Ok(rewrite)
}

fn handle_with_receiver(
    rw: &mut Rewriter,
    call: NodeId,
    prim: SourcePrimitive,
    recv: NodeId,
) -> CallRewrite {
    use SourcePrimitive::*;
    match prim {
        // x.get_attr(name) -> pop.get_attr(x, name)
        GetAttr => {
            rw.flags.record(Helper::GetAttr);
            let base = rw.pop_receiver(call);
            let name = rw.call_argument(call, 0, "name");
            let func = rw.attr_of(base, "get_attr");
            CallRewrite::Expr(Node::Call {
                func,
                args: vec![recv, name],
                kwargs: vec![],
            })
        }
        // g.get_attrs() -> {k: getattr(g, k) for k in g._attr}
        GetAttrs => attr_map_comprehension(rw, recv, "_attr"),
        // g.get_rels() -> {k: getattr(g, k) for k in g._rel}
        GetRels => attr_map_comprehension(rw, recv, "_rel"),
        // x.get_mass(qry) -> pop.get_mass(x, qry)
        GetMass => {
            rw.flags.record(Helper::GetMass);
            let base = rw.pop_receiver(call);
            let qry = rw.call_argument(call, 0, "qry");
            let func = rw.attr_of(base, "get_mass");
            CallRewrite::Expr(Node::Call {
                func,
                args: vec![recv, qry],
                kwargs: vec![],
            })
        }
        // g.get_site_at() -> g.pos
        GetSiteAt => CallRewrite::Expr(Node::Attribute {
            value: recv,
            attr: "pos".to_string(),
        }),
        // g.get_rel(name) -> g.pos if name == '@' else getattr(g, mpi(name))
        GetRel => {
            let name = rw.call_argument(call, 0, "name");
            let at = rw.str_of("@");
            let test = rw.alloc(Node::Compare {
                left: name,
                ops: vec![CmpOp::Eq],
                comparators: vec![at],
            });
            let pos = rw.attr_of(recv, "pos");
            let getattr_fn = rw.nm("getattr");
            let mpi_fn = rw.nm("mpi");
            let canon = rw.call_n(mpi_fn, vec![name]);
            let fallback = rw.call_n(getattr_fn, vec![recv, canon]);
            CallRewrite::Expr(Node::IfExp {
                test,
                body: pos,
                orelse: fallback,
            })
        }
        // g.ha(qry) -> g.has_attr(qry)
        Ha => {
            rw.flags.record(Helper::HasAttr);
            renamed_method_call(rw, call, recv, "has_attr")
        }
        // g.hr(qry) -> g.has_rel(qry)
        Hr => {
            rw.flags.record(Helper::HasRel);
            renamed_method_call(rw, call, recv, "has_rel")
        }
        HasSites => {
            rw.diag(
                DiagnosticKind::Advisory,
                "calls to function has_sites may be unintended... perhaps you want has_rel \
                 instead?",
            );
            rw.flags.record(Helper::HasRel);
            renamed_method_call(rw, call, recv, "has_rel")
        }
        // g.is_at_site(site) -> g.pos == site
        IsAtSite | IsAtSiteName => {
            let mut site = rw.call_argument(call, 0, "site");
            if is_none(rw, site) {
                site = rw.call_argument(call, 0, "name");
            }
            let pos = rw.attr_of(recv, "pos");
            CallRewrite::Expr(Node::Compare {
                left: pos,
                ops: vec![CmpOp::Eq],
                comparators: vec![site],
            })
        }
        // g.is_void() -> getattr(g, '__void__', False)
        IsVoid => {
            let getattr_fn = rw.nm("getattr");
            let key = rw.str_of("__void__");
            let default = rw.alloc(Node::Bool(false));
            CallRewrite::Expr(Node::Call {
                func: getattr_fn,
                args: vec![recv, key, default],
                kwargs: vec![],
            })
        }
        // g.set_attr(name, value) -> setattr(g, mpi(name), value)
        SetAttr => {
            let name = rw.call_argument(call, 0, "name");
            let value = rw.call_argument(call, 1, "value");
            let setattr_fn = rw.nm("setattr");
            let mpi_fn = rw.nm("mpi");
            let canon = rw.call_n(mpi_fn, vec![name]);
            CallRewrite::Expr(Node::Call {
                func: setattr_fn,
                args: vec![recv, canon, value],
                kwargs: vec![],
            })
        }
        // g.set_attrs(attrs) -> for name, value in attrs.items(): setattr(...)
        SetAttrs => {
            let attrs = rw.call_argument(call, 0, "attrs");
            let body = set_field_stmt(rw, recv, None);
            CallRewrite::Stmts(vec![items_loop(rw, attrs, vec![body])])
        }
        // g.set_rel(name, value) -> move the agent for '@', setattr otherwise
        SetRel => {
            let name = rw.call_argument(call, 0, "name");
            let value = rw.call_argument(call, 1, "value");
            CallRewrite::Stmts(vec![set_rel_stmt(rw, recv, name, value)])
        }
        // g.set_rels(rels) -> the same dispatch inside an items() loop
        SetRels => {
            let rels = rw.call_argument(call, 0, "rels");
            let name = rw.nm("name");
            let value = rw.nm("value");
            let body = set_rel_stmt(rw, recv, name, value);
            CallRewrite::Stmts(vec![items_loop(rw, rels, vec![body])])
        }
        // x.get_groups(qry) -> pop.get_groups(x, qry)
        GetGroups => {
            rw.flags.record(Helper::GetGroups);
            let base = rw.pop_receiver(call);
            let qry = rw.call_argument(call, 0, "qry");
            let func = rw.attr_of(base, "get_groups");
            CallRewrite::Expr(Node::Call {
                func,
                args: vec![recv, qry],
                kwargs: vec![],
            })
        }
        // s.get_mass_prop(qry) -> pop.get_mass_prop(s, qry)
        GetMassProp => {
            rw.flags.record(Helper::GetMassProp);
            let base = rw.pop_receiver(call);
            let qry = rw.call_argument(call, 0, "qry");
            let func = rw.attr_of(base, "get_mass_prop");
            CallRewrite::Expr(Node::Call {
                func,
                args: vec![recv, qry],
                kwargs: vec![],
            })
        }
        // s.get_mass_and_prop(qry) -> pop.get_mass_and_prop(s, qry)
        GetMassAndProp => {
            rw.flags.record(Helper::GetMassAndProp);
            let base = rw.pop_receiver(call);
            let qry = rw.call_argument(call, 0, "qry");
            let func = rw.attr_of(base, "get_mass_and_prop");
            CallRewrite::Expr(Node::Call {
                func,
                args: vec![recv, qry],
                kwargs: vec![],
            })
        }
        // p.add_vita_group(g) -> p.vita_groups.append(g)
        AddVitaGroup => {
            let group = rw.call_argument(call, 0, "group");
            let queue = rw.attr_of(recv, "vita_groups");
            let func = rw.attr_of(queue, "append");
            CallRewrite::Expr(Node::Call {
                func,
                args: vec![group],
                kwargs: vec![],
            })
        }
        // p.get_group(attr, rel) -> p.get_groups(GroupQry(attr, rel, [], True))
        GetGroup => {
            rw.flags.record(Helper::GetGroups);
            let attr = rw.call_argument(call, 0, "attr");
            let mut rel = rw.call_argument(call, 1, "rel");
            if is_none(rw, rel) {
                rel = rw.alloc(Node::DictLit {
                    keys: vec![],
                    values: vec![],
                });
            }
            let conds = rw.alloc(Node::ListLit { elts: vec![] });
            let full = rw.alloc(Node::Bool(true));
            let ctor = rw.nm("GroupQry");
            let qry = rw.call_n(ctor, vec![attr, rel, conds, full]);
            let func = rw.attr_of(recv, "get_groups");
            CallRewrite::Expr(Node::Call {
                func,
                args: vec![qry],
                kwargs: vec![],
            })
        }
        // p.get_group_cnt() -> len(p.schedule.agents)
        GetGroupCnt => {
            let len_fn = rw.nm("len");
            let sched = rw.attr_of(recv, "schedule");
            let agents = rw.attr_of(sched, "agents");
            CallRewrite::Expr(Node::Call {
                func: len_fn,
                args: vec![agents],
                kwargs: vec![],
            })
        }
        // p.get_groups_mass(qry, hist_delta=d) -> p.get_groups_mass(qry)
        GetGroupsMass => {
            rw.flags.record(Helper::GetGroupsMass);
            let qry = rw.call_argument(call, 0, "qry");
            let hist_delta = rw.call_argument(call, 1, "hist_delta");
            if !is_none(rw, hist_delta) {
                rw.diag(
                    DiagnosticKind::Advisory,
                    "the hist_delta parameter in get_groups_mass is not supported; it will \
                     be treated as 0 (i.e. ignored)",
                );
            }
            let func = func_of(rw, call);
            CallRewrite::Expr(Node::Call {
                func,
                args: vec![qry],
                kwargs: vec![],
            })
        }
        // p.get_site_cnt() -> len(p.site_hashes)
        GetSiteCnt => {
            let len_fn = rw.nm("len");
            let table = rw.attr_of(recv, "site_hashes");
            CallRewrite::Expr(Node::Call {
                func: len_fn,
                args: vec![table],
                kwargs: vec![],
            })
        }
        // handled before the receiver lookup
        Copy | HasAttr | HasRel | MatchesQry | GetGroupsMassProp | GetGroupsMassAndProp
        | GetHash | AddGroup | AddGroups | Unexpected | Resource => CallRewrite::Unchanged,
    }
}

/// `{k: getattr(g, k) for k in g.<table>}`
fn attr_map_comprehension(rw: &mut Rewriter, recv: NodeId, table: &str) -> CallRewrite {
    let key = rw.nm("k");
    let getattr_fn = rw.nm("getattr");
    let k_arg = rw.nm("k");
    let value = rw.call_n(getattr_fn, vec![recv, k_arg]);
    let target = rw.nm("k");
    let iter = rw.attr_of(recv, table);
    CallRewrite::Expr(Node::DictComp {
        key,
        value,
        target,
        iter,
        ifs: vec![],
    })
}

/// Rewrite a method call to the same receiver under a different name,
/// keeping the original arguments.
fn renamed_method_call(rw: &mut Rewriter, call: NodeId, recv: NodeId, name: &str) -> CallRewrite {
    let (args, kwargs) = call_parts(rw, call);
    let func = rw.attr_of(recv, name);
    CallRewrite::Expr(Node::Call { func, args, kwargs })
}

/// `for name, value in <map>.items(): <body>`
fn items_loop(rw: &mut Rewriter, map: NodeId, body: Vec<NodeId>) -> NodeId {
    let n = rw.nm("name");
    let v = rw.nm("value");
    let target = rw.alloc(Node::TupleLit { elts: vec![n, v] });
    let items = rw.attr_of(map, "items");
    let iter = rw.call_n(items, vec![]);
    rw.alloc(Node::For { target, iter, body })
}

/// `setattr(recv, mpi(name), value)` with the loop variables when no
/// explicit name/value pair is given.
fn set_field_stmt(rw: &mut Rewriter, recv: NodeId, pair: Option<(NodeId, NodeId)>) -> NodeId {
    let (name, value) = match pair {
        Some(p) => p,
        None => (rw.nm("name"), rw.nm("value")),
    };
    let setattr_fn = rw.nm("setattr");
    let mpi_fn = rw.nm("mpi");
    let canon = rw.call_n(mpi_fn, vec![name]);
    let call = rw.call_n(setattr_fn, vec![recv, canon, value]);
    rw.expr_stmt(call)
}

/// The relocation dispatch shared by set_rel and set_rels:
/// move the agent when the key is the relocation sentinel, set a plain
/// field otherwise.
fn set_rel_stmt(rw: &mut Rewriter, recv: NodeId, name: NodeId, value: NodeId) -> NodeId {
    let at = rw.str_of("@");
    let test = rw.alloc(Node::Compare {
        left: name,
        ops: vec![CmpOp::Eq],
        comparators: vec![at],
    });
    let mover = rw.attr_path(&["pop", "grid", "move_agent"]);
    let move_call = rw.call_n(mover, vec![recv, value]);
    let move_stmt = rw.expr_stmt(move_call);
    let set_stmt = set_field_stmt(rw, recv, Some((name, value)));
    rw.alloc(Node::If {
        test,
        body: vec![move_stmt],
        orelse: vec![set_stmt],
    })
}
