// Source text generation from the arena tree.
// The rewrite passes produce trees in the target runtime's dialect; this
// module renders them back to source the generated files can load.

use super::{Arena, BinOp, BoolOpKind, CmpOp, Node, NodeId, UnaryOp};

const INDENT: &str = "    ";

impl Arena {
    /// Render the node at `id` as source text. Statements end with a
    /// newline; expressions do not.
    pub fn to_source(&self, id: NodeId) -> String {
        if self.is_statement(id) {
            let mut out = String::new();
            self.write_stmt(&mut out, id, 0);
            out
        } else {
            self.expr(id)
        }
    }

    fn is_statement(&self, id: NodeId) -> bool {
        matches!(
            self.node(id),
            Node::Module { .. }
                | Node::ClassDef { .. }
                | Node::FunctionDef { .. }
                | Node::Assign { .. }
                | Node::AugAssign { .. }
                | Node::ExprStmt(_)
                | Node::Return { .. }
                | Node::If { .. }
                | Node::For { .. }
                | Node::While { .. }
                | Node::With { .. }
                | Node::Import { .. }
                | Node::Pass
        )
    }

    fn write_body(&self, out: &mut String, body: &[NodeId], level: usize) {
        for (i, stmt) in body.iter().enumerate() {
            // blank line before nested definitions, matching the usual
            // layout of the generated files
            if i > 0
                && matches!(
                    self.node(*stmt),
                    Node::ClassDef { .. } | Node::FunctionDef { .. }
                )
            {
                out.push('\n');
            }
            self.write_stmt(out, *stmt, level);
        }
    }

    fn write_stmt(&self, out: &mut String, id: NodeId, level: usize) {
        let pad = INDENT.repeat(level);
        match self.node(id) {
            Node::Module { body } => self.write_body(out, body, level),
            Node::ClassDef { name, bases, body } => {
                if bases.is_empty() {
                    out.push_str(&format!("{pad}class {name}:\n"));
                } else {
                    let bs = bases
                        .iter()
                        .map(|b| self.expr(*b))
                        .collect::<Vec<_>>()
                        .join(", ");
                    out.push_str(&format!("{pad}class {name}({bs}):\n"));
                }
                self.write_block(out, body, level + 1);
            }
            Node::FunctionDef { name, params, body } => {
                out.push_str(&format!("{pad}def {name}({}):\n", params.join(", ")));
                self.write_block(out, body, level + 1);
            }
            Node::Assign { target, value } => {
                out.push_str(&format!(
                    "{pad}{} = {}\n",
                    self.target_source(*target),
                    self.expr(*value)
                ));
            }
            Node::AugAssign { target, op, value } => {
                out.push_str(&format!(
                    "{pad}{} {}= {}\n",
                    self.expr(*target),
                    binop_str(*op),
                    self.expr(*value)
                ));
            }
            Node::ExprStmt(e) => out.push_str(&format!("{pad}{}\n", self.expr(*e))),
            Node::Return { value } => match value {
                Some(v) => out.push_str(&format!("{pad}return {}\n", self.expr(*v))),
                None => out.push_str(&format!("{pad}return\n")),
            },
            Node::If { test, body, orelse } => {
                out.push_str(&format!("{pad}if {}:\n", self.expr(*test)));
                self.write_block(out, body, level + 1);
                self.write_orelse(out, orelse, level);
            }
            Node::For { target, iter, body } => {
                out.push_str(&format!(
                    "{pad}for {} in {}:\n",
                    self.target_source(*target),
                    self.expr(*iter)
                ));
                self.write_block(out, body, level + 1);
            }
            Node::While { test, body } => {
                out.push_str(&format!("{pad}while {}:\n", self.expr(*test)));
                self.write_block(out, body, level + 1);
            }
            Node::With {
                context,
                binding,
                body,
            } => {
                match binding {
                    Some(b) => {
                        out.push_str(&format!("{pad}with {} as {b}:\n", self.expr(*context)))
                    }
                    None => out.push_str(&format!("{pad}with {}:\n", self.expr(*context))),
                }
                self.write_block(out, body, level + 1);
            }
            Node::Import { raw } => out.push_str(&format!("{pad}{raw}\n")),
            Node::Pass => out.push_str(&format!("{pad}pass\n")),
            _ => {
                // expression in statement position; render it bare
                out.push_str(&format!("{pad}{}\n", self.expr(id)));
            }
        }
    }

    fn write_block(&self, out: &mut String, body: &[NodeId], level: usize) {
        if body.is_empty() {
            out.push_str(&format!("{}pass\n", INDENT.repeat(level)));
        } else {
            self.write_body(out, body, level);
        }
    }

    // `else` holding a lone `if` collapses to `elif`
    fn write_orelse(&self, out: &mut String, orelse: &[NodeId], level: usize) {
        if orelse.is_empty() {
            return;
        }
        let pad = INDENT.repeat(level);
        if orelse.len() == 1 {
            if let Node::If { test, body, orelse } = self.node(orelse[0]) {
                out.push_str(&format!("{pad}elif {}:\n", self.expr(*test)));
                self.write_block(out, body, level + 1);
                self.write_orelse(out, orelse, level);
                return;
            }
        }
        out.push_str(&format!("{pad}else:\n"));
        self.write_block(out, orelse, level + 1);
    }

    fn expr(&self, id: NodeId) -> String {
        self.expr_prec(id, 0)
    }

    /// Render an expression, parenthesizing it when its own precedence
    /// is below what the surrounding position requires.
    fn expr_prec(&self, id: NodeId, min_prec: u8) -> String {
        let (text, prec) = self.raw_expr(id);
        if prec < min_prec {
            format!("({text})")
        } else {
            text
        }
    }

    fn raw_expr(&self, id: NodeId) -> (String, u8) {
        match self.node(id) {
            Node::Int(n) => (n.to_string(), ATOM),
            Node::Float(f) => {
                let mut s = f.to_string();
                if !s.contains('.') && !s.contains('e') && !s.contains("inf") && !s.contains("NaN")
                {
                    s.push_str(".0");
                }
                (s, ATOM)
            }
            Node::Str(s) => (format!("'{}'", escape_str(s)), ATOM),
            Node::Bool(b) => ((if *b { "True" } else { "False" }).to_string(), ATOM),
            Node::NoneLit => ("None".to_string(), ATOM),
            Node::Name(n) => (n.clone(), ATOM),
            Node::Attribute { value, attr } => {
                (format!("{}.{attr}", self.expr_prec(*value, POSTFIX)), POSTFIX)
            }
            Node::Subscript { value, index } => (
                format!("{}[{}]", self.expr_prec(*value, POSTFIX), self.expr(*index)),
                POSTFIX,
            ),
            Node::Call { func, args, kwargs } => {
                let mut parts: Vec<String> = args.iter().map(|a| self.expr(*a)).collect();
                parts.extend(
                    kwargs
                        .iter()
                        .map(|(k, v)| format!("{k}={}", self.expr(*v))),
                );
                (
                    format!("{}({})", self.expr_prec(*func, POSTFIX), parts.join(", ")),
                    POSTFIX,
                )
            }
            Node::BinOp { op, left, right } => {
                let prec = binop_prec(*op);
                let text = if *op == BinOp::Pow {
                    // right-associative
                    format!(
                        "{} ** {}",
                        self.expr_prec(*left, prec + 1),
                        self.expr_prec(*right, prec)
                    )
                } else {
                    format!(
                        "{} {} {}",
                        self.expr_prec(*left, prec),
                        binop_str(*op),
                        self.expr_prec(*right, prec + 1)
                    )
                };
                (text, prec)
            }
            Node::UnaryOp { op, operand } => match op {
                UnaryOp::Not => (format!("not {}", self.expr_prec(*operand, NOT)), NOT),
                UnaryOp::Neg => (format!("-{}", self.expr_prec(*operand, UNARY)), UNARY),
                UnaryOp::Pos => (format!("+{}", self.expr_prec(*operand, UNARY)), UNARY),
            },
            Node::BoolOp { op, values } => {
                let (sep, prec) = match op {
                    BoolOpKind::And => (" and ", AND),
                    BoolOpKind::Or => (" or ", OR),
                };
                let text = values
                    .iter()
                    .map(|v| self.expr_prec(*v, prec + 1))
                    .collect::<Vec<_>>()
                    .join(sep);
                (text, prec)
            }
            Node::Compare {
                left,
                ops,
                comparators,
            } => {
                let mut text = self.expr_prec(*left, CMP + 1);
                for (op, c) in ops.iter().zip(comparators.iter()) {
                    text.push_str(&format!(" {} {}", cmpop_str(*op), self.expr_prec(*c, CMP + 1)));
                }
                (text, CMP)
            }
            Node::IfExp { test, body, orelse } => (
                format!(
                    "{} if {} else {}",
                    self.expr_prec(*body, TERNARY + 1),
                    self.expr_prec(*test, TERNARY + 1),
                    self.expr_prec(*orelse, TERNARY)
                ),
                TERNARY,
            ),
            Node::Lambda { params, body } => (
                format!("lambda {}: {}", params.join(", "), self.expr(*body)),
                LAMBDA,
            ),
            Node::ListLit { elts } => (format!("[{}]", self.comma_sep(elts)), ATOM),
            Node::TupleLit { elts } => {
                let text = match elts.len() {
                    0 => "()".to_string(),
                    1 => format!("({},)", self.expr(elts[0])),
                    _ => format!("({})", self.comma_sep(elts)),
                };
                (text, ATOM)
            }
            Node::SetLit { elts } => {
                let text = if elts.is_empty() {
                    "set()".to_string()
                } else {
                    format!("{{{}}}", self.comma_sep(elts))
                };
                (text, ATOM)
            }
            Node::DictLit { keys, values } => {
                let entries = keys
                    .iter()
                    .zip(values.iter())
                    .map(|(k, v)| format!("{}: {}", self.expr(*k), self.expr(*v)))
                    .collect::<Vec<_>>()
                    .join(", ");
                (format!("{{{entries}}}"), ATOM)
            }
            Node::ListComp {
                elt,
                target,
                iter,
                ifs,
            } => (
                format!(
                    "[{} {}]",
                    self.expr(*elt),
                    self.comp_clause(*target, *iter, ifs)
                ),
                ATOM,
            ),
            Node::GeneratorExp {
                elt,
                target,
                iter,
                ifs,
            } => (
                format!(
                    "({} {})",
                    self.expr(*elt),
                    self.comp_clause(*target, *iter, ifs)
                ),
                ATOM,
            ),
            Node::DictComp {
                key,
                value,
                target,
                iter,
                ifs,
            } => (
                format!(
                    "{{{}: {} {}}}",
                    self.expr(*key),
                    self.expr(*value),
                    self.comp_clause(*target, *iter, ifs)
                ),
                ATOM,
            ),
            // statements render through write_stmt; reaching one here
            // means a statement node sits in expression position
            other => (format!("<stmt {other:?}>"), ATOM),
        }
    }

    fn comma_sep(&self, elts: &[NodeId]) -> String {
        elts.iter()
            .map(|e| self.expr(*e))
            .collect::<Vec<_>>()
            .join(", ")
    }

    // binding targets render tuples bare: `for k, v in ...`
    fn target_source(&self, id: NodeId) -> String {
        match self.node(id) {
            Node::TupleLit { elts } if !elts.is_empty() => self.comma_sep(elts),
            _ => self.expr(id),
        }
    }

    fn comp_clause(&self, target: NodeId, iter: NodeId, ifs: &[NodeId]) -> String {
        let mut text = format!(
            "for {} in {}",
            self.target_source(target),
            self.expr_prec(iter, TERNARY + 1)
        );
        for cond in ifs {
            text.push_str(&format!(" if {}", self.expr_prec(*cond, TERNARY + 1)));
        }
        text
    }
}

// precedence levels, loosest first
const LAMBDA: u8 = 1;
const TERNARY: u8 = 2;
const OR: u8 = 3;
const AND: u8 = 4;
const NOT: u8 = 5;
const CMP: u8 = 6;
const ADD: u8 = 11;
const MUL: u8 = 12;
const UNARY: u8 = 13;
const POW: u8 = 14;
const POSTFIX: u8 = 15;
const ATOM: u8 = 16;

fn binop_prec(op: BinOp) -> u8 {
    match op {
        BinOp::Add | BinOp::Sub => ADD,
        BinOp::Mul | BinOp::Div | BinOp::Mod => MUL,
        BinOp::Pow => POW,
    }
}

fn binop_str(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::Pow => "**",
    }
}

fn cmpop_str(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Eq => "==",
        CmpOp::NotEq => "!=",
        CmpOp::Lt => "<",
        CmpOp::LtE => "<=",
        CmpOp::Gt => ">",
        CmpOp::GtE => ">=",
        CmpOp::In => "in",
        CmpOp::NotIn => "not in",
        CmpOp::Is => "is",
        CmpOp::IsNot => "is not",
    }
}

fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}
