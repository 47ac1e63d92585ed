// Recursive-descent parser producing arena nodes.
// Covers the statement and expression forms rule definitions actually
// use: class/def blocks, assignments, conditionals, loops, weighted
// outcome constructors with keyword arguments, lambdas, and single
// generator comprehensions.

use anyhow::{anyhow, bail, Result};

use super::{
    lexer::{lex, Tok},
    ParseTree, Parser,
};
use crate::ast::{Arena, BinOp, BoolOpKind, CmpOp, Node, NodeId, UnaryOp};

/// Parser for rule-source fragments.
#[derive(Debug, Default)]
pub struct RuleParser;

impl RuleParser {
    pub fn new() -> Self {
        Self
    }
}

impl Parser for RuleParser {
    fn parse(&mut self, source: &str) -> Result<ParseTree> {
        let toks = lex(source)?;
        let mut inner = Inner {
            toks,
            pos: 0,
            arena: Arena::new(),
        };
        let root = inner.parse_module()?;
        Ok(ParseTree {
            arena: inner.arena,
            root,
        })
    }

    fn name(&self) -> &'static str {
        "rule"
    }
}

struct Inner {
    toks: Vec<Tok>,
    pos: usize,
    arena: Arena,
}

impl Inner {
    fn peek(&self) -> &Tok {
        self.toks.get(self.pos).unwrap_or(&Tok::Eof)
    }

    fn peek2(&self) -> &Tok {
        self.toks.get(self.pos + 1).unwrap_or(&Tok::Eof)
    }

    fn bump(&mut self) -> Tok {
        let t = self.peek().clone();
        if self.pos < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == tok {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok) -> Result<()> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(anyhow!("expected {:?}, found {:?}", tok, self.peek()))
        }
    }

    fn expect_name(&mut self) -> Result<String> {
        match self.bump() {
            Tok::Name(n) => Ok(n),
            other => Err(anyhow!("expected identifier, found {other:?}")),
        }
    }

    // ---- statements ----

    fn parse_module(&mut self) -> Result<NodeId> {
        let mut body = Vec::new();
        loop {
            match self.peek() {
                Tok::Eof => break,
                Tok::Newline => {
                    self.pos += 1;
                }
                _ => body.push(self.parse_stmt()?),
            }
        }
        Ok(self.arena.alloc(Node::Module { body }))
    }

    fn parse_stmt(&mut self) -> Result<NodeId> {
        match self.peek() {
            Tok::Def => self.parse_funcdef(),
            Tok::Class => self.parse_classdef(),
            Tok::If => self.parse_if(),
            Tok::For => self.parse_for(),
            Tok::While => self.parse_while(),
            Tok::With => self.parse_with(),
            _ => {
                let stmt = self.parse_simple_stmt()?;
                self.expect(&Tok::Newline)?;
                Ok(stmt)
            }
        }
    }

    fn parse_funcdef(&mut self) -> Result<NodeId> {
        self.expect(&Tok::Def)?;
        let name = self.expect_name()?;
        self.expect(&Tok::LParen)?;
        let mut params = Vec::new();
        while !self.eat(&Tok::RParen) {
            params.push(self.expect_name()?);
            if !self.eat(&Tok::Comma) {
                self.expect(&Tok::RParen)?;
                break;
            }
        }
        self.expect(&Tok::Colon)?;
        let body = self.parse_block()?;
        Ok(self.arena.alloc(Node::FunctionDef { name, params, body }))
    }

    fn parse_classdef(&mut self) -> Result<NodeId> {
        self.expect(&Tok::Class)?;
        let name = self.expect_name()?;
        let mut bases = Vec::new();
        if self.eat(&Tok::LParen) {
            while !self.eat(&Tok::RParen) {
                bases.push(self.parse_expr()?);
                if !self.eat(&Tok::Comma) {
                    self.expect(&Tok::RParen)?;
                    break;
                }
            }
        }
        self.expect(&Tok::Colon)?;
        let body = self.parse_block()?;
        Ok(self.arena.alloc(Node::ClassDef { name, bases, body }))
    }

    fn parse_if(&mut self) -> Result<NodeId> {
        self.expect(&Tok::If)?;
        let test = self.parse_expr()?;
        self.expect(&Tok::Colon)?;
        let body = self.parse_block()?;
        let orelse = self.parse_orelse()?;
        Ok(self.arena.alloc(Node::If { test, body, orelse }))
    }

    fn parse_orelse(&mut self) -> Result<Vec<NodeId>> {
        if self.eat(&Tok::Elif) {
            let test = self.parse_expr()?;
            self.expect(&Tok::Colon)?;
            let body = self.parse_block()?;
            let orelse = self.parse_orelse()?;
            let nested = self.arena.alloc(Node::If { test, body, orelse });
            Ok(vec![nested])
        } else if self.eat(&Tok::Else) {
            self.expect(&Tok::Colon)?;
            self.parse_block()
        } else {
            Ok(Vec::new())
        }
    }

    fn parse_for(&mut self) -> Result<NodeId> {
        self.expect(&Tok::For)?;
        let target = self.parse_target()?;
        self.expect(&Tok::In)?;
        let iter = self.parse_expr_or_tuple()?;
        self.expect(&Tok::Colon)?;
        let body = self.parse_block()?;
        Ok(self.arena.alloc(Node::For { target, iter, body }))
    }

    fn parse_while(&mut self) -> Result<NodeId> {
        self.expect(&Tok::While)?;
        let test = self.parse_expr()?;
        self.expect(&Tok::Colon)?;
        let body = self.parse_block()?;
        Ok(self.arena.alloc(Node::While { test, body }))
    }

    fn parse_with(&mut self) -> Result<NodeId> {
        self.expect(&Tok::With)?;
        let context = self.parse_expr()?;
        let binding = if self.eat(&Tok::As) {
            Some(self.expect_name()?)
        } else {
            None
        };
        self.expect(&Tok::Colon)?;
        let body = self.parse_block()?;
        Ok(self.arena.alloc(Node::With {
            context,
            binding,
            body,
        }))
    }

    fn parse_block(&mut self) -> Result<Vec<NodeId>> {
        self.expect(&Tok::Newline)?;
        self.expect(&Tok::Indent)?;
        let mut body = Vec::new();
        loop {
            match self.peek() {
                Tok::Dedent => {
                    self.pos += 1;
                    break;
                }
                Tok::Newline => {
                    self.pos += 1;
                }
                Tok::Eof => bail!("unexpected end of input inside block"),
                _ => body.push(self.parse_stmt()?),
            }
        }
        Ok(body)
    }

    fn parse_simple_stmt(&mut self) -> Result<NodeId> {
        match self.peek() {
            Tok::Return => {
                self.pos += 1;
                let value = if matches!(self.peek(), Tok::Newline | Tok::Eof) {
                    None
                } else {
                    Some(self.parse_expr_or_tuple()?)
                };
                Ok(self.arena.alloc(Node::Return { value }))
            }
            Tok::Pass => {
                self.pos += 1;
                Ok(self.arena.alloc(Node::Pass))
            }
            Tok::Import | Tok::From => self.parse_import(),
            _ => self.parse_assign_or_expr(),
        }
    }

    /// Imports are kept verbatim; the tokens of the line are glued back
    /// into a raw string, since nothing downstream rewrites them.
    fn parse_import(&mut self) -> Result<NodeId> {
        let mut pieces: Vec<String> = Vec::new();
        while !matches!(self.peek(), Tok::Newline | Tok::Eof) {
            let piece = match self.bump() {
                Tok::Import => "import".to_string(),
                Tok::From => "from".to_string(),
                Tok::As => "as".to_string(),
                Tok::Name(n) => n,
                Tok::Dot => ".".to_string(),
                Tok::Comma => ",".to_string(),
                Tok::Star => "*".to_string(),
                other => bail!("unexpected token in import statement: {other:?}"),
            };
            pieces.push(piece);
        }
        let mut raw = String::new();
        let mut prev_dot = false;
        for (i, piece) in pieces.iter().enumerate() {
            let is_dot = piece == ".";
            let is_comma = piece == ",";
            if i > 0 {
                // dots glue to the surrounding names, except the leading
                // dot of a relative import; commas glue to the left
                let space = if is_comma {
                    false
                } else if is_dot {
                    matches!(pieces[i - 1].as_str(), "from" | "import")
                } else {
                    !prev_dot
                };
                if space {
                    raw.push(' ');
                }
            }
            raw.push_str(piece);
            prev_dot = is_dot;
        }
        Ok(self.arena.alloc(Node::Import { raw }))
    }

    fn parse_assign_or_expr(&mut self) -> Result<NodeId> {
        let first = self.parse_expr_or_tuple()?;
        if self.eat(&Tok::Assign) {
            self.check_target(first)?;
            let value = self.parse_expr_or_tuple()?;
            return Ok(self.arena.alloc(Node::Assign {
                target: first,
                value,
            }));
        }
        let aug = match self.peek() {
            Tok::PlusEq => Some(BinOp::Add),
            Tok::MinusEq => Some(BinOp::Sub),
            Tok::StarEq => Some(BinOp::Mul),
            Tok::SlashEq => Some(BinOp::Div),
            _ => None,
        };
        if let Some(op) = aug {
            self.pos += 1;
            self.check_target(first)?;
            let value = self.parse_expr()?;
            return Ok(self.arena.alloc(Node::AugAssign {
                target: first,
                op,
                value,
            }));
        }
        Ok(self.arena.alloc(Node::ExprStmt(first)))
    }

    fn check_target(&self, id: NodeId) -> Result<()> {
        match self.arena.node(id) {
            Node::Name(_) | Node::Attribute { .. } | Node::Subscript { .. } => Ok(()),
            Node::TupleLit { elts } => {
                for e in elts {
                    self.check_target(*e)?;
                }
                Ok(())
            }
            other => bail!("invalid assignment target: {other:?}"),
        }
    }

    // `for` and comprehension targets: names or (possibly nested) tuples
    fn parse_target(&mut self) -> Result<NodeId> {
        let first = self.parse_target_atom()?;
        if self.peek() != &Tok::Comma {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat(&Tok::Comma) {
            if matches!(self.peek(), Tok::In | Tok::Colon) {
                break;
            }
            elts.push(self.parse_target_atom()?);
        }
        Ok(self.arena.alloc(Node::TupleLit { elts }))
    }

    fn parse_target_atom(&mut self) -> Result<NodeId> {
        if self.eat(&Tok::LParen) {
            let inner = self.parse_target()?;
            self.expect(&Tok::RParen)?;
            return Ok(inner);
        }
        let name = self.expect_name()?;
        Ok(self.arena.alloc(Node::Name(name)))
    }

    // ---- expressions ----

    fn parse_expr_or_tuple(&mut self) -> Result<NodeId> {
        let first = self.parse_expr()?;
        if self.peek() != &Tok::Comma {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat(&Tok::Comma) {
            if !self.starts_expr() {
                break;
            }
            elts.push(self.parse_expr()?);
        }
        Ok(self.arena.alloc(Node::TupleLit { elts }))
    }

    fn starts_expr(&self) -> bool {
        matches!(
            self.peek(),
            Tok::Name(_)
                | Tok::Int(_)
                | Tok::Float(_)
                | Tok::Str(_)
                | Tok::NoneKw
                | Tok::True
                | Tok::False
                | Tok::Not
                | Tok::Lambda
                | Tok::Minus
                | Tok::Plus
                | Tok::LParen
                | Tok::LBracket
                | Tok::LBrace
        )
    }

    fn parse_expr(&mut self) -> Result<NodeId> {
        if self.eat(&Tok::Lambda) {
            let mut params = Vec::new();
            while self.peek() != &Tok::Colon {
                params.push(self.expect_name()?);
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
            self.expect(&Tok::Colon)?;
            let body = self.parse_expr()?;
            return Ok(self.arena.alloc(Node::Lambda { params, body }));
        }
        let expr = self.parse_or()?;
        if self.eat(&Tok::If) {
            let test = self.parse_or()?;
            self.expect(&Tok::Else)?;
            let orelse = self.parse_expr()?;
            return Ok(self.arena.alloc(Node::IfExp {
                test,
                body: expr,
                orelse,
            }));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<NodeId> {
        let first = self.parse_and()?;
        if self.peek() != &Tok::Or {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat(&Tok::Or) {
            values.push(self.parse_and()?);
        }
        Ok(self.arena.alloc(Node::BoolOp {
            op: BoolOpKind::Or,
            values,
        }))
    }

    fn parse_and(&mut self) -> Result<NodeId> {
        let first = self.parse_not()?;
        if self.peek() != &Tok::And {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat(&Tok::And) {
            values.push(self.parse_not()?);
        }
        Ok(self.arena.alloc(Node::BoolOp {
            op: BoolOpKind::And,
            values,
        }))
    }

    fn parse_not(&mut self) -> Result<NodeId> {
        if self.eat(&Tok::Not) {
            let operand = self.parse_not()?;
            return Ok(self.arena.alloc(Node::UnaryOp {
                op: UnaryOp::Not,
                operand,
            }));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<NodeId> {
        let left = self.parse_arith()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        loop {
            let op = match self.peek() {
                Tok::EqEq => CmpOp::Eq,
                Tok::NotEq => CmpOp::NotEq,
                Tok::Lt => CmpOp::Lt,
                Tok::LtE => CmpOp::LtE,
                Tok::Gt => CmpOp::Gt,
                Tok::GtE => CmpOp::GtE,
                Tok::In => CmpOp::In,
                Tok::Not if self.peek2() == &Tok::In => {
                    self.pos += 1;
                    CmpOp::NotIn
                }
                Tok::Is => {
                    if self.peek2() == &Tok::Not {
                        self.pos += 1;
                        CmpOp::IsNot
                    } else {
                        CmpOp::Is
                    }
                }
                _ => break,
            };
            self.pos += 1;
            ops.push(op);
            comparators.push(self.parse_arith()?);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(self.arena.alloc(Node::Compare {
            left,
            ops,
            comparators,
        }))
    }

    fn parse_arith(&mut self) -> Result<NodeId> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Tok::Plus => BinOp::Add,
                Tok::Minus => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_term()?;
            left = self.arena.alloc(Node::BinOp { op, left, right });
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<NodeId> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Tok::Star => BinOp::Mul,
                Tok::Slash => BinOp::Div,
                Tok::Percent => BinOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_factor()?;
            left = self.arena.alloc(Node::BinOp { op, left, right });
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<NodeId> {
        if self.eat(&Tok::Minus) {
            let operand = self.parse_factor()?;
            return Ok(self.arena.alloc(Node::UnaryOp {
                op: UnaryOp::Neg,
                operand,
            }));
        }
        if self.eat(&Tok::Plus) {
            let operand = self.parse_factor()?;
            return Ok(self.arena.alloc(Node::UnaryOp {
                op: UnaryOp::Pos,
                operand,
            }));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<NodeId> {
        let left = self.parse_postfix()?;
        if self.eat(&Tok::StarStar) {
            let right = self.parse_factor()?;
            return Ok(self.arena.alloc(Node::BinOp {
                op: BinOp::Pow,
                left,
                right,
            }));
        }
        Ok(left)
    }

    fn parse_postfix(&mut self) -> Result<NodeId> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek() {
                Tok::LParen => {
                    self.pos += 1;
                    let (args, kwargs) = self.parse_call_args()?;
                    expr = self.arena.alloc(Node::Call {
                        func: expr,
                        args,
                        kwargs,
                    });
                }
                Tok::Dot => {
                    self.pos += 1;
                    let attr = self.expect_name()?;
                    expr = self.arena.alloc(Node::Attribute { value: expr, attr });
                }
                Tok::LBracket => {
                    self.pos += 1;
                    let index = self.parse_expr_or_tuple()?;
                    self.expect(&Tok::RBracket)?;
                    expr = self.arena.alloc(Node::Subscript { value: expr, index });
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> Result<(Vec<NodeId>, Vec<(String, NodeId)>)> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        loop {
            if self.eat(&Tok::RParen) {
                break;
            }
            if let (Tok::Name(_), Tok::Assign) = (self.peek(), self.peek2()) {
                let name = self.expect_name()?;
                self.expect(&Tok::Assign)?;
                let value = self.parse_expr()?;
                kwargs.push((name, value));
            } else {
                args.push(self.parse_expr()?);
            }
            if !self.eat(&Tok::Comma) {
                self.expect(&Tok::RParen)?;
                break;
            }
        }
        Ok((args, kwargs))
    }

    fn parse_atom(&mut self) -> Result<NodeId> {
        match self.bump() {
            Tok::Name(n) => Ok(self.arena.alloc(Node::Name(n))),
            Tok::Int(v) => Ok(self.arena.alloc(Node::Int(v))),
            Tok::Float(v) => Ok(self.arena.alloc(Node::Float(v))),
            Tok::Str(s) => Ok(self.arena.alloc(Node::Str(s))),
            Tok::NoneKw => Ok(self.arena.alloc(Node::NoneLit)),
            Tok::True => Ok(self.arena.alloc(Node::Bool(true))),
            Tok::False => Ok(self.arena.alloc(Node::Bool(false))),
            Tok::LParen => self.parse_paren(),
            Tok::LBracket => self.parse_bracket(),
            Tok::LBrace => self.parse_brace(),
            other => Err(anyhow!("unexpected token in expression: {other:?}")),
        }
    }

    fn parse_paren(&mut self) -> Result<NodeId> {
        if self.eat(&Tok::RParen) {
            return Ok(self.arena.alloc(Node::TupleLit { elts: vec![] }));
        }
        let first = self.parse_expr()?;
        if self.peek() == &Tok::For {
            let (target, iter, ifs) = self.parse_comp_clause()?;
            self.expect(&Tok::RParen)?;
            return Ok(self.arena.alloc(Node::GeneratorExp {
                elt: first,
                target,
                iter,
                ifs,
            }));
        }
        if self.peek() == &Tok::Comma {
            let mut elts = vec![first];
            while self.eat(&Tok::Comma) {
                if self.peek() == &Tok::RParen {
                    break;
                }
                elts.push(self.parse_expr()?);
            }
            self.expect(&Tok::RParen)?;
            return Ok(self.arena.alloc(Node::TupleLit { elts }));
        }
        self.expect(&Tok::RParen)?;
        Ok(first)
    }

    fn parse_bracket(&mut self) -> Result<NodeId> {
        if self.eat(&Tok::RBracket) {
            return Ok(self.arena.alloc(Node::ListLit { elts: vec![] }));
        }
        let first = self.parse_expr()?;
        if self.peek() == &Tok::For {
            let (target, iter, ifs) = self.parse_comp_clause()?;
            self.expect(&Tok::RBracket)?;
            return Ok(self.arena.alloc(Node::ListComp {
                elt: first,
                target,
                iter,
                ifs,
            }));
        }
        let mut elts = vec![first];
        while self.eat(&Tok::Comma) {
            if self.peek() == &Tok::RBracket {
                break;
            }
            elts.push(self.parse_expr()?);
        }
        self.expect(&Tok::RBracket)?;
        Ok(self.arena.alloc(Node::ListLit { elts }))
    }

    fn parse_brace(&mut self) -> Result<NodeId> {
        if self.eat(&Tok::RBrace) {
            return Ok(self.arena.alloc(Node::DictLit {
                keys: vec![],
                values: vec![],
            }));
        }
        let first = self.parse_expr()?;
        if self.eat(&Tok::Colon) {
            let value = self.parse_expr()?;
            if self.peek() == &Tok::For {
                let (target, iter, ifs) = self.parse_comp_clause()?;
                self.expect(&Tok::RBrace)?;
                return Ok(self.arena.alloc(Node::DictComp {
                    key: first,
                    value,
                    target,
                    iter,
                    ifs,
                }));
            }
            let mut keys = vec![first];
            let mut values = vec![value];
            while self.eat(&Tok::Comma) {
                if self.peek() == &Tok::RBrace {
                    break;
                }
                keys.push(self.parse_expr()?);
                self.expect(&Tok::Colon)?;
                values.push(self.parse_expr()?);
            }
            self.expect(&Tok::RBrace)?;
            return Ok(self.arena.alloc(Node::DictLit { keys, values }));
        }
        let mut elts = vec![first];
        while self.eat(&Tok::Comma) {
            if self.peek() == &Tok::RBrace {
                break;
            }
            elts.push(self.parse_expr()?);
        }
        self.expect(&Tok::RBrace)?;
        Ok(self.arena.alloc(Node::SetLit { elts }))
    }

    fn parse_comp_clause(&mut self) -> Result<(NodeId, NodeId, Vec<NodeId>)> {
        self.expect(&Tok::For)?;
        let target = self.parse_target()?;
        self.expect(&Tok::In)?;
        let iter = self.parse_or()?;
        let mut ifs = Vec::new();
        while self.eat(&Tok::If) {
            ifs.push(self.parse_or()?);
        }
        if self.peek() == &Tok::For {
            bail!("comprehensions with multiple generators are not supported");
        }
        Ok((target, iter, ifs))
    }
}
