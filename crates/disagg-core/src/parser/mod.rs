// Parser module for the rule-source dialect.

use anyhow::Result;

use crate::ast::{Arena, NodeId};

pub mod lexer;
pub mod rule_parser;

#[cfg(test)]
mod rule_parser_tests;

/// A parsed source fragment: the node arena plus its module root.
#[derive(Debug)]
pub struct ParseTree {
    pub arena: Arena,
    pub root: NodeId,
}

/// Trait for rule-source parsers.
pub trait Parser: Send + Sync {
    /// Parse source code into a module tree.
    fn parse(&mut self, source: &str) -> Result<ParseTree>;

    /// Get parser name for debugging.
    fn name(&self) -> &'static str;
}

pub use rule_parser::RuleParser;

/// Parse a rule-source fragment with the default parser.
pub fn parse_module(source: &str) -> Result<ParseTree> {
    RuleParser::new().parse(source)
}
