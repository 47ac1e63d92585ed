//! # Disagg Core
//!
//! Core implementation of the disagg rule translator, including:
//! - Arena-allocated syntax tree for the rule-source dialect
//! - Rule-source parser
//! - The rewrite engine (call table, outcome compiler, class pass)
//! - Per-rule-type parameter records
//! - Import consolidation and code assembly
//!
//! The translator takes rule definitions written against a
//! population-oriented stochastic-simulation model and emits equivalent
//! transition logic for an individual-agent runtime. This crate provides
//! the foundational components used by the command-line front end.

#![warn(clippy::all)]

pub mod assemble;
pub mod ast;
pub mod imports;
pub mod params;
pub mod parser;
pub mod rewrite;
pub mod translate;

// Re-export commonly used types
pub use assemble::AssemblyOptions;
pub use ast::{Arena, Node, NodeId, ParentMap};
pub use imports::ImportExtractor;
pub use params::{GateSpec, ParamRecord, QryRecord};
pub use parser::{parse_module, ParseTree, Parser, RuleParser};
pub use rewrite::{
    CallRewrite, Diagnostic, DiagnosticKind, Helper, RewriteClass, Rewriter, SourcePrimitive,
    UsageFlags,
};
pub use translate::{RuleSource, Translation, Translator};

/// Translator version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing for disagg core components
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("disagg_core=info".parse().unwrap()),
        )
        .init();
}

/// Error types for translation runs
#[derive(thiserror::Error, Debug)]
pub enum TranslateError {
    /// Rule source failed to parse
    #[error("Parse error: {0}")]
    Parse(#[from] anyhow::Error),

    /// A return statement inside the transition method has an
    /// unrecognized shape
    #[error("Malformed return: {0}")]
    MalformedReturn(String),

    /// A returned sequence mixes weighted-outcome constructors with
    /// other values
    #[error("Inconsistent outcome list: {0}")]
    MixedOutcomeList(String),

    /// A temporal gate value outside the four recognized encodings
    #[error("Unknown temporal gate encoding: {0}")]
    UnknownGate(String),

    /// Parameter records failed to decode
    #[error("Parameter record error: {0}")]
    Params(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for translation operations
pub type Result<T> = std::result::Result<T, TranslateError>;
