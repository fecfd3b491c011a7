// WHY: The pattern engine sits behind two narrow traits so the compiled grammar can be
// served by regex-automata today and by another acceptor backend without touching the stages

pub mod compiler;
pub mod grammar;
pub mod regex_engine;

use std::sync::Arc;

use crate::error::EngineError;

pub use compiler::{GrammarOptions, PatternCompiler};
pub use grammar::{Fragment, Grammar, LabelKind, OutputLabel, Term};
pub use regex_engine::{CompiledRecognizer, RegexEngine};

/// Result of looking one sentence up in a compiled recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Raw output labels, possibly with duplicates
    Analyses(Vec<String>),
    /// The recognizer ran and nothing matched
    NoAnalysis,
    /// The engine produced its "unknown" marker; callers treat this as no match
    Unknown,
}

/// Read-only compiled artifact
pub trait Recognizer: Send + Sync {
    fn lookup(&self, sentence: &str) -> Result<Lookup, EngineError>;

    /// Number of distinct compiled patterns, for diagnostics
    fn pattern_count(&self) -> usize;

    /// Longest sentence, in characters, in which every occurrence is guaranteed to be seen.
    /// `None` when the recognizer scans sentences of any length.
    fn covered_chars(&self) -> Option<usize> {
        None
    }
}

/// Turns a declarative grammar into a queryable recognizer
pub trait PatternEngine {
    fn compile(&self, grammar: &Grammar) -> Result<Arc<dyn Recognizer>, EngineError>;
}
