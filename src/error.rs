// WHY: Collaborator failures are typed so stages can degrade per sentence
// instead of aborting the run; everything else flows through anyhow

use std::time::Duration;
use thiserror::Error;

/// Failure of an external collaborator (pattern engine or tagger)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("collaborator timed out after {0:?}")]
    Timeout(Duration),
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("collaborator failed: {0}")]
    Failed(String),
}

impl EngineError {
    /// Short stable code used in rejection reasons and stats keys
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Unavailable(_) => "unavailable",
            Self::Failed(_) => "failed",
        }
    }
}
