//! Parser error surface.

use thiserror::Error;

/// Errors raised while turning EXPLAIN output into a plan tree.
///
/// Parsing is best-effort: lines that match no known shape are skipped, and
/// only a source yielding no plan at all is a hard failure.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid plan structure: {0}")]
    InvalidStructure(String),

    #[error("Unable to parse plan")]
    MissingPlan,
}

/// Result type for plan parsing.
pub type Result<T> = std::result::Result<T, ParseError>;
