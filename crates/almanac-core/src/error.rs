//! Error types for the calendar engine and item store.

use thiserror::Error;

/// Errors surfaced by the engine, the item store and the session provider.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid {field} '{value}': {reason}")]
    InvalidInput {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("item not found: {0}")]
    NotFound(String),

    #[error("not signed in; run `almanac login <user>` first")]
    Unauthenticated,

    #[error("store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    pub fn invalid(
        field: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidInput {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias for engine and store operations.
pub type CoreResult<T> = Result<T, CoreError>;
