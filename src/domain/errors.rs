//! Shared domain error types.

use thiserror::Error;

/// Errors raised while constructing or mutating domain records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("segment {segment_index} duration {duration} is not valid for is_pro={is_pro}")]
    InvalidDuration { segment_index: i64, duration: u32, is_pro: bool },

    #[error("segment {segment_index} has empty prompt_text")]
    EmptyPrompt { segment_index: i64 },

    #[error("storyboard has no segments")]
    EmptyStoryboard,

    #[error("duplicate segment_index {0} in storyboard")]
    DuplicateSegmentIndex(i64),

    #[error("invalid state transition for {entity} {id}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("validation failed: {0}")]
    ValidationFailed(String),
}

/// Convenience alias for domain-layer results.
pub type DomainResult<T> = Result<T, DomainError>;
