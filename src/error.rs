// src/error.rs
use thiserror::Error;

/// Classified failure from the embedding service.
///
/// Transient failures (throttling, 5xx, transport hiccups) are retried by the
/// batch embedder; permanent ones abort the batch immediately.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmbeddingError {
    #[error("transient embedding failure: {0}")]
    Transient(String),
    #[error("permanent embedding failure: {0}")]
    Permanent(String),
}

impl EmbeddingError {
    pub fn is_transient(&self) -> bool {
        matches!(self, EmbeddingError::Transient(_))
    }
}

#[derive(Debug, Error)]
pub enum PromoError {
    #[error("unknown arm: {0}")]
    UnknownArm(String),

    #[error("outcome must be 0 or 1, got {0}")]
    InvalidOutcome(i64),

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("similarity computation failed: {0}")]
    Similarity(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("embedding failed for item {index}: {source}")]
    Embedding {
        index: usize,
        #[source]
        source: EmbeddingError,
    },

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type PromoResult<T> = std::result::Result<T, PromoError>;
