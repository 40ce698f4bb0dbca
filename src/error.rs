//! Error taxonomy for the matching pipeline.
//!
//! Each variant names the external collaborator that failed, so callers can
//! tell an aborted upload apart from an unreachable index without parsing
//! message strings. Any of these aborts the in-flight submission; the one
//! non-fatal case (match recording after a successful search) is not an
//! error value at all — see `pipeline::MatchRecording`.
//!
//! Configuration problems (missing DSNs, bad dimensions) are caught at
//! startup by `config::load_config` and never reach this type.

use thiserror::Error;

/// A fatal failure in one step of an ingestion flow.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The submission failed validation before any side effect.
    #[error("invalid submission: {0}")]
    Invalid(String),

    /// Object storage upload failed; nothing was persisted.
    #[error("object storage error: {0}")]
    Storage(anyhow::Error),

    /// The embedding provider failed (rate limit, timeout, malformed
    /// response). All sub-causes are treated identically.
    #[error("embedding provider error: {0}")]
    Embedding(anyhow::Error),

    /// The relational store rejected a write or read.
    #[error("persistence error: {0}")]
    Persistence(anyhow::Error),

    /// The vector index rejected an upsert or search.
    #[error("vector index error: {0}")]
    Index(anyhow::Error),
}

impl PipelineError {
    /// Machine-readable code for logs and error responses.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Invalid(_) => "invalid_submission",
            PipelineError::Storage(_) => "storage_error",
            PipelineError::Embedding(_) => "embedding_error",
            PipelineError::Persistence(_) => "persistence_error",
            PipelineError::Index(_) => "index_error",
        }
    }
}
