//! Error types shared by the pipeline, the stores and the scheduler.

use thiserror::Error;

/// Fatal to a single extraction. Nothing is persisted when this is returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Could not find start URL in Python file")]
    NoStartUrl,
}

/// Why the semantic grouping collaborator's answer was not used.
///
/// Never surfaced to callers: the grouper logs it and falls back.
#[derive(Debug, Error)]
pub enum GroupingError {
    #[error("grouping request failed: {0}")]
    Transport(String),

    #[error("grouping service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("grouping service returned no content")]
    EmptyResponse,

    #[error("grouping response is not a step list: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("proposed steps do not reconstruct the command list")]
    Reconstruction,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} with ID {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage file is corrupt: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    pub fn test_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: "Test",
            id: id.to_string(),
        }
    }

    pub fn result_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: "Test result",
            id: id.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Services not available after {attempts} attempts: {source}")]
    BackendUnavailable {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;
