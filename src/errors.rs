use std::path::PathBuf;
use std::time::Duration;

use crate::semantic::{EmbeddingError, IndexError};

/// A required artifact could not be loaded. Fatal to the whole session.
#[derive(thiserror::Error, Debug)]
pub enum ResourceUnavailable {
    #[error("{artifact} not found at {}", path.display())]
    Missing { artifact: &'static str, path: PathBuf },

    #[error("{artifact} at {} is malformed: {reason}", path.display())]
    Malformed {
        artifact: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error("{artifact} is inconsistent with {other}: {reason}")]
    Inconsistent {
        artifact: &'static str,
        other: &'static str,
        reason: String,
    },
}

impl ResourceUnavailable {
    pub fn artifact(&self) -> &'static str {
        match self {
            ResourceUnavailable::Missing { artifact, .. }
            | ResourceUnavailable::Malformed { artifact, .. }
            | ResourceUnavailable::Inconsistent { artifact, .. } => *artifact,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, ResourceUnavailable::Missing { .. })
    }
}

/// A model or index call failed while serving one request.
#[derive(thiserror::Error, Debug)]
pub enum InferenceError {
    #[error("tokenization failed: {0}")]
    Tokenization(String),

    #[error("model execution failed: {0}")]
    Model(String),

    #[error("unexpected model output: {0}")]
    Output(String),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("resources unavailable: {0}")]
    Resource(#[from] ResourceUnavailable),

    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("request timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    #[error("'{0}' is not one of the current results")]
    InvalidSelection(String),

    #[error("no results to ask about, search first")]
    NothingRetrieved,

    #[error("request worker exited without a result")]
    WorkerLost,
}
