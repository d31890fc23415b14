use skylab_model::{BuildId, ModelError};
use thiserror::Error;

use crate::service::ServiceError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("ambiguous: {0}")]
    Ambiguous(String),

    #[error("bot {bot}: dimension {key:?} has {} values, expected one", .values.len())]
    MultipleValues {
        bot: String,
        key: String,
        values: Vec<String>,
    },

    #[error("{0}")]
    AdmissionDenied(String),

    #[error("lease dispatch failed: {reason}")]
    DispatchFailed {
        build: Option<BuildId>,
        reason: String,
    },

    #[error("no dut_name for build {build}")]
    MissingAssignment { build: BuildId },

    #[error("operation cancelled")]
    Cancelled,

    #[error("timed out waiting for build {build} to start")]
    WaitTimeout { build: BuildId },

    #[error("{op}: giving up after {attempts} attempts: {source}")]
    Transient {
        op: String,
        attempts: u32,
        #[source]
        source: ServiceError,
    },

    #[error("{op}: {source}")]
    Service {
        op: String,
        #[source]
        source: ServiceError,
    },

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl CoreError {
    /// Build the lease refers to, when one was created.
    pub fn build_id(&self) -> Option<BuildId> {
        match self {
            CoreError::DispatchFailed { build, .. } => *build,
            CoreError::MissingAssignment { build } | CoreError::WaitTimeout { build } => {
                Some(*build)
            }
            _ => None,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
