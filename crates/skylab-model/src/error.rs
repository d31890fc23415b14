use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("dimension {key:?} cannot be set on a {kind} lease")]
    ReservedDimension { key: String, kind: &'static str },

    #[error("unknown selector kind: {0}")]
    UnknownSelectorKind(String),

    #[error("unknown lease cap: {0}")]
    UnknownCap(String),

    #[error("unknown build status: {0}")]
    UnknownBuildStatus(String),

    #[error("{kind} selector requires a non-empty value")]
    EmptySelector { kind: &'static str },

    #[error("invalid lease duration: {0}")]
    InvalidDuration(String),

    #[error("invalid lease reason: {0}")]
    InvalidReason(String),

    #[error("malformed dimension {0:?}: expected key=value or key:value")]
    MalformedDimension(String),

    #[error("invalid model: {0}")]
    Invalid(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
