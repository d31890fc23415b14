use thiserror::Error;

/// Transport-level failure reported by a remote service.
///
/// The shape is what retry classification looks at; see [`crate::retry::is_transient`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },

    #[error("network error: {message}")]
    Network { temporary: bool, message: String },

    /// The inventory knows about the request but refuses it for this device.
    #[error("device lookup failed: {reason}")]
    Device { reason: String },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

impl ServiceError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        ServiceError::Http {
            status,
            message: message.into(),
        }
    }

    pub fn network(temporary: bool, message: impl Into<String>) -> Self {
        ServiceError::Network {
            temporary,
            message: message.into(),
        }
    }
}
