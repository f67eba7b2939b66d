//! Error types for workbridge-core.

use thiserror::Error;

use crate::protocol::NO_SUCH_METHOD;

/// Result type for workbridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, routing or settling bridge calls.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Context creation was attempted without a usable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A response referenced a call id with no pending entry, or an id was
    /// registered twice. Signals a programming error or channel corruption.
    #[error("protocol error: {message} (call id `{id}`)")]
    Protocol { id: String, message: String },

    /// The remote method failed; `message` is its textual description.
    #[error("{message}")]
    Remote {
        method: Option<String>,
        message: String,
    },

    /// The executor has no callable bound under the requested name.
    #[error("{NO_SUCH_METHOD}: {}", method.as_deref().unwrap_or("<unnamed>"))]
    NoSuchMethod { method: Option<String> },

    /// Failure raised from inside a callable body.
    #[error("{0}")]
    Thrown(String),

    /// A positional argument could not be decoded into the requested type.
    #[error("invalid argument {index}: {message}")]
    Argument { index: usize, message: String },

    /// A value could not be rendered as program text or wire data.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The platform failed to create an isolated context.
    #[error("platform error: {0}")]
    Platform(String),

    /// The channel to a context is gone.
    #[error("context closed: {0}")]
    ContextClosed(String),

    /// No RPC stub is installed under this name.
    #[error("no stub installed for `{0}`")]
    StubNotFound(String),
}

impl Error {
    /// Construct the failure a callable body reports to its caller.
    pub fn thrown(message: impl Into<String>) -> Self {
        Self::Thrown(message.into())
    }

    /// Build the caller-side error for a response carrying `error`.
    pub fn from_response(method: Option<String>, message: String) -> Self {
        if message == NO_SUCH_METHOD {
            Self::NoSuchMethod { method }
        } else {
            Self::Remote { method, message }
        }
    }

    /// Whether this error is fatal to the bridge rather than to one call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Protocol { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
