//! Canonical error and result types for the crate.
//!
//! [`ClientError`] covers precondition failures raised before any I/O,
//! transport faults that trigger reconnection, protocol acknowledgement
//! errors reported by the directory service, and frame encoding problems.

use crate::{correlation::CorrelationError, session::SessionState, transport::TransportError};

/// Errors emitted by [`crate::GossipClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A required credential was not configured.
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
    /// The operation is not valid in the current session state.
    #[error("operation not permitted while {0}")]
    InvalidState(SessionState),
    /// No connection is open.
    #[error("not connected")]
    NotConnected,
    /// The connection was torn down before a response arrived.
    #[error("connection closed")]
    ConnectionClosed,
    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// The directory service acknowledged a request with an error code.
    #[error("{event} failed: {code}")]
    Protocol { event: String, code: String },
    /// The directory service rejected the credentials.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    /// An inbound frame or payload could not be parsed.
    #[error("failed to decode frame: {0}")]
    Decode(#[source] serde_json::Error),
    /// An outbound frame could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
    /// A waiter could not be registered.
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
}

impl ClientError {
    /// Error code reported by the directory service, if this is a protocol
    /// acknowledgement error.
    #[must_use]
    pub fn protocol_code(&self) -> Option<&str> {
        match self {
            Self::Protocol { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether the error came from the connection rather than the request.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::NotConnected | Self::ConnectionClosed
        )
    }
}

/// Result alias used by public client APIs.
pub type Result<T> = std::result::Result<T, ClientError>;
