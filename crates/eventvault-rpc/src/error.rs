//! Transport-level error types.

use thiserror::Error;

use eventvault_core::IndexError;

/// Errors surfaced by an RPC transport operation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, timeout, non-2xx status).
    #[error("HTTP error: {0}")]
    Http(String),

    /// WebSocket connect/send/receive error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON-RPC error object returned by the node.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The node's response did not match the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A log payload could not be decoded into an event record.
    #[error("decode error: {0}")]
    Decode(String),

    /// Every configured endpoint failed for this call.
    #[error("all endpoints failed for {method}")]
    AllEndpointsFailed { method: String },
}

impl From<TransportError> for IndexError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Decode(reason) => IndexError::Decode(reason),
            other => IndexError::Transport(other.to_string()),
        }
    }
}
