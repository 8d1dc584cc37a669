//! Ordered first-success fallback over a list of transports.

use std::sync::Arc;

use serde_json::Value;

use crate::error::TransportError;
use crate::transport::RpcTransport;

/// Tries each configured endpoint in fixed priority order, per call.
///
/// A call succeeds on the first transport that answers without error. This
/// is deliberately not a circuit breaker: a transport that failed is tried
/// again on the very next call, so a flaky primary endpoint recovers without
/// operator action.
pub struct FallbackTransports {
    transports: Vec<Arc<dyn RpcTransport>>,
}

impl FallbackTransports {
    /// Build from transports in priority order (index 0 tried first).
    pub fn new(transports: Vec<Arc<dyn RpcTransport>>) -> Result<Self, TransportError> {
        if transports.is_empty() {
            return Err(TransportError::InvalidResponse("empty transport list".into()));
        }
        Ok(Self { transports })
    }

    /// Call `method`, falling through the endpoint list on error.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        for transport in &self.transports {
            match transport.request(method, params.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    tracing::warn!(
                        url = transport.url(),
                        method,
                        error = %err,
                        "endpoint failed, falling back to next"
                    );
                }
            }
        }
        Err(TransportError::AllEndpointsFailed { method: method.into() })
    }

    pub fn len(&self) -> usize {
        self.transports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }
}
