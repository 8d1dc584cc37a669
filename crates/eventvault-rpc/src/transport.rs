//! The `RpcTransport` trait — one JSON-RPC endpoint, any wire protocol.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;

/// A single JSON-RPC endpoint.
///
/// Object-safe so endpoints of different protocols can share a fallback
/// list as `Arc<dyn RpcTransport>`.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Call `method` with positional `params`, returning the raw result.
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError>;

    /// The endpoint's URL, for logging.
    fn url(&self) -> &str;
}
