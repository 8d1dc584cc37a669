//! eventvault-rpc — JSON-RPC transports and the Ethereum log source.
//!
//! Reliability model: an ordered endpoint list with per-call first-success
//! fallback for reads, and a self-healing WebSocket task for subscriptions.
//! No endpoint is ever excluded after a failure.

pub mod decode;
pub mod error;
pub mod fallback;
pub mod http;
pub mod request;
pub mod source;
pub mod transport;
pub mod ws;

pub use error::TransportError;
pub use fallback::FallbackTransports;
pub use http::HttpTransport;
pub use source::EthLogSource;
pub use transport::RpcTransport;
pub use ws::WsSubscriber;
