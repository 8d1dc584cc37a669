//! WebSocket subscriptions with endpoint rotation and auto-resubscribe.
//!
//! A background task owns the connection. On disconnect it rotates to the
//! next configured endpoint with doubling backoff and re-issues
//! `eth_subscribe` for every registered subscription. Receivers stay alive
//! across reconnects, which means notifications around a reconnect can be
//! redelivered — subscribers already treat delivery as at-least-once.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;

use crate::error::TransportError;
use crate::request::JsonRpcResponse;

const RECONNECT_INITIAL: Duration = Duration::from_millis(500);
const RECONNECT_MAX: Duration = Duration::from_secs(60);

struct Subscription {
    kind: String,
    params: Value,
    sender: mpsc::UnboundedSender<Value>,
    /// Server-assigned subscription id; reset on every reconnect.
    server_id: Option<String>,
}

struct Shared {
    urls: Vec<String>,
    subscriptions: Mutex<Vec<Subscription>>,
}

/// Subscription-only WebSocket client over an ordered endpoint list.
pub struct WsSubscriber {
    shared: Arc<Shared>,
    register_tx: mpsc::UnboundedSender<usize>,
}

impl WsSubscriber {
    /// Start the background connection task over `urls` (priority order).
    pub fn new(urls: Vec<String>) -> Result<Self, TransportError> {
        if urls.is_empty() {
            return Err(TransportError::WebSocket("empty endpoint list".into()));
        }
        let shared = Arc::new(Shared { urls, subscriptions: Mutex::new(Vec::new()) });
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        tokio::spawn(connection_task(shared.clone(), register_rx));
        Ok(Self { shared, register_tx })
    }

    /// Register an `eth_subscribe` stream of the given kind.
    ///
    /// `params` is the subscription's extra parameter object (`Value::Null`
    /// for parameterless kinds such as `newHeads`).
    pub fn subscribe(&self, kind: &str, params: Value) -> mpsc::UnboundedReceiver<Value> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let index = {
            let mut subs = self.shared.subscriptions.lock().unwrap();
            subs.push(Subscription {
                kind: kind.to_string(),
                params,
                sender,
                server_id: None,
            });
            subs.len() - 1
        };
        // Wake the connection task so an already-open socket subscribes now;
        // a future (re)connect covers the not-yet-connected case.
        let _ = self.register_tx.send(index);
        receiver
    }
}

/// Wire text for the `eth_subscribe` request of subscription `index`.
/// The request id doubles as the subscription index for confirmation
/// matching.
fn subscribe_text(index: usize, kind: &str, params: &Value) -> String {
    let rpc_params = match params {
        Value::Null => json!([kind]),
        other => json!([kind, other]),
    };
    json!({
        "jsonrpc": "2.0",
        "method": "eth_subscribe",
        "params": rpc_params,
        "id": index as u64,
    })
    .to_string()
}

async fn connection_task(shared: Arc<Shared>, mut register_rx: mpsc::UnboundedReceiver<usize>) {
    let mut backoff = RECONNECT_INITIAL;
    let mut url_index = 0usize;

    loop {
        let url = shared.urls[url_index % shared.urls.len()].clone();
        url_index += 1;

        let connected = tokio_tungstenite::connect_async(url.as_str()).await;
        let (mut sink, mut stream) = match connected {
            Ok((ws, _)) => {
                tracing::info!(url = %url, "WebSocket connected");
                backoff = RECONNECT_INITIAL;
                ws.split()
            }
            Err(err) => {
                tracing::warn!(url = %url, error = %err, "WebSocket connect failed");
                time::sleep(backoff).await;
                backoff = (backoff * 2).min(RECONNECT_MAX);
                continue;
            }
        };

        // Subscribe everything registered so far. Requests are collected
        // under the lock, sent after it is released.
        let pending: Vec<String> = {
            let mut subs = shared.subscriptions.lock().unwrap();
            subs.iter_mut()
                .enumerate()
                .map(|(i, sub)| {
                    sub.server_id = None;
                    subscribe_text(i, &sub.kind, &sub.params)
                })
                .collect()
        };
        let mut failed = false;
        for text in pending {
            if sink.send(Message::Text(text)).await.is_err() {
                failed = true;
                break;
            }
        }

        while !failed {
            tokio::select! {
                registered = register_rx.recv() => {
                    let Some(index) = registered else {
                        // WsSubscriber dropped; shut the task down.
                        return;
                    };
                    let text = {
                        let subs = shared.subscriptions.lock().unwrap();
                        subs.get(index).map(|sub| subscribe_text(index, &sub.kind, &sub.params))
                    };
                    if let Some(text) = text {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                }
                message = stream.next() => {
                    match message {
                        None | Some(Ok(Message::Close(_))) => break,
                        Some(Err(err)) => {
                            tracing::warn!(error = %err, "WebSocket receive error");
                            break;
                        }
                        Some(Ok(Message::Text(text))) => dispatch_message(&shared, &text),
                        Some(Ok(Message::Ping(payload))) => {
                            if sink.send(Message::Pong(payload)).await.is_err() {
                                break;
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        tracing::warn!(url = %url, "WebSocket disconnected, reconnecting");
        time::sleep(backoff).await;
        backoff = (backoff * 2).min(RECONNECT_MAX);
    }
}

fn dispatch_message(shared: &Shared, text: &str) {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        tracing::debug!("unparseable WebSocket message");
        return;
    };

    // Subscription notification?
    if value.get("method").and_then(Value::as_str) == Some("eth_subscription") {
        let params = &value["params"];
        let Some(server_id) = params["subscription"].as_str() else {
            return;
        };
        let subs = shared.subscriptions.lock().unwrap();
        if let Some(sub) = subs.iter().find(|s| s.server_id.as_deref() == Some(server_id)) {
            // A closed receiver just drops notifications for that stream.
            let _ = sub.sender.send(params["result"].clone());
        }
        return;
    }

    // Otherwise a response to one of our subscribe requests: the id is the
    // subscription index, the result the server-assigned id.
    if let Ok(response) = serde_json::from_value::<JsonRpcResponse>(value) {
        let (Some(index), Some(result)) = (response.id_u64(), response.result) else {
            return;
        };
        if let Some(server_id) = result.as_str() {
            let mut subs = shared.subscriptions.lock().unwrap();
            if let Some(sub) = subs.get_mut(index as usize) {
                sub.server_id = Some(server_id.to_string());
                tracing::debug!(kind = %sub.kind, server_id, "subscription confirmed");
            }
        }
    }
}
