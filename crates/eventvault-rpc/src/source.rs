//! `EthLogSource` — the Ethereum JSON-RPC implementation of the core
//! `ChainLogSource` port.
//!
//! Historical reads (`eth_blockNumber`, `eth_getLogs`) go over the HTTP
//! fallback list; live triggers ride WebSocket subscriptions when endpoints
//! are configured.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use eventvault_core::{ChainLogSource, EventKind, EventRecord, IndexError, LogQuery};

use crate::decode::{decode_log, parse_quantity, signature_topic, to_quantity, RawLog};
use crate::fallback::FallbackTransports;
use crate::ws::WsSubscriber;

/// Ledger RPC source with per-call transport fallback.
pub struct EthLogSource {
    http: FallbackTransports,
    ws: Option<WsSubscriber>,
    chain_id: u64,
    topics: HashMap<EventKind, String>,
}

impl EthLogSource {
    pub fn new(http: FallbackTransports, ws: Option<WsSubscriber>, chain_id: u64) -> Self {
        let topics = EventKind::ALL
            .iter()
            .map(|kind| (*kind, signature_topic(kind.signature())))
            .collect();
        tracing::info!(chain_id, endpoints = http.len(), "log source ready");
        Self { http, ws, chain_id, topics }
    }

    /// The chain this source is configured for.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn topic0(&self, kind: EventKind) -> &str {
        &self.topics[&kind]
    }

    fn ws(&self) -> Result<&WsSubscriber, IndexError> {
        self.ws
            .as_ref()
            .ok_or_else(|| IndexError::Transport("no WebSocket endpoints configured".into()))
    }
}

#[async_trait]
impl ChainLogSource for EthLogSource {
    async fn latest_block(&self) -> Result<u64, IndexError> {
        let value = self.http.request("eth_blockNumber", json!([])).await?;
        let raw = value
            .as_str()
            .ok_or_else(|| IndexError::Transport(format!("eth_blockNumber returned {value}")))?;
        Ok(parse_quantity(raw)?)
    }

    async fn get_logs(
        &self,
        query: &LogQuery,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<EventRecord>, IndexError> {
        let params = json!([{
            "address": query.address,
            "topics": [self.topic0(query.kind)],
            "fromBlock": to_quantity(from_block),
            "toBlock": to_quantity(to_block),
        }]);
        let value = self.http.request("eth_getLogs", params).await?;
        let raw_logs: Vec<RawLog> = serde_json::from_value(value)
            .map_err(|e| IndexError::Decode(format!("eth_getLogs response: {e}")))?;

        raw_logs
            .iter()
            .filter(|raw| !raw.removed)
            .map(|raw| decode_log(query.kind, raw).map_err(IndexError::from))
            .collect()
    }

    async fn subscribe_logs(
        &self,
        query: &LogQuery,
    ) -> Result<mpsc::UnboundedReceiver<usize>, IndexError> {
        let filter = json!({
            "address": query.address,
            "topics": [self.topic0(query.kind)],
        });
        let mut notifications = self.ws()?.subscribe("logs", filter);

        // Forward a bare count per delivery: subscription payloads are a
        // trigger, never authoritative data.
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while notifications.recv().await.is_some() {
                if tx.send(1).is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn subscribe_blocks(&self) -> Result<mpsc::UnboundedReceiver<u64>, IndexError> {
        let mut headers = self.ws()?.subscribe("newHeads", Value::Null);

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(header) = headers.recv().await {
                let number = header
                    .get("number")
                    .and_then(Value::as_str)
                    .and_then(|raw| parse_quantity(raw).ok());
                match number {
                    Some(number) => {
                        if tx.send(number).is_err() {
                            break;
                        }
                    }
                    None => tracing::debug!("header without parseable number, skipping"),
                }
            }
        });
        Ok(rx)
    }
}
