//! Indexer configuration, loaded from the environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::IndexError;

/// Configuration for the indexer daemon.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Address of the collection contract (emits `Transfer`).
    pub collection_contract: String,
    /// Address of the vendor contract (emits `Purchase` and `Claim`).
    pub vendor_contract: String,
    /// Block both contracts were deployed at; backfill starts here.
    pub deployment_block: u64,
    /// Chain identifier (1 = mainnet, 31337 = local anvil, …).
    pub chain_id: u64,
    /// HTTP JSON-RPC endpoints, in fallback priority order.
    pub http_urls: Vec<String>,
    /// WebSocket endpoints for subscriptions, in priority order.
    /// Empty = subscriptions disabled, head polling used instead.
    pub ws_urls: Vec<String>,
    /// SQLite database path.
    pub database_path: String,
    /// Directory the snapshot file is exported into.
    pub snapshot_dir: PathBuf,
    /// Blocks per `eth_getLogs` request during range fetches.
    pub chunk_size: u64,
    /// A full integrity resweep runs on every block divisible by this.
    pub resweep_interval: u64,
    /// Head polling cadence when no WebSocket endpoint is configured.
    pub poll_interval: Duration,
    /// Store commit attempts before giving up.
    pub commit_attempts: u32,
    /// Delay between commit attempts.
    pub commit_retry_delay: Duration,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            collection_contract: String::new(),
            vendor_contract: String::new(),
            deployment_block: 0,
            chain_id: 1,
            http_urls: vec![],
            ws_urls: vec![],
            database_path: "./eventvault.db".into(),
            snapshot_dir: "./data".into(),
            chunk_size: 10_000,
            resweep_interval: 900,
            poll_interval: Duration::from_secs(12),
            commit_attempts: 5,
            commit_retry_delay: Duration::from_millis(500),
        }
    }
}

impl IndexerConfig {
    /// Load configuration from process environment variables.
    ///
    /// Required: `COLLECTION_CONTRACT`, `VENDOR_CONTRACT`,
    /// `CONTRACT_DEPLOYMENT_BLOCK`, `CHAIN_ID`, `RPC_HTTP_URLS`.
    /// Optional: `RPC_WS_URLS`, `DATABASE_PATH`, `SNAPSHOT_DIR`.
    pub fn from_env() -> Result<Self, IndexError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, IndexError> {
        let defaults = Self::default();

        let collection_contract = require_address(&lookup, "COLLECTION_CONTRACT")?;
        let vendor_contract = require_address(&lookup, "VENDOR_CONTRACT")?;
        let deployment_block = require_u64(&lookup, "CONTRACT_DEPLOYMENT_BLOCK")?;
        let chain_id = require_u64(&lookup, "CHAIN_ID")?;

        let http_urls = split_urls(&require(&lookup, "RPC_HTTP_URLS")?);
        if http_urls.is_empty() {
            return Err(IndexError::Config("RPC_HTTP_URLS must list at least one endpoint".into()));
        }
        let ws_urls = lookup("RPC_WS_URLS").map(|v| split_urls(&v)).unwrap_or_default();

        Ok(Self {
            collection_contract,
            vendor_contract,
            deployment_block,
            chain_id,
            http_urls,
            ws_urls,
            database_path: lookup("DATABASE_PATH").unwrap_or_else(|| defaults.database_path.clone()),
            snapshot_dir: lookup("SNAPSHOT_DIR").map(PathBuf::from).unwrap_or_else(|| defaults.snapshot_dir.clone()),
            ..defaults
        })
    }
}

fn require(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, IndexError> {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| IndexError::Config(format!("environment variable {key} not set")))
}

fn require_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<u64, IndexError> {
    let raw = require(lookup, key)?;
    raw.trim()
        .parse()
        .map_err(|_| IndexError::Config(format!("{key} is not a valid integer: {raw:?}")))
}

fn require_address(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, IndexError> {
    let raw = require(lookup, key)?;
    let addr = raw.trim();
    let hex = addr.strip_prefix("0x").unwrap_or(addr);
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(IndexError::Config(format!("{key} is not a valid address: {raw:?}")));
    }
    Ok(addr.to_string())
}

fn split_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
