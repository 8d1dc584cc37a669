//! eventvaultd — the chain-event indexer daemon.
//!
//! Startup: load env config, open the store, run a full backfill, then keep
//! the history current from live subscriptions plus a periodic integrity
//! resweep. On SIGINT/SIGTERM the in-flight cycle finishes, the store is
//! closed, and the process exits cleanly; exhausted commit retries and
//! invalid configuration exit non-zero.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use eventvault_core::{
    ChainLogSource, CycleMode, CycleRequests, EventStore, IndexerConfig, LogQuery, Reconciler,
    Worker,
};
use eventvault_rpc::{EthLogSource, FallbackTransports, HttpTransport, RpcTransport, WsSubscriber};
use eventvault_store::{FileSnapshotExporter, KvEventStore, SqliteKvStore};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "exiting");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = IndexerConfig::from_env().context("loading configuration")?;
    info!(
        chain_id = config.chain_id,
        deployment_block = config.deployment_block,
        endpoints = config.http_urls.len(),
        "starting eventvaultd"
    );

    // Transports, in configured priority order.
    let mut transports: Vec<Arc<dyn RpcTransport>> = Vec::with_capacity(config.http_urls.len());
    for url in &config.http_urls {
        transports.push(Arc::new(
            HttpTransport::new(url.clone()).context("building HTTP transport")?,
        ));
    }
    let http = FallbackTransports::new(transports).context("building fallback list")?;

    let ws = if config.ws_urls.is_empty() {
        warn!("no WebSocket endpoints configured, falling back to head polling");
        None
    } else {
        Some(WsSubscriber::new(config.ws_urls.clone()).context("starting WebSocket client")?)
    };

    let source = Arc::new(EthLogSource::new(http, ws, config.chain_id));
    let store = Arc::new(KvEventStore::new(
        SqliteKvStore::open(&config.database_path)
            .await
            .context("opening event store")?,
    ));
    let exporter = FileSnapshotExporter::new(&config.snapshot_dir);

    let requests = Arc::new(CycleRequests::new());
    let reconciler = Reconciler::new(config.clone(), source.clone(), store.clone(), exporter);

    arm_triggers(&config, &source, reconciler.queries(), &requests).await;

    // Initial full backfill from the deployment block.
    requests.request(CycleMode::Full);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received, finishing in-flight cycle");
        let _ = shutdown_tx.send(true);
    });

    let worker = Worker::new(reconciler, requests);
    let result = worker.run(shutdown_rx).await;

    if let Err(err) = store.close().await {
        warn!(error = %err, "store close failed");
    } else {
        info!("store closed");
    }

    result.map_err(Into::into)
}

/// Wire the real-time triggers: log subscriptions per watched stream plus
/// the block-cadence integrity resweep, or a plain head-polling timer when
/// no WebSocket endpoint is configured.
async fn arm_triggers(
    config: &IndexerConfig,
    source: &Arc<EthLogSource>,
    queries: &[LogQuery],
    requests: &Arc<CycleRequests>,
) {
    if config.ws_urls.is_empty() {
        let requests = requests.clone();
        let poll_interval = config.poll_interval;
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + poll_interval;
            let mut ticker = tokio::time::interval_at(start, poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                requests.request(CycleMode::Incremental);
            }
        });
        return;
    }

    // New logs on the collection and vendor contracts trigger incremental
    // cycles. Claim events ride the vendor Purchase subscription's cycles;
    // the resweep catches anything the live path misses.
    for query in queries.iter().take(2) {
        match source.subscribe_logs(query).await {
            Ok(mut notifications) => {
                let requests = requests.clone();
                let kind = query.kind;
                tokio::spawn(async move {
                    while notifications.recv().await.is_some() {
                        info!(%kind, "new log observed, scheduling incremental cycle");
                        requests.request(CycleMode::Incremental);
                    }
                });
            }
            Err(err) => warn!(kind = %query.kind, error = %err, "log subscription unavailable"),
        }
    }

    // Integrity resweep on the block cadence.
    match source.subscribe_blocks().await {
        Ok(mut headers) => {
            let requests = requests.clone();
            let resweep_interval = config.resweep_interval;
            tokio::spawn(async move {
                while let Some(number) = headers.recv().await {
                    if number % resweep_interval == 0 {
                        info!(block = number, "integrity resweep due, scheduling full cycle");
                        requests.request(CycleMode::Full);
                    }
                }
            });
        }
        Err(err) => warn!(error = %err, "block subscription unavailable"),
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable, using Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
