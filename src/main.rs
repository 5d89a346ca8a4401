use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use kalshi_mover_poller::config::AppConfig;
use kalshi_mover_poller::kalshi::KalshiMarketData;
use kalshi_mover_poller::movement::MovementDetector;
use kalshi_mover_poller::poller::{Poller, PollerOptions};
use kalshi_mover_poller::stats::Stats;
use kalshi_mover_poller::store::FirestoreStore;
use kalshi_mover_poller::writer::SnapshotWriter;

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = AppConfig::load().context("load configuration")?;
    let group = cfg.strategy.market_group().to_string();

    let store = FirestoreStore::new(
        &cfg.firestore_base_url,
        cfg.service_account.clone(),
        cfg.store_timeout,
    )
    .context("init firestore store")?;

    tracing::info!(
        base_url = %cfg.base_url,
        api_key = %format!("...{}", cfg.api_key_suffix()),
        strategy = cfg.strategy.kind(),
        market_group = %group,
        min_move = %cfg.threshold,
        poll_interval_ms = cfg.poll_interval.as_millis() as u64,
        project = %store.project_id(),
        snapshot_collection = %cfg.snapshot_collection,
        movements_collection = %cfg.movements_collection,
        "starting poller"
    );

    let source = KalshiMarketData::new(
        cfg.base_url.clone(),
        cfg.api_key_id.clone(),
        cfg.signer.clone(),
        cfg.strategy.clone(),
        cfg.fetch.clone(),
    )?;

    let writer = SnapshotWriter::new(
        Arc::new(store),
        cfg.snapshot_collection.clone(),
        cfg.movements_collection.clone(),
        group.clone(),
    );

    let poller = Poller::new(
        Arc::new(source),
        MovementDetector::new(cfg.threshold, group),
        writer,
        Stats::new(now_ms()),
        PollerOptions {
            poll_interval: cfg.poll_interval,
            stats_log_sec: cfg.stats_log_sec,
            stats_jsonl_path: cfg.stats_jsonl_path.clone(),
        },
    );

    poller.run().await;
    Ok(())
}
