// =============================================================================
// aurora-signals — Main Entry Point
// =============================================================================
//
// Stateless real-time trading-signal service: consumes market-data messages
// from a bus queue group, dispatches them to independent strategies, and
// publishes the resulting signals back onto the bus through a circuit
// breaker. Configuration is resolved once at startup from the environment;
// there is no admin HTTP surface in this process (see SPEC_FULL.md §6).
// =============================================================================

mod adapter;
mod config;
mod config_manager;
mod dispatcher;
mod egress;
mod error;
mod event;
mod heartbeat;
mod metrics;
mod orderbook;
mod signal;
mod strategy;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::ServiceConfig;
use crate::config_manager::store::MongoDocumentStore;
use crate::config_manager::StrategyConfigManager;
use crate::dispatcher::Dispatcher;
use crate::egress::EgressPublisher;
use crate::heartbeat::HeartbeatReporter;
use crate::orderbook::OrderBookTracker;
use crate::strategy::btc_dominance::BtcDominanceStrategy;
use crate::strategy::cross_exchange_spread::{new_price_cache, run_price_refresh_loop, CrossExchangeSpreadStrategy};
use crate::strategy::iceberg_detector::IcebergDetectorStrategy;
use crate::strategy::onchain_metrics::OnchainMetricsStrategy;
use crate::strategy::orderbook_skew::OrderbookSkewStrategy;
use crate::strategy::spread_liquidity::SpreadLiquidityStrategy;
use crate::strategy::ticker_velocity::TickerVelocityStrategy;
use crate::strategy::trade_momentum::TradeMomentumStrategy;
use crate::strategy::StrategyRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("aurora-signals starting up");

    let config = ServiceConfig::from_env();
    info!(
        bus_url = %config.bus_url,
        consumer_topic = %config.consumer_topic,
        publisher_topic = %config.publisher_topic,
        symbols = ?config.symbols,
        "configuration loaded"
    );

    // ── Document store + configuration manager (L4) ──────────────────────
    let store = MongoDocumentStore::connect(&config.mongodb_uri, &config.mongodb_database)
        .await
        .map_err(|e| anyhow::anyhow!("failed to connect to document store at {}: {e}", config.mongodb_uri))?;
    let config_manager = Arc::new(StrategyConfigManager::new(
        Arc::new(store),
        Duration::from_secs(config.cache_ttl_seconds),
    ));

    // ── Order-book tracker (L1), shared with the iceberg strategy ────────
    let tracker = Arc::new(OrderBookTracker::new(
        config.history_window_seconds as u64,
        config.max_tracked_symbols,
        config.max_buckets_per_symbol,
    ));

    // ── Strategy registry (L2/L3) ─────────────────────────────────────────
    let registry = Arc::new(StrategyRegistry::new());
    registry.register(Arc::new(OrderbookSkewStrategy::new()));
    registry.register(Arc::new(TradeMomentumStrategy::new()));
    registry.register(Arc::new(TickerVelocityStrategy::new()));
    registry.register(Arc::new(BtcDominanceStrategy::new()));
    registry.register(Arc::new(OnchainMetricsStrategy::new()));
    registry.register(Arc::new(IcebergDetectorStrategy::new(tracker.clone())));
    registry.register(Arc::new(SpreadLiquidityStrategy::new()));

    let price_cache = new_price_cache();
    registry.register(Arc::new(CrossExchangeSpreadStrategy::new(price_cache.clone())));

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .pool_max_idle_per_host(config.max_outbound_http_inflight)
        .build()?;
    tokio::spawn(run_price_refresh_loop(http_client, price_cache, Duration::from_secs(30)));

    info!(strategies = ?registry.strategy_ids(), "strategy registry populated");

    // ── Bus connection ────────────────────────────────────────────────────
    let bus_client = async_nats::connect(&config.bus_url)
        .await
        .map_err(|e| anyhow::anyhow!("failed to connect to bus at {}: {e}", config.bus_url))?;
    info!(bus_url = %config.bus_url, "connected to bus");

    // ── Egress publisher (L7) ─────────────────────────────────────────────
    let publisher = EgressPublisher::new(
        Arc::new(bus_client.clone()),
        config.publisher_topic.clone(),
        config.egress_queue_capacity,
        config.publisher_workers,
        config.circuit_breaker_failure_threshold,
        Duration::from_secs(config.circuit_breaker_recovery_timeout_seconds),
    );

    // ── Dispatcher (L5) ────────────────────────────────────────────────────
    let dispatcher = Dispatcher::new(
        registry,
        config_manager.clone(),
        tracker,
        publisher.clone(),
        Duration::from_millis(config.publish_deadline_ms),
    );

    // ── Cache-sweep task ───────────────────────────────────────────────────
    let sweep_manager = config_manager.clone();
    let sweep_ttl = Duration::from_secs(config.cache_ttl_seconds);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_ttl);
        loop {
            interval.tick().await;
            sweep_manager.sweep_cache();
        }
    });

    // ── Heartbeat (L8) ─────────────────────────────────────────────────────
    if config.heartbeat_enabled {
        let heartbeat = HeartbeatReporter::new(
            dispatcher.clone(),
            publisher.clone(),
            Duration::from_secs(config.heartbeat_interval_seconds),
            config.heartbeat_detailed_stats,
        );
        tokio::spawn(async move { heartbeat.run().await });
    } else {
        info!("heartbeat disabled by configuration");
    }

    // ── Dispatcher worker pool ─────────────────────────────────────────────
    let mut workers = Vec::with_capacity(config.dispatch_workers.max(1));
    for worker_id in 0..config.dispatch_workers.max(1) {
        let dispatcher = dispatcher.clone();
        let client = bus_client.clone();
        let subject = config.consumer_topic.clone();
        let queue_group = config.consumer_group.clone();
        workers.push(tokio::spawn(async move {
            info!(worker_id, "dispatcher worker starting");
            if let Err(e) = dispatcher.run(client, subject, queue_group).await {
                error!(worker_id, error = %e, "dispatcher worker exited with error");
            }
        }));
    }

    info!("all subsystems running, press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received, stopping gracefully");

    for worker in workers {
        worker.abort();
    }
    bus_client.flush().await.ok();

    info!("aurora-signals shut down complete");
    Ok(())
}
