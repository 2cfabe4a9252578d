// =============================================================================
// Ingest dispatcher (L5)
// =============================================================================
//
// Subscribes to the inbound bus with queue-group (competing-consumer)
// semantics, decodes each message, updates L1 on depth events, fans out to
// every enabled strategy whose filter matches, and enqueues emitted signals
// onto the egress publisher. See SPEC_FULL.md §4.5.
// =============================================================================

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tracing::{debug, error, warn};

use crate::adapter::adapt;
use crate::config_manager::StrategyConfigManager;
use crate::egress::EgressPublisher;
use crate::event::{decode_message, MarketEvent};
use crate::metrics::RollingWindow;
use crate::orderbook::OrderBookTracker;
use crate::strategy::StrategyRegistry;

#[derive(Debug, Default)]
pub struct DispatcherSnapshot {
    pub messages_processed: u64,
    pub decode_errors: u64,
    pub strategy_errors: u64,
    pub signals_emitted: u64,
    pub backpressure_drops: u64,
    pub avg_processing_time_ms: f64,
    pub max_processing_time_ms: f64,
}

struct Stats {
    messages_processed: AtomicU64,
    decode_errors: AtomicU64,
    strategy_errors: AtomicU64,
    signals_emitted: AtomicU64,
    backpressure_drops: AtomicU64,
    processing_time_ms: RollingWindow,
    running: AtomicBool,
}

impl Stats {
    fn new() -> Self {
        Self {
            messages_processed: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            strategy_errors: AtomicU64::new(0),
            signals_emitted: AtomicU64::new(0),
            backpressure_drops: AtomicU64::new(0),
            processing_time_ms: RollingWindow::new(1000),
            running: AtomicBool::new(false),
        }
    }
}

/// Drives one or more bus worker tasks. Cheap to clone: every clone shares
/// the registry, tracker, config manager, egress publisher and stats.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<StrategyRegistry>,
    config_manager: Arc<StrategyConfigManager>,
    tracker: Arc<OrderBookTracker>,
    egress: EgressPublisher,
    publish_deadline: Duration,
    stats: Arc<Stats>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<StrategyRegistry>,
        config_manager: Arc<StrategyConfigManager>,
        tracker: Arc<OrderBookTracker>,
        egress: EgressPublisher,
        publish_deadline: Duration,
    ) -> Self {
        Self {
            registry,
            config_manager,
            tracker,
            egress,
            publish_deadline,
            stats: Arc::new(Stats::new()),
        }
    }

    /// Decode and process one raw bus payload. A decode failure is counted
    /// and dropped with no retry; strategy failures are isolated by the
    /// registry and counted here.
    pub async fn handle_message(&self, raw: &[u8]) {
        let start = Instant::now();

        let event = match decode_message(raw) {
            Ok(event) => event,
            Err(err) => {
                self.stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "dropping message: decode failed");
                self.stats.messages_processed.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .processing_time_ms
                    .push(start.elapsed().as_secs_f64() * 1000.0);
                return;
            }
        };

        if let MarketEvent::Depth(depth) = &event {
            self.tracker
                .update(&depth.symbol, &depth.bids, &depth.asks, event.event_time());
        }

        let symbol = event.symbol().to_string();
        let config_manager = self.config_manager.clone();
        let (signals, errored) = self
            .registry
            .dispatch(&event, move |strategy_id| {
                let config_manager = config_manager.clone();
                let symbol = symbol.clone();
                async move { config_manager.get_config(strategy_id, Some(&symbol)).await }
            })
            .await;

        self.stats
            .strategy_errors
            .fetch_add(errored.len() as u64, Ordering::Relaxed);

        for signal in signals {
            self.stats.signals_emitted.fetch_add(1, Ordering::Relaxed);
            let wire = adapt(&signal);
            if !self.egress.enqueue(wire, self.publish_deadline).await {
                self.stats.backpressure_drops.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.stats.messages_processed.fetch_add(1, Ordering::Relaxed);
        self.stats
            .processing_time_ms
            .push(start.elapsed().as_secs_f64() * 1000.0);
    }

    /// Subscribe to `subject` under `queue_group` and process messages until
    /// the subscription ends (bus disconnect or shutdown). Multiple workers
    /// may run this concurrently over the same subject/group for horizontal
    /// scale-out; ordering per subject is preserved by the bus's queue-group
    /// routing.
    pub async fn run(
        &self,
        client: async_nats::Client,
        subject: String,
        queue_group: String,
    ) -> anyhow::Result<()> {
        let mut subscriber = client.queue_subscribe(subject.clone(), queue_group).await?;
        debug!(subject = %subject, "dispatcher subscribed");
        self.stats.running.store(true, Ordering::SeqCst);
        while let Some(message) = subscriber.next().await {
            self.handle_message(&message.payload).await;
        }
        self.stats.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.stats.running.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> DispatcherSnapshot {
        DispatcherSnapshot {
            messages_processed: self.stats.messages_processed.load(Ordering::Relaxed),
            decode_errors: self.stats.decode_errors.load(Ordering::Relaxed),
            strategy_errors: self.stats.strategy_errors.load(Ordering::Relaxed),
            signals_emitted: self.stats.signals_emitted.load(Ordering::Relaxed),
            backpressure_drops: self.stats.backpressure_drops.load(Ordering::Relaxed),
            avg_processing_time_ms: self.stats.processing_time_ms.average(),
            max_processing_time_ms: self.stats.processing_time_ms.max(),
        }
    }
}
