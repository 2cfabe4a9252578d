// =============================================================================
// Heartbeat reporter (L8)
// =============================================================================
//
// Every H seconds, logs one structured record summarizing message-processing
// throughput and error rates since the previous tick, plus cumulative
// totals. Reads already-maintained dispatcher/publisher counters only — it
// never perturbs pipeline latency. Field names for the delta/rate/total
// block and the detailed per-component section mirror
// `strategies/utils/heartbeat.py` field-for-field. See SPEC_FULL.md §4.8.
// =============================================================================

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::info;

use crate::dispatcher::Dispatcher;
use crate::egress::EgressPublisher;

#[derive(Debug, Clone, Copy, Default)]
struct PreviousStats {
    messages_processed: u64,
    processing_errors: u64,
    signals_published: u64,
    publish_errors: u64,
}

pub struct HeartbeatReporter {
    dispatcher: Dispatcher,
    publisher: EgressPublisher,
    interval: Duration,
    detailed_stats: bool,
    start: Instant,
}

impl HeartbeatReporter {
    pub fn new(dispatcher: Dispatcher, publisher: EgressPublisher, interval: Duration, detailed_stats: bool) -> Self {
        Self {
            dispatcher,
            publisher,
            interval,
            detailed_stats,
            start: Instant::now(),
        }
    }

    /// Runs until the process shuts down. Intended to be spawned as its own
    /// task; does not return early on a single failed tick.
    pub async fn run(&self) {
        let mut previous = PreviousStats::default();
        let mut heartbeat_count: u64 = 0;

        loop {
            sleep(self.interval).await;
            heartbeat_count += 1;
            previous = self.log_tick(heartbeat_count, previous);
        }
    }

    fn log_tick(&self, heartbeat_count: u64, previous: PreviousStats) -> PreviousStats {
        let dispatcher_snapshot = self.dispatcher.snapshot();
        let publisher_snapshot = self.publisher.snapshot();

        let messages_processed = dispatcher_snapshot.messages_processed;
        let processing_errors = dispatcher_snapshot.decode_errors + dispatcher_snapshot.strategy_errors;
        let signals_published = publisher_snapshot.order_count;
        let publish_errors = publisher_snapshot.error_count;

        let messages_processed_delta = messages_processed.saturating_sub(previous.messages_processed);
        let consumer_errors_delta = processing_errors.saturating_sub(previous.processing_errors);
        let orders_published_delta = signals_published.saturating_sub(previous.signals_published);
        let publisher_errors_delta = publish_errors.saturating_sub(previous.publish_errors);

        let interval_secs = self.interval.as_secs_f64().max(1e-9);
        let messages_per_second = messages_processed_delta as f64 / interval_secs;
        let orders_per_second = orders_published_delta as f64 / interval_secs;
        let error_rate_per_second = (consumer_errors_delta + publisher_errors_delta) as f64 / interval_secs;

        let uptime_seconds = self.start.elapsed().as_secs_f64();

        if self.detailed_stats {
            info!(
                heartbeat_count,
                uptime_seconds = round2(uptime_seconds),
                uptime_minutes = round2(uptime_seconds / 60.0),
                uptime_hours = round2(uptime_seconds / 3600.0),
                interval_seconds = self.interval.as_secs(),
                messages_processed_delta,
                consumer_errors_delta,
                orders_published_delta,
                publisher_errors_delta,
                messages_per_second = round2(messages_per_second),
                orders_per_second = round2(orders_per_second),
                error_rate_per_second = round2(error_rate_per_second),
                total_messages_processed = messages_processed,
                total_consumer_errors = processing_errors,
                total_orders_published = signals_published,
                total_publisher_errors = publish_errors,
                dispatcher_is_running = self.dispatcher.is_running(),
                dispatcher_backpressure_drops = dispatcher_snapshot.backpressure_drops,
                dispatcher_avg_processing_time_ms = round2(dispatcher_snapshot.avg_processing_time_ms),
                dispatcher_max_processing_time_ms = round2(dispatcher_snapshot.max_processing_time_ms),
                publisher_circuit_breaker_state = %publisher_snapshot.breaker_state,
                publisher_queue_size = publisher_snapshot.queue_depth,
                publisher_avg_publishing_time_ms = round2(publisher_snapshot.avg_latency_ms),
                publisher_max_publishing_time_ms = round2(publisher_snapshot.max_latency_ms),
                publisher_dropped_count = publisher_snapshot.dropped_count,
                "heartbeat"
            );
        } else {
            info!(
                heartbeat_count,
                uptime_seconds = round2(uptime_seconds),
                interval_seconds = self.interval.as_secs(),
                messages_processed_delta,
                consumer_errors_delta,
                orders_published_delta,
                publisher_errors_delta,
                messages_per_second = round2(messages_per_second),
                orders_per_second = round2(orders_per_second),
                error_rate_per_second = round2(error_rate_per_second),
                total_messages_processed = messages_processed,
                total_consumer_errors = processing_errors,
                total_orders_published = signals_published,
                total_publisher_errors = publish_errors,
                "heartbeat"
            );
        }

        PreviousStats {
            messages_processed,
            processing_errors,
            signals_published,
            publish_errors,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
