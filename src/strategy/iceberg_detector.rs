// =============================================================================
// Iceberg detector strategy
// =============================================================================
//
// Thin wrapper around the L1 order-book tracker: feeds depth updates in,
// reads back qualifying patterns, and turns the strongest one into a signal.
// The tracker is shared (constructed once in main.rs) since other depth
// consumers may want the same history without double-counting updates.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config_manager::model::ResolvedConfig;
use crate::event::MarketEvent;
use crate::orderbook::{IcebergParams, OrderBookTracker, Side};
use crate::signal::{ConfidenceBucket, Signal, SignalAction, SignalType};
use crate::strategy::rate_limiter::RateLimiter;
use crate::strategy::{EventFilter, Strategy};

pub struct IcebergDetectorStrategy {
    tracker: Arc<OrderBookTracker>,
    rate_limiter: RateLimiter<(String, String, String)>,
}

impl IcebergDetectorStrategy {
    pub fn new(tracker: Arc<OrderBookTracker>) -> Self {
        Self {
            tracker,
            rate_limiter: RateLimiter::new(),
        }
    }
}

impl Strategy for IcebergDetectorStrategy {
    fn id(&self) -> &'static str {
        "iceberg_detector"
    }

    fn event_filter(&self) -> EventFilter {
        EventFilter::DepthOnly
    }

    fn on_event(&self, event: &MarketEvent, config: &ResolvedConfig) -> anyhow::Result<Vec<Signal>> {
        let MarketEvent::Depth(depth) = event else {
            return Ok(Vec::new());
        };

        let event_time = event.event_time();
        self.tracker.update(&depth.symbol, &depth.bids, &depth.asks, event_time);

        let mid_price = depth.mid_price();
        if mid_price.is_zero() {
            return Ok(Vec::new());
        }

        let level_proximity_pct = config.get_f64("level_proximity_pct", 1.0);
        let params = IcebergParams {
            min_refill_count: config.get_i64("min_refill_count", 2).max(0) as u32,
            refill_speed_threshold_seconds: config.get_f64("refill_speed_threshold_seconds", 5.0),
            consistency_threshold: config.get_f64("consistency_threshold", 0.1),
            persistence_threshold_seconds: config.get_f64("persistence_threshold_seconds", 120.0),
        };

        let mut patterns = self.tracker.detect_icebergs(&depth.symbol, mid_price, level_proximity_pct, params);
        if patterns.is_empty() {
            return Ok(Vec::new());
        }
        patterns.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        let strongest = &patterns[0];

        let base_confidence = config.get_f64("base_confidence", 0.70);
        let min_signal_interval = config.get_i64("min_signal_interval_seconds", 120).max(0) as u64;

        let rate_key = (depth.symbol.clone(), strongest.price.round_dp(2).to_string(), strongest.side.to_string());
        if !self
            .rate_limiter
            .check_and_update(rate_key, Duration::from_secs(min_signal_interval))
        {
            return Ok(Vec::new());
        }

        let (signal_type, signal_action) = match strongest.side {
            Side::Bid => (SignalType::Buy, SignalAction::OpenLong),
            Side::Ask => (SignalType::Sell, SignalAction::OpenShort),
        };

        let confidence_score = (base_confidence * strongest.confidence.max(0.5)).clamp(0.0, 1.0);

        let current_price = mid_price.to_f64().unwrap_or(0.0);
        let distance_to_level_pct = strongest
            .price
            .to_f64()
            .zip(Some(current_price))
            .filter(|(_, cur)| *cur > 0.0)
            .map(|(level, cur)| ((level - cur) / cur * 100.0).abs())
            .unwrap_or(0.0);
        let atr_proxy = (distance_to_level_pct / 100.0 * current_price).max(current_price * 0.005);
        let (stop_loss, take_profit) = match strongest.side {
            Side::Bid => (current_price - 2.5 * atr_proxy, current_price + 2.5 * atr_proxy),
            Side::Ask => (current_price + 2.5 * atr_proxy, current_price - 2.5 * atr_proxy),
        };

        let mut metadata = HashMap::new();
        metadata.insert("pattern_type".to_string(), serde_json::json!(strongest.pattern_tag.to_string()));
        metadata.insert(
            "reasoning".to_string(),
            serde_json::json!(format!(
                "{} iceberg detected on {} side at {}",
                strongest.pattern_tag, strongest.side, strongest.price
            )),
        );
        metadata.insert("distance_to_level_pct".to_string(), serde_json::json!(distance_to_level_pct));
        metadata.insert("iceberg_price".to_string(), serde_json::json!(strongest.price.to_f64().unwrap_or(0.0)));
        metadata.insert("iceberg_side".to_string(), serde_json::json!(strongest.side.to_string()));
        metadata.insert("refill_count".to_string(), serde_json::json!(strongest.refill_count));
        metadata.insert("avg_refill_speed".to_string(), serde_json::json!(strongest.mean_refill_latency_seconds));
        metadata.insert("volume_consistency".to_string(), serde_json::json!(strongest.volume_consistency_score));
        metadata.insert("persistence_seconds".to_string(), serde_json::json!(strongest.persistence_seconds));
        metadata.insert("current_price".to_string(), serde_json::json!(current_price));
        metadata.insert("stop_loss".to_string(), serde_json::json!(stop_loss));
        metadata.insert("take_profit".to_string(), serde_json::json!(take_profit));

        Ok(vec![Signal {
            id: Some(Uuid::new_v4()),
            symbol: depth.symbol.clone(),
            signal_type,
            signal_action,
            confidence: ConfidenceBucket::from_score(confidence_score),
            confidence_score,
            price: Decimal::try_from(current_price).unwrap_or(mid_price),
            strategy_name: "iceberg_detector".to_string(),
            metadata,
            timestamp: Utc::now(),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_manager::model::ConfigSource;
    use crate::config_manager::schema::ParameterValue as P;
    use crate::event::DepthLevel;
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;

    fn config() -> ResolvedConfig {
        ResolvedConfig {
            parameters: HashMap::from([
                ("level_proximity_pct".to_string(), P::Float(1.0)),
                ("min_refill_count".to_string(), P::Int(2)),
                ("refill_speed_threshold_seconds".to_string(), P::Float(5.0)),
                ("consistency_threshold".to_string(), P::Float(0.1)),
                ("persistence_threshold_seconds".to_string(), P::Float(120.0)),
                ("base_confidence".to_string(), P::Float(0.70)),
                ("min_signal_interval_seconds".to_string(), P::Int(0)),
            ]),
            version: 1,
            source: ConfigSource::Default,
            is_override: false,
            cache_hit: false,
        }
    }

    fn depth_at(price: Decimal, qty: Decimal, offset_secs: i64) -> MarketEvent {
        let base = chrono::DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let ts = base + ChronoDuration::seconds(offset_secs);
        MarketEvent::Depth(crate::event::DepthUpdate {
            symbol: "BTCUSDT".to_string(),
            event_time_ms: ts.timestamp_millis(),
            first_update_id: 1,
            final_update_id: 2,
            bids: vec![DepthLevel { price, quantity: qty }],
            asks: vec![DepthLevel {
                price: price + dec!(10),
                quantity: dec!(5),
            }],
        })
    }

    #[test]
    fn quiet_book_emits_nothing() {
        let strategy = IcebergDetectorStrategy::new(Arc::new(OrderBookTracker::new(300, 100, 200)));
        let signals = strategy.on_event(&depth_at(dec!(50000), dec!(5.0), 0), &config()).unwrap();
        assert!(signals.is_empty());
    }

    #[test]
    fn repeated_refills_emit_a_buy_signal() {
        let strategy = IcebergDetectorStrategy::new(Arc::new(OrderBookTracker::new(300, 100, 200)));
        let config = config();
        let quantities = [
            dec!(10.0),
            dec!(1.0),
            dec!(9.0),
            dec!(1.0),
            dec!(9.5),
            dec!(0.5),
            dec!(9.2),
        ];
        let mut last = Vec::new();
        for (i, qty) in quantities.into_iter().enumerate() {
            last = strategy.on_event(&depth_at(dec!(50000), qty, i as i64), &config).unwrap();
        }
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].signal_type, SignalType::Buy);
        assert_eq!(last[0].strategy_name, "iceberg_detector");
        assert!(last[0].metadata.contains_key("refill_count"));
    }

    #[test]
    fn two_refill_pattern_at_two_second_spacing_tags_as_refill() {
        let strategy = IcebergDetectorStrategy::new(Arc::new(OrderBookTracker::new(300, 100, 200)));
        let config = config();
        let quantities = [dec!(2.0), dec!(0.2), dec!(2.0), dec!(0.2), dec!(2.0)];
        let mut last = Vec::new();
        for (i, qty) in quantities.into_iter().enumerate() {
            last = strategy.on_event(&depth_at(dec!(50000), qty, i as i64 * 2), &config).unwrap();
        }
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].signal_type, SignalType::Buy);
        assert_eq!(last[0].signal_action, SignalAction::OpenLong);
        assert_eq!(last[0].strategy_name, "iceberg_detector");
        assert_eq!(last[0].metadata.get("pattern_type"), Some(&serde_json::json!("refill")));
        assert_eq!(last[0].metadata.get("iceberg_price"), Some(&serde_json::json!(50000.0)));
        assert_eq!(last[0].metadata.get("iceberg_side"), Some(&serde_json::json!("bid")));
    }
}
