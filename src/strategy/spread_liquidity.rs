// =============================================================================
// Spread/liquidity strategy
// =============================================================================
//
// Watches the rolling baseline of spread and top-of-book depth per symbol; a
// book that widens and thins quickly signals departing liquidity, which this
// strategy treats defensively rather than as a momentum opportunity. Direction
// follows which side was heavier before the liquidity pulled back, mirroring
// the imbalance read in orderbook_skew.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use uuid::Uuid;

use crate::config_manager::model::ResolvedConfig;
use crate::event::MarketEvent;
use crate::signal::{ConfidenceBucket, Signal, SignalAction, SignalType};
use crate::strategy::rate_limiter::RateLimiter;
use crate::strategy::{EventFilter, Strategy};

#[derive(Debug, Clone, Copy)]
struct Sample {
    timestamp: DateTime<Utc>,
    spread_percent: f64,
    bid_volume: f64,
    ask_volume: f64,
}

pub struct SpreadLiquidityStrategy {
    windows: Mutex<HashMap<String, VecDeque<Sample>>>,
    rate_limiter: RateLimiter<String>,
}

impl SpreadLiquidityStrategy {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            rate_limiter: RateLimiter::new(),
        }
    }
}

impl Default for SpreadLiquidityStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for SpreadLiquidityStrategy {
    fn id(&self) -> &'static str {
        "spread_liquidity"
    }

    fn event_filter(&self) -> EventFilter {
        EventFilter::DepthOnly
    }

    fn on_event(&self, event: &MarketEvent, config: &ResolvedConfig) -> anyhow::Result<Vec<Signal>> {
        let MarketEvent::Depth(depth) = event else {
            return Ok(Vec::new());
        };

        let top_levels = config.get_i64("top_levels", 5).max(1) as usize;
        let window_seconds = config.get_i64("window_seconds", 30).max(1);
        let spread_widen_threshold = config.get_f64("spread_widen_threshold_percent", 20.0);
        let depth_drop_threshold = config.get_f64("depth_drop_threshold_percent", 30.0);
        let min_signal_interval = config.get_i64("min_signal_interval_seconds", 60).max(0) as u64;

        let mid_price = depth.mid_price();
        if mid_price.is_zero() {
            return Ok(Vec::new());
        }

        let sample = Sample {
            timestamp: event.event_time(),
            spread_percent: depth.spread_percent().to_f64().unwrap_or(0.0),
            bid_volume: depth.top_n_bid_volume(top_levels).to_f64().unwrap_or(0.0),
            ask_volume: depth.top_n_ask_volume(top_levels).to_f64().unwrap_or(0.0),
        };

        let (baseline, current) = {
            let mut windows = self.windows.lock();
            let window = windows.entry(depth.symbol.clone()).or_insert_with(VecDeque::new);
            window.push_back(sample);
            let cutoff = sample.timestamp - ChronoDuration::seconds(window_seconds);
            while let Some(front) = window.front() {
                if front.timestamp < cutoff && window.len() > 1 {
                    window.pop_front();
                } else {
                    break;
                }
            }
            if window.len() < 2 {
                return Ok(Vec::new());
            }
            (*window.front().unwrap(), *window.back().unwrap())
        };

        let baseline_depth = baseline.bid_volume + baseline.ask_volume;
        let current_depth = current.bid_volume + current.ask_volume;
        if baseline.spread_percent <= 0.0 || baseline_depth <= 0.0 {
            return Ok(Vec::new());
        }

        let spread_widen_percent = (current.spread_percent - baseline.spread_percent) / baseline.spread_percent * 100.0;
        let depth_drop_percent = (baseline_depth - current_depth) / baseline_depth * 100.0;

        if spread_widen_percent < spread_widen_threshold || depth_drop_percent < depth_drop_threshold {
            return Ok(Vec::new());
        }

        let (signal_type, signal_action) = if baseline.bid_volume >= baseline.ask_volume {
            (SignalType::Sell, SignalAction::OpenShort)
        } else {
            (SignalType::Buy, SignalAction::OpenLong)
        };

        if !self
            .rate_limiter
            .check_and_update(depth.symbol.clone(), Duration::from_secs(min_signal_interval))
        {
            return Ok(Vec::new());
        }

        let spread_component = (spread_widen_percent / spread_widen_threshold.max(1.0)).min(1.0);
        let depth_component = (depth_drop_percent / depth_drop_threshold.max(1.0)).min(1.0);
        let confidence_score = ((spread_component + depth_component) / 2.0).clamp(0.0, 1.0);

        let mut metadata = HashMap::new();
        metadata.insert("spread_widen_percent".to_string(), serde_json::json!(spread_widen_percent));
        metadata.insert("depth_drop_percent".to_string(), serde_json::json!(depth_drop_percent));
        metadata.insert("baseline_spread_percent".to_string(), serde_json::json!(baseline.spread_percent));
        metadata.insert("current_spread_percent".to_string(), serde_json::json!(current.spread_percent));
        metadata.insert("baseline_depth".to_string(), serde_json::json!(baseline_depth));
        metadata.insert("current_depth".to_string(), serde_json::json!(current_depth));

        Ok(vec![Signal {
            id: Some(Uuid::new_v4()),
            symbol: depth.symbol.clone(),
            signal_type,
            signal_action,
            confidence: ConfidenceBucket::from_score(confidence_score),
            confidence_score,
            price: mid_price,
            strategy_name: "spread_liquidity".to_string(),
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
    use rust_decimal_macros::dec;

    fn config() -> ResolvedConfig {
        ResolvedConfig {
            parameters: HashMap::from([
                ("top_levels".to_string(), P::Int(5)),
                ("window_seconds".to_string(), P::Int(30)),
                ("spread_widen_threshold_percent".to_string(), P::Float(20.0)),
                ("depth_drop_threshold_percent".to_string(), P::Float(30.0)),
                ("min_signal_interval_seconds".to_string(), P::Int(0)),
            ]),
            version: 1,
            source: ConfigSource::Default,
            is_override: false,
            cache_hit: false,
        }
    }

    fn depth_at(
        bid_price: rust_decimal::Decimal,
        ask_price: rust_decimal::Decimal,
        bid_qty: rust_decimal::Decimal,
        ask_qty: rust_decimal::Decimal,
        offset_ms: i64,
    ) -> MarketEvent {
        MarketEvent::Depth(crate::event::DepthUpdate {
            symbol: "BTCUSDT".to_string(),
            event_time_ms: offset_ms,
            first_update_id: 1,
            final_update_id: 2,
            bids: vec![DepthLevel {
                price: bid_price,
                quantity: bid_qty,
            }],
            asks: vec![DepthLevel {
                price: ask_price,
                quantity: ask_qty,
            }],
        })
    }

    #[test]
    fn single_sample_yields_no_signal() {
        let strategy = SpreadLiquidityStrategy::new();
        let signals = strategy
            .on_event(&depth_at(dec!(49995), dec!(50005), dec!(10), dec!(10), 0), &config())
            .unwrap();
        assert!(signals.is_empty());
    }

    #[test]
    fn widening_spread_and_thinning_bid_depth_emits_sell() {
        let strategy = SpreadLiquidityStrategy::new();
        let config = config();
        strategy
            .on_event(&depth_at(dec!(49995), dec!(50005), dec!(20), dec!(5), 0), &config)
            .unwrap();
        let signals = strategy
            .on_event(&depth_at(dec!(49900), dec!(50100), dec!(2), dec!(1), 1_000), &config)
            .unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type, SignalType::Sell);
    }

    #[test]
    fn stable_book_emits_nothing() {
        let strategy = SpreadLiquidityStrategy::new();
        let config = config();
        strategy
            .on_event(&depth_at(dec!(49995), dec!(50005), dec!(10), dec!(10), 0), &config)
            .unwrap();
        let signals = strategy
            .on_event(&depth_at(dec!(49995), dec!(50005), dec!(10), dec!(10), 1_000), &config)
            .unwrap();
        assert!(signals.is_empty());
    }
}
