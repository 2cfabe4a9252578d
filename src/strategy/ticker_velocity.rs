// =============================================================================
// Ticker velocity strategy
// =============================================================================

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use uuid::Uuid;

use crate::config_manager::model::ResolvedConfig;
use crate::event::MarketEvent;
use crate::signal::{ConfidenceBucket, Signal, SignalAction, SignalType};
use crate::strategy::{EventFilter, Strategy};

pub struct TickerVelocityStrategy {
    samples: Mutex<HashMap<String, VecDeque<(DateTime<Utc>, f64)>>>,
}

impl TickerVelocityStrategy {
    pub fn new() -> Self {
        Self {
            samples: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for TickerVelocityStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for TickerVelocityStrategy {
    fn id(&self) -> &'static str {
        "ticker_velocity"
    }

    fn event_filter(&self) -> EventFilter {
        EventFilter::TickerOnly
    }

    fn on_event(&self, event: &MarketEvent, config: &ResolvedConfig) -> anyhow::Result<Vec<Signal>> {
        let MarketEvent::Ticker(ticker) = event else {
            return Ok(Vec::new());
        };

        let window_seconds = config.get_i64("time_window_seconds", 60).max(1);
        let buy_threshold = config.get_f64("buy_threshold", 0.5);
        let sell_threshold = config.get_f64("sell_threshold", -0.5);
        let min_price_change = config.get_f64("min_price_change", 0.1);

        let last_price = ticker.last_price.to_f64().unwrap_or(0.0);
        let event_time = event.event_time();

        let mut samples = self.samples.lock();
        let window = samples.entry(ticker.symbol.clone()).or_insert_with(VecDeque::new);
        window.push_back((event_time, last_price));
        let cutoff = event_time - ChronoDuration::seconds(window_seconds);
        while let Some((ts, _)) = window.front() {
            if *ts < cutoff {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() < 2 {
            return Ok(Vec::new());
        }

        let oldest = window.front().unwrap().1;
        let latest = window.back().unwrap().1;
        if oldest <= 0.0 {
            return Ok(Vec::new());
        }

        let velocity = (latest - oldest) / oldest * 100.0;
        if velocity.abs() < min_price_change {
            return Ok(Vec::new());
        }

        let (signal_type, signal_action) = if velocity >= buy_threshold {
            (SignalType::Buy, SignalAction::OpenLong)
        } else if velocity <= sell_threshold {
            (SignalType::Sell, SignalAction::OpenShort)
        } else {
            return Ok(Vec::new());
        };

        let confidence_score = (velocity.abs() / 10.0).clamp(0.0, 1.0);
        let mut metadata = HashMap::new();
        metadata.insert("velocity_percent".to_string(), serde_json::json!(velocity));
        metadata.insert("window_seconds".to_string(), serde_json::json!(window_seconds));

        Ok(vec![Signal {
            id: Some(Uuid::new_v4()),
            symbol: ticker.symbol.clone(),
            signal_type,
            signal_action,
            confidence: ConfidenceBucket::from_score(confidence_score),
            confidence_score,
            price: ticker.last_price,
            strategy_name: "ticker_velocity".to_string(),
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
    use crate::event::TickerData;
    use rust_decimal_macros::dec;

    fn config() -> ResolvedConfig {
        ResolvedConfig {
            parameters: HashMap::from([
                ("time_window_seconds".to_string(), P::Int(60)),
                ("buy_threshold".to_string(), P::Float(0.5)),
                ("sell_threshold".to_string(), P::Float(-0.5)),
                ("min_price_change".to_string(), P::Float(0.1)),
            ]),
            version: 1,
            source: ConfigSource::Default,
            is_override: false,
            cache_hit: false,
        }
    }

    fn ticker_at(last_price: rust_decimal::Decimal, event_time_ms: i64) -> MarketEvent {
        MarketEvent::Ticker(TickerData {
            symbol: "BTCUSDT".to_string(),
            event_time_ms,
            price_change: dec!(0),
            price_change_percent: dec!(0),
            weighted_avg_price: dec!(0),
            prev_close_price: dec!(0),
            last_price,
            last_qty: dec!(0),
            bid_price: dec!(0),
            bid_qty: dec!(0),
            ask_price: dec!(0),
            ask_qty: dec!(0),
            open_price: dec!(0),
            high_price: dec!(0),
            low_price: dec!(0),
            volume: dec!(0),
            quote_volume: dec!(0),
            open_time_ms: 0,
            close_time_ms: 0,
            first_trade_id: 0,
            last_trade_id: 0,
            trade_count: 0,
        })
    }

    #[test]
    fn rising_price_within_window_emits_buy() {
        let strategy = TickerVelocityStrategy::new();
        let config = config();
        strategy.on_event(&ticker_at(dec!(100), 0), &config).unwrap();
        let signals = strategy
            .on_event(&ticker_at(dec!(102), 10_000), &config)
            .unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type, SignalType::Buy);
    }

    #[test]
    fn tiny_move_below_min_change_is_skipped() {
        let strategy = TickerVelocityStrategy::new();
        let config = config();
        strategy.on_event(&ticker_at(dec!(100.00), 0), &config).unwrap();
        let signals = strategy
            .on_event(&ticker_at(dec!(100.01), 1_000), &config)
            .unwrap();
        assert!(signals.is_empty());
    }

    #[test]
    fn single_sample_yields_no_signal() {
        let strategy = TickerVelocityStrategy::new();
        let config = config();
        let signals = strategy.on_event(&ticker_at(dec!(100), 0), &config).unwrap();
        assert!(signals.is_empty());
    }
}
