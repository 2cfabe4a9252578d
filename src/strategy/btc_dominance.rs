// =============================================================================
// Bitcoin dominance strategy
// =============================================================================
//
// Dominance is approximated from relative price momentum across BTC/ETH/BNB
// rather than true market-cap share, since this service only observes price
// tickers, not circulating supply. Normalized into the conventional 30-80%
// dominance band so the threshold parameters read naturally.
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

const ASSETS: [(&str, &str); 3] = [("BTCUSDT", "BTC"), ("ETHUSDT", "ETH"), ("BNBUSDT", "BNB")];

fn asset_for(symbol: &str) -> Option<&'static str> {
    ASSETS.iter().find(|(s, _)| *s == symbol).map(|(_, a)| *a)
}

pub struct BtcDominanceStrategy {
    history: Mutex<HashMap<&'static str, VecDeque<(DateTime<Utc>, f64)>>>,
    prev_dominance: Mutex<Option<f64>>,
    rate_limiter: RateLimiter<String>,
}

impl BtcDominanceStrategy {
    pub fn new() -> Self {
        Self {
            history: Mutex::new(HashMap::new()),
            prev_dominance: Mutex::new(None),
            rate_limiter: RateLimiter::new(),
        }
    }
}

impl Default for BtcDominanceStrategy {
    fn default() -> Self {
        Self::new()
    }
}

fn momentum(history: &HashMap<&'static str, VecDeque<(DateTime<Utc>, f64)>>, asset: &str) -> f64 {
    let Some(series) = history.get(asset) else {
        return 0.0;
    };
    if series.len() < 2 {
        return 0.0;
    }
    let oldest = series.front().unwrap().1;
    let latest = series.back().unwrap().1;
    if oldest <= 0.0 {
        0.0
    } else {
        (latest - oldest) / oldest
    }
}

impl Strategy for BtcDominanceStrategy {
    fn id(&self) -> &'static str {
        "btc_dominance"
    }

    fn event_filter(&self) -> EventFilter {
        EventFilter::TickerOnly
    }

    fn on_event(&self, event: &MarketEvent, config: &ResolvedConfig) -> anyhow::Result<Vec<Signal>> {
        let MarketEvent::Ticker(ticker) = event else {
            return Ok(Vec::new());
        };
        let Some(asset) = asset_for(&ticker.symbol) else {
            return Ok(Vec::new());
        };

        let window_hours = config.get_i64("window_hours", 24).max(1);
        let retention = ChronoDuration::hours(window_hours + 1);
        let event_time = event.event_time();
        let last_price = ticker.last_price.to_f64().unwrap_or(0.0);

        {
            let mut history = self.history.lock();
            let series = history.entry(asset).or_insert_with(VecDeque::new);
            series.push_back((event_time, last_price));
            let cutoff = event_time - retention;
            while let Some((ts, _)) = series.front() {
                if *ts < cutoff {
                    series.pop_front();
                } else {
                    break;
                }
            }
        }

        if asset != "BTC" {
            return Ok(Vec::new());
        }

        let high_threshold = config.get_f64("high_threshold", 70.0);
        let low_threshold = config.get_f64("low_threshold", 40.0);
        let change_threshold = config.get_f64("change_threshold", 5.0);
        let min_signal_interval = config.get_i64("min_signal_interval_seconds", 14400).max(0) as u64;

        let (btc_mom, eth_mom, bnb_mom) = {
            let history = self.history.lock();
            (momentum(&history, "BTC"), momentum(&history, "ETH"), momentum(&history, "BNB"))
        };

        let denom = btc_mom + eth_mom + bnb_mom;
        let dominance_fraction = if denom.abs() > f64::EPSILON { btc_mom / denom } else { 0.5 };
        let dominance = 30.0 + dominance_fraction.clamp(0.0, 1.0) * 50.0;
        let change_24h_percent = btc_mom * 100.0;

        let prev_dominance = {
            let mut prev = self.prev_dominance.lock();
            let previous = *prev;
            *prev = Some(dominance);
            previous
        };
        let trend_rising = prev_dominance.map(|p| dominance > p).unwrap_or(false);
        let trend_falling = prev_dominance.map(|p| dominance < p).unwrap_or(false);

        let decision = if dominance > high_threshold && (trend_rising || change_24h_percent > change_threshold) {
            Some((SignalType::Buy, SignalAction::OpenLong))
        } else if dominance < low_threshold && (trend_falling || change_24h_percent < -change_threshold) {
            Some((SignalType::Sell, SignalAction::OpenShort))
        } else if change_24h_percent >= change_threshold {
            Some((SignalType::Buy, SignalAction::OpenLong))
        } else if change_24h_percent <= -change_threshold {
            Some((SignalType::Sell, SignalAction::OpenShort))
        } else {
            None
        };

        let Some((signal_type, signal_action)) = decision else {
            return Ok(Vec::new());
        };

        if !self
            .rate_limiter
            .check_and_update("BTCUSDT".to_string(), Duration::from_secs(min_signal_interval))
        {
            return Ok(Vec::new());
        }

        let confidence_score = (change_24h_percent.abs() / 20.0).clamp(0.0, 1.0);
        let mut metadata = HashMap::new();
        metadata.insert("dominance_percent".to_string(), serde_json::json!(dominance));
        metadata.insert("change_24h_percent".to_string(), serde_json::json!(change_24h_percent));
        metadata.insert("btc_momentum".to_string(), serde_json::json!(btc_mom));
        metadata.insert("eth_momentum".to_string(), serde_json::json!(eth_mom));
        metadata.insert("bnb_momentum".to_string(), serde_json::json!(bnb_mom));

        Ok(vec![Signal {
            id: Some(Uuid::new_v4()),
            symbol: "BTCUSDT".to_string(),
            signal_type,
            signal_action,
            confidence: ConfidenceBucket::from_score(confidence_score),
            confidence_score,
            price: ticker.last_price,
            strategy_name: "btc_dominance".to_string(),
            metadata,
            timestamp: Utc::now(),
        }])
    }
}
