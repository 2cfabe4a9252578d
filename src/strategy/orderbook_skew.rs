// =============================================================================
// Order-book skew strategy
// =============================================================================
//
// Emits on bid/ask volume imbalance at the top of the book. No dedicated
// rate-limit interval in the schema — the threshold crossing itself is the
// natural throttle, matching the reference implementation's constants.
// =============================================================================

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use uuid::Uuid;

use crate::config_manager::model::ResolvedConfig;
use crate::event::MarketEvent;
use crate::signal::{ConfidenceBucket, Signal, SignalAction, SignalType};
use crate::strategy::{EventFilter, Strategy};

pub struct OrderbookSkewStrategy;

impl OrderbookSkewStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OrderbookSkewStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for OrderbookSkewStrategy {
    fn id(&self) -> &'static str {
        "orderbook_skew"
    }

    fn event_filter(&self) -> EventFilter {
        EventFilter::DepthOnly
    }

    fn on_event(&self, event: &MarketEvent, config: &ResolvedConfig) -> anyhow::Result<Vec<Signal>> {
        let MarketEvent::Depth(depth) = event else {
            return Ok(Vec::new());
        };

        let top_levels = config.get_i64("top_levels", 5).max(1) as usize;
        let buy_threshold = config.get_f64("buy_threshold", 1.2);
        let sell_threshold = config.get_f64("sell_threshold", 0.8);
        let min_spread_percent = config.get_f64("min_spread_percent", 0.1);

        let spread_percent = depth.spread_percent().to_f64().unwrap_or(0.0);
        if spread_percent < min_spread_percent {
            return Ok(Vec::new());
        }

        let bid_volume = depth.top_n_bid_volume(top_levels).to_f64().unwrap_or(0.0);
        let ask_volume = depth.top_n_ask_volume(top_levels).to_f64().unwrap_or(0.0);
        if ask_volume <= 0.0 || bid_volume <= 0.0 {
            return Ok(Vec::new());
        }

        let imbalance = bid_volume / ask_volume;
        let mid_price = depth.mid_price();
        if mid_price.is_zero() {
            return Ok(Vec::new());
        }

        let (signal_type, signal_action) = if imbalance >= buy_threshold {
            (SignalType::Buy, SignalAction::OpenLong)
        } else if imbalance <= sell_threshold {
            (SignalType::Sell, SignalAction::OpenShort)
        } else {
            return Ok(Vec::new());
        };

        let confidence_score = if (buy_threshold - 1.0).abs() > f64::EPSILON {
            ((imbalance - 1.0).abs() / (buy_threshold - 1.0)).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let mut metadata = HashMap::new();
        metadata.insert("imbalance".to_string(), serde_json::json!(imbalance));
        metadata.insert("bid_volume".to_string(), serde_json::json!(bid_volume));
        metadata.insert("ask_volume".to_string(), serde_json::json!(ask_volume));
        metadata.insert("spread_percent".to_string(), serde_json::json!(spread_percent));

        Ok(vec![Signal {
            id: Some(Uuid::new_v4()),
            symbol: depth.symbol.clone(),
            signal_type,
            signal_action,
            confidence: ConfidenceBucket::from_score(confidence_score),
            confidence_score,
            price: mid_price,
            strategy_name: "orderbook_skew".to_string(),
            metadata,
            timestamp: Utc::now(),
        }])
    }
}
