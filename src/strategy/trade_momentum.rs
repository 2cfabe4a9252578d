// =============================================================================
// Trade momentum strategy
// =============================================================================

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use uuid::Uuid;

use crate::config_manager::model::ResolvedConfig;
use crate::event::{MarketEvent, TradeData};
use crate::signal::{ConfidenceBucket, Signal, SignalAction, SignalType};
use crate::strategy::{EventFilter, Strategy};

const DEFAULT_WINDOW: usize = 50;

pub struct TradeMomentumStrategy {
    windows: Mutex<HashMap<String, VecDeque<TradeData>>>,
}

impl TradeMomentumStrategy {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for TradeMomentumStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for TradeMomentumStrategy {
    fn id(&self) -> &'static str {
        "trade_momentum"
    }

    fn event_filter(&self) -> EventFilter {
        EventFilter::TradeOnly
    }

    fn on_event(&self, event: &MarketEvent, config: &ResolvedConfig) -> anyhow::Result<Vec<Signal>> {
        let MarketEvent::Trade(trade) = event else {
            return Ok(Vec::new());
        };

        let min_quantity = config.get_f64("min_quantity", 0.001);
        let quantity = trade.quantity.to_f64().unwrap_or(0.0);
        if quantity < min_quantity {
            return Ok(Vec::new());
        }

        let window_size = config.get_i64("window_size", DEFAULT_WINDOW as i64).max(2) as usize;
        let mut windows = self.windows.lock();
        let window = windows.entry(trade.symbol.clone()).or_insert_with(VecDeque::new);
        window.push_back(trade.clone());
        while window.len() > window_size {
            window.pop_front();
        }
        if window.len() < 2 {
            return Ok(Vec::new());
        }

        let price_weight = config.get_f64("price_weight", 0.4);
        let quantity_weight = config.get_f64("quantity_weight", 0.3);
        let maker_weight = config.get_f64("maker_weight", 0.3);
        let buy_threshold = config.get_f64("buy_threshold", 0.7);
        let sell_threshold = config.get_f64("sell_threshold", -0.7);

        let first_price = window.front().unwrap().price.to_f64().unwrap_or(0.0);
        let last_price = window.back().unwrap().price.to_f64().unwrap_or(0.0);
        let normalized_price_change = if first_price > 0.0 {
            ((last_price - first_price) / first_price).clamp(-1.0, 1.0)
        } else {
            0.0
        };

        let total_buy_qty: f64 = window
            .iter()
            .filter(|t| !t.is_buyer_maker)
            .filter_map(|t| t.quantity.to_f64())
            .sum();
        let total_sell_qty: f64 = window
            .iter()
            .filter(|t| t.is_buyer_maker)
            .filter_map(|t| t.quantity.to_f64())
            .sum();
        let total_qty = total_buy_qty + total_sell_qty;
        let signed_quantity_share = if total_qty > 0.0 {
            (total_buy_qty - total_sell_qty) / total_qty
        } else {
            0.0
        };

        let maker_trades = window.iter().filter(|t| t.is_buyer_maker).count();
        let taker_trades = window.len() - maker_trades;
        let signed_maker_flow = if !window.is_empty() {
            (taker_trades as f64 - maker_trades as f64) / window.len() as f64
        } else {
            0.0
        };

        let score = price_weight * normalized_price_change
            + quantity_weight * signed_quantity_share
            + maker_weight * signed_maker_flow;

        let (signal_type, signal_action) = if score >= buy_threshold {
            (SignalType::Buy, SignalAction::OpenLong)
        } else if score <= sell_threshold {
            (SignalType::Sell, SignalAction::OpenShort)
        } else {
            return Ok(Vec::new());
        };

        let confidence_score = score.abs().clamp(0.0, 1.0);
        let mut metadata = HashMap::new();
        metadata.insert("score".to_string(), serde_json::json!(score));
        metadata.insert(
            "normalized_price_change".to_string(),
            serde_json::json!(normalized_price_change),
        );
        metadata.insert(
            "signed_quantity_share".to_string(),
            serde_json::json!(signed_quantity_share),
        );
        metadata.insert("signed_maker_flow".to_string(), serde_json::json!(signed_maker_flow));

        Ok(vec![Signal {
            id: Some(Uuid::new_v4()),
            symbol: trade.symbol.clone(),
            signal_type,
            signal_action,
            confidence: ConfidenceBucket::from_score(confidence_score),
            confidence_score,
            price: trade.price,
            strategy_name: "trade_momentum".to_string(),
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
    use rust_decimal_macros::dec;

    fn config() -> ResolvedConfig {
        ResolvedConfig {
            parameters: HashMap::from([
                ("window_size".to_string(), P::Int(10)),
                ("price_weight".to_string(), P::Float(0.4)),
                ("quantity_weight".to_string(), P::Float(0.3)),
                ("maker_weight".to_string(), P::Float(0.3)),
                ("buy_threshold".to_string(), P::Float(0.3)),
                ("sell_threshold".to_string(), P::Float(-0.3)),
                ("min_quantity".to_string(), P::Float(0.001)),
            ]),
            version: 1,
            source: ConfigSource::Default,
            is_override: false,
            cache_hit: false,
        }
    }

    fn trade(price: rust_decimal::Decimal, qty: rust_decimal::Decimal, buyer_maker: bool, id: u64) -> MarketEvent {
        MarketEvent::Trade(TradeData {
            symbol: "BTCUSDT".to_string(),
            trade_id: id,
            price,
            quantity: qty,
            buyer_order_id: 1,
            seller_order_id: 2,
            trade_time_ms: 0,
            event_time_ms: 0,
            is_buyer_maker: buyer_maker,
        })
    }

    #[test]
    fn rising_price_with_taker_buys_emits_buy() {
        let strategy = TradeMomentumStrategy::new();
        let config = config();
        for (i, (price, maker)) in [
            (dec!(100), false),
            (dec!(101), false),
            (dec!(103), false),
            (dec!(105), false),
        ]
        .into_iter()
        .enumerate()
        {
            let event = trade(price, dec!(1.0), maker, i as u64);
            let signals = strategy.on_event(&event, &config).unwrap();
            if i == 3 {
                assert_eq!(signals.len(), 1);
                assert_eq!(signals[0].signal_type, SignalType::Buy);
            }
        }
    }

    #[test]
    fn below_min_quantity_is_skipped() {
        let strategy = TradeMomentumStrategy::new();
        let config = config();
        let event = trade(dec!(100), dec!(0.0001), false, 1);
        let signals = strategy.on_event(&event, &config).unwrap();
        assert!(signals.is_empty());
    }

    #[test]
    fn single_trade_is_insufficient_for_a_signal() {
        let strategy = TradeMomentumStrategy::new();
        let config = config();
        let event = trade(dec!(100), dec!(10.0), false, 1);
        let signals = strategy.on_event(&event, &config).unwrap();
        assert!(signals.is_empty());
    }
}
