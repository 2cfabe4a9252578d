// =============================================================================
// Signal adapter (L6) — internal Signal → downstream trade-engine wire format
// =============================================================================
//
// Pure mapping, no I/O: every field on `WireSignal` is derived from the
// incoming `Signal` plus a handful of fixed lookup tables. Applying the
// adapter twice to the same signal produces the same output, since it never
// consults mutable state.
// =============================================================================

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::signal::{ConfidenceBucket, Signal, SignalAction, SignalType};

const SOURCE: &str = "realtime-strategies";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strength {
    Extreme,
    Strong,
    Medium,
    Weak,
}

impl Strength {
    fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            Strength::Extreme
        } else if score >= 0.7 {
            Strength::Strong
        } else if score >= 0.5 {
            Strength::Medium
        } else {
            Strength::Weak
        }
    }
}

impl std::fmt::Display for Strength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Strength::Extreme => "extreme",
            Strength::Strong => "strong",
            Strength::Medium => "medium",
            Strength::Weak => "weak",
        };
        write!(f, "{s}")
    }
}

fn action_for(signal_action: SignalAction) -> &'static str {
    match signal_action {
        SignalAction::OpenLong => "buy",
        SignalAction::OpenShort => "sell",
        SignalAction::CloseLong | SignalAction::CloseShort => "close",
        SignalAction::Hold => "hold",
    }
}

/// Position size keyed on price magnitude: the higher the unit price, the
/// smaller the notional-equivalent quantity quoted back to the trade engine.
fn quantity_for_price(price: f64) -> f64 {
    if price >= 10_000.0 {
        0.01
    } else if price >= 1_000.0 {
        0.1
    } else if price >= 100.0 {
        1.0
    } else if price >= 10.0 {
        10.0
    } else {
        100.0
    }
}

fn risk_bands(confidence: ConfidenceBucket) -> (f64, f64) {
    match confidence {
        ConfidenceBucket::High => (0.02, 0.05),
        ConfidenceBucket::Medium => (0.03, 0.04),
        ConfidenceBucket::Low => (0.05, 0.03),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WireSignal {
    pub id: Uuid,
    pub signal_id: Uuid,
    pub symbol: String,
    pub action: String,
    pub signal_type: String,
    pub confidence: f64,
    pub strength: String,
    pub price: f64,
    pub current_price: f64,
    pub source: String,
    pub strategy: String,
    pub strategy_id: String,
    pub timeframe: String,
    pub order_type: String,
    pub time_in_force: String,
    pub quantity: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub timestamp: String,
    pub metadata: HashMap<String, Value>,
}

/// Adapt one internal signal into the wire dictionary the downstream trade
/// engine expects. Pure and deterministic.
pub fn adapt(signal: &Signal) -> WireSignal {
    let price = signal.price.to_f64().unwrap_or(0.0);
    let timeframe = signal
        .metadata
        .get("timeframe")
        .and_then(Value::as_str)
        .unwrap_or("tick")
        .to_string();

    let (stop_loss_pct, take_profit_pct) = risk_bands(signal.confidence);

    let mut metadata = signal.metadata.clone();
    metadata.insert(
        "original_signal_type".to_string(),
        Value::String(signal.signal_type.to_string()),
    );
    metadata.insert(
        "original_signal_action".to_string(),
        Value::String(signal.signal_action.to_string()),
    );
    metadata.insert(
        "original_confidence".to_string(),
        serde_json::json!(signal.confidence_score),
    );

    WireSignal {
        id: Uuid::new_v4(),
        signal_id: signal.id.unwrap_or_else(Uuid::new_v4),
        symbol: signal.symbol.clone(),
        action: action_for(signal.signal_action).to_string(),
        signal_type: signal.signal_type.to_string().to_lowercase(),
        confidence: signal.confidence_score,
        strength: Strength::from_score(signal.confidence_score).to_string(),
        price,
        current_price: price,
        source: SOURCE.to_string(),
        strategy: signal.strategy_name.clone(),
        strategy_id: format!("{}_{}", signal.strategy_name, signal.symbol),
        timeframe,
        order_type: "market".to_string(),
        time_in_force: "GTC".to_string(),
        quantity: quantity_for_price(price),
        stop_loss_pct,
        take_profit_pct,
        timestamp: signal.timestamp.to_rfc3339(),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_signal() -> Signal {
        Signal {
            id: Some(Uuid::nil()),
            symbol: "BTCUSDT".to_string(),
            signal_type: SignalType::Buy,
            signal_action: SignalAction::OpenLong,
            confidence: ConfidenceBucket::High,
            confidence_score: 0.92,
            price: dec!(50000),
            strategy_name: "orderbook_skew".to_string(),
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn open_long_maps_to_buy_and_extreme_strength() {
        let wire = adapt(&base_signal());
        assert_eq!(wire.action, "buy");
        assert_eq!(wire.strength, "extreme");
        assert_eq!(wire.signal_type, "buy");
        assert_eq!(wire.strategy_id, "orderbook_skew_BTCUSDT");
        assert_eq!(wire.stop_loss_pct, 0.02);
        assert_eq!(wire.take_profit_pct, 0.05);
    }

    #[test]
    fn close_actions_collapse_to_close() {
        let mut signal = base_signal();
        signal.signal_action = SignalAction::CloseLong;
        assert_eq!(adapt(&signal).action, "close");
        signal.signal_action = SignalAction::CloseShort;
        assert_eq!(adapt(&signal).action, "close");
    }

    #[test]
    fn quantity_scales_inversely_with_price_magnitude() {
        let mut signal = base_signal();
        signal.price = dec!(50000);
        assert_eq!(adapt(&signal).quantity, 0.01);
        signal.price = dec!(50);
        assert_eq!(adapt(&signal).quantity, 10.0);
    }

    #[test]
    fn metadata_carries_original_fields_without_dropping_existing_keys() {
        let mut signal = base_signal();
        signal.metadata.insert("imbalance".to_string(), serde_json::json!(1.4));
        let wire = adapt(&signal);
        assert_eq!(wire.metadata.get("imbalance"), Some(&serde_json::json!(1.4)));
        assert_eq!(
            wire.metadata.get("original_signal_action"),
            Some(&serde_json::json!("OPEN_LONG"))
        );
    }

    #[test]
    fn missing_timeframe_metadata_defaults_to_tick() {
        let wire = adapt(&base_signal());
        assert_eq!(wire.timeframe, "tick");
    }

    #[test]
    fn applying_adapter_twice_is_idempotent_on_derived_fields() {
        let signal = base_signal();
        let first = adapt(&signal);
        let second = adapt(&signal);
        assert_eq!(first.action, second.action);
        assert_eq!(first.quantity, second.quantity);
        assert_eq!(first.stop_loss_pct, second.stop_loss_pct);
    }
}
