// =============================================================================
// Signal model — the output of a strategy, before adaptation to the wire format
// =============================================================================

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

/// Directional classification of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalType {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalType::Buy => "BUY",
            SignalType::Sell => "SELL",
            SignalType::Hold => "HOLD",
        };
        write!(f, "{s}")
    }
}

/// The position action a downstream trade engine should take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalAction {
    OpenLong,
    OpenShort,
    CloseLong,
    CloseShort,
    Hold,
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalAction::OpenLong => "OPEN_LONG",
            SignalAction::OpenShort => "OPEN_SHORT",
            SignalAction::CloseLong => "CLOSE_LONG",
            SignalAction::CloseShort => "CLOSE_SHORT",
            SignalAction::Hold => "HOLD",
        };
        write!(f, "{s}")
    }
}

/// Qualitative confidence bucket derived from the numeric confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfidenceBucket {
    High,
    Medium,
    Low,
}

impl ConfidenceBucket {
    /// Bucket a numeric confidence score: `>=0.8` high, `>=0.6` medium, else low.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            ConfidenceBucket::High
        } else if score >= 0.6 {
            ConfidenceBucket::Medium
        } else {
            ConfidenceBucket::Low
        }
    }
}

impl fmt::Display for ConfidenceBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfidenceBucket::High => "HIGH",
            ConfidenceBucket::Medium => "MEDIUM",
            ConfidenceBucket::Low => "LOW",
        };
        write!(f, "{s}")
    }
}

/// A signal emitted by a strategy. Immutable once created; owned by the
/// pipeline until published (by L7) or dropped.
#[derive(Debug, Clone)]
pub struct Signal {
    pub id: Option<Uuid>,
    pub symbol: String,
    pub signal_type: SignalType,
    pub signal_action: SignalAction,
    pub confidence: ConfidenceBucket,
    pub confidence_score: f64,
    pub price: Decimal,
    pub strategy_name: String,
    pub metadata: HashMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    /// `true` iff the signal satisfies the invariants every emitted signal
    /// must hold (see TESTABLE PROPERTIES): score in range, positive price,
    /// non-empty symbol.
    pub fn is_well_formed(&self) -> bool {
        (0.0..=1.0).contains(&self.confidence_score)
            && self.price > Decimal::ZERO
            && !self.symbol.is_empty()
            && !self.strategy_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_signal() -> Signal {
        Signal {
            id: None,
            symbol: "BTCUSDT".to_string(),
            signal_type: SignalType::Buy,
            signal_action: SignalAction::OpenLong,
            confidence: ConfidenceBucket::High,
            confidence_score: 0.85,
            price: dec!(50000),
            strategy_name: "orderbook_skew".to_string(),
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn confidence_bucket_boundaries() {
        assert_eq!(ConfidenceBucket::from_score(0.8), ConfidenceBucket::High);
        assert_eq!(ConfidenceBucket::from_score(0.79), ConfidenceBucket::Medium);
        assert_eq!(ConfidenceBucket::from_score(0.6), ConfidenceBucket::Medium);
        assert_eq!(ConfidenceBucket::from_score(0.59), ConfidenceBucket::Low);
    }

    #[test]
    fn well_formed_signal_passes() {
        assert!(sample_signal().is_well_formed());
    }

    #[test]
    fn zero_price_signal_is_not_well_formed() {
        let mut s = sample_signal();
        s.price = Decimal::ZERO;
        assert!(!s.is_well_formed());
    }

    #[test]
    fn out_of_range_confidence_is_not_well_formed() {
        let mut s = sample_signal();
        s.confidence_score = 1.2;
        assert!(!s.is_well_formed());
    }

    #[test]
    fn display_impls_match_wire_vocabulary() {
        assert_eq!(SignalType::Buy.to_string(), "BUY");
        assert_eq!(SignalAction::OpenLong.to_string(), "OPEN_LONG");
        assert_eq!(ConfidenceBucket::Low.to_string(), "LOW");
    }
}
