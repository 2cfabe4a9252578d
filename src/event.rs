// =============================================================================
// Market event model — closed sum type over Depth / Trade / Ticker
// =============================================================================
//
// Replaces duck-typed attribute access on a decoded exchange payload with a
// closed enum: decoders produce a concrete variant and strategies match on
// it. Prices and quantities are parsed straight from their wire-format
// decimal strings into `rust_decimal::Decimal` — they never pass through a
// binary float on the way in.
// =============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::PipelineError;

/// Minimum accepted symbol length (see DATA MODEL invariants).
const MIN_SYMBOL_LEN: usize = 6;

/// A single order-book level: price and quantity, both non-negative.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// A snapshot/delta order-book update for one symbol.
///
/// `bids` are ordered descending by price, `asks` ascending — this is
/// enforced at decode, not re-checked by consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthUpdate {
    pub symbol: String,
    pub event_time_ms: i64,
    pub first_update_id: u64,
    pub final_update_id: u64,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

impl DepthUpdate {
    /// Mid-price: `(best_bid + best_ask) / 2`, or zero if either side is empty.
    pub fn mid_price(&self) -> Decimal {
        match (self.bids.first(), self.asks.first()) {
            (Some(bid), Some(ask)) => (bid.price + ask.price) / Decimal::TWO,
            _ => Decimal::ZERO,
        }
    }

    /// Spread as a percentage of the best bid, or zero if either side is empty.
    pub fn spread_percent(&self) -> Decimal {
        match (self.bids.first(), self.asks.first()) {
            (Some(bid), Some(ask)) if bid.price > Decimal::ZERO => {
                (ask.price - bid.price) / bid.price * Decimal::ONE_HUNDRED
            }
            _ => Decimal::ZERO,
        }
    }

    /// Sum of quantity across the top `n` levels of one side.
    pub fn top_n_bid_volume(&self, n: usize) -> Decimal {
        self.bids.iter().take(n).map(|l| l.quantity).sum()
    }

    pub fn top_n_ask_volume(&self, n: usize) -> Decimal {
        self.asks.iter().take(n).map(|l| l.quantity).sum()
    }
}

/// A single executed trade print.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeData {
    pub symbol: String,
    pub trade_id: u64,
    pub price: Decimal,
    pub quantity: Decimal,
    pub buyer_order_id: u64,
    pub seller_order_id: u64,
    pub trade_time_ms: i64,
    pub event_time_ms: i64,
    /// True iff the buyer is the resting (maker) order.
    pub is_buyer_maker: bool,
}

impl TradeData {
    pub fn notional_value(&self) -> Decimal {
        self.price * self.quantity
    }
}

/// A 24-hour rolling ticker snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerData {
    pub symbol: String,
    pub event_time_ms: i64,
    pub price_change: Decimal,
    pub price_change_percent: Decimal,
    pub weighted_avg_price: Decimal,
    pub prev_close_price: Decimal,
    pub last_price: Decimal,
    pub last_qty: Decimal,
    pub bid_price: Decimal,
    pub bid_qty: Decimal,
    pub ask_price: Decimal,
    pub ask_qty: Decimal,
    pub open_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub volume: Decimal,
    pub quote_volume: Decimal,
    pub open_time_ms: i64,
    pub close_time_ms: i64,
    pub first_trade_id: i64,
    pub last_trade_id: i64,
    pub trade_count: i64,
}

/// A decoded, typed market event.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Depth(DepthUpdate),
    Trade(TradeData),
    Ticker(TickerData),
}

impl MarketEvent {
    pub fn symbol(&self) -> &str {
        match self {
            MarketEvent::Depth(d) => &d.symbol,
            MarketEvent::Trade(t) => &t.symbol,
            MarketEvent::Ticker(t) => &t.symbol,
        }
    }

    pub fn event_time_ms(&self) -> i64 {
        match self {
            MarketEvent::Depth(d) => d.event_time_ms,
            MarketEvent::Trade(t) => t.event_time_ms,
            MarketEvent::Ticker(t) => t.event_time_ms,
        }
    }

    pub fn event_time(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.event_time_ms()).unwrap_or_else(Utc::now)
    }
}

fn validate_symbol(raw: &str) -> Result<String, PipelineError> {
    let symbol = raw.to_uppercase();
    if symbol.len() < MIN_SYMBOL_LEN {
        return Err(PipelineError::Decode(format!(
            "symbol '{symbol}' shorter than minimum length {MIN_SYMBOL_LEN}"
        )));
    }
    Ok(symbol)
}

fn req_str<'a>(data: &'a Value, field: &str) -> Result<&'a str, PipelineError> {
    data.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| PipelineError::Decode(format!("missing field '{field}'")))
}

fn req_i64(data: &Value, field: &str) -> Result<i64, PipelineError> {
    data.get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| PipelineError::Decode(format!("missing field '{field}'")))
}

fn req_u64(data: &Value, field: &str) -> Result<u64, PipelineError> {
    data.get(field)
        .and_then(Value::as_u64)
        .ok_or_else(|| PipelineError::Decode(format!("missing field '{field}'")))
}

fn req_bool(data: &Value, field: &str) -> Result<bool, PipelineError> {
    data.get(field)
        .and_then(Value::as_bool)
        .ok_or_else(|| PipelineError::Decode(format!("missing field '{field}'")))
}

fn parse_decimal(raw: &str, field: &str) -> Result<Decimal, PipelineError> {
    let value: Decimal = raw
        .parse()
        .map_err(|_| PipelineError::Decode(format!("field '{field}' is not a valid decimal: {raw}")))?;
    if value.is_sign_negative() {
        return Err(PipelineError::Decode(format!(
            "field '{field}' must not be negative: {raw}"
        )));
    }
    Ok(value)
}

fn req_decimal(data: &Value, field: &str) -> Result<Decimal, PipelineError> {
    parse_decimal(req_str(data, field)?, field)
}

fn parse_levels(data: &Value, field: &str) -> Result<Vec<DepthLevel>, PipelineError> {
    let raw = data
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| PipelineError::Decode(format!("missing field '{field}'")))?;

    raw.iter()
        .map(|level| {
            let pair = level
                .as_array()
                .ok_or_else(|| PipelineError::Decode(format!("level in '{field}' is not an array")))?;
            let price_str = pair
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| PipelineError::Decode(format!("level in '{field}' missing price")))?;
            let qty_str = pair
                .get(1)
                .and_then(Value::as_str)
                .ok_or_else(|| PipelineError::Decode(format!("level in '{field}' missing quantity")))?;
            Ok(DepthLevel {
                price: parse_decimal(price_str, field)?,
                quantity: parse_decimal(qty_str, field)?,
            })
        })
        .collect()
}

fn decode_depth(symbol: String, data: &Value) -> Result<DepthUpdate, PipelineError> {
    let bids = parse_levels(data, "b")?;
    let asks = parse_levels(data, "a")?;

    if bids.windows(2).any(|w| w[0].price < w[1].price) {
        return Err(PipelineError::Decode("bid levels not descending".to_string()));
    }
    if asks.windows(2).any(|w| w[0].price > w[1].price) {
        return Err(PipelineError::Decode("ask levels not ascending".to_string()));
    }

    Ok(DepthUpdate {
        symbol,
        event_time_ms: req_i64(data, "E")?,
        first_update_id: req_u64(data, "U")?,
        final_update_id: req_u64(data, "u")?,
        bids,
        asks,
    })
}

fn decode_trade(symbol: String, data: &Value) -> Result<TradeData, PipelineError> {
    Ok(TradeData {
        symbol,
        trade_id: req_u64(data, "t")?,
        price: req_decimal(data, "p")?,
        quantity: req_decimal(data, "q")?,
        buyer_order_id: req_u64(data, "b")?,
        seller_order_id: req_u64(data, "a")?,
        trade_time_ms: req_i64(data, "T")?,
        event_time_ms: req_i64(data, "E")?,
        is_buyer_maker: req_bool(data, "m")?,
    })
}

fn decode_ticker(symbol: String, data: &Value) -> Result<TickerData, PipelineError> {
    Ok(TickerData {
        symbol,
        event_time_ms: req_i64(data, "E")?,
        price_change: req_decimal(data, "p")?,
        price_change_percent: req_decimal(data, "P")?,
        weighted_avg_price: req_decimal(data, "w")?,
        prev_close_price: req_decimal(data, "x")?,
        last_price: req_decimal(data, "c")?,
        last_qty: req_decimal(data, "Q")?,
        bid_price: req_decimal(data, "b")?,
        bid_qty: req_decimal(data, "B")?,
        ask_price: req_decimal(data, "a")?,
        ask_qty: req_decimal(data, "A")?,
        open_price: req_decimal(data, "o")?,
        high_price: req_decimal(data, "h")?,
        low_price: req_decimal(data, "l")?,
        volume: req_decimal(data, "v")?,
        quote_volume: req_decimal(data, "q")?,
        open_time_ms: req_i64(data, "O")?,
        close_time_ms: req_i64(data, "C")?,
        first_trade_id: req_i64(data, "F")?,
        last_trade_id: req_i64(data, "L")?,
        trade_count: req_i64(data, "n")?,
    })
}

/// Decode a raw bus payload of shape `{"stream": "<symbol>@<type>", "data": {...}}`
/// into a typed [`MarketEvent`].
///
/// Unknown stream-type suffixes and malformed payloads are decode errors —
/// the caller (the dispatcher) drops the message and bumps an error counter;
/// there is no retry.
pub fn decode_message(raw: &[u8]) -> Result<MarketEvent, PipelineError> {
    let root: Value = serde_json::from_slice(raw)
        .map_err(|e| PipelineError::Decode(format!("invalid JSON: {e}")))?;

    let stream = root
        .get("stream")
        .and_then(Value::as_str)
        .ok_or_else(|| PipelineError::Decode("missing field 'stream'".to_string()))?;

    let (symbol_raw, stream_type) = stream
        .split_once('@')
        .ok_or_else(|| PipelineError::Decode(format!("stream '{stream}' missing '@' separator")))?;

    let symbol = validate_symbol(symbol_raw)?;

    let data = root
        .get("data")
        .ok_or_else(|| PipelineError::Decode("missing field 'data'".to_string()))?;

    if stream_type.starts_with("depth") {
        decode_depth(symbol, data).map(MarketEvent::Depth)
    } else if stream_type == "trade" {
        decode_trade(symbol, data).map(MarketEvent::Trade)
    } else if stream_type == "ticker" {
        decode_ticker(symbol, data).map(MarketEvent::Ticker)
    } else {
        Err(PipelineError::Decode(format!(
            "unknown stream type '{stream_type}'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn depth_payload() -> serde_json::Value {
        serde_json::json!({
            "stream": "BTCUSDT@depth20@100ms",
            "data": {
                "E": 1700000000000i64,
                "U": 100,
                "u": 105,
                "b": [["50000.00", "1.5"], ["49999.00", "2.0"]],
                "a": [["50001.00", "1.0"], ["50002.00", "0.5"]],
            }
        })
    }

    #[test]
    fn decodes_depth_update() {
        let payload = depth_payload();
        let raw = serde_json::to_vec(&payload).unwrap();
        let event = decode_message(&raw).unwrap();
        match event {
            MarketEvent::Depth(d) => {
                assert_eq!(d.symbol, "BTCUSDT");
                assert_eq!(d.bids[0].price, dec!(50000.00));
                assert_eq!(d.asks[0].price, dec!(50001.00));
                assert_eq!(d.mid_price(), dec!(50000.50));
            }
            _ => panic!("expected Depth variant"),
        }
    }

    #[test]
    fn rejects_short_symbol() {
        let mut payload = depth_payload();
        payload["stream"] = serde_json::json!("BTC@depth20@100ms");
        let raw = serde_json::to_vec(&payload).unwrap();
        assert!(decode_message(&raw).is_err());
    }

    #[test]
    fn rejects_unknown_stream_type() {
        let mut payload = depth_payload();
        payload["stream"] = serde_json::json!("BTCUSDT@klines_1m");
        let raw = serde_json::to_vec(&payload).unwrap();
        assert!(decode_message(&raw).is_err());
    }

    #[test]
    fn empty_book_sides_yield_zero_mid_and_spread() {
        let d = DepthUpdate {
            symbol: "BTCUSDT".to_string(),
            event_time_ms: 0,
            first_update_id: 1,
            final_update_id: 2,
            bids: vec![],
            asks: vec![DepthLevel {
                price: dec!(100),
                quantity: dec!(1),
            }],
        };
        assert_eq!(d.mid_price(), Decimal::ZERO);
        assert_eq!(d.spread_percent(), Decimal::ZERO);
    }

    #[test]
    fn decodes_trade() {
        let payload = serde_json::json!({
            "stream": "ETHUSDT@trade",
            "data": {
                "t": 12345,
                "p": "3000.50",
                "q": "0.25",
                "b": 1,
                "a": 2,
                "T": 1700000000000i64,
                "E": 1700000000001i64,
                "m": true,
            }
        });
        let raw = serde_json::to_vec(&payload).unwrap();
        let event = decode_message(&raw).unwrap();
        match event {
            MarketEvent::Trade(t) => {
                assert_eq!(t.symbol, "ETHUSDT");
                assert!(t.is_buyer_maker);
                assert_eq!(t.notional_value(), dec!(750.125));
            }
            _ => panic!("expected Trade variant"),
        }
    }

    #[test]
    fn decode_then_reencode_roundtrips_depth() {
        let raw = serde_json::to_vec(&depth_payload()).unwrap();
        let event = decode_message(&raw).unwrap();
        let MarketEvent::Depth(d) = event else {
            panic!("expected Depth");
        };
        assert_eq!(d.bids.len(), 2);
        assert_eq!(d.asks.len(), 2);
        assert_eq!(d.first_update_id, 100);
        assert_eq!(d.final_update_id, 105);
    }
}
