// =============================================================================
// Order-book tracker (L1)
// =============================================================================
//
// Maintains, per symbol and per side, a bounded ring of (timestamp, quantity)
// samples for every observed price level, and detects iceberg patterns within
// a price's history. See SPEC_FULL.md §4.1.
// =============================================================================

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::event::DepthLevel;

/// Below this fraction of a bucket's observed peak quantity, the level is
/// considered depleted; at or above the refill fraction it counts as
/// refilled again. Not exposed as strategy parameters: they describe the
/// shape of the detector itself, not a strategy's risk appetite.
const DEPLETION_FRACTION: f64 = 0.3;
const REFILL_FRACTION: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Bid,
    Ask,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Bid => write!(f, "bid"),
            Side::Ask => write!(f, "ask"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternTag {
    Refill,
    Consistent,
    Persistent,
}

impl std::fmt::Display for PatternTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternTag::Refill => write!(f, "refill"),
            PatternTag::Consistent => write!(f, "consistent"),
            PatternTag::Persistent => write!(f, "persistent"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IcebergPattern {
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub refill_count: u32,
    pub mean_refill_latency_seconds: f64,
    pub volume_consistency_score: f64,
    pub persistence_seconds: f64,
    pub pattern_tag: PatternTag,
    pub confidence: f64,
}

/// Thresholds for a single detection pass. Sourced from the calling
/// strategy's resolved config snapshot, not stored on the tracker, since
/// they can change at runtime per symbol.
#[derive(Debug, Clone, Copy)]
pub struct IcebergParams {
    pub min_refill_count: u32,
    pub refill_speed_threshold_seconds: f64,
    pub consistency_threshold: f64,
    pub persistence_threshold_seconds: f64,
}

struct PriceBucket {
    samples: VecDeque<(DateTime<Utc>, Decimal)>,
    last_touch: DateTime<Utc>,
}

impl PriceBucket {
    fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            samples: VecDeque::new(),
            last_touch: timestamp,
        }
    }

    fn push(&mut self, timestamp: DateTime<Utc>, quantity: Decimal, window: ChronoDuration) {
        self.samples.push_back((timestamp, quantity));
        self.last_touch = timestamp;
        let cutoff = timestamp - window;
        while let Some((ts, _)) = self.samples.front() {
            if *ts < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}

struct SymbolBook {
    bids: HashMap<Decimal, PriceBucket>,
    asks: HashMap<Decimal, PriceBucket>,
    last_touch: DateTime<Utc>,
}

impl SymbolBook {
    fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            bids: HashMap::new(),
            asks: HashMap::new(),
            last_touch: timestamp,
        }
    }

    fn side_map(&mut self, side: Side) -> &mut HashMap<Decimal, PriceBucket> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    fn bucket_count(&self) -> usize {
        self.bids.len() + self.asks.len()
    }

    /// Evict the bucket (across both sides) with the oldest last touch.
    fn evict_oldest_bucket(&mut self) {
        let oldest_bid = self.bids.iter().min_by_key(|(_, b)| b.last_touch).map(|(p, b)| (*p, b.last_touch));
        let oldest_ask = self.asks.iter().min_by_key(|(_, b)| b.last_touch).map(|(p, b)| (*p, b.last_touch));

        match (oldest_bid, oldest_ask) {
            (Some((bid_price, bid_touch)), Some((ask_price, ask_touch))) => {
                if bid_touch <= ask_touch {
                    self.bids.remove(&bid_price);
                } else {
                    self.asks.remove(&ask_price);
                }
            }
            (Some((bid_price, _)), None) => {
                self.bids.remove(&bid_price);
            }
            (None, Some((ask_price, _))) => {
                self.asks.remove(&ask_price);
            }
            (None, None) => {}
        }
    }
}

pub struct OrderBookTracker {
    history_window: ChronoDuration,
    max_symbols: usize,
    max_buckets_per_symbol: usize,
    books: RwLock<HashMap<String, SymbolBook>>,
}

impl OrderBookTracker {
    pub fn new(history_window_seconds: u64, max_symbols: usize, max_buckets_per_symbol: usize) -> Self {
        Self {
            history_window: ChronoDuration::seconds(history_window_seconds as i64),
            max_symbols,
            max_buckets_per_symbol,
            books: RwLock::new(HashMap::new()),
        }
    }

    /// Apply a depth snapshot/delta: append samples for every level on both
    /// sides, trim samples older than the history window, and evict under
    /// the configured symbol/bucket limits.
    pub fn update(&self, symbol: &str, bids: &[DepthLevel], asks: &[DepthLevel], timestamp: DateTime<Utc>) {
        let mut books = self.books.write();

        if !books.contains_key(symbol) && books.len() >= self.max_symbols {
            if let Some(oldest) = books.iter().min_by_key(|(_, b)| b.last_touch).map(|(s, _)| s.clone()) {
                debug!(evicted_symbol = %oldest, "order-book tracker evicting LRU symbol");
                books.remove(&oldest);
            }
        }

        let book = books
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolBook::new(timestamp));
        book.last_touch = timestamp;

        for level in bids {
            book.bids
                .entry(level.price)
                .or_insert_with(|| PriceBucket::new(timestamp))
                .push(timestamp, level.quantity, self.history_window);
        }
        for level in asks {
            book.asks
                .entry(level.price)
                .or_insert_with(|| PriceBucket::new(timestamp))
                .push(timestamp, level.quantity, self.history_window);
        }

        while book.bucket_count() > self.max_buckets_per_symbol {
            book.evict_oldest_bucket();
        }
    }

    /// Detect iceberg patterns on buckets within `proximity_pct` of
    /// `reference_price`. Returns one entry per qualifying bucket.
    pub fn detect_icebergs(
        &self,
        symbol: &str,
        reference_price: Decimal,
        proximity_pct: f64,
        params: IcebergParams,
    ) -> Vec<IcebergPattern> {
        let books = self.books.read();
        let Some(book) = books.get(symbol) else {
            return Vec::new();
        };

        let proximity = reference_price * Decimal::try_from(proximity_pct / 100.0).unwrap_or(Decimal::ZERO);
        let mut patterns = Vec::new();

        for (side, buckets) in [(Side::Bid, &book.bids), (Side::Ask, &book.asks)] {
            for (price, bucket) in buckets {
                if (*price - reference_price).abs() > proximity {
                    continue;
                }
                if let Some(pattern) = evaluate_bucket(symbol, side, *price, bucket, params) {
                    patterns.push(pattern);
                }
            }
        }

        patterns
    }

    pub fn tracked_symbol_count(&self) -> usize {
        self.books.read().len()
    }
}

fn evaluate_bucket(
    symbol: &str,
    side: Side,
    price: Decimal,
    bucket: &PriceBucket,
    params: IcebergParams,
) -> Option<IcebergPattern> {
    if bucket.samples.is_empty() {
        return None;
    }

    let peak = bucket
        .samples
        .iter()
        .map(|(_, q)| *q)
        .fold(Decimal::ZERO, Decimal::max);
    if peak.is_zero() {
        return None;
    }

    let depletion_level = peak * Decimal::try_from(DEPLETION_FRACTION).unwrap();
    let refill_level = peak * Decimal::try_from(REFILL_FRACTION).unwrap();

    let mut refill_count = 0u32;
    let mut refill_latencies = Vec::new();
    let mut depleted_at: Option<DateTime<Utc>> = None;

    for (ts, qty) in &bucket.samples {
        if depleted_at.is_none() && *qty <= depletion_level {
            depleted_at = Some(*ts);
        } else if let Some(since) = depleted_at {
            if *qty >= refill_level {
                refill_count += 1;
                refill_latencies.push((*ts - since).num_milliseconds() as f64 / 1000.0);
                depleted_at = None;
            }
        }
    }
    let mean_refill_latency_seconds = if refill_latencies.is_empty() {
        f64::INFINITY
    } else {
        refill_latencies.iter().sum::<f64>() / refill_latencies.len() as f64
    };

    let non_zero: Vec<f64> = bucket
        .samples
        .iter()
        .filter(|(_, q)| !q.is_zero())
        .filter_map(|(_, q)| q.to_f64())
        .collect();
    let volume_consistency_score = if non_zero.len() < 3 {
        0.0
    } else {
        let mean = non_zero.iter().sum::<f64>() / non_zero.len() as f64;
        let variance = non_zero.iter().map(|q| (q - mean).powi(2)).sum::<f64>() / non_zero.len() as f64;
        let stdev = variance.sqrt();
        let ratio = if mean > 0.0 { (stdev / mean).clamp(0.0, 1.0) } else { 1.0 };
        1.0 - ratio
    };

    let persistence_seconds = bucket
        .samples
        .iter()
        .filter(|(_, q)| !q.is_zero())
        .map(|(ts, _)| *ts)
        .fold(None, |range: Option<(DateTime<Utc>, DateTime<Utc>)>, ts| match range {
            None => Some((ts, ts)),
            Some((first, last)) => Some((first.min(ts), last.max(ts))),
        })
        .map(|(first, last)| (last - first).num_milliseconds() as f64 / 1000.0)
        .unwrap_or(0.0);

    let refill_qualifies =
        refill_count >= params.min_refill_count && mean_refill_latency_seconds <= params.refill_speed_threshold_seconds;
    let consistent_qualifies = volume_consistency_score >= params.consistency_threshold && non_zero.len() >= 3;
    let persistent_qualifies = persistence_seconds >= params.persistence_threshold_seconds;

    let tag = if refill_qualifies {
        PatternTag::Refill
    } else if consistent_qualifies {
        PatternTag::Consistent
    } else if persistent_qualifies {
        PatternTag::Persistent
    } else {
        return None;
    };

    let refill_score = if params.min_refill_count > 0 {
        (refill_count as f64 / params.min_refill_count as f64).min(1.0)
    } else {
        0.0
    };
    let persistence_score = if params.persistence_threshold_seconds > 0.0 {
        (persistence_seconds / params.persistence_threshold_seconds).min(1.0)
    } else {
        0.0
    };
    let confidence = refill_score.max(volume_consistency_score).max(persistence_score);

    Some(IcebergPattern {
        symbol: symbol.to_string(),
        side,
        price,
        refill_count,
        mean_refill_latency_seconds: if mean_refill_latency_seconds.is_finite() {
            mean_refill_latency_seconds
        } else {
            0.0
        },
        volume_consistency_score,
        persistence_seconds,
        pattern_tag: tag,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn level(price: Decimal, qty: Decimal) -> DepthLevel {
        DepthLevel { price, quantity: qty }
    }

    #[test]
    fn empty_book_detects_nothing() {
        let tracker = OrderBookTracker::new(300, 100, 200);
        let patterns = tracker.detect_icebergs(
            "BTCUSDT",
            dec!(50000),
            1.0,
            IcebergParams {
                min_refill_count: 3,
                refill_speed_threshold_seconds: 5.0,
                consistency_threshold: 0.1,
                persistence_threshold_seconds: 120.0,
            },
        );
        assert!(patterns.is_empty());
    }

    #[test]
    fn repeated_refills_tag_as_refill_pattern() {
        let tracker = OrderBookTracker::new(300, 100, 200);
        let base = Utc::now();
        let price = dec!(50000.00);

        let samples = [
            (dec!(10.0), 0),
            (dec!(1.0), 1),
            (dec!(9.0), 2),
            (dec!(1.0), 3),
            (dec!(9.5), 4),
            (dec!(0.5), 5),
            (dec!(9.2), 6),
        ];
        for (qty, offset) in samples {
            let ts = base + ChronoDuration::seconds(offset);
            tracker.update("BTCUSDT", &[level(price, qty)], &[], ts);
        }

        let patterns = tracker.detect_icebergs(
            "BTCUSDT",
            price,
            1.0,
            IcebergParams {
                min_refill_count: 3,
                refill_speed_threshold_seconds: 5.0,
                consistency_threshold: 0.1,
                persistence_threshold_seconds: 120.0,
            },
        );

        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].pattern_tag, PatternTag::Refill);
        assert!(patterns[0].refill_count >= 3);
        assert_eq!(patterns[0].side, Side::Bid);
    }

    #[test]
    fn out_of_proximity_bucket_is_excluded() {
        let tracker = OrderBookTracker::new(300, 100, 200);
        let base = Utc::now();
        tracker.update("BTCUSDT", &[level(dec!(40000), dec!(5.0))], &[], base);

        let patterns = tracker.detect_icebergs(
            "BTCUSDT",
            dec!(50000),
            1.0,
            IcebergParams {
                min_refill_count: 1,
                refill_speed_threshold_seconds: 5.0,
                consistency_threshold: 0.0,
                persistence_threshold_seconds: 0.0,
            },
        );
        assert!(patterns.is_empty());
    }

    #[test]
    fn symbol_eviction_respects_max_symbols() {
        let tracker = OrderBookTracker::new(300, 1, 200);
        let base = Utc::now();
        tracker.update("BTCUSDT", &[level(dec!(50000), dec!(1.0))], &[], base);
        tracker.update(
            "ETHUSDT",
            &[level(dec!(3000), dec!(1.0))],
            &[],
            base + ChronoDuration::seconds(1),
        );
        assert_eq!(tracker.tracked_symbol_count(), 1);
    }

    #[test]
    fn persistent_level_with_low_refill_and_consistency_tags_persistent() {
        let tracker = OrderBookTracker::new(300, 100, 200);
        let base = Utc::now();
        let price = dec!(50000.00);
        for offset in 0..5 {
            tracker.update(
                "BTCUSDT",
                &[level(price, dec!(9.0) + Decimal::from(offset))],
                &[],
                base + ChronoDuration::seconds(offset * 40),
            );
        }

        let patterns = tracker.detect_icebergs(
            "BTCUSDT",
            price,
            1.0,
            IcebergParams {
                min_refill_count: 10,
                refill_speed_threshold_seconds: 1.0,
                consistency_threshold: 0.99,
                persistence_threshold_seconds: 100.0,
            },
        );

        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].pattern_tag, PatternTag::Persistent);
    }
}
