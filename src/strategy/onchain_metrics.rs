// =============================================================================
// On-chain metrics strategy
// =============================================================================
//
// Real Glassnode/Messari/CoinMetrics access needs API keys this service
// doesn't have, so metric snapshots are synthesized from a small
// deterministic generator seeded by the event clock instead of a live feed.
// The growth/flow analysis and thresholds below are the real strategy; only
// the data source is a stand-in.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::config_manager::model::ResolvedConfig;
use crate::event::MarketEvent;
use crate::signal::{ConfidenceBucket, Signal, SignalAction, SignalType};
use crate::strategy::rate_limiter::RateLimiter;
use crate::strategy::{EventFilter, Strategy};

const FETCH_INTERVAL: ChronoDuration = ChronoDuration::hours(1);
const MAX_HISTORY: usize = 7 * 24;
const MIN_HISTORY_FOR_GROWTH: usize = 24;

#[derive(Debug, Clone, Copy)]
struct Metrics {
    active_addresses: f64,
    transaction_volume: f64,
    /// Hash rate for BTC, DeFi TVL for ETH — third network-health figure.
    tertiary: f64,
    exchange_inflow: f64,
    exchange_outflow: f64,
}

/// Small xorshift64 step, deterministic given `seed`. Stands in for the
/// random jitter the reference data sources would carry.
fn next(seed: &mut u64) -> f64 {
    *seed ^= *seed << 13;
    *seed ^= *seed >> 7;
    *seed ^= *seed << 17;
    (*seed >> 11) as f64 / (1u64 << 53) as f64
}

fn jitter(seed: &mut u64, base: f64, spread: f64) -> f64 {
    base + (next(seed) * 2.0 - 1.0) * spread
}

fn simulate_btc_metrics(seed: u64) -> Metrics {
    let mut s = seed;
    Metrics {
        active_addresses: jitter(&mut s, 1_000_000.0, 50_000.0),
        transaction_volume: jitter(&mut s, 500_000.0, 100_000.0),
        tertiary: jitter(&mut s, 200.0, 20.0),
        exchange_inflow: jitter(&mut s, 3000.0, 2000.0).max(0.0),
        exchange_outflow: jitter(&mut s, 3000.0, 2000.0).max(0.0),
    }
}

fn simulate_eth_metrics(seed: u64) -> Metrics {
    let mut s = seed ^ 0x9E3779B97F4A7C15;
    Metrics {
        active_addresses: jitter(&mut s, 800_000.0, 40_000.0),
        transaction_volume: jitter(&mut s, 300_000.0, 50_000.0),
        tertiary: jitter(&mut s, 75_000_000_000.0, 25_000_000_000.0),
        exchange_inflow: jitter(&mut s, 125_000.0, 75_000.0).max(0.0),
        exchange_outflow: jitter(&mut s, 125_000.0, 75_000.0).max(0.0),
    }
}

fn percent_change(old: f64, new: f64) -> f64 {
    if old == 0.0 {
        0.0
    } else {
        (new - old) / old * 100.0
    }
}

fn asset_key(symbol: &str) -> Option<&'static str> {
    if symbol.starts_with("BTC") {
        Some("BTC")
    } else if symbol.starts_with("ETH") {
        Some("ETH")
    } else {
        None
    }
}

struct AssetState {
    history: VecDeque<(DateTime<Utc>, Metrics)>,
    last_fetch: Option<DateTime<Utc>>,
}

impl AssetState {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            last_fetch: None,
        }
    }
}

struct GrowthMetrics {
    active_addresses_growth: f64,
    transaction_volume_growth: f64,
    tertiary_growth: f64,
    net_exchange_flow: f64,
}

pub struct OnchainMetricsStrategy {
    state: Mutex<HashMap<&'static str, AssetState>>,
    rate_limiter: RateLimiter<String>,
}

impl OnchainMetricsStrategy {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HashMap::new()),
            rate_limiter: RateLimiter::new(),
        }
    }
}

impl Default for OnchainMetricsStrategy {
    fn default() -> Self {
        Self::new()
    }
}

fn growth_metrics(history: &VecDeque<(DateTime<Utc>, Metrics)>) -> Option<GrowthMetrics> {
    if history.len() < MIN_HISTORY_FOR_GROWTH {
        return None;
    }
    let current = history.back()?.1;
    let day_ago = history[history.len() - MIN_HISTORY_FOR_GROWTH].1;

    Some(GrowthMetrics {
        active_addresses_growth: percent_change(day_ago.active_addresses, current.active_addresses),
        transaction_volume_growth: percent_change(day_ago.transaction_volume, current.transaction_volume),
        tertiary_growth: percent_change(day_ago.tertiary, current.tertiary),
        net_exchange_flow: current.exchange_inflow - current.exchange_outflow,
    })
}

impl Strategy for OnchainMetricsStrategy {
    fn id(&self) -> &'static str {
        "onchain_metrics"
    }

    fn event_filter(&self) -> EventFilter {
        EventFilter::Any
    }

    fn on_event(&self, event: &MarketEvent, config: &ResolvedConfig) -> anyhow::Result<Vec<Signal>> {
        let (symbol, price) = match event {
            MarketEvent::Ticker(t) => (t.symbol.clone(), t.last_price),
            MarketEvent::Trade(t) => (t.symbol.clone(), t.price),
            MarketEvent::Depth(_) => return Ok(Vec::new()),
        };
        let Some(asset) = asset_key(&symbol) else {
            return Ok(Vec::new());
        };

        let event_time = event.event_time();
        let growth = {
            let mut state = self.state.lock();
            let asset_state = state.entry(asset).or_insert_with(AssetState::new);

            let needs_fetch = match asset_state.last_fetch {
                None => true,
                Some(last) => event_time - last >= FETCH_INTERVAL,
            };
            if needs_fetch {
                let seed = event_time.timestamp_millis().max(1) as u64;
                let metrics = if asset == "BTC" {
                    simulate_btc_metrics(seed)
                } else {
                    simulate_eth_metrics(seed)
                };
                asset_state.history.push_back((event_time, metrics));
                while asset_state.history.len() > MAX_HISTORY {
                    asset_state.history.pop_front();
                }
                asset_state.last_fetch = Some(event_time);
            }

            growth_metrics(&asset_state.history)
        };

        let Some(growth) = growth else {
            return Ok(Vec::new());
        };

        let network_growth_threshold = config.get_f64("network_growth_threshold", 10.0);
        let volume_threshold = config.get_f64("volume_threshold", 15.0);
        let min_signal_interval = config.get_i64("min_signal_interval_seconds", 86_400).max(0) as u64;

        let decision = if growth.active_addresses_growth > network_growth_threshold
            && growth.transaction_volume_growth > volume_threshold
        {
            if asset == "BTC" && growth.tertiary_growth > 0.0 {
                let confidence_score =
                    ((growth.active_addresses_growth + growth.transaction_volume_growth) / 30.0).min(0.8);
                Some((
                    SignalType::Buy,
                    SignalAction::OpenLong,
                    confidence_score,
                    "network_growth",
                    format!(
                        "strong BTC network fundamentals: {:.1}% address growth",
                        growth.active_addresses_growth
                    ),
                ))
            } else if asset == "ETH" && growth.tertiary_growth > 5.0 {
                let confidence_score =
                    ((growth.active_addresses_growth + growth.transaction_volume_growth) / 35.0).min(0.75);
                Some((
                    SignalType::Buy,
                    SignalAction::OpenLong,
                    confidence_score,
                    "ecosystem_growth",
                    format!("strong ETH ecosystem growth: {:.1}% DeFi TVL growth", growth.tertiary_growth),
                ))
            } else {
                None
            }
        } else if growth.net_exchange_flow > 0.0 && growth.net_exchange_flow.abs() > 1000.0 {
            let confidence_score = (growth.net_exchange_flow.abs() / 5000.0).min(0.7);
            Some((
                SignalType::Sell,
                SignalAction::OpenShort,
                confidence_score,
                "exchange_inflow_pressure",
                format!("large {asset} exchange inflows indicate selling pressure"),
            ))
        } else {
            None
        };

        let Some((signal_type, signal_action, confidence_score, reason_tag, reasoning)) = decision else {
            return Ok(Vec::new());
        };

        let rate_key = format!("{asset}_onchain");
        if !self
            .rate_limiter
            .check_and_update(rate_key, Duration::from_secs(min_signal_interval))
        {
            return Ok(Vec::new());
        }

        let mut metadata = HashMap::new();
        metadata.insert(
            "active_addresses_growth_24h".to_string(),
            serde_json::json!(growth.active_addresses_growth),
        );
        metadata.insert(
            "transaction_volume_growth_24h".to_string(),
            serde_json::json!(growth.transaction_volume_growth),
        );
        metadata.insert("net_exchange_flow".to_string(), serde_json::json!(growth.net_exchange_flow));
        metadata.insert("signal_type".to_string(), serde_json::json!(reason_tag));
        metadata.insert("asset".to_string(), serde_json::json!(asset));
        metadata.insert("reasoning".to_string(), serde_json::json!(reasoning));

        Ok(vec![Signal {
            id: Some(Uuid::new_v4()),
            symbol,
            signal_type,
            signal_action,
            confidence: ConfidenceBucket::from_score(confidence_score),
            confidence_score,
            price,
            strategy_name: "onchain_metrics".to_string(),
            metadata,
            timestamp: Utc::now(),
        }])
    }
}
