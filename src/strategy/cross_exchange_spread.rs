// =============================================================================
// Cross-exchange spread strategy
// =============================================================================
//
// Binance prices arrive on the primary stream; other venues are polled by a
// background refresh loop (spawned by main.rs, see `run_price_refresh_loop`)
// that writes into a shared cache this strategy only reads from. Keeping the
// HTTP collaborator out of `on_event` lets the strategy stay synchronous like
// every other one, instead of making the whole trait async for one venue.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use tracing::warn;
use uuid::Uuid;

use crate::config_manager::model::ResolvedConfig;
use crate::event::MarketEvent;
use crate::signal::{ConfidenceBucket, Signal, SignalAction, SignalType};
use crate::strategy::rate_limiter::RateLimiter;
use crate::strategy::{EventFilter, Strategy};

const PRICE_MAX_AGE: Duration = Duration::from_secs(60);
const BINANCE: &str = "binance";

/// Keyed by `(venue, symbol)`; shared between this strategy and the
/// background refresh loop.
pub type ExchangePriceCache = Arc<RwLock<HashMap<(String, String), (f64, Instant)>>>;

pub fn new_price_cache() -> ExchangePriceCache {
    Arc::new(RwLock::new(HashMap::new()))
}

/// Poll non-Binance venues for BTCUSDT at `interval` until `cache` is
/// dropped or the task is aborted. Errors are logged and retried on the next
/// tick; a dead venue never blocks the others.
pub async fn run_price_refresh_loop(client: reqwest::Client, cache: ExchangePriceCache, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if let Ok(price) = fetch_coinbase_btc_price(&client).await {
            cache
                .write()
                .insert(("coinbase".to_string(), "BTCUSDT".to_string()), (price, Instant::now()));
        } else {
            warn!("failed to refresh coinbase BTCUSDT price");
        }
        if let Ok(price) = fetch_kraken_btc_price(&client).await {
            cache
                .write()
                .insert(("kraken".to_string(), "BTCUSDT".to_string()), (price, Instant::now()));
        } else {
            warn!("failed to refresh kraken BTCUSDT price");
        }
    }
}

async fn fetch_coinbase_btc_price(client: &reqwest::Client) -> anyhow::Result<f64> {
    let body: serde_json::Value = client
        .get("https://api.coinbase.com/v2/exchange-rates?currency=BTC")
        .timeout(Duration::from_secs(5))
        .send()
        .await?
        .json()
        .await?;
    body["data"]["rates"]["USD"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|p| *p > 0.0)
        .ok_or_else(|| anyhow::anyhow!("coinbase response missing USD rate"))
}

async fn fetch_kraken_btc_price(client: &reqwest::Client) -> anyhow::Result<f64> {
    let body: serde_json::Value = client
        .get("https://api.kraken.com/0/public/Ticker?pair=XBTUSD")
        .timeout(Duration::from_secs(5))
        .send()
        .await?
        .json()
        .await?;
    body["result"]["XXBTZUSD"]["c"][0]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| anyhow::anyhow!("kraken response missing last price"))
}

pub struct CrossExchangeSpreadStrategy {
    cache: ExchangePriceCache,
    rate_limiter: RateLimiter<(String, String, String)>,
}

impl CrossExchangeSpreadStrategy {
    pub fn new(cache: ExchangePriceCache) -> Self {
        Self {
            cache,
            rate_limiter: RateLimiter::new(),
        }
    }
}

impl Strategy for CrossExchangeSpreadStrategy {
    fn id(&self) -> &'static str {
        "cross_exchange_spread"
    }

    fn event_filter(&self) -> EventFilter {
        EventFilter::Any
    }

    fn on_event(&self, event: &MarketEvent, config: &ResolvedConfig) -> anyhow::Result<Vec<Signal>> {
        let (symbol, binance_price) = match event {
            MarketEvent::Ticker(t) => (t.symbol.clone(), t.last_price.to_f64()),
            MarketEvent::Trade(t) => (t.symbol.clone(), t.price.to_f64()),
            MarketEvent::Depth(_) => return Ok(Vec::new()),
        };
        let Some(binance_price) = binance_price.filter(|p| *p > 0.0) else {
            return Ok(Vec::new());
        };

        {
            let mut cache = self.cache.write();
            cache.insert((BINANCE.to_string(), symbol.clone()), (binance_price, Instant::now()));
        }

        let spread_threshold = config.get_f64("spread_threshold_percent", 0.5);
        let max_position_size = config.get_f64("max_position_size", 500.0);
        let min_signal_interval = config.get_i64("min_signal_interval_seconds", 300).max(0) as u64;

        let venue_prices: Vec<(String, f64)> = {
            let cache = self.cache.read();
            cache
                .iter()
                .filter(|((_, sym), (_, fetched_at))| sym == &symbol && fetched_at.elapsed() <= PRICE_MAX_AGE)
                .map(|((venue, _), (price, _))| (venue.clone(), *price))
                .collect()
        };

        if venue_prices.len() < 2 {
            return Ok(Vec::new());
        }

        let (high_venue, high_price) = venue_prices
            .iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
            .cloned()
            .unwrap();
        let (low_venue, low_price) = venue_prices
            .iter()
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
            .cloned()
            .unwrap();

        if low_price <= 0.0 || high_venue == low_venue {
            return Ok(Vec::new());
        }

        let spread_percent = (high_price - low_price) / low_price * 100.0;
        if spread_percent < spread_threshold {
            return Ok(Vec::new());
        }

        let rate_key = (symbol.clone(), high_venue.clone(), low_venue.clone());
        if !self
            .rate_limiter
            .check_and_update(rate_key, Duration::from_secs(min_signal_interval))
        {
            return Ok(Vec::new());
        }

        let confidence_score = (spread_percent / 2.0).min(0.95);
        let position_size = max_position_size.min(max_position_size * confidence_score);

        let mut buy_metadata = HashMap::new();
        buy_metadata.insert("spread_percent".to_string(), serde_json::json!(spread_percent));
        buy_metadata.insert("buy_exchange".to_string(), serde_json::json!(low_venue));
        buy_metadata.insert("sell_exchange".to_string(), serde_json::json!(high_venue));
        buy_metadata.insert("buy_price".to_string(), serde_json::json!(low_price));
        buy_metadata.insert("sell_price".to_string(), serde_json::json!(high_price));
        buy_metadata.insert("position_size_usdt".to_string(), serde_json::json!(position_size));
        let sell_metadata = buy_metadata.clone();

        let low_price_decimal = rust_decimal::Decimal::try_from(low_price).unwrap_or_default();
        let high_price_decimal = rust_decimal::Decimal::try_from(high_price).unwrap_or_default();

        Ok(vec![
            Signal {
                id: Some(Uuid::new_v4()),
                symbol: symbol.clone(),
                signal_type: SignalType::Buy,
                signal_action: SignalAction::OpenLong,
                confidence: ConfidenceBucket::from_score(confidence_score),
                confidence_score,
                price: low_price_decimal,
                strategy_name: "cross_exchange_spread".to_string(),
                metadata: buy_metadata,
                timestamp: Utc::now(),
            },
            Signal {
                id: Some(Uuid::new_v4()),
                symbol,
                signal_type: SignalType::Sell,
                signal_action: SignalAction::OpenShort,
                confidence: ConfidenceBucket::from_score(confidence_score),
                confidence_score,
                price: high_price_decimal,
                strategy_name: "cross_exchange_spread".to_string(),
                metadata: sell_metadata,
                timestamp: Utc::now(),
            },
        ])
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
                ("spread_threshold_percent".to_string(), P::Float(0.5)),
                ("min_signal_interval_seconds".to_string(), P::Int(0)),
                ("max_position_size".to_string(), P::Float(500.0)),
            ]),
            version: 1,
            source: ConfigSource::Default,
            is_override: false,
            cache_hit: false,
        }
    }

    fn ticker(symbol: &str, price: rust_decimal::Decimal) -> MarketEvent {
        MarketEvent::Ticker(TickerData {
            symbol: symbol.to_string(),
            event_time_ms: 0,
            price_change: dec!(0),
            price_change_percent: dec!(0),
            weighted_avg_price: dec!(0),
            prev_close_price: dec!(0),
            last_price: price,
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
    fn needs_at_least_two_venues() {
        let cache = new_price_cache();
        let strategy = CrossExchangeSpreadStrategy::new(cache);
        let signals = strategy.on_event(&ticker("BTCUSDT", dec!(50000)), &config()).unwrap();
        assert!(signals.is_empty());
    }

    #[test]
    fn wide_spread_emits_buy_and_sell_pair() {
        let cache = new_price_cache();
        cache
            .write()
            .insert(("coinbase".to_string(), "BTCUSDT".to_string()), (50500.0, Instant::now()));
        let strategy = CrossExchangeSpreadStrategy::new(cache);
        let signals = strategy.on_event(&ticker("BTCUSDT", dec!(50000)), &config()).unwrap();
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].signal_type, SignalType::Buy);
        assert_eq!(signals[1].signal_type, SignalType::Sell);
        assert_eq!(
            signals[0].metadata.get("buy_exchange"),
            Some(&serde_json::json!("binance"))
        );
        assert_eq!(
            signals[0].metadata.get("sell_exchange"),
            Some(&serde_json::json!("coinbase"))
        );
        assert!(signals[0].metadata.get("venue").is_none());
    }

    #[test]
    fn stale_venue_price_is_ignored() {
        let cache = new_price_cache();
        cache.write().insert(
            ("coinbase".to_string(), "BTCUSDT".to_string()),
            (50500.0, Instant::now() - Duration::from_secs(120)),
        );
        let strategy = CrossExchangeSpreadStrategy::new(cache);
        let signals = strategy.on_event(&ticker("BTCUSDT", dec!(50000)), &config()).unwrap();
        assert!(signals.is_empty());
    }
}
