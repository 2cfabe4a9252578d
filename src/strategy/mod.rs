// =============================================================================
// Strategy contract and registry (L2)
// =============================================================================

pub mod btc_dominance;
pub mod cross_exchange_spread;
pub mod iceberg_detector;
pub mod onchain_metrics;
pub mod orderbook_skew;
pub mod rate_limiter;
pub mod spread_liquidity;
pub mod ticker_velocity;
pub mod trade_momentum;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, warn};

use crate::config_manager::model::ResolvedConfig;
use crate::event::MarketEvent;
use crate::signal::Signal;

/// Which event variants a strategy wants to see. The dispatcher skips the
/// call entirely for events that don't match, so a strategy never has to
/// guard against its own irrelevant variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    DepthOnly,
    TradeOnly,
    TickerOnly,
    Any,
}

impl EventFilter {
    fn matches(self, event: &MarketEvent) -> bool {
        match (self, event) {
            (EventFilter::Any, _) => true,
            (EventFilter::DepthOnly, MarketEvent::Depth(_)) => true,
            (EventFilter::TradeOnly, MarketEvent::Trade(_)) => true,
            (EventFilter::TickerOnly, MarketEvent::Ticker(_)) => true,
            _ => false,
        }
    }
}

/// A single trading strategy. Pure in its inputs but may hold private
/// rolling state (rate limiters, rolling windows) behind interior
/// mutability, since the registry hands out shared references.
pub trait Strategy: Send + Sync {
    /// Stable identifier, matching the config manager's strategy id (see
    /// `config_manager::defaults::STRATEGY_IDS`).
    fn id(&self) -> &'static str;

    fn event_filter(&self) -> EventFilter;

    /// Evaluate one event against the current config snapshot. Queries the
    /// config manager at most once per event upstream of this call — the
    /// snapshot is passed in, not fetched here.
    fn on_event(&self, event: &MarketEvent, config: &ResolvedConfig) -> anyhow::Result<Vec<Signal>>;
}

struct Entry {
    strategy: Arc<dyn Strategy>,
    enabled: AtomicBool,
}

/// Holds every registered strategy plus a stable enable/disable flag per
/// strategy. The dispatcher iterates only enabled strategies whose event
/// filter matches the current event.
pub struct StrategyRegistry {
    entries: RwLock<Vec<Entry>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, strategy: Arc<dyn Strategy>) {
        self.entries.write().push(Entry {
            strategy,
            enabled: AtomicBool::new(true),
        });
    }

    pub fn set_enabled(&self, strategy_id: &str, enabled: bool) -> bool {
        let entries = self.entries.read();
        match entries.iter().find(|e| e.strategy.id() == strategy_id) {
            Some(entry) => {
                entry.enabled.store(enabled, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn is_enabled(&self, strategy_id: &str) -> Option<bool> {
        self.entries
            .read()
            .iter()
            .find(|e| e.strategy.id() == strategy_id)
            .map(|e| e.enabled.load(Ordering::SeqCst))
    }

    pub fn strategy_ids(&self) -> Vec<&'static str> {
        self.entries.read().iter().map(|e| e.strategy.id()).collect()
    }

    /// Dispatch `event` to every enabled strategy whose filter matches,
    /// resolving a fresh config snapshot per strategy via `resolve_config`.
    /// A panicking or error-returning strategy is isolated: its error is
    /// logged and counted by the caller, siblings still run.
    ///
    /// Returns the signals produced plus the ids of strategies that errored.
    pub async fn dispatch<F, Fut>(
        &self,
        event: &MarketEvent,
        resolve_config: F,
    ) -> (Vec<Signal>, Vec<&'static str>)
    where
        F: Fn(&'static str) -> Fut,
        Fut: std::future::Future<Output = ResolvedConfig>,
    {
        let candidates: Vec<Arc<dyn Strategy>> = {
            let entries = self.entries.read();
            entries
                .iter()
                .filter(|e| e.enabled.load(Ordering::SeqCst) && e.strategy.event_filter().matches(event))
                .map(|e| e.strategy.clone())
                .collect()
        };

        let mut signals = Vec::new();
        let mut errored = Vec::new();

        for strategy in candidates {
            let config = resolve_config(strategy.id()).await;
            match strategy.on_event(event, &config) {
                Ok(mut produced) => signals.append(&mut produced),
                Err(err) => {
                    error!(strategy_id = strategy.id(), error = %err, "strategy failed, dropping event for this strategy");
                    errored.push(strategy.id());
                }
            }
        }

        if !errored.is_empty() {
            warn!(failed = ?errored, "one or more strategies failed on this event");
        }

        (signals, errored)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
