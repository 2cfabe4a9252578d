// =============================================================================
// TTL cache — lazy expiry on read plus a periodic sweep
// =============================================================================
//
// Deliberately not an LRU (see the design notes): a straightforward
// `Map<key, (value, inserted_at)>` is sufficient because reads are frequent
// and writes are rare, and resolution always falls through to the store on
// a miss.
// =============================================================================

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use super::model::ResolvedConfig;

/// Build the cache key for a `(strategy_id, symbol?)` pair: `"strategy:symbol"`
/// or `"strategy:global"` when no symbol override is in play.
pub fn cache_key(strategy_id: &str, symbol: Option<&str>) -> String {
    format!("{strategy_id}:{}", symbol.unwrap_or("global"))
}

struct Entry {
    value: ResolvedConfig,
    inserted_at: Instant,
}

/// A single-writer, many-readers TTL cache of resolved configs.
pub struct TtlCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached value for `key` if present and not yet stale.
    pub fn get(&self, key: &str) -> Option<ResolvedConfig> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.inserted_at.elapsed() > self.ttl {
            None
        } else {
            Some(entry.value.clone())
        }
    }

    pub fn insert(&self, key: String, value: ResolvedConfig) {
        self.entries.write().insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Invalidate a single key immediately (called after any write).
    pub fn invalidate(&self, key: &str) {
        self.entries.write().remove(key);
    }

    /// Remove every entry whose age exceeds the TTL. Called periodically by
    /// the cache-refresh background task.
    pub fn sweep(&self) {
        let mut entries = self.entries.write();
        entries.retain(|_, entry| entry.inserted_at.elapsed() <= self.ttl);
    }

    /// Clear the cache entirely (used by the admin `refresh_cache` operation).
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::model::ConfigSource;
    use std::collections::HashMap as Map;
    use std::thread::sleep;

    fn sample_value() -> ResolvedConfig {
        ResolvedConfig {
            parameters: Map::new(),
            version: 1,
            source: ConfigSource::Default,
            is_override: false,
            cache_hit: false,
        }
    }

    #[test]
    fn cache_key_uses_global_when_no_symbol() {
        assert_eq!(cache_key("orderbook_skew", None), "orderbook_skew:global");
        assert_eq!(cache_key("orderbook_skew", Some("BTCUSDT")), "orderbook_skew:BTCUSDT");
    }

    #[test]
    fn hit_before_ttl_miss_after() {
        let cache = TtlCache::new(Duration::from_millis(20));
        cache.insert("k".to_string(), sample_value());
        assert!(cache.get("k").is_some());
        sleep(Duration::from_millis(40));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn invalidate_removes_immediately() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("k".to_string(), sample_value());
        cache.invalidate("k");
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn sweep_drops_only_stale_entries() {
        let cache = TtlCache::new(Duration::from_millis(20));
        cache.insert("stale".to_string(), sample_value());
        sleep(Duration::from_millis(40));
        cache.insert("fresh".to_string(), sample_value());
        cache.sweep();
        assert_eq!(cache.len(), 1);
    }
}
