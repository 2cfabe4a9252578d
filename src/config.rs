// =============================================================================
// Service configuration — environment-sourced, loaded once at startup
// =============================================================================
//
// Every tunable lives here so the rest of the pipeline never touches
// `std::env` directly. Fields carry the same serde-default-fn convention the
// rest of this codebase uses for config structs, but values are sourced from
// environment variables rather than a JSON file: this service is configured
// at process start and does not hot-reload (see the design notes).
// =============================================================================

use serde::{Deserialize, Serialize};

fn default_bus_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_consumer_topic() -> String {
    "binance.websocket.data".to_string()
}

fn default_publisher_topic() -> String {
    "signals.trading".to_string()
}

fn default_consumer_group() -> String {
    "realtime-strategies".to_string()
}

fn default_consumer_name() -> String {
    "realtime-strategies-1".to_string()
}

fn default_mongodb_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_mongodb_database() -> String {
    "realtime_strategies".to_string()
}

fn default_mongodb_timeout_ms() -> u64 {
    5000
}

fn default_cache_ttl_seconds() -> u64 {
    60
}

fn default_dispatch_workers() -> usize {
    1
}

fn default_egress_queue_capacity() -> usize {
    1000
}

fn default_publisher_workers() -> usize {
    2
}

fn default_circuit_breaker_failure_threshold() -> u32 {
    5
}

fn default_circuit_breaker_recovery_timeout_seconds() -> u64 {
    60
}

fn default_publish_deadline_ms() -> u64 {
    1000
}

fn default_heartbeat_enabled() -> bool {
    true
}

fn default_heartbeat_interval_seconds() -> u64 {
    60
}

fn default_heartbeat_detailed_stats() -> bool {
    true
}

fn default_max_tracked_symbols() -> usize {
    100
}

fn default_max_buckets_per_symbol() -> usize {
    200
}

fn default_history_window_seconds() -> i64 {
    300
}

fn default_max_outbound_http_inflight() -> usize {
    8
}

fn default_symbols() -> Vec<String> {
    vec![
        "BTCUSDT".to_string(),
        "ETHUSDT".to_string(),
        "BNBUSDT".to_string(),
    ]
}

/// Top-level process configuration, resolved once from the environment at
/// startup. Not re-read after `from_env()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    // --- Bus -----------------------------------------------------------------
    #[serde(default = "default_bus_url")]
    pub bus_url: String,
    #[serde(default = "default_consumer_topic")]
    pub consumer_topic: String,
    #[serde(default = "default_publisher_topic")]
    pub publisher_topic: String,
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,

    // --- Document store --------------------------------------------------------
    #[serde(default = "default_mongodb_uri")]
    pub mongodb_uri: String,
    #[serde(default = "default_mongodb_database")]
    pub mongodb_database: String,
    #[serde(default = "default_mongodb_timeout_ms")]
    pub mongodb_timeout_ms: u64,

    // --- Config manager --------------------------------------------------------
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,

    // --- Dispatch / egress -------------------------------------------------------
    #[serde(default = "default_dispatch_workers")]
    pub dispatch_workers: usize,
    #[serde(default = "default_egress_queue_capacity")]
    pub egress_queue_capacity: usize,
    #[serde(default = "default_publisher_workers")]
    pub publisher_workers: usize,
    #[serde(default = "default_publish_deadline_ms")]
    pub publish_deadline_ms: u64,

    // --- Circuit breaker ---------------------------------------------------------
    #[serde(default = "default_circuit_breaker_failure_threshold")]
    pub circuit_breaker_failure_threshold: u32,
    #[serde(default = "default_circuit_breaker_recovery_timeout_seconds")]
    pub circuit_breaker_recovery_timeout_seconds: u64,

    // --- Heartbeat -----------------------------------------------------------------
    #[serde(default = "default_heartbeat_enabled")]
    pub heartbeat_enabled: bool,
    #[serde(default = "default_heartbeat_interval_seconds")]
    pub heartbeat_interval_seconds: u64,
    #[serde(default = "default_heartbeat_detailed_stats")]
    pub heartbeat_detailed_stats: bool,

    // --- Order-book tracker resource ceilings -------------------------------------
    #[serde(default = "default_max_tracked_symbols")]
    pub max_tracked_symbols: usize,
    #[serde(default = "default_max_buckets_per_symbol")]
    pub max_buckets_per_symbol: usize,
    #[serde(default = "default_history_window_seconds")]
    pub history_window_seconds: i64,

    // --- Outbound HTTP (cross-exchange strategy) ----------------------------------
    #[serde(default = "default_max_outbound_http_inflight")]
    pub max_outbound_http_inflight: usize,

    // --- Symbol universe -----------------------------------------------------------
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bus_url: default_bus_url(),
            consumer_topic: default_consumer_topic(),
            publisher_topic: default_publisher_topic(),
            consumer_group: default_consumer_group(),
            consumer_name: default_consumer_name(),
            mongodb_uri: default_mongodb_uri(),
            mongodb_database: default_mongodb_database(),
            mongodb_timeout_ms: default_mongodb_timeout_ms(),
            cache_ttl_seconds: default_cache_ttl_seconds(),
            dispatch_workers: default_dispatch_workers(),
            egress_queue_capacity: default_egress_queue_capacity(),
            publisher_workers: default_publisher_workers(),
            publish_deadline_ms: default_publish_deadline_ms(),
            circuit_breaker_failure_threshold: default_circuit_breaker_failure_threshold(),
            circuit_breaker_recovery_timeout_seconds:
                default_circuit_breaker_recovery_timeout_seconds(),
            heartbeat_enabled: default_heartbeat_enabled(),
            heartbeat_interval_seconds: default_heartbeat_interval_seconds(),
            heartbeat_detailed_stats: default_heartbeat_detailed_stats(),
            max_tracked_symbols: default_max_tracked_symbols(),
            max_buckets_per_symbol: default_max_buckets_per_symbol(),
            history_window_seconds: default_history_window_seconds(),
            max_outbound_http_inflight: default_max_outbound_http_inflight(),
            symbols: default_symbols(),
        }
    }
}

impl ServiceConfig {
    /// Build configuration from the process environment, falling back to
    /// built-in defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bus_url: env_or("NATS_URL", defaults.bus_url),
            consumer_topic: env_or("NATS_CONSUMER_TOPIC", defaults.consumer_topic),
            publisher_topic: env_or("NATS_PUBLISHER_TOPIC", defaults.publisher_topic),
            consumer_group: env_or("NATS_CONSUMER_GROUP", defaults.consumer_group),
            consumer_name: env_or("NATS_CONSUMER_NAME", defaults.consumer_name),
            mongodb_uri: env_or("MONGODB_URI", defaults.mongodb_uri),
            mongodb_database: env_or("MONGODB_DATABASE", defaults.mongodb_database),
            mongodb_timeout_ms: env_parsed_or("MONGODB_TIMEOUT_MS", defaults.mongodb_timeout_ms),
            cache_ttl_seconds: env_parsed_or("CONFIG_CACHE_TTL_SECONDS", defaults.cache_ttl_seconds),
            dispatch_workers: env_parsed_or("DISPATCH_WORKERS", defaults.dispatch_workers),
            egress_queue_capacity: env_parsed_or(
                "EGRESS_QUEUE_CAPACITY",
                defaults.egress_queue_capacity,
            ),
            publisher_workers: env_parsed_or("PUBLISHER_WORKERS", defaults.publisher_workers),
            publish_deadline_ms: env_parsed_or("PUBLISH_DEADLINE_MS", defaults.publish_deadline_ms),
            circuit_breaker_failure_threshold: env_parsed_or(
                "CIRCUIT_BREAKER_FAILURE_THRESHOLD",
                defaults.circuit_breaker_failure_threshold,
            ),
            circuit_breaker_recovery_timeout_seconds: env_parsed_or(
                "CIRCUIT_BREAKER_RECOVERY_TIMEOUT",
                defaults.circuit_breaker_recovery_timeout_seconds,
            ),
            heartbeat_enabled: env_parsed_or("HEARTBEAT_ENABLED", defaults.heartbeat_enabled),
            heartbeat_interval_seconds: env_parsed_or(
                "HEARTBEAT_INTERVAL_SECONDS",
                defaults.heartbeat_interval_seconds,
            ),
            heartbeat_detailed_stats: env_parsed_or(
                "HEARTBEAT_INCLUDE_DETAILED_STATS",
                defaults.heartbeat_detailed_stats,
            ),
            max_tracked_symbols: env_parsed_or("MAX_TRACKED_SYMBOLS", defaults.max_tracked_symbols),
            max_buckets_per_symbol: env_parsed_or(
                "MAX_BUCKETS_PER_SYMBOL",
                defaults.max_buckets_per_symbol,
            ),
            history_window_seconds: env_parsed_or(
                "HISTORY_WINDOW_SECONDS",
                defaults.history_window_seconds,
            ),
            max_outbound_http_inflight: env_parsed_or(
                "MAX_OUTBOUND_HTTP_INFLIGHT",
                defaults.max_outbound_http_inflight,
            ),
            symbols: env_list_or("TRADING_SYMBOLS", defaults.symbols),
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_list_or(key: &str, default: Vec<String>) -> Vec<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.bus_url, "nats://localhost:4222");
        assert_eq!(cfg.consumer_topic, "binance.websocket.data");
        assert_eq!(cfg.publisher_topic, "signals.trading");
        assert_eq!(cfg.circuit_breaker_failure_threshold, 5);
        assert_eq!(cfg.circuit_breaker_recovery_timeout_seconds, 60);
        assert!(cfg.heartbeat_enabled);
        assert_eq!(cfg.heartbeat_interval_seconds, 60);
        assert_eq!(cfg.symbols, vec!["BTCUSDT", "ETHUSDT", "BNBUSDT"]);
    }

    #[test]
    fn env_list_or_splits_and_uppercases() {
        let result = env_list_or("__NONEXISTENT_VAR_FOR_TEST__", vec!["FALLBACK".to_string()]);
        assert_eq!(result, vec!["FALLBACK".to_string()]);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: ServiceConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.bus_url, ServiceConfig::default().bus_url);
        assert_eq!(cfg.cache_ttl_seconds, 60);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = ServiceConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: ServiceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.bus_url, cfg2.bus_url);
        assert_eq!(cfg.symbols, cfg2.symbols);
    }
}
