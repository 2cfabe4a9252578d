// =============================================================================
// Per-strategy parameter schemas, built-in defaults, and environment overrides
// =============================================================================
//
// Mirrors `constants.py` / `get_strategy_config()` in the reference
// implementation: every strategy has a schema (used for validation), a set
// of built-in defaults (the last-resort tier of the resolution order), and
// an optional environment-variable override read once at process start.
// =============================================================================

use std::collections::HashMap;

use super::schema::{ParameterSchema, ParameterType, ParameterValue};

/// The eight strategy ids this service dispatches to, in a stable order.
pub const STRATEGY_IDS: &[&str] = &[
    "orderbook_skew",
    "trade_momentum",
    "ticker_velocity",
    "btc_dominance",
    "cross_exchange_spread",
    "onchain_metrics",
    "iceberg_detector",
    "spread_liquidity",
];

fn f(v: f64) -> ParameterValue {
    ParameterValue::Float(v)
}
fn i(v: i64) -> ParameterValue {
    ParameterValue::Int(v)
}

/// Return the declared parameter schema for `strategy_id`, or an empty slice
/// for an unrecognised id (callers treat every parameter as unknown then).
pub fn schema_for(strategy_id: &str) -> Vec<ParameterSchema> {
    match strategy_id {
        "orderbook_skew" => vec![
            ParameterSchema {
                name: "top_levels",
                param_type: ParameterType::Int,
                description: "number of top-of-book levels summed per side",
                default: i(5),
                min: Some(1.0),
                max: Some(20.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "buy_threshold",
                param_type: ParameterType::Float,
                description: "bid/ask imbalance ratio above which a BUY is emitted",
                default: f(1.2),
                min: Some(1.0),
                max: Some(10.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "sell_threshold",
                param_type: ParameterType::Float,
                description: "bid/ask imbalance ratio below which a SELL is emitted",
                default: f(0.8),
                min: Some(0.0),
                max: Some(1.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "min_spread_percent",
                param_type: ParameterType::Float,
                description: "minimum spread percent required to consider the book",
                default: f(0.1),
                min: Some(0.0),
                max: Some(5.0),
                allowed_values: None,
                example: None,
            },
        ],
        "trade_momentum" => vec![
            ParameterSchema {
                name: "window_size",
                param_type: ParameterType::Int,
                description: "number of trailing trades kept per symbol",
                default: i(50),
                min: Some(5.0),
                max: Some(1000.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "price_weight",
                param_type: ParameterType::Float,
                description: "weight of normalized price change in the score",
                default: f(0.4),
                min: Some(0.0),
                max: Some(1.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "quantity_weight",
                param_type: ParameterType::Float,
                description: "weight of signed quantity share in the score",
                default: f(0.3),
                min: Some(0.0),
                max: Some(1.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "maker_weight",
                param_type: ParameterType::Float,
                description: "weight of signed maker flow in the score",
                default: f(0.3),
                min: Some(0.0),
                max: Some(1.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "buy_threshold",
                param_type: ParameterType::Float,
                description: "score above which a BUY is emitted",
                default: f(0.7),
                min: Some(-1.0),
                max: Some(1.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "sell_threshold",
                param_type: ParameterType::Float,
                description: "score below which a SELL is emitted",
                default: f(-0.7),
                min: Some(-1.0),
                max: Some(1.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "min_quantity",
                param_type: ParameterType::Float,
                description: "minimum trade quantity to consider",
                default: f(0.001),
                min: Some(0.0),
                max: None,
                allowed_values: None,
                example: None,
            },
        ],
        "ticker_velocity" => vec![
            ParameterSchema {
                name: "time_window_seconds",
                param_type: ParameterType::Int,
                description: "window over which price velocity is measured",
                default: i(60),
                min: Some(1.0),
                max: Some(3600.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "buy_threshold",
                param_type: ParameterType::Float,
                description: "velocity percent above which a BUY is emitted",
                default: f(0.5),
                min: Some(0.0),
                max: Some(100.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "sell_threshold",
                param_type: ParameterType::Float,
                description: "velocity percent below which a SELL is emitted",
                default: f(-0.5),
                min: Some(-100.0),
                max: Some(0.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "min_price_change",
                param_type: ParameterType::Float,
                description: "minimum absolute percent change required to act",
                default: f(0.1),
                min: Some(0.0),
                max: Some(100.0),
                allowed_values: None,
                example: None,
            },
        ],
        "btc_dominance" => vec![
            ParameterSchema {
                name: "high_threshold",
                param_type: ParameterType::Float,
                description: "dominance percent above which BTC is considered dominant",
                default: f(70.0),
                min: Some(30.0),
                max: Some(80.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "low_threshold",
                param_type: ParameterType::Float,
                description: "dominance percent below which BTC is considered weak",
                default: f(40.0),
                min: Some(30.0),
                max: Some(80.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "change_threshold",
                param_type: ParameterType::Float,
                description: "24h change percent treated as a strong move",
                default: f(5.0),
                min: Some(0.0),
                max: Some(50.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "window_hours",
                param_type: ParameterType::Int,
                description: "price history window in hours",
                default: i(24),
                min: Some(1.0),
                max: Some(168.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "min_signal_interval_seconds",
                param_type: ParameterType::Int,
                description: "minimum seconds between signals",
                default: i(14400),
                min: Some(0.0),
                max: None,
                allowed_values: None,
                example: None,
            },
        ],
        "cross_exchange_spread" => vec![
            ParameterSchema {
                name: "spread_threshold_percent",
                param_type: ParameterType::Float,
                description: "minimum cross-venue spread percent to act on",
                default: f(0.5),
                min: Some(0.0),
                max: Some(10.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "min_signal_interval_seconds",
                param_type: ParameterType::Int,
                description: "minimum seconds between signals for a venue pair",
                default: i(300),
                min: Some(0.0),
                max: None,
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "max_position_size",
                param_type: ParameterType::Float,
                description: "maximum notional size suggested in signal metadata",
                default: f(500.0),
                min: Some(0.0),
                max: None,
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "exchanges",
                param_type: ParameterType::String,
                description: "comma-separated venues polled besides the primary stream",
                default: ParameterValue::String("binance,coinbase".to_string()),
                min: None,
                max: None,
                allowed_values: None,
                example: None,
            },
        ],
        "onchain_metrics" => vec![
            ParameterSchema {
                name: "network_growth_threshold",
                param_type: ParameterType::Float,
                description: "24h network-activity growth percent treated as strong",
                default: f(10.0),
                min: Some(0.0),
                max: Some(100.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "volume_threshold",
                param_type: ParameterType::Float,
                description: "24h flow/volume change percent treated as significant",
                default: f(15.0),
                min: Some(0.0),
                max: Some(100.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "min_signal_interval_seconds",
                param_type: ParameterType::Int,
                description: "minimum seconds between signals per asset",
                default: i(86400),
                min: Some(0.0),
                max: None,
                allowed_values: None,
                example: None,
            },
        ],
        "iceberg_detector" => vec![
            ParameterSchema {
                name: "min_refill_count",
                param_type: ParameterType::Int,
                description: "minimum refill transitions to qualify as an iceberg",
                default: i(2),
                min: Some(1.0),
                max: Some(50.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "refill_speed_threshold_seconds",
                param_type: ParameterType::Float,
                description: "maximum latency between depletion and refill",
                default: f(5.0),
                min: Some(0.0),
                max: Some(300.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "consistency_threshold",
                param_type: ParameterType::Float,
                description: "minimum volume-consistency score to qualify",
                default: f(0.1),
                min: Some(0.0),
                max: Some(1.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "persistence_threshold_seconds",
                param_type: ParameterType::Float,
                description: "minimum persistence span to qualify",
                default: f(120.0),
                min: Some(0.0),
                max: Some(3600.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "level_proximity_pct",
                param_type: ParameterType::Float,
                description: "maximum distance from reference price, as a percent",
                default: f(1.0),
                min: Some(0.0),
                max: Some(10.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "base_confidence",
                param_type: ParameterType::Float,
                description: "baseline confidence assigned before banding",
                default: f(0.70),
                min: Some(0.0),
                max: Some(1.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "history_window_seconds",
                param_type: ParameterType::Int,
                description: "order-book sample retention window",
                default: i(300),
                min: Some(1.0),
                max: Some(3600.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "max_symbols",
                param_type: ParameterType::Int,
                description: "maximum symbols tracked by the order-book tracker",
                default: i(100),
                min: Some(1.0),
                max: Some(10000.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "min_signal_interval_seconds",
                param_type: ParameterType::Float,
                description: "minimum seconds between signals for a (symbol, price, side) key",
                default: f(120.0),
                min: Some(0.0),
                max: None,
                allowed_values: None,
                example: None,
            },
        ],
        "spread_liquidity" => vec![
            ParameterSchema {
                name: "top_levels",
                param_type: ParameterType::Int,
                description: "number of top-of-book levels summed per side",
                default: i(5),
                min: Some(1.0),
                max: Some(20.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "spread_widen_threshold_percent",
                param_type: ParameterType::Float,
                description: "minimum spread widening percent to trigger a signal",
                default: f(20.0),
                min: Some(0.0),
                max: Some(500.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "depth_drop_threshold_percent",
                param_type: ParameterType::Float,
                description: "minimum top-of-book depth drop percent to trigger a signal",
                default: f(30.0),
                min: Some(0.0),
                max: Some(100.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "window_seconds",
                param_type: ParameterType::Int,
                description: "rolling window used to compare spread/depth baselines",
                default: i(30),
                min: Some(1.0),
                max: Some(3600.0),
                allowed_values: None,
                example: None,
            },
            ParameterSchema {
                name: "min_signal_interval_seconds",
                param_type: ParameterType::Int,
                description: "minimum seconds between signals per symbol",
                default: i(60),
                min: Some(0.0),
                max: None,
                allowed_values: None,
                example: None,
            },
        ],
        _ => Vec::new(),
    }
}

/// Built-in defaults for `strategy_id`, derived from its schema.
pub fn defaults_for(strategy_id: &str) -> HashMap<String, ParameterValue> {
    schema_for(strategy_id)
        .into_iter()
        .map(|s| (s.name.to_string(), s.default))
        .collect()
}

/// Per-strategy `(parameter name, environment variable)` pairs, mirroring
/// `constants.py`'s per-strategy env var names. Used by the environment tier
/// of the config manager's resolution order.
fn env_var_names(strategy_id: &str) -> Vec<(&'static str, &'static str)> {
    match strategy_id {
        "orderbook_skew" => vec![
            ("top_levels", "ORDERBOOK_SKEW_TOP_LEVELS"),
            ("buy_threshold", "ORDERBOOK_SKEW_BUY_THRESHOLD"),
            ("sell_threshold", "ORDERBOOK_SKEW_SELL_THRESHOLD"),
            ("min_spread_percent", "ORDERBOOK_SKEW_MIN_SPREAD_PERCENT"),
        ],
        "trade_momentum" => vec![
            ("price_weight", "TRADE_MOMENTUM_PRICE_WEIGHT"),
            ("quantity_weight", "TRADE_MOMENTUM_QUANTITY_WEIGHT"),
            ("maker_weight", "TRADE_MOMENTUM_MAKER_WEIGHT"),
            ("buy_threshold", "TRADE_MOMENTUM_BUY_THRESHOLD"),
            ("sell_threshold", "TRADE_MOMENTUM_SELL_THRESHOLD"),
            ("min_quantity", "TRADE_MOMENTUM_MIN_QUANTITY"),
        ],
        "ticker_velocity" => vec![
            ("time_window_seconds", "TICKER_VELOCITY_TIME_WINDOW"),
            ("buy_threshold", "TICKER_VELOCITY_BUY_THRESHOLD"),
            ("sell_threshold", "TICKER_VELOCITY_SELL_THRESHOLD"),
            ("min_price_change", "TICKER_VELOCITY_MIN_PRICE_CHANGE"),
        ],
        "btc_dominance" => vec![
            ("high_threshold", "BTC_DOMINANCE_HIGH_THRESHOLD"),
            ("low_threshold", "BTC_DOMINANCE_LOW_THRESHOLD"),
            ("change_threshold", "BTC_DOMINANCE_CHANGE_THRESHOLD"),
            ("window_hours", "BTC_DOMINANCE_WINDOW_HOURS"),
            ("min_signal_interval_seconds", "BTC_DOMINANCE_MIN_SIGNAL_INTERVAL"),
        ],
        "cross_exchange_spread" => vec![
            ("spread_threshold_percent", "CROSS_EXCHANGE_SPREAD_THRESHOLD_PERCENT"),
            ("min_signal_interval_seconds", "CROSS_EXCHANGE_MIN_SIGNAL_INTERVAL"),
            ("max_position_size", "CROSS_EXCHANGE_MAX_POSITION_SIZE"),
            ("exchanges", "CROSS_EXCHANGE_EXCHANGES"),
        ],
        "onchain_metrics" => vec![
            ("network_growth_threshold", "ONCHAIN_NETWORK_GROWTH_THRESHOLD"),
            ("volume_threshold", "ONCHAIN_VOLUME_THRESHOLD"),
            ("min_signal_interval_seconds", "ONCHAIN_MIN_SIGNAL_INTERVAL"),
        ],
        "iceberg_detector" => vec![
            ("min_refill_count", "ICEBERG_MIN_REFILL_COUNT"),
            ("refill_speed_threshold_seconds", "ICEBERG_REFILL_SPEED_THRESHOLD_SECONDS"),
            ("consistency_threshold", "ICEBERG_CONSISTENCY_THRESHOLD"),
            ("persistence_threshold_seconds", "ICEBERG_PERSISTENCE_THRESHOLD_SECONDS"),
            ("level_proximity_pct", "ICEBERG_LEVEL_PROXIMITY_PCT"),
            ("min_signal_interval_seconds", "ICEBERG_MIN_SIGNAL_INTERVAL"),
        ],
        "spread_liquidity" => vec![
            ("spread_widen_threshold_percent", "SPREAD_LIQUIDITY_WIDEN_THRESHOLD_PERCENT"),
            ("depth_drop_threshold_percent", "SPREAD_LIQUIDITY_DEPTH_DROP_THRESHOLD_PERCENT"),
            ("window_seconds", "SPREAD_LIQUIDITY_WINDOW_SECONDS"),
            ("min_signal_interval_seconds", "SPREAD_LIQUIDITY_MIN_SIGNAL_INTERVAL"),
        ],
        _ => Vec::new(),
    }
}

/// Read environment-variable overrides for `strategy_id`'s parameters.
/// Only parameters with a set and parseable environment variable are
/// returned; everything else falls through to the built-in default tier.
pub fn env_overrides_for(strategy_id: &str) -> HashMap<String, ParameterValue> {
    let schema = schema_for(strategy_id);
    let mut overrides = HashMap::new();

    for (param_name, var_name) in env_var_names(strategy_id) {
        let Ok(raw) = std::env::var(var_name) else {
            continue;
        };
        let declared_type = schema
            .iter()
            .find(|s| s.name == param_name)
            .map(|s| s.param_type);

        let parsed = match declared_type {
            Some(ParameterType::Int) => raw.parse::<i64>().ok().map(ParameterValue::Int),
            Some(ParameterType::Float) => raw.parse::<f64>().ok().map(ParameterValue::Float),
            Some(ParameterType::Bool) => raw.parse::<bool>().ok().map(ParameterValue::Bool),
            _ => Some(ParameterValue::String(raw)),
        };

        if let Some(value) = parsed {
            overrides.insert(param_name.to_string(), value);
        }
    }

    overrides
}

/// Whether `strategy_id` is enabled by its `STRATEGY_ENABLED_<ID>` toggle
/// (default: enabled).
pub fn is_enabled_by_env(strategy_id: &str) -> bool {
    let var_name = format!("STRATEGY_ENABLED_{}", strategy_id.to_uppercase());
    std::env::var(var_name)
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(true)
}
