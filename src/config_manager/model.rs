// =============================================================================
// Config-manager data model
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::schema::ParameterValue;

/// A stored strategy parameter set. `symbol = None` is a global config;
/// `symbol = Some(_)` is a symbol override. At most one of each per
/// `(strategy_id, symbol)` key lives in the store at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub id: String,
    pub strategy_id: String,
    pub symbol: Option<String>,
    pub parameters: HashMap<String, ParameterValue>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub metadata: HashMap<String, ParameterValue>,
}

/// The kind of change an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

/// An immutable record of a single configuration change. Append-only: the
/// store exposes no update path for these, only insert and query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub strategy_id: String,
    pub symbol: Option<String>,
    pub action: AuditAction,
    pub old_parameters: Option<HashMap<String, ParameterValue>>,
    pub new_parameters: Option<HashMap<String, ParameterValue>>,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Where a resolved config came from, for observability/debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    Cache,
    StoreSymbol,
    StoreGlobal,
    Environment,
    Default,
}

/// The result of resolving parameters for `(strategy_id, symbol?)`: the
/// parameters themselves plus provenance metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedConfig {
    pub parameters: HashMap<String, ParameterValue>,
    pub version: u64,
    pub source: ConfigSource,
    pub is_override: bool,
    pub cache_hit: bool,
}

impl ResolvedConfig {
    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.parameters.get(name)
    }

    pub fn get_f64(&self, name: &str, default: f64) -> f64 {
        self.get(name).and_then(ParameterValue::as_f64).unwrap_or(default)
    }

    pub fn get_i64(&self, name: &str, default: i64) -> i64 {
        self.get(name).and_then(ParameterValue::as_i64).unwrap_or(default)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParameterValue::as_str)
    }
}

/// Summary of a strategy's override coverage, for the `list_strategies`
/// operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyInfo {
    pub strategy_id: String,
    pub has_global_config: bool,
    pub symbol_overrides: Vec<String>,
    pub parameter_count: usize,
}
