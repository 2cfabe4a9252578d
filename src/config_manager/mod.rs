// =============================================================================
// Runtime configuration manager (L4)
// =============================================================================
//
// Resolves parameters for `(strategy_id, symbol?)`, validates proposed
// parameter maps, persists updates with an audit trail, and supports
// rollback to any historical version. See SPEC_FULL.md §4.4.
//
// Built once at startup and threaded through construction (no process-wide
// singleton): the dispatcher holds an `Arc<StrategyConfigManager>` and
// passes resolved snapshots to strategies.
// =============================================================================

pub mod cache;
pub mod defaults;
pub mod model;
pub mod schema;
pub mod store;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};

use cache::{cache_key, TtlCache};
use model::{AuditAction, AuditRecord, ConfigSource, ResolvedConfig, StrategyConfig, StrategyInfo};
use schema::ParameterValue;
use store::DocumentStore;

/// How a rollback target is identified by the caller.
#[derive(Debug, Clone)]
pub enum RollbackTarget {
    Version(u64),
    AuditId(String),
    Previous,
}

pub struct StrategyConfigManager {
    store: Arc<dyn DocumentStore>,
    cache: TtlCache,
}

impl StrategyConfigManager {
    pub fn new(store: Arc<dyn DocumentStore>, cache_ttl: Duration) -> Self {
        Self {
            store,
            cache: TtlCache::new(cache_ttl),
        }
    }

    /// Resolve parameters for `(strategy_id, symbol?)` following the
    /// resolution order: cache -> store symbol override -> store global ->
    /// environment -> built-in default. Every non-cache hit populates the
    /// cache at this exact key.
    pub async fn get_config(&self, strategy_id: &str, symbol: Option<&str>) -> ResolvedConfig {
        let key = cache_key(strategy_id, symbol);

        if let Some(mut cached) = self.cache.get(&key) {
            cached.cache_hit = true;
            return cached;
        }

        if let Some(symbol) = symbol {
            if let Ok(Some(found)) = self.store.get_symbol_config(strategy_id, symbol).await {
                let resolved = ResolvedConfig {
                    parameters: found.parameters,
                    version: found.version,
                    source: ConfigSource::StoreSymbol,
                    is_override: true,
                    cache_hit: false,
                };
                self.cache.insert(key, resolved.clone());
                return resolved;
            }
        }

        if let Ok(Some(found)) = self.store.get_global_config(strategy_id).await {
            let resolved = ResolvedConfig {
                parameters: found.parameters,
                version: found.version,
                source: ConfigSource::StoreGlobal,
                is_override: false,
                cache_hit: false,
            };
            self.cache.insert(key, resolved.clone());
            return resolved;
        }

        let base = defaults::defaults_for(strategy_id);
        let overrides = defaults::env_overrides_for(strategy_id);

        let resolved = if overrides.is_empty() {
            ResolvedConfig {
                parameters: base,
                version: 1,
                source: ConfigSource::Default,
                is_override: false,
                cache_hit: false,
            }
        } else {
            let mut merged = base;
            merged.extend(overrides);
            ResolvedConfig {
                parameters: merged,
                version: 1,
                source: ConfigSource::Environment,
                is_override: false,
                cache_hit: false,
            }
        };

        self.cache.insert(key, resolved.clone());
        resolved
    }

    /// The single validation function reused by every call path (see
    /// SPEC_FULL.md §11 Open Question resolution).
    pub fn validate_parameters(
        &self,
        strategy_id: &str,
        proposed: &HashMap<String, ParameterValue>,
    ) -> Vec<crate::error::ValidationIssue> {
        let schema = defaults::schema_for(strategy_id);
        schema::validate_parameters(&schema, proposed)
    }

    async fn existing_config(
        &self,
        strategy_id: &str,
        symbol: Option<&str>,
    ) -> anyhow::Result<Option<StrategyConfig>> {
        match symbol {
            Some(symbol) => self.store.get_symbol_config(strategy_id, symbol).await,
            None => self.store.get_global_config(strategy_id).await,
        }
    }

    /// Create or update a config. Validates first (never mutates on
    /// failure); with `validate_only` set, returns after validation without
    /// touching the store or writing an audit record.
    pub async fn set_config(
        &self,
        strategy_id: &str,
        symbol: Option<&str>,
        parameters: HashMap<String, ParameterValue>,
        changed_by: &str,
        reason: Option<String>,
        validate_only: bool,
    ) -> PipelineResult<Option<StrategyConfig>> {
        let issues = self.validate_parameters(strategy_id, &parameters);
        if !issues.is_empty() {
            return Err(PipelineError::Validation(issues));
        }

        if validate_only {
            return Ok(None);
        }

        if !self.store.is_connected().await {
            return Err(PipelineError::StoreUnavailable);
        }

        let existing = self
            .existing_config(strategy_id, symbol)
            .await
            .map_err(|_| PipelineError::StoreUnavailable)?;

        let now = Utc::now();
        let version = existing.as_ref().map(|c| c.version + 1).unwrap_or(1);
        let created_at = existing.as_ref().map(|c| c.created_at).unwrap_or(now);
        let action = if existing.is_some() {
            AuditAction::Update
        } else {
            AuditAction::Create
        };
        let old_parameters = existing.as_ref().map(|c| c.parameters.clone());

        let new_config = StrategyConfig {
            id: Uuid::new_v4().to_string(),
            strategy_id: strategy_id.to_string(),
            symbol: symbol.map(str::to_string),
            parameters: parameters.clone(),
            version,
            created_at,
            updated_at: now,
            created_by: changed_by.to_string(),
            metadata: HashMap::new(),
        };

        let write_result = match symbol {
            Some(_) => self.store.upsert_symbol_config(new_config.clone()).await,
            None => self.store.upsert_global_config(new_config.clone()).await,
        };
        write_result.map_err(|_| PipelineError::StoreUnavailable)?;

        let record = AuditRecord {
            id: Uuid::new_v4().to_string(),
            strategy_id: strategy_id.to_string(),
            symbol: symbol.map(str::to_string),
            action,
            old_parameters,
            new_parameters: Some(parameters),
            changed_by: changed_by.to_string(),
            changed_at: now,
            reason,
        };
        self.store
            .create_audit_record(record)
            .await
            .map_err(|_| PipelineError::StoreUnavailable)?;

        self.cache.invalidate(&cache_key(strategy_id, symbol));

        info!(
            strategy_id,
            symbol = symbol.unwrap_or("global"),
            version,
            "strategy config updated"
        );

        Ok(Some(new_config))
    }

    /// Delete a config. Requires a preceding best-effort read to populate
    /// `old_parameters` on the audit record; writes an audit record only if
    /// a config actually existed.
    pub async fn delete_config(
        &self,
        strategy_id: &str,
        symbol: Option<&str>,
        changed_by: &str,
        reason: Option<String>,
    ) -> PipelineResult<bool> {
        if !self.store.is_connected().await {
            return Err(PipelineError::StoreUnavailable);
        }

        let existing = self
            .existing_config(strategy_id, symbol)
            .await
            .map_err(|_| PipelineError::StoreUnavailable)?;

        let Some(existing) = existing else {
            return Ok(false);
        };

        let deleted = match symbol {
            Some(symbol) => self.store.delete_symbol_config(strategy_id, symbol).await,
            None => self.store.delete_global_config(strategy_id).await,
        }
        .map_err(|_| PipelineError::StoreUnavailable)?;

        if deleted {
            let record = AuditRecord {
                id: Uuid::new_v4().to_string(),
                strategy_id: strategy_id.to_string(),
                symbol: symbol.map(str::to_string),
                action: AuditAction::Delete,
                old_parameters: Some(existing.parameters),
                new_parameters: None,
                changed_by: changed_by.to_string(),
                changed_at: Utc::now(),
                reason,
            };
            self.store
                .create_audit_record(record)
                .await
                .map_err(|_| PipelineError::StoreUnavailable)?;
            self.cache.invalidate(&cache_key(strategy_id, symbol));
        }

        Ok(deleted)
    }

    /// Roll back to a prior version, identified by version number, audit id,
    /// or the sentinel "previous". Refuses cross-strategy audit ids as a
    /// security check (returned as [`PipelineError::NotFoundForStrategy`]).
    pub async fn rollback_config(
        &self,
        strategy_id: &str,
        symbol: Option<&str>,
        target: RollbackTarget,
        reason: &str,
        changed_by: &str,
    ) -> PipelineResult<StrategyConfig> {
        let target_audit = match target {
            RollbackTarget::Version(version) => self
                .store
                .get_audit_record_by_version(strategy_id, version, symbol)
                .await
                .map_err(|_| PipelineError::StoreUnavailable)?,
            RollbackTarget::AuditId(id) => {
                let record = self
                    .store
                    .get_audit_record_by_id(&id)
                    .await
                    .map_err(|_| PipelineError::StoreUnavailable)?;
                match record {
                    Some(record) if record.strategy_id == strategy_id => Some(record),
                    Some(_) => {
                        warn!(strategy_id, audit_id = %id, "rollback refused: audit id belongs to a different strategy");
                        return Err(PipelineError::NotFoundForStrategy);
                    }
                    None => None,
                }
            }
            RollbackTarget::Previous => {
                let trail = self
                    .store
                    .get_audit_trail(strategy_id, symbol, 2)
                    .await
                    .map_err(|_| PipelineError::StoreUnavailable)?;
                trail.into_iter().nth(1)
            }
        };

        let Some(target_audit) = target_audit else {
            return Err(PipelineError::NotFoundForStrategy);
        };

        let parameters = target_audit
            .new_parameters
            .ok_or(PipelineError::NotFoundForStrategy)?;

        let restored = self
            .set_config(
                strategy_id,
                symbol,
                parameters,
                changed_by,
                Some(format!("Rollback: {reason} (from audit {})", target_audit.id)),
                false,
            )
            .await?;

        restored.ok_or(PipelineError::NotFoundForStrategy)
    }

    /// List every known strategy id with its override coverage.
    pub async fn list_strategies(&self) -> Vec<StrategyInfo> {
        let mut infos = Vec::new();
        for strategy_id in defaults::STRATEGY_IDS {
            let has_global_config = self
                .store
                .get_global_config(strategy_id)
                .await
                .ok()
                .flatten()
                .is_some();
            let symbol_overrides = self
                .store
                .list_symbol_overrides(strategy_id)
                .await
                .unwrap_or_default();
            infos.push(StrategyInfo {
                strategy_id: strategy_id.to_string(),
                has_global_config,
                symbol_overrides,
                parameter_count: defaults::schema_for(strategy_id).len(),
            });
        }
        infos
    }

    pub async fn get_audit_trail(
        &self,
        strategy_id: &str,
        symbol: Option<&str>,
        limit: usize,
    ) -> Vec<AuditRecord> {
        self.store
            .get_audit_trail(strategy_id, symbol, limit)
            .await
            .unwrap_or_default()
    }

    /// Clear the entire cache immediately (admin `cache-refresh` operation).
    pub fn refresh_cache(&self) {
        self.cache.clear();
    }

    /// Run one sweep pass, evicting entries older than the TTL. Intended to
    /// be called periodically by a background task spawned at startup.
    pub fn sweep_cache(&self) {
        self.cache.sweep();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::InMemoryDocumentStore;

    fn manager() -> StrategyConfigManager {
        StrategyConfigManager::new(Arc::new(InMemoryDocumentStore::new()), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn falls_back_to_defaults_when_store_empty() {
        let manager = manager();
        let resolved = manager.get_config("orderbook_skew", None).await;
        assert_eq!(resolved.source, ConfigSource::Default);
        assert_eq!(resolved.version, 1);
    }

    #[tokio::test]
    async fn create_then_update_increments_version_and_preserves_created_at() {
        let manager = manager();
        let mut params = HashMap::new();
        params.insert("buy_threshold".to_string(), ParameterValue::Float(1.3));
        params.insert("sell_threshold".to_string(), ParameterValue::Float(0.8));
        params.insert("min_spread_percent".to_string(), ParameterValue::Float(0.1));
        params.insert("top_levels".to_string(), ParameterValue::Int(5));

        let created = manager
            .set_config("orderbook_skew", None, params.clone(), "tester", None, false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.version, 1);

        let updated = manager
            .set_config("orderbook_skew", None, params, "tester", None, false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.created_at, created.created_at);

        let trail = manager.get_audit_trail("orderbook_skew", None, 10).await;
        assert_eq!(trail.len(), 2);
    }

    #[tokio::test]
    async fn write_then_read_returns_new_parameters_immediately() {
        let manager = manager();
        let mut params = HashMap::new();
        params.insert("buy_threshold".to_string(), ParameterValue::Float(1.5));
        params.insert("sell_threshold".to_string(), ParameterValue::Float(0.8));
        params.insert("min_spread_percent".to_string(), ParameterValue::Float(0.1));
        params.insert("top_levels".to_string(), ParameterValue::Int(5));
        manager
            .set_config("orderbook_skew", None, params, "tester", None, false)
            .await
            .unwrap();

        let resolved = manager.get_config("orderbook_skew", None).await;
        assert_eq!(resolved.get_f64("buy_threshold", 0.0), 1.5);
        assert_eq!(resolved.source, ConfigSource::StoreGlobal);
    }

    #[tokio::test]
    async fn validate_only_does_not_mutate_or_write_audit() {
        let manager = manager();
        let mut params = HashMap::new();
        params.insert("buy_threshold".to_string(), ParameterValue::Float(1.5));
        params.insert("sell_threshold".to_string(), ParameterValue::Float(0.8));
        params.insert("min_spread_percent".to_string(), ParameterValue::Float(0.1));
        params.insert("top_levels".to_string(), ParameterValue::Int(5));

        let result = manager
            .set_config("orderbook_skew", None, params, "tester", None, true)
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(manager
            .get_audit_trail("orderbook_skew", None, 10)
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn rollback_by_version_restores_old_parameters_as_new_version() {
        let manager = manager();
        let mk_params = |threshold: f64| {
            let mut p = HashMap::new();
            p.insert("buy_threshold".to_string(), ParameterValue::Float(threshold));
            p.insert("sell_threshold".to_string(), ParameterValue::Float(0.8));
            p.insert("min_spread_percent".to_string(), ParameterValue::Float(0.1));
            p.insert("top_levels".to_string(), ParameterValue::Int(5));
            p
        };

        manager
            .set_config("orderbook_skew", None, mk_params(1.1), "tester", None, false)
            .await
            .unwrap();
        manager
            .set_config("orderbook_skew", None, mk_params(1.2), "tester", None, false)
            .await
            .unwrap();
        manager
            .set_config("orderbook_skew", None, mk_params(1.3), "tester", None, false)
            .await
            .unwrap();

        let rolled_back = manager
            .rollback_config(
                "orderbook_skew",
                None,
                RollbackTarget::Version(1),
                "test rollback",
                "tester",
            )
            .await
            .unwrap();

        assert_eq!(rolled_back.version, 4);
        assert_eq!(rolled_back.parameters.get("buy_threshold").unwrap().as_f64(), Some(1.1));

        let trail = manager.get_audit_trail("orderbook_skew", None, 10).await;
        assert_eq!(trail.len(), 4);
        assert!(trail[0].reason.as_ref().unwrap().starts_with("Rollback"));
    }

    #[tokio::test]
    async fn rollback_refuses_cross_strategy_audit_id() {
        let manager = manager();
        let mut params = HashMap::new();
        params.insert("buy_threshold".to_string(), ParameterValue::Float(1.3));
        params.insert("sell_threshold".to_string(), ParameterValue::Float(0.8));
        params.insert("min_spread_percent".to_string(), ParameterValue::Float(0.1));
        params.insert("top_levels".to_string(), ParameterValue::Int(5));

        manager
            .set_config("orderbook_skew", None, params, "tester", None, false)
            .await
            .unwrap();
        let trail = manager.get_audit_trail("orderbook_skew", None, 10).await;
        let foreign_audit_id = trail[0].id.clone();

        let result = manager
            .rollback_config(
                "trade_momentum",
                None,
                RollbackTarget::AuditId(foreign_audit_id),
                "attempted cross-strategy rollback",
                "tester",
            )
            .await;

        assert!(matches!(result, Err(PipelineError::NotFoundForStrategy)));
        let trade_momentum_trail = manager.get_audit_trail("trade_momentum", None, 10).await;
        assert!(trade_momentum_trail.is_empty());
    }

    #[tokio::test]
    async fn disconnected_store_fails_writes_with_store_unavailable() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.set_connected(false);
        let manager = StrategyConfigManager::new(store, Duration::from_secs(60));
        let mut params = HashMap::new();
        params.insert("buy_threshold".to_string(), ParameterValue::Float(1.3));
        params.insert("sell_threshold".to_string(), ParameterValue::Float(0.8));
        params.insert("min_spread_percent".to_string(), ParameterValue::Float(0.1));
        params.insert("top_levels".to_string(), ParameterValue::Int(5));

        let result = manager
            .set_config("orderbook_skew", None, params, "tester", None, false)
            .await;
        assert!(matches!(result, Err(PipelineError::StoreUnavailable)));
    }

    #[tokio::test]
    async fn unknown_parameter_is_rejected_without_mutation() {
        let manager = manager();
        let mut params = HashMap::new();
        params.insert("not_a_real_param".to_string(), ParameterValue::Float(1.0));

        let result = manager
            .set_config("orderbook_skew", None, params, "tester", None, false)
            .await;
        assert!(matches!(result, Err(PipelineError::Validation(_))));
        assert!(manager
            .get_audit_trail("orderbook_skew", None, 10)
            .await
            .is_empty());
    }
}
