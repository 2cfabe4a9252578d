// =============================================================================
// Document store — trait boundary plus an in-memory and a MongoDB implementation
// =============================================================================
//
// The driver beyond these documented operations (connection pooling, retry,
// TLS) is an external collaborator per SPEC_FULL.md §1 — this module only
// owns the operations the config manager actually calls.
// =============================================================================

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::{doc, Document};
use mongodb::Client;
use parking_lot::RwLock;

use super::model::{AuditAction, AuditRecord, StrategyConfig};

/// The three logical collections the config manager depends on, exposed as a
/// single trait so the manager is agnostic to the concrete driver.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn is_connected(&self) -> bool;

    async fn get_global_config(&self, strategy_id: &str) -> anyhow::Result<Option<StrategyConfig>>;
    async fn get_symbol_config(
        &self,
        strategy_id: &str,
        symbol: &str,
    ) -> anyhow::Result<Option<StrategyConfig>>;
    async fn upsert_global_config(&self, config: StrategyConfig) -> anyhow::Result<()>;
    async fn upsert_symbol_config(&self, config: StrategyConfig) -> anyhow::Result<()>;
    async fn delete_global_config(&self, strategy_id: &str) -> anyhow::Result<bool>;
    async fn delete_symbol_config(&self, strategy_id: &str, symbol: &str) -> anyhow::Result<bool>;
    async fn list_symbol_overrides(&self, strategy_id: &str) -> anyhow::Result<Vec<String>>;

    async fn create_audit_record(&self, record: AuditRecord) -> anyhow::Result<()>;
    async fn get_audit_trail(
        &self,
        strategy_id: &str,
        symbol: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<AuditRecord>>;
    async fn get_audit_record_by_id(&self, id: &str) -> anyhow::Result<Option<AuditRecord>>;
    async fn get_audit_record_by_version(
        &self,
        strategy_id: &str,
        version: u64,
        symbol: Option<&str>,
    ) -> anyhow::Result<Option<AuditRecord>>;
}

// =============================================================================
// In-memory implementation — used by tests and as a store-unavailable
// simulator (via `set_connected(false)`)
// =============================================================================

#[derive(Default)]
struct InMemoryState {
    global: HashMap<String, StrategyConfig>,
    symbol: HashMap<(String, String), StrategyConfig>,
    audit: Vec<AuditRecord>,
}

/// An in-process document store with no external dependency. This is the
/// non-Mongo arm of [`DocumentStore`], used throughout the test suite so
/// tests never require a live database.
pub struct InMemoryDocumentStore {
    state: RwLock<InMemoryState>,
    connected: RwLock<bool>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(InMemoryState::default()),
            connected: RwLock::new(true),
        }
    }

    /// Simulate store connectivity loss/recovery for error-path tests.
    pub fn set_connected(&self, connected: bool) {
        *self.connected.write() = connected;
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn is_connected(&self) -> bool {
        *self.connected.read()
    }

    async fn get_global_config(&self, strategy_id: &str) -> anyhow::Result<Option<StrategyConfig>> {
        Ok(self.state.read().global.get(strategy_id).cloned())
    }

    async fn get_symbol_config(
        &self,
        strategy_id: &str,
        symbol: &str,
    ) -> anyhow::Result<Option<StrategyConfig>> {
        Ok(self
            .state
            .read()
            .symbol
            .get(&(strategy_id.to_string(), symbol.to_string()))
            .cloned())
    }

    async fn upsert_global_config(&self, config: StrategyConfig) -> anyhow::Result<()> {
        if !self.is_connected().await {
            anyhow::bail!("store unavailable");
        }
        self.state
            .write()
            .global
            .insert(config.strategy_id.clone(), config);
        Ok(())
    }

    async fn upsert_symbol_config(&self, config: StrategyConfig) -> anyhow::Result<()> {
        if !self.is_connected().await {
            anyhow::bail!("store unavailable");
        }
        let symbol = config
            .symbol
            .clone()
            .ok_or_else(|| anyhow::anyhow!("symbol config missing symbol"))?;
        self.state
            .write()
            .symbol
            .insert((config.strategy_id.clone(), symbol), config);
        Ok(())
    }

    async fn delete_global_config(&self, strategy_id: &str) -> anyhow::Result<bool> {
        if !self.is_connected().await {
            anyhow::bail!("store unavailable");
        }
        Ok(self.state.write().global.remove(strategy_id).is_some())
    }

    async fn delete_symbol_config(&self, strategy_id: &str, symbol: &str) -> anyhow::Result<bool> {
        if !self.is_connected().await {
            anyhow::bail!("store unavailable");
        }
        Ok(self
            .state
            .write()
            .symbol
            .remove(&(strategy_id.to_string(), symbol.to_string()))
            .is_some())
    }

    async fn list_symbol_overrides(&self, strategy_id: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .state
            .read()
            .symbol
            .keys()
            .filter(|(sid, _)| sid == strategy_id)
            .map(|(_, sym)| sym.clone())
            .collect())
    }

    async fn create_audit_record(&self, record: AuditRecord) -> anyhow::Result<()> {
        if !self.is_connected().await {
            anyhow::bail!("store unavailable");
        }
        self.state.write().audit.push(record);
        Ok(())
    }

    async fn get_audit_trail(
        &self,
        strategy_id: &str,
        symbol: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<AuditRecord>> {
        let state = self.state.read();
        let mut matches: Vec<AuditRecord> = state
            .audit
            .iter()
            .filter(|r| r.strategy_id == strategy_id && r.symbol.as_deref() == symbol)
            .cloned()
            .collect();
        matches.reverse();
        matches.truncate(limit);
        Ok(matches)
    }

    async fn get_audit_record_by_id(&self, id: &str) -> anyhow::Result<Option<AuditRecord>> {
        Ok(self.state.read().audit.iter().find(|r| r.id == id).cloned())
    }

    async fn get_audit_record_by_version(
        &self,
        strategy_id: &str,
        version: u64,
        symbol: Option<&str>,
    ) -> anyhow::Result<Option<AuditRecord>> {
        // Chronological history, indexed 1-based by version number — matches
        // the reference implementation's `get_config_by_version`.
        let state = self.state.read();
        let mut history: Vec<&AuditRecord> = state
            .audit
            .iter()
            .filter(|r| r.strategy_id == strategy_id && r.symbol.as_deref() == symbol)
            .collect();
        history.sort_by_key(|r| r.changed_at);
        let idx = version.checked_sub(1).map(|v| v as usize);
        Ok(idx.and_then(|idx| history.get(idx)).map(|r| (*r).clone()))
    }
}

// =============================================================================
// MongoDB implementation
// =============================================================================

const GLOBAL_COLLECTION: &str = "strategy_config_global";
const SYMBOL_COLLECTION: &str = "strategy_config_symbol";
const AUDIT_COLLECTION: &str = "strategy_config_audit";

/// MongoDB-backed document store. Connection is established once at startup;
/// this type does not itself retry or reconnect (see SPEC_FULL.md §1 — the
/// driver's dial/reconnect behavior is an external collaborator).
pub struct MongoDocumentStore {
    client: Client,
    database: String,
}

impl MongoDocumentStore {
    pub async fn connect(uri: &str, database: &str) -> anyhow::Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        Ok(Self {
            client,
            database: database.to_string(),
        })
    }

    fn global_collection(&self) -> mongodb::Collection<Document> {
        self.client
            .database(&self.database)
            .collection(GLOBAL_COLLECTION)
    }

    fn symbol_collection(&self) -> mongodb::Collection<Document> {
        self.client
            .database(&self.database)
            .collection(SYMBOL_COLLECTION)
    }

    fn audit_collection(&self) -> mongodb::Collection<Document> {
        self.client
            .database(&self.database)
            .collection(AUDIT_COLLECTION)
    }
}

fn config_to_doc(config: &StrategyConfig) -> anyhow::Result<Document> {
    Ok(bson::to_document(config)?)
}

fn doc_to_config(doc: Document) -> anyhow::Result<StrategyConfig> {
    Ok(bson::from_document(doc)?)
}

fn record_to_doc(record: &AuditRecord) -> anyhow::Result<Document> {
    Ok(bson::to_document(record)?)
}

fn doc_to_record(doc: Document) -> anyhow::Result<AuditRecord> {
    Ok(bson::from_document(doc)?)
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn is_connected(&self) -> bool {
        self.client
            .database(&self.database)
            .run_command(doc! { "ping": 1 }, None)
            .await
            .is_ok()
    }

    async fn get_global_config(&self, strategy_id: &str) -> anyhow::Result<Option<StrategyConfig>> {
        let found = self
            .global_collection()
            .find_one(doc! { "strategy_id": strategy_id }, None)
            .await?;
        found.map(doc_to_config).transpose()
    }

    async fn get_symbol_config(
        &self,
        strategy_id: &str,
        symbol: &str,
    ) -> anyhow::Result<Option<StrategyConfig>> {
        let found = self
            .symbol_collection()
            .find_one(doc! { "strategy_id": strategy_id, "symbol": symbol }, None)
            .await?;
        found.map(doc_to_config).transpose()
    }

    async fn upsert_global_config(&self, config: StrategyConfig) -> anyhow::Result<()> {
        let filter = doc! { "strategy_id": &config.strategy_id };
        let document = config_to_doc(&config)?;
        self.global_collection()
            .replace_one(
                filter,
                document,
                mongodb::options::ReplaceOptions::builder()
                    .upsert(true)
                    .build(),
            )
            .await?;
        Ok(())
    }

    async fn upsert_symbol_config(&self, config: StrategyConfig) -> anyhow::Result<()> {
        let symbol = config
            .symbol
            .clone()
            .ok_or_else(|| anyhow::anyhow!("symbol config missing symbol"))?;
        let filter = doc! { "strategy_id": &config.strategy_id, "symbol": &symbol };
        let document = config_to_doc(&config)?;
        self.symbol_collection()
            .replace_one(
                filter,
                document,
                mongodb::options::ReplaceOptions::builder()
                    .upsert(true)
                    .build(),
            )
            .await?;
        Ok(())
    }

    async fn delete_global_config(&self, strategy_id: &str) -> anyhow::Result<bool> {
        let result = self
            .global_collection()
            .delete_one(doc! { "strategy_id": strategy_id }, None)
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn delete_symbol_config(&self, strategy_id: &str, symbol: &str) -> anyhow::Result<bool> {
        let result = self
            .symbol_collection()
            .delete_one(doc! { "strategy_id": strategy_id, "symbol": symbol }, None)
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn list_symbol_overrides(&self, strategy_id: &str) -> anyhow::Result<Vec<String>> {
        use futures_util::TryStreamExt;
        let mut cursor = self
            .symbol_collection()
            .find(doc! { "strategy_id": strategy_id }, None)
            .await?;
        let mut symbols = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            if let Ok(config) = doc_to_config(doc) {
                if let Some(symbol) = config.symbol {
                    symbols.push(symbol);
                }
            }
        }
        Ok(symbols)
    }

    async fn create_audit_record(&self, record: AuditRecord) -> anyhow::Result<()> {
        let document = record_to_doc(&record)?;
        self.audit_collection().insert_one(document, None).await?;
        Ok(())
    }

    async fn get_audit_trail(
        &self,
        strategy_id: &str,
        symbol: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<AuditRecord>> {
        use futures_util::TryStreamExt;
        let mut filter = doc! { "strategy_id": strategy_id };
        if let Some(symbol) = symbol {
            filter.insert("symbol", symbol);
        }
        let options = mongodb::options::FindOptions::builder()
            .sort(doc! { "changed_at": -1 })
            .limit(limit as i64)
            .build();
        let mut cursor = self.audit_collection().find(filter, options).await?;
        let mut records = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            records.push(doc_to_record(doc)?);
        }
        Ok(records)
    }

    async fn get_audit_record_by_id(&self, id: &str) -> anyhow::Result<Option<AuditRecord>> {
        let found = self
            .audit_collection()
            .find_one(doc! { "id": id }, None)
            .await?;
        found.map(doc_to_record).transpose()
    }

    async fn get_audit_record_by_version(
        &self,
        strategy_id: &str,
        version: u64,
        symbol: Option<&str>,
    ) -> anyhow::Result<Option<AuditRecord>> {
        use futures_util::TryStreamExt;
        let mut filter = doc! { "strategy_id": strategy_id };
        if let Some(symbol) = symbol {
            filter.insert("symbol", symbol);
        }
        let options = mongodb::options::FindOptions::builder()
            .sort(doc! { "changed_at": 1 })
            .build();
        let mut cursor = self.audit_collection().find(filter, options).await?;
        let mut history = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            history.push(doc_to_record(doc)?);
        }
        let idx = version.checked_sub(1).map(|v| v as usize);
        Ok(idx.and_then(|idx| history.into_iter().nth(idx)))
    }
}

#[allow(dead_code)]
fn _unused_action_exhaustiveness_check(action: AuditAction) -> &'static str {
    match action {
        AuditAction::Create => "CREATE",
        AuditAction::Update => "UPDATE",
        AuditAction::Delete => "DELETE",
    }
}
