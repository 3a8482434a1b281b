//! In-memory storage backend for tests and offline runs

use crate::errors::CoreResult;
use crate::storage::Storage;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local storage. Durable only for the lifetime of the process;
/// the default backend when no Redis URL is configured.
pub struct MemoryStorage {
    records: RwLock<HashMap<String, HashMap<String, serde_json::Value>>>,
    logs: RwLock<HashMap<String, Vec<serde_json::Value>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            logs: RwLock::new(HashMap::new()),
        }
    }

    fn log_key(family: &str, id: &str) -> String {
        format!("{}:{}", family, id)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put(&self, family: &str, id: &str, value: serde_json::Value) -> CoreResult<()> {
        let mut records = self.records.write().await;
        records
            .entry(family.to_string())
            .or_default()
            .insert(id.to_string(), value);
        Ok(())
    }

    async fn get(&self, family: &str, id: &str) -> CoreResult<Option<serde_json::Value>> {
        let records = self.records.read().await;
        Ok(records.get(family).and_then(|f| f.get(id)).cloned())
    }

    async fn delete(&self, family: &str, id: &str) -> CoreResult<()> {
        let mut records = self.records.write().await;
        if let Some(f) = records.get_mut(family) {
            f.remove(id);
        }
        Ok(())
    }

    async fn list(&self, family: &str) -> CoreResult<Vec<serde_json::Value>> {
        let records = self.records.read().await;
        Ok(records
            .get(family)
            .map(|f| f.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn append(&self, family: &str, id: &str, entry: serde_json::Value) -> CoreResult<()> {
        let mut logs = self.logs.write().await;
        logs.entry(Self::log_key(family, id)).or_default().push(entry);
        Ok(())
    }

    async fn read_log(&self, family: &str, id: &str) -> CoreResult<Vec<serde_json::Value>> {
        let logs = self.logs.read().await;
        Ok(logs.get(&Self::log_key(family, id)).cloned().unwrap_or_default())
    }

    async fn health_check(&self) -> CoreResult<bool> {
        Ok(true)
    }
}
