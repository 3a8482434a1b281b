//! Redis-backed storage

use crate::errors::{CoreError, CoreResult};
use crate::storage::Storage;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client as RedisClient};

/// Durable storage over Redis: records as JSON strings under prefixed
/// keys, logs as Redis lists.
#[derive(Clone)]
pub struct RedisStorage {
    connection_manager: ConnectionManager,
    key_prefix: String,
}

impl RedisStorage {
    pub async fn new(redis_url: &str, key_prefix: Option<String>) -> CoreResult<Self> {
        let client = RedisClient::open(redis_url)
            .map_err(|e| CoreError::transient_io(format!("failed to create Redis client: {}", e)))?;

        let connection_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| CoreError::transient_io(format!("failed to connect to Redis: {}", e)))?;

        Ok(Self {
            connection_manager,
            key_prefix: key_prefix.unwrap_or_else(|| "tierdesk:".to_string()),
        })
    }

    fn record_key(&self, family: &str, id: &str) -> String {
        format!("{}{}:{}", self.key_prefix, family, id)
    }

    fn log_key(&self, family: &str, id: &str) -> String {
        format!("{}{}:log:{}", self.key_prefix, family, id)
    }

    fn family_pattern(&self, family: &str) -> String {
        format!("{}{}:*", self.key_prefix, family)
    }

    fn log_prefix(&self, family: &str) -> String {
        format!("{}{}:log:", self.key_prefix, family)
    }
}

#[async_trait]
impl Storage for RedisStorage {
    async fn put(&self, family: &str, id: &str, value: serde_json::Value) -> CoreResult<()> {
        let mut conn = self.connection_manager.clone();
        let data = serde_json::to_string(&value)?;
        conn.set::<_, _, ()>(self.record_key(family, id), data)
            .await
            .map_err(|e| CoreError::transient_io(format!("failed to store record: {}", e)))?;
        Ok(())
    }

    async fn get(&self, family: &str, id: &str) -> CoreResult<Option<serde_json::Value>> {
        let mut conn = self.connection_manager.clone();
        let data: Option<String> = conn
            .get(self.record_key(family, id))
            .await
            .map_err(|e| CoreError::transient_io(format!("failed to read record: {}", e)))?;
        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, family: &str, id: &str) -> CoreResult<()> {
        let mut conn = self.connection_manager.clone();
        conn.del::<_, ()>(self.record_key(family, id))
            .await
            .map_err(|e| CoreError::transient_io(format!("failed to delete record: {}", e)))?;
        Ok(())
    }

    async fn list(&self, family: &str) -> CoreResult<Vec<serde_json::Value>> {
        let mut conn = self.connection_manager.clone();
        let keys: Vec<String> = conn
            .keys(self.family_pattern(family))
            .await
            .map_err(|e| CoreError::transient_io(format!("failed to list records: {}", e)))?;

        // Log lists share the family prefix; skip them.
        let log_prefix = self.log_prefix(family);
        let mut records = Vec::new();
        for key in keys.into_iter().filter(|k| !k.starts_with(&log_prefix)) {
            let data: Option<String> = conn
                .get(&key)
                .await
                .map_err(|e| CoreError::transient_io(format!("failed to read record: {}", e)))?;
            if let Some(json) = data {
                records.push(serde_json::from_str(&json)?);
            }
        }
        Ok(records)
    }

    async fn append(&self, family: &str, id: &str, entry: serde_json::Value) -> CoreResult<()> {
        let mut conn = self.connection_manager.clone();
        let data = serde_json::to_string(&entry)?;
        conn.rpush::<_, _, ()>(self.log_key(family, id), data)
            .await
            .map_err(|e| CoreError::transient_io(format!("failed to append to log: {}", e)))?;
        Ok(())
    }

    async fn read_log(&self, family: &str, id: &str) -> CoreResult<Vec<serde_json::Value>> {
        let mut conn = self.connection_manager.clone();
        let entries: Vec<String> = conn
            .lrange(self.log_key(family, id), 0, -1)
            .await
            .map_err(|e| CoreError::transient_io(format!("failed to read log: {}", e)))?;
        entries
            .into_iter()
            .map(|json| serde_json::from_str(&json).map_err(CoreError::from))
            .collect()
    }

    async fn health_check(&self) -> CoreResult<bool> {
        let mut conn = self.connection_manager.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| CoreError::transient_io(format!("ping failed: {}", e)))?;
        Ok(pong == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        // Key construction is pure; exercised without a live server.
        let prefix = "tierdesk:".to_string();
        assert_eq!(
            format!("{}{}:{}", prefix, "session", "sess_1"),
            "tierdesk:session:sess_1"
        );
        assert_eq!(
            format!("{}{}:log:{}", prefix, "messages", "sess_1"),
            "tierdesk:messages:log:sess_1"
        );
    }
}
