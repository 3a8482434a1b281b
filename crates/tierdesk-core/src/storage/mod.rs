//! Persistence seam: key-value records plus per-record append-only logs
//!
//! Sessions, customer profiles and evaluations are durable key-value
//! records by id; messages are an append-only log per session. The core
//! does not assume any particular store; backends implement this trait.

mod memory;
mod redis_store;

pub use memory::MemoryStorage;
pub use redis_store::RedisStorage;

use crate::errors::CoreResult;
use async_trait::async_trait;

/// Record families used by the engine
pub mod family {
    pub const SESSION: &str = "session";
    pub const PROFILE: &str = "profile";
    pub const EVALUATION: &str = "evaluation";
    pub const MESSAGES: &str = "messages";
}

/// Minimal key-value plus append-log interface.
///
/// Failures are surfaced as [`crate::CoreError::TransientIo`]; callers
/// treat them as retryable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store or replace a record.
    async fn put(&self, family: &str, id: &str, value: serde_json::Value) -> CoreResult<()>;

    /// Fetch a record.
    async fn get(&self, family: &str, id: &str) -> CoreResult<Option<serde_json::Value>>;

    /// Delete a record; deleting a missing record is not an error.
    async fn delete(&self, family: &str, id: &str) -> CoreResult<()>;

    /// All records in a family, in unspecified order.
    async fn list(&self, family: &str) -> CoreResult<Vec<serde_json::Value>>;

    /// Append an entry to a record's log.
    async fn append(&self, family: &str, id: &str, entry: serde_json::Value) -> CoreResult<()>;

    /// Read a record's log in append order.
    async fn read_log(&self, family: &str, id: &str) -> CoreResult<Vec<serde_json::Value>>;

    /// Backend reachability check.
    async fn health_check(&self) -> CoreResult<bool>;
}
