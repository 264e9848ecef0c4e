//! Score store contract and backends
//!
//! The store is the only shared mutable state in the service and its single
//! serialization point. Every backend guarantees that concurrent increments
//! on the same identity are applied one after another, so no update is lost.
//! Callers add no locking of their own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::config::StorageConfig;
use crate::Result;

mod file;
mod memory;
mod sqlite;

pub use file::JsonFileStore;
pub use memory::MemoryScoreStore;
pub use sqlite::SqliteScoreStore;

/// One persisted score, keyed by identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub identity: String,
    pub score: u64,
}

impl ScoreRecord {
    pub fn new(identity: impl Into<String>, score: u64) -> Self {
        Self {
            identity: identity.into(),
            score,
        }
    }
}

/// Backend-agnostic score storage
///
/// Any operation may fail with a storage error (see
/// [`crate::Error::is_storage_unavailable`]). A failed operation leaves the
/// stored state untouched.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Current score, or 0 when the identity has no record. Never creates one.
    async fn get_score(&self, identity: &str) -> Result<u64>;

    /// Create a zero record if absent and return the current score
    async fn ensure_and_get_score(&self, identity: &str) -> Result<u64>;

    /// Atomically add 1 (creating the record at 1 if absent) and return the
    /// post-increment value
    async fn increment_and_get(&self, identity: &str) -> Result<u64>;

    /// Every known record. Each record reflects whole increments only.
    async fn list_all(&self) -> Result<Vec<ScoreRecord>>;

    /// Short backend name for logs and the health endpoint
    fn backend_name(&self) -> &'static str;
}

/// Store handle shared between the engine and HTTP handlers
pub type SharedStore = Arc<dyn ScoreStore>;

/// Whether a plain score lookup materializes a zero record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupPolicy {
    /// Unknown identities read as 0 and stay absent from rankings
    #[default]
    ReadOnly,
    /// Unknown identities are stored with score 0 on first lookup
    Upsert,
}

/// Look up a score, applying the configured lookup policy
pub async fn lookup_score(
    store: &dyn ScoreStore,
    identity: &str,
    policy: LookupPolicy,
) -> Result<u64> {
    match policy {
        LookupPolicy::ReadOnly => store.get_score(identity).await,
        LookupPolicy::Upsert => store.ensure_and_get_score(identity).await,
    }
}

/// Open the backend selected by configuration
///
/// The two durable backends are exclusive deployment choices; a failure to
/// open the configured one is returned, never papered over with the other.
pub async fn open(config: &StorageConfig) -> Result<SharedStore> {
    let store: SharedStore = match config {
        StorageConfig::Sqlite { url } => Arc::new(SqliteScoreStore::connect(url).await?),
        StorageConfig::File { path } => Arc::new(JsonFileStore::open(path).await?),
        StorageConfig::Memory => Arc::new(MemoryScoreStore::new()),
    };

    info!("Score store ready ({} backend)", store.backend_name());
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_policy_read_only_does_not_create() {
        let store = MemoryScoreStore::new();

        let score = lookup_score(&store, "nobody", LookupPolicy::ReadOnly).await.unwrap();
        assert_eq!(score, 0);
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_policy_upsert_creates_zero_record() {
        let store = MemoryScoreStore::new();

        let score = lookup_score(&store, "nobody", LookupPolicy::Upsert).await.unwrap();
        assert_eq!(score, 0);
        assert_eq!(
            store.list_all().await.unwrap(),
            vec![ScoreRecord::new("nobody", 0)]
        );
    }

    #[tokio::test]
    async fn test_open_memory_backend() {
        let store = open(&StorageConfig::Memory).await.unwrap();
        assert_eq!(store.backend_name(), "memory");
        assert_eq!(store.increment_and_get("alice").await.unwrap(), 1);
    }
}
