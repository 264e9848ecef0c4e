//! In-memory score store
//!
//! Not durable. Used for tests and `--in-memory` deployments; every operation
//! runs under one mutex, which also makes increments atomic.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{ScoreRecord, ScoreStore};
use crate::{Error, Result};

#[derive(Debug, Default)]
pub struct MemoryScoreStore {
    players: Mutex<HashMap<String, u64>>,
}

impl MemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with existing scores
    pub fn with_records(records: impl IntoIterator<Item = ScoreRecord>) -> Self {
        let players = records
            .into_iter()
            .map(|record| (record.identity, record.score))
            .collect();
        Self {
            players: Mutex::new(players),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, u64>>> {
        self.players
            .lock()
            .map_err(|_| Error::Internal("score table mutex poisoned".to_string()))
    }
}

#[async_trait]
impl ScoreStore for MemoryScoreStore {
    async fn get_score(&self, identity: &str) -> Result<u64> {
        Ok(self.lock()?.get(identity).copied().unwrap_or(0))
    }

    async fn ensure_and_get_score(&self, identity: &str) -> Result<u64> {
        let mut players = self.lock()?;
        Ok(*players.entry(identity.to_string()).or_insert(0))
    }

    async fn increment_and_get(&self, identity: &str) -> Result<u64> {
        let mut players = self.lock()?;
        let score = players.entry(identity.to_string()).or_insert(0);
        *score = score
            .checked_add(1)
            .ok_or_else(|| Error::Internal(format!("score overflow for '{}'", identity)))?;
        Ok(*score)
    }

    async fn list_all(&self) -> Result<Vec<ScoreRecord>> {
        let players = self.lock()?;
        Ok(players
            .iter()
            .map(|(identity, score)| ScoreRecord::new(identity.clone(), *score))
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
