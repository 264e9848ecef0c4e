//! JSON file score store
//!
//! Persists `{ "players": { "<identity>": { "score": N } } }`, rewritten in
//! full on every mutation. All mutations go through one async mutex, so the
//! file has a single writer, and each rewrite lands via temp file + rename so
//! a crash never leaves a half-written document behind.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{ScoreRecord, ScoreStore};
use crate::{Error, Result};

/// On-disk document layout
#[derive(Debug, Default, Serialize, Deserialize)]
struct ScoreDocument {
    #[serde(default)]
    players: BTreeMap<String, PlayerEntry>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct PlayerEntry {
    score: u64,
}

pub struct JsonFileStore {
    path: PathBuf,
    players: Mutex<BTreeMap<String, u64>>,
}

impl JsonFileStore {
    /// Load the document at `path`, starting empty if the file does not exist
    pub async fn open(path: &Path) -> Result<Self> {
        let players = match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let document: ScoreDocument = serde_json::from_str(&content)?;
                info!(
                    "Loaded {} player(s) from {}",
                    document.players.len(),
                    path.display()
                );
                document
                    .players
                    .into_iter()
                    .map(|(identity, entry)| (identity, entry.score))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Score file {} not found, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: path.to_path_buf(),
            players: Mutex::new(players),
        })
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the whole document. Caller holds the players lock.
    async fn persist(&self, players: &BTreeMap<String, u64>) -> Result<()> {
        let document = ScoreDocument {
            players: players
                .iter()
                .map(|(identity, score)| (identity.clone(), PlayerEntry { score: *score }))
                .collect(),
        };
        let json = serde_json::to_string_pretty(&document)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut tmp_path = self.path.clone().into_os_string();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);

        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        debug!("Wrote {} player(s) to {}", players.len(), self.path.display());
        Ok(())
    }

    /// Set `identity` to `score` and persist, restoring the previous value if
    /// the write fails
    async fn commit(
        &self,
        players: &mut BTreeMap<String, u64>,
        identity: &str,
        score: u64,
    ) -> Result<()> {
        let previous = players.insert(identity.to_string(), score);

        if let Err(e) = self.persist(players).await {
            match previous {
                Some(old) => players.insert(identity.to_string(), old),
                None => players.remove(identity),
            };
            return Err(e);
        }

        Ok(())
    }
}

#[async_trait]
impl ScoreStore for JsonFileStore {
    async fn get_score(&self, identity: &str) -> Result<u64> {
        Ok(self.players.lock().await.get(identity).copied().unwrap_or(0))
    }

    async fn ensure_and_get_score(&self, identity: &str) -> Result<u64> {
        let mut players = self.players.lock().await;

        if let Some(score) = players.get(identity) {
            return Ok(*score);
        }

        self.commit(&mut players, identity, 0).await?;
        Ok(0)
    }

    async fn increment_and_get(&self, identity: &str) -> Result<u64> {
        let mut players = self.players.lock().await;

        let current = players.get(identity).copied().unwrap_or(0);
        let next = current
            .checked_add(1)
            .ok_or_else(|| Error::Internal(format!("score overflow for '{}'", identity)))?;

        self.commit(&mut players, identity, next).await?;
        Ok(next)
    }

    async fn list_all(&self) -> Result<Vec<ScoreRecord>> {
        let players = self.players.lock().await;
        Ok(players
            .iter()
            .map(|(identity, score)| ScoreRecord::new(identity.clone(), *score))
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "json-file"
    }
}
