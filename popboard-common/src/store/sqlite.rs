//! SQLite score store
//!
//! One `players` row per identity. Increments run as a single
//! `INSERT .. ON CONFLICT DO UPDATE .. RETURNING` statement, so the
//! read-modify-write happens inside SQLite's write lock and concurrent
//! callers cannot observe the same pre-increment value.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use super::{ScoreRecord, ScoreStore};
use crate::{Error, Result};

/// Busy timeout applied to every connection
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

pub struct SqliteScoreStore {
    pool: SqlitePool,
}

impl SqliteScoreStore {
    /// Connect to `url` (e.g. `sqlite://scores.db`), creating the database
    /// file and schema when missing
    pub async fn connect(url: &str) -> Result<Self> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");

        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);
        if !in_memory {
            // WAL lets full-table reads proceed while an increment holds the writer
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Each connection to an in-memory database sees its own empty database,
        // and closing the only one discards every score
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(8)
        };

        let pool = pool_options.connect_with(options).await?;

        info!("Connected to score database: {}", url);
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, creating the schema if needed
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        create_players_table(&pool).await?;
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn create_players_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS players (
            username TEXT PRIMARY KEY NOT NULL,
            score INTEGER NOT NULL DEFAULT 0 CHECK (score >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn to_score(identity: &str, raw: i64) -> Result<u64> {
    u64::try_from(raw)
        .map_err(|_| Error::Internal(format!("negative score {} stored for '{}'", raw, identity)))
}

#[async_trait]
impl ScoreStore for SqliteScoreStore {
    async fn get_score(&self, identity: &str) -> Result<u64> {
        let score: Option<i64> = sqlx::query_scalar("SELECT score FROM players WHERE username = ?")
            .bind(identity)
            .fetch_optional(&self.pool)
            .await?;

        match score {
            Some(raw) => to_score(identity, raw),
            None => Ok(0),
        }
    }

    async fn ensure_and_get_score(&self, identity: &str) -> Result<u64> {
        // The no-op update makes RETURNING yield the existing row on conflict
        let score: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO players (username, score) VALUES (?, 0)
            ON CONFLICT(username) DO UPDATE SET score = score
            RETURNING score
            "#,
        )
        .bind(identity)
        .fetch_one(&self.pool)
        .await?;

        to_score(identity, score)
    }

    async fn increment_and_get(&self, identity: &str) -> Result<u64> {
        let score: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO players (username, score) VALUES (?, 1)
            ON CONFLICT(username) DO UPDATE SET score = score + 1
            RETURNING score
            "#,
        )
        .bind(identity)
        .fetch_one(&self.pool)
        .await?;

        to_score(identity, score)
    }

    async fn list_all(&self) -> Result<Vec<ScoreRecord>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT username, score FROM players ORDER BY username")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(identity, raw)| {
                let score = to_score(&identity, raw)?;
                Ok(ScoreRecord::new(identity, score))
            })
            .collect()
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
