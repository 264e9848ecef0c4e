//! Score synchronization engine
//!
//! Turns client events into store calls and pushes the results back out:
//! a private `score` reply to the requesting session and a `ranking`
//! snapshot to every session. The engine holds no score state of its own;
//! each snapshot is rebuilt from the store at broadcast time, and per-identity
//! serialization is left entirely to the store.
//!
//! Fan-outs are serialized: the store read and the broadcast happen under one
//! lock, so sessions never receive an older snapshot after a newer one.
//!
//! Storage failures are logged and the triggering request is dropped: no
//! reply, no broadcast, no retry.

use popboard_common::config::{ServerConfig, DEFAULT_FANOUT_CAPACITY, DEFAULT_OUTBOX_CAPACITY};
use popboard_common::events::ServerEvent;
use popboard_common::ranking::{RankedEntry, RankingSnapshot, Standing, DEFAULT_LEADERBOARD_SIZE};
use popboard_common::store::{lookup_score, LookupPolicy, SharedStore};
use popboard_common::Result;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::fanout::FanoutHub;
use crate::session::{Connection, SessionId, SessionRegistry, SessionState};

/// Engine tuning taken from the server configuration
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub lookup_policy: LookupPolicy,
    pub leaderboard_size: usize,
    pub fanout_capacity: usize,
    /// Private replies a session may have queued before it is closed
    pub outbox_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            lookup_policy: LookupPolicy::default(),
            leaderboard_size: DEFAULT_LEADERBOARD_SIZE,
            fanout_capacity: DEFAULT_FANOUT_CAPACITY,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }
}

impl From<&ServerConfig> for EngineOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            lookup_policy: config.lookup_policy,
            leaderboard_size: config.leaderboard_size,
            fanout_capacity: config.fanout_capacity,
            outbox_capacity: config.outbox_capacity,
        }
    }
}

pub struct SyncEngine {
    store: SharedStore,
    sessions: SessionRegistry,
    fanout: FanoutHub,
    /// Held across snapshot read and broadcast
    fanout_lock: Mutex<()>,
    options: EngineOptions,
}

impl SyncEngine {
    pub fn new(store: SharedStore, options: EngineOptions) -> Self {
        Self {
            store,
            sessions: SessionRegistry::new(),
            fanout: FanoutHub::new(options.fanout_capacity),
            fanout_lock: Mutex::new(()),
            options,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Open an anonymous session and queue the current ranking for it
    ///
    /// The session subscribes to the fan-out before the snapshot is read, so
    /// it cannot miss a mutation that lands in between. The snapshot is taken
    /// under the fan-out lock and is never older than a broadcast already sent.
    pub async fn connect(&self) -> Connection {
        let (tx, rx) = mpsc::channel(self.options.outbox_capacity);
        let broadcasts = self.fanout.subscribe();
        let id = self.sessions.open(tx).await;

        info!("Session {} connected ({} live)", id, self.sessions.len().await);

        let guard = self.fanout_lock.lock().await;
        match self.snapshot().await {
            Ok(snapshot) => {
                self.sessions
                    .send_to(id, ServerEvent::Ranking(snapshot.to_scoreboard()))
                    .await;
            }
            Err(e) => error!("Initial ranking for session {} unavailable: {}", id, e),
        }
        drop(guard);

        Connection::new(id, rx, broadcasts)
    }

    /// Bind a session to `identity`, reply with its score, then fan out
    ///
    /// Creates a zero record for a new identity. Repeating it never changes
    /// an existing score. Returns the score sent, or None when the request
    /// was ignored or dropped.
    pub async fn announce(&self, session: SessionId, identity: &str) -> Option<u64> {
        if identity.is_empty() {
            debug!("Session {} announced an empty identity, ignoring", session);
            return None;
        }

        let score = match self.store.ensure_and_get_score(identity).await {
            Ok(score) => score,
            Err(e) => {
                error!("Announce '{}' dropped: {}", identity, e);
                return None;
            }
        };

        if !self.sessions.bind(session, identity).await {
            debug!("Session {} closed before announce of '{}' completed", session, identity);
        }
        info!("Session {} identified as '{}' (score {})", session, identity, score);

        self.sessions.send_to(session, ServerEvent::Score(score)).await;
        self.fan_out().await;
        Some(score)
    }

    /// Add one point to `identity`, reply with the new score, then fan out
    ///
    /// An increment from a session that never announced is still applied and
    /// binds the session. An empty identity is ignored. The store write is
    /// kept even if the session disconnects before the reply goes out.
    pub async fn increment(&self, session: SessionId, identity: &str) -> Option<u64> {
        if identity.is_empty() {
            debug!("Session {} sent increment without identity, ignoring", session);
            return None;
        }

        let score = match self.store.increment_and_get(identity).await {
            Ok(score) => score,
            Err(e) => {
                error!("Increment for '{}' dropped: {}", identity, e);
                return None;
            }
        };

        self.sessions.bind_if_anonymous(session, identity).await;
        debug!("'{}' incremented to {}", identity, score);

        if !self.sessions.send_to(session, ServerEvent::Score(score)).await {
            debug!("Session {} gone before score reply for '{}'", session, identity);
        }
        self.fan_out().await;
        Some(score)
    }

    /// Tear a session down. No store mutation, no broadcast.
    pub async fn disconnect(&self, session: SessionId) {
        match self.sessions.close(session).await {
            Some(identity) => info!("Session {} ('{}') disconnected", session, identity),
            None => info!("Session {} disconnected", session),
        }
    }

    /// Rebuild the ranking from the store and deliver it to every session
    ///
    /// Returns the number of sessions reached.
    pub async fn fan_out(&self) -> usize {
        let _guard = self.fanout_lock.lock().await;

        let snapshot = match self.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Ranking fan-out skipped: {}", e);
                return 0;
            }
        };

        if let Some(leader) = snapshot.leader() {
            debug!(
                "Ranking: {} players, leader '{}' with {}",
                snapshot.len(),
                leader.identity,
                leader.score
            );
        }

        self.fanout.broadcast(ServerEvent::Ranking(snapshot.to_scoreboard()))
    }

    /// Fresh ranking of every stored record
    pub async fn snapshot(&self) -> Result<RankingSnapshot> {
        let records = self.store.list_all().await?;
        Ok(RankingSnapshot::from_records(records))
    }

    /// Top-N leaderboard projection
    pub async fn leaderboard(&self) -> Result<Vec<RankedEntry>> {
        Ok(self.snapshot().await?.top(self.options.leaderboard_size))
    }

    /// Score and rank of one identity within the whole field
    ///
    /// Under [`LookupPolicy::Upsert`] an unknown identity is stored with score
    /// 0 first and therefore ranks; otherwise it reports rank unknown.
    pub async fn standing(&self, identity: &str) -> Result<Standing> {
        self.apply_lookup(identity).await?;
        Ok(self.snapshot().await?.standing(identity))
    }

    /// One snapshot plus the standing of `identity` taken from that same
    /// snapshot, so both agree on the field size
    pub async fn ranking_for(
        &self,
        identity: Option<&str>,
    ) -> Result<(RankingSnapshot, Option<Standing>)> {
        if let Some(identity) = identity {
            self.apply_lookup(identity).await?;
        }
        let snapshot = self.snapshot().await?;
        let standing = identity.map(|identity| snapshot.standing(identity));
        Ok((snapshot, standing))
    }

    async fn apply_lookup(&self, identity: &str) -> Result<u64> {
        lookup_score(self.store.as_ref(), identity, self.options.lookup_policy).await
    }

    pub async fn session_state(&self, session: SessionId) -> SessionState {
        self.sessions.state(session).await
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.len().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use popboard_common::store::{MemoryScoreStore, ScoreRecord, ScoreStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Memory store that counts full-table reads
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryScoreStore,
        list_calls: AtomicUsize,
    }

    #[async_trait]
    impl ScoreStore for CountingStore {
        async fn get_score(&self, identity: &str) -> Result<u64> {
            self.inner.get_score(identity).await
        }

        async fn ensure_and_get_score(&self, identity: &str) -> Result<u64> {
            self.inner.ensure_and_get_score(identity).await
        }

        async fn increment_and_get(&self, identity: &str) -> Result<u64> {
            self.inner.increment_and_get(identity).await
        }

        async fn list_all(&self) -> Result<Vec<ScoreRecord>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.list_all().await
        }

        fn backend_name(&self) -> &'static str {
            "counting"
        }
    }

    fn engine_with(records: Vec<ScoreRecord>) -> SyncEngine {
        SyncEngine::new(
            Arc::new(MemoryScoreStore::with_records(records)),
            EngineOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_connect_sends_current_ranking() {
        let engine = engine_with(vec![ScoreRecord::new("alice", 2)]);
        let mut conn = engine.connect().await;

        match conn.try_recv() {
            Some(ServerEvent::Ranking(board)) => assert_eq!(board["alice"].score, 2),
            other => panic!("expected ranking, got {:?}", other),
        }
        assert_eq!(engine.session_state(conn.id()).await, SessionState::Anonymous);
    }

    #[tokio::test]
    async fn test_empty_identity_is_ignored() {
        let engine = engine_with(Vec::new());
        let mut conn = engine.connect().await;
        conn.try_recv();

        assert_eq!(engine.increment(conn.id(), "").await, None);
        assert_eq!(engine.announce(conn.id(), "").await, None);
        assert!(conn.try_recv().is_none());
        assert!(engine.store().list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_standing_follows_lookup_policy() {
        let store = Arc::new(MemoryScoreStore::with_records(vec![ScoreRecord::new("alice", 1)]));

        let read_only = SyncEngine::new(store.clone(), EngineOptions::default());
        let standing = read_only.standing("nobody").await.unwrap();
        assert_eq!(standing.rank, None);
        assert_eq!(standing.score, 0);

        let upsert = SyncEngine::new(
            store,
            EngineOptions {
                lookup_policy: LookupPolicy::Upsert,
                ..Default::default()
            },
        );
        let standing = upsert.standing("nobody").await.unwrap();
        assert_eq!(standing.rank, Some(2));
        assert_eq!(standing.total, 2);
    }

    #[tokio::test]
    async fn test_leaderboard_uses_configured_size() {
        let records: Vec<ScoreRecord> =
            (0..6).map(|i| ScoreRecord::new(format!("p{}", i), i)).collect();
        let engine = SyncEngine::new(
            Arc::new(MemoryScoreStore::with_records(records)),
            EngineOptions {
                leaderboard_size: 3,
                ..Default::default()
            },
        );

        let top = engine.leaderboard().await.unwrap();
        let names: Vec<&str> = top.iter().map(|e| e.identity.as_str()).collect();
        assert_eq!(names, vec!["p5", "p4", "p3"]);
    }

    #[tokio::test]
    async fn test_ranking_for_reads_the_store_once() {
        let store = Arc::new(CountingStore::default());
        store.increment_and_get("alice").await.unwrap();
        let engine = SyncEngine::new(
            store.clone(),
            EngineOptions {
                lookup_policy: LookupPolicy::Upsert,
                ..Default::default()
            },
        );

        let (snapshot, standing) = engine.ranking_for(Some("bob")).await.unwrap();
        let standing = standing.unwrap();

        assert_eq!(store.list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(standing.total, snapshot.len());
        assert_eq!(standing.rank, Some(2));

        let (_, none) = engine.ranking_for(None).await.unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_connect_uses_configured_outbox() {
        let engine = SyncEngine::new(
            Arc::new(MemoryScoreStore::new()),
            EngineOptions {
                outbox_capacity: 2,
                ..Default::default()
            },
        );
        let conn = engine.connect().await;

        // The initial ranking fills one slot; a reader that never drains is
        // closed once the outbox overflows
        assert_eq!(engine.announce(conn.id(), "alice").await, Some(0));
        assert_eq!(engine.increment(conn.id(), "alice").await, Some(1));
        assert_eq!(engine.session_state(conn.id()).await, SessionState::Closed);
        assert_eq!(engine.store().get_score("alice").await.unwrap(), 1);
    }
}
