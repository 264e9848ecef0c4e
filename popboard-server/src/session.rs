//! Connection sessions
//!
//! A session lives exactly as long as its transport connection. It moves
//! `Anonymous -> Identified -> Closed`; closing drops it from the registry and
//! leaves the score records untouched. Several sessions may be bound to the
//! same identity at once.

use chrono::{DateTime, Utc};
use popboard_common::events::ServerEvent;
use std::collections::HashMap;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

pub type SessionId = Uuid;

/// Lifecycle state of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no identity announced yet
    Anonymous,
    /// Bound to an identity
    Identified(String),
    /// Disconnected (or never existed)
    Closed,
}

struct SessionEntry {
    identity: Option<String>,
    outbox: mpsc::Sender<ServerEvent>,
    connected_at: DateTime<Utc>,
}

/// Live sessions keyed by id
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new anonymous session whose private events go to `outbox`
    pub async fn open(&self, outbox: mpsc::Sender<ServerEvent>) -> SessionId {
        let id = Uuid::new_v4();
        let entry = SessionEntry {
            identity: None,
            outbox,
            connected_at: Utc::now(),
        };
        self.sessions.write().await.insert(id, entry);
        id
    }

    /// Bind (or rebind) a session to an identity. False if the session is closed.
    pub async fn bind(&self, id: SessionId, identity: &str) -> bool {
        match self.sessions.write().await.get_mut(&id) {
            Some(entry) => {
                entry.identity = Some(identity.to_string());
                true
            }
            None => false,
        }
    }

    /// Bind only if the session has not announced an identity yet
    pub async fn bind_if_anonymous(&self, id: SessionId, identity: &str) {
        if let Some(entry) = self.sessions.write().await.get_mut(&id) {
            if entry.identity.is_none() {
                debug!("Session {} bound to '{}' by increment", id, identity);
                entry.identity = Some(identity.to_string());
            }
        }
    }

    pub async fn state(&self, id: SessionId) -> SessionState {
        match self.sessions.read().await.get(&id) {
            Some(SessionEntry { identity: Some(identity), .. }) => {
                SessionState::Identified(identity.clone())
            }
            Some(_) => SessionState::Anonymous,
            None => SessionState::Closed,
        }
    }

    /// Queue a private event for one session. False if it is gone.
    ///
    /// A session whose outbox is full is not reading its replies; it is
    /// closed rather than left to buffer without bound.
    pub async fn send_to(&self, id: SessionId, event: ServerEvent) -> bool {
        let result = match self.sessions.read().await.get(&id) {
            Some(entry) => entry.outbox.try_send(event),
            None => return false,
        };

        match result {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!("Session {} outbox full, dropping {} and closing", id, event.name());
                self.close(id).await;
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Remove a session, returning the identity it was bound to
    pub async fn close(&self, id: SessionId) -> Option<String> {
        let entry = self.sessions.write().await.remove(&id)?;
        let connected_for = Utc::now().signed_duration_since(entry.connected_at);
        debug!(
            "Session {} closed after {}s",
            id,
            connected_for.num_seconds()
        );
        entry.identity
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Number of live sessions bound to `identity`
    #[cfg(test)]
    pub async fn count_bound_to(&self, identity: &str) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|entry| entry.identity.as_deref() == Some(identity))
            .count()
    }
}

/// Receiving end of a session: private replies plus the global fan-out
pub struct Connection {
    id: SessionId,
    private: mpsc::Receiver<ServerEvent>,
    broadcasts: broadcast::Receiver<ServerEvent>,
}

impl Connection {
    pub(crate) fn new(
        id: SessionId,
        private: mpsc::Receiver<ServerEvent>,
        broadcasts: broadcast::Receiver<ServerEvent>,
    ) -> Self {
        Self {
            id,
            private,
            broadcasts,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Wait for the next event addressed to this session
    ///
    /// Private replies are preferred when both are ready. Returns None once
    /// the session has been closed or the fan-out hub is gone.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        loop {
            tokio::select! {
                biased;
                event = self.private.recv() => return event,
                result = self.broadcasts.recv() => match result {
                    Ok(event) => return Some(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Session {} lagged, skipped {} broadcast(s)", self.id, skipped);
                    }
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }

    /// Next already-queued event, without waiting
    pub fn try_recv(&mut self) -> Option<ServerEvent> {
        if let Ok(event) = self.private.try_recv() {
            return Some(event);
        }
        loop {
            match self.broadcasts.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("Session {} lagged, skipped {} broadcast(s)", self.id, skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}
