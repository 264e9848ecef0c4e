//! Fan-out hub delivering one event to every live session

use popboard_common::events::ServerEvent;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Broadcast side of the session channel pair
///
/// Each session holds a receiver; a slow session that falls more than
/// `capacity` events behind skips the oldest ones. Only complete ranking
/// snapshots travel here, so the next one it receives supersedes anything
/// it missed.
#[derive(Clone)]
pub struct FanoutHub {
    tx: broadcast::Sender<ServerEvent>,
}

impl FanoutHub {
    /// Create a new hub buffering up to `capacity` events per receiver
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        info!("Fan-out hub initialized with capacity {}", capacity);
        Self { tx }
    }

    /// Deliver an event to all subscribed sessions
    ///
    /// Returns the number of receivers reached; zero when nobody is connected.
    pub fn broadcast(&self, event: ServerEvent) -> usize {
        match self.tx.send(event) {
            Ok(count) => {
                debug!("Broadcast event to {} sessions", count);
                count
            }
            Err(_) => 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
