//! Wire events exchanged over a client connection
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.
//! Client frames carry a handle string; server frames carry either the
//! requester's authoritative score or the full scoreboard.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::{Error, Result};

/// Score entry inside a scoreboard broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerScore {
    pub score: u64,
}

/// Full scoreboard as broadcast to clients: identity -> { score }
pub type Scoreboard = BTreeMap<String, PlayerScore>;

/// Events sent by clients
///
/// The payload is passed through untrimmed and unvalidated; a missing or
/// null payload decodes as an empty handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Bind the connection to a handle and fetch its score
    Announce(String),
    /// Add one point to a handle
    Increment(String),
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

impl ClientEvent {
    /// Decode a client text frame
    ///
    /// Accepts the legacy names `initUser` and `pop` as well.
    pub fn decode(text: &str) -> Result<Self> {
        let frame: RawFrame = serde_json::from_str(text)
            .map_err(|e| Error::Protocol(format!("malformed frame: {}", e)))?;

        let handle = match frame.data {
            Value::String(handle) => handle,
            Value::Null => String::new(),
            other => {
                return Err(Error::Protocol(format!(
                    "'{}' payload must be a string, got {}",
                    frame.event, other
                )))
            }
        };

        match frame.event.as_str() {
            "announce" | "initUser" => Ok(ClientEvent::Announce(handle)),
            "increment" | "pop" => Ok(ClientEvent::Increment(handle)),
            unknown => Err(Error::Protocol(format!("unknown event '{}'", unknown))),
        }
    }

    #[cfg(test)]
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Handle carried by the event
    pub fn identity(&self) -> &str {
        match self {
            ClientEvent::Announce(identity) | ClientEvent::Increment(identity) => identity,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Announce(_) => "announce",
            ClientEvent::Increment(_) => "increment",
        }
    }
}

/// Events sent by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Private reply: authoritative score of the requesting handle
    Score(u64),
    /// Broadcast: every known handle and its score
    Ranking(Scoreboard),
}

impl ServerEvent {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    #[cfg(test)]
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Protocol(format!("malformed frame: {}", e)))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Score(_) => "score",
            ServerEvent::Ranking(_) => "ranking",
        }
    }
}
