//! WebSocket transport
//!
//! One socket is one session. Inbound text frames are decoded, their handle
//! validated, and handed to the engine one at a time, so a connection's
//! events are applied in arrival order. A separate writer task forwards the
//! session's private replies and the shared fan-out to the socket.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use popboard_common::events::ClientEvent;
use popboard_common::Identity;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::engine::SyncEngine;
use crate::session::SessionId;
use crate::AppState;

/// GET /ws - upgrade to the score protocol
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.engine))
}

async fn handle_socket(socket: WebSocket, engine: Arc<SyncEngine>) {
    let mut connection = engine.connect().await;
    let session = connection.id();
    let (mut sink, mut stream) = socket.split();

    // Ends when the socket stops accepting frames or the session is closed
    // from the engine side (outbox overflow)
    let mut writer = tokio::spawn(async move {
        while let Some(event) = connection.recv().await {
            let text = match event.encode() {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode {} for session {}: {}", event.name(), session, e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Each frame is fully handled before the next is read; a disconnect
    // therefore never interrupts a store write already under way.
    loop {
        tokio::select! {
            _ = &mut writer => {
                debug!("Session {} writer finished", session);
                break;
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    dispatch_frame(&engine, session, &text).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Session {} socket error: {}", session, e);
                    break;
                }
            },
        }
    }

    writer.abort();
    engine.disconnect(session).await;
}

/// Decode one client frame, validate its handle, and apply it
///
/// Malformed frames and invalid handles are dropped with a warning; the
/// protocol has no error event. An empty handle is passed on for the engine
/// to ignore. Returns the score the engine replied with, if any.
pub async fn dispatch_frame(engine: &SyncEngine, session: SessionId, text: &str) -> Option<u64> {
    let event = match ClientEvent::decode(text) {
        Ok(event) => event,
        Err(e) => {
            warn!("Session {} sent unusable frame: {}", session, e);
            return None;
        }
    };

    let raw = event.identity();
    let identity = if raw.is_empty() {
        String::new()
    } else {
        match Identity::parse(raw) {
            Ok(identity) => identity.into_inner(),
            Err(e) => {
                warn!("Session {} {} rejected: {}", session, event.name(), e);
                return None;
            }
        }
    };

    match event {
        ClientEvent::Announce(_) => engine.announce(session, &identity).await,
        ClientEvent::Increment(_) => engine.increment(session, &identity).await,
    }
}
