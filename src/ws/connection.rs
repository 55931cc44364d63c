//! WebSocket connection state machine.
//!
//! Each connection starts `Unauthenticated`. A valid `authenticate` binds
//! it in the [`crate::domain::SessionRegistry`], after which location and
//! voice events are accepted; before that they are dropped silently. The
//! binding, not a local flag, is the source of truth: an eviction by a
//! newer connection for the same user returns this one to
//! `Unauthenticated`.

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::messages::ClientEvent;
use crate::app_state::AppState;
use crate::domain::{ConnectionId, EventSender, ServerEvent, TriggerType};
use crate::error::SafeguardError;
use crate::service::PhraseVerification;

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads client events and answers the ones that warrant a reply.
/// - Forwards events queued for the bound user.
/// - Closes on client close, transport error, or registry shutdown, and
///   always unbinds on the way out.
pub async fn run_connection(socket: WebSocket, state: AppState) {
    let connection = ConnectionId::new();
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(state.connection_buffer);
    let mut shutdown = state.registry.shutdown_signal();
    let (mut ws_tx, mut ws_rx) = socket.split();
    tracing::debug!(%connection, "ws connection opened");

    if *shutdown.borrow() {
        let _ = ws_tx.send(Message::Close(None)).await;
        return;
    }

    loop {
        tokio::select! {
            // Incoming frame from the client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_text(&state, connection, &tx, text.as_str()).await;
                        if let Some(event) = reply
                            && send_event(&mut ws_tx, &event).await.is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    _ => {}
                }
            }
            // Event queued for the bound user
            event = rx.recv() => {
                let Some(event) = event else { break };
                if send_event(&mut ws_tx, &event).await.is_err() {
                    break;
                }
            }
            // Registry teardown
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    state.registry.unbind(connection).await;
    tracing::debug!(%connection, "ws connection closed");
}

async fn send_event<S>(ws_tx: &mut S, event: &ServerEvent) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    match serde_json::to_string(event) {
        Ok(json) => ws_tx.send(Message::text(json)).await,
        Err(err) => {
            tracing::error!(error = %err, event = event.event_name(), "failed to encode ws event");
            Ok(())
        }
    }
}

/// Processes one text frame and returns the reply for this connection, if
/// any.
pub async fn handle_text(
    state: &AppState,
    connection: ConnectionId,
    sender: &EventSender,
    text: &str,
) -> Option<ServerEvent> {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(err) => {
            return Some(ServerEvent::Error {
                code: 400,
                message: format!("malformed event: {err}"),
            });
        }
    };

    let bound = if event.requires_auth() {
        let Some(user_id) = state.registry.user_of(connection).await else {
            tracing::debug!(%connection, event = event.name(), "dropping event from unauthenticated connection");
            return None;
        };
        Some(user_id)
    } else {
        None
    };

    match (event, bound) {
        (ClientEvent::Authenticate { token }, _) => {
            Some(authenticate(state, connection, sender, &token).await)
        }
        (
            ClientEvent::LocationUpdate {
                location,
                timestamp,
            },
            Some(user_id),
        ) => match state.locations.share(user_id, &location, timestamp).await {
            Ok((_, delivered)) => {
                tracing::trace!(%user_id, delivered, "location shared");
                None
            }
            Err(err) => Some(error_event(&err)),
        },
        (
            ClientEvent::VoicePhraseDetected {
                transcript,
                confidence,
                timestamp,
            },
            Some(user_id),
        ) => match state.voice.verify(user_id, &transcript, confidence).await {
            Ok(PhraseVerification::Matched { confidence, .. }) => {
                tracing::info!(%user_id, confidence, "voice phrase matched");
                Some(ServerEvent::EmergencyTrigger {
                    trigger_type: TriggerType::Voice,
                    user_id,
                    transcript,
                    confidence,
                    timestamp: timestamp.unwrap_or_else(Utc::now),
                })
            }
            Ok(PhraseVerification::Mismatch | PhraseVerification::NoActivePhrase) => None,
            Err(err) => Some(error_event(&err)),
        },
        (_, None) => None,
    }
}

async fn authenticate(
    state: &AppState,
    connection: ConnectionId,
    sender: &EventSender,
    token: &str,
) -> ServerEvent {
    match state.users.authenticate(token).await {
        Ok(user) => {
            let evicted = state
                .registry
                .bind(connection, user.id, sender.clone())
                .await;
            tracing::info!(%connection, user_id = %user.id, evicted = ?evicted, "ws connection authenticated");
            ServerEvent::Authenticated {
                success: true,
                user_id: user.id,
            }
        }
        Err(err) => {
            tracing::debug!(%connection, error = %err, "ws authentication failed");
            ServerEvent::AuthenticationError {
                error: "Invalid token".to_string(),
            }
        }
    }
}

fn error_event(err: &SafeguardError) -> ServerEvent {
    ServerEvent::Error {
        code: err.status_code().as_u16(),
        message: err.to_string(),
    }
}
