//! WebSocket transport for a conversation's live channel.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use tandem_shared::protocol::{ClientEvent, ServerEvent};
use tandem_shared::types::ConversationId;

use crate::api::AppState;
use crate::auth::Actor;
use crate::engine::Engine;
use crate::error::ServerError;
use crate::hub::Subscription;

/// `GET /conversations/:id/live`
///
/// Authorization happens before the upgrade so a refused caller gets a
/// plain HTTP error.
pub async fn live(
    ws: WebSocketUpgrade,
    Actor(profile): Actor,
    State(state): State<AppState>,
    Path(conversation_id): Path<ConversationId>,
) -> Result<Response, ServerError> {
    let subscription = state.engine.subscribe(profile, conversation_id).await?;
    let engine = Arc::clone(&state.engine);
    Ok(ws.on_upgrade(move |socket| run_socket(socket, engine, subscription)))
}

async fn run_socket(socket: WebSocket, engine: Arc<Engine>, mut subscription: Subscription) {
    let profile = subscription.profile();
    let conversation_id = subscription.conversation_id();
    let (mut sink, mut stream) = socket.split();

    debug!(conversation = %conversation_id, profile = %profile, "Live channel opened");

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else {
                    // Disconnected by the hub (slow consumer or room closed).
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                let closing = matches!(event, ServerEvent::ConversationClosed { .. });
                let text = match event.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode event");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
                if closing {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match ClientEvent::from_json(&text) {
                    Ok(ClientEvent::Typing) => {
                        if let Err(e) = engine.emit_typing(profile, conversation_id).await {
                            debug!(error = %e, "Typing signal refused");
                            if matches!(e, ServerError::Forbidden(_) | ServerError::NotFound(_)) {
                                break;
                            }
                        }
                    }
                    Err(e) => debug!(error = %e, "Ignoring malformed client frame"),
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!(conversation = %conversation_id, profile = %profile, "Live channel closed");
}
