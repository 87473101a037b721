use std::collections::HashMap;
use std::sync::Arc;

use axum::debug_handler;
use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::broadcast::Broadcaster;
use crate::error::AppResult;
use crate::session::Actor;
use crate::store::Message;

#[derive(Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ClientEvent {
    JoinFeedback { feedback_id: i64 },
    LeaveFeedback { feedback_id: i64 },
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ServerEvent {
    NewMessage { message: Message },
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn chat_ws(
    State(broadcaster): State<Arc<Broadcaster>>,
    actor: Actor,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, broadcaster, actor)))
}

/// One socket, many rooms: the client steers membership with join/leave
/// events, each joined room gets a forwarding task, and everything is torn
/// down when the socket closes.
async fn handle_socket(socket: WebSocket, hub: Arc<Broadcaster>, actor: Actor) {
    info!(email = %actor.email, "chat socket connected");
    let (mut sink, mut stream) = socket.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let mut writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sink.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut joined: HashMap<i64, JoinHandle<()>> = HashMap::new();

    loop {
        tokio::select! {
            frame = stream.next() => {
                let Some(Ok(frame)) = frame else { break };
                let Ok(event) = serde_json::from_slice::<ClientEvent>(&frame.into_data()) else {
                    continue;
                };
                match event {
                    ClientEvent::JoinFeedback { feedback_id } => {
                        // joining twice is a no-op
                        if joined.contains_key(&feedback_id) {
                            continue;
                        }
                        debug!(email = %actor.email, feedback_id, "joined room");
                        joined.insert(feedback_id, forward(hub.join(feedback_id), out_tx.clone()));
                    }
                    ClientEvent::LeaveFeedback { feedback_id } => {
                        debug!(email = %actor.email, feedback_id, "left room");
                        if let Some(task) = joined.remove(&feedback_id) {
                            task.abort();
                        }
                    }
                }
            }
            _ = &mut writer => break,
        }
    }

    for task in joined.into_values() {
        task.abort();
    }
    writer.abort();
    info!(email = %actor.email, "chat socket disconnected");
}

/// Relays a room subscription onto the socket's outbound queue. Dropping
/// (aborting) this task is what leaves the room.
fn forward(
    mut rx: broadcast::Receiver<Message>,
    out: mpsc::UnboundedSender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(message) => {
                    let Ok(text) = serde_json::to_string(&ServerEvent::NewMessage { message })
                    else {
                        break;
                    };
                    if out.send(text).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "slow chat socket missed messages");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
