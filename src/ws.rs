//! `/ws/logs` real-time dashboard feed (spec.md §4.F), wiring an axum
//! websocket upgrade into `AuditBroadcaster::subscribe`. Grounded on
//! `original_source/backend/realtime_logs.py::ConnectionManager.connect`/
//! `disconnect`, adapted per the spec.md §9 Design Note that breaks the
//! cyclic subscriber reference: this handler only ever holds the
//! subscription id and the receiver half, never a pointer back into the
//! broadcaster's internal table.

use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use tracing::{debug, info};

pub async fn logs_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let (sub_id, mut rx) = state.audit.subscribe();
    info!(sub_id, "audit dashboard subscriber connected");

    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(envelope) = msg else { break };
                let payload = match serde_json::to_string(&envelope) {
                    Ok(p) => p,
                    Err(_) => continue,
                };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    state.audit.unsubscribe(sub_id);
    debug!(sub_id, "audit dashboard subscriber disconnected");
}
