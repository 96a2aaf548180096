//! Real-time alert fan-out (§6.4): a WebSocket mount approximating a
//! Socket.IO channel, since this workspace carries no Socket.IO server
//! crate. Every event on the [`EventBus`] is forwarded as a JSON frame
//! tagged with its event type.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use netwatch_core::AlertEvent;
use netwatch_store::DurableStore;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::debug;

use super::AppState;

/// `GET /socket.io`: upgrade to a WebSocket and stream `alert_created`,
/// `alert_updated`, `alert_resolved` frames as they occur (§6.4).
pub async fn stream<S: DurableStore + 'static>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<S>>,
) -> impl IntoResponse {
    let rx = state.bus.subscribe();
    ws.on_upgrade(move |socket| forward_events(socket, rx))
}

async fn forward_events(mut socket: WebSocket, rx: tokio::sync::broadcast::Receiver<AlertEvent>) {
    let mut events = BroadcastStream::new(rx);

    loop {
        tokio::select! {
            next = events.next() => match next {
                Some(Ok(event)) => {
                    let frame = serde_json::json!({
                        "type": event.event_type.to_string(),
                        "alert": event.alert,
                    });
                    let Ok(text) = serde_json::to_string(&frame) else {
                        continue;
                    };
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    debug!(skipped, "socket.io client lagged, skipping events");
                }
                None => break,
            },
            // The channel is one-directional; `None` means the client closed
            // the socket, anything else is ignored.
            incoming = socket.recv() => {
                if incoming.is_none() {
                    break;
                }
            }
        }
    }
}
