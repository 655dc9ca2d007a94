//! WebSocket transport for the relay.
//!
//! One reader loop plus one writer task per connection. The writer
//! drains the bounded outbound queue owned by the Connection Registry;
//! the reader decodes frames and hands them to the Session Manager.
//! Any way the reader ends, cleanly or not, funnels into
//! `on_socket_closed`, which is idempotent and identity-checked on the
//! other side.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use lingocast_relay::{decode_frame, encode_frame};

use super::AppState;

/// GET /ws
///
/// Upgrades to the relay's message-oriented WebSocket transport.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();

    let (tx, mut rx) = tokio::sync::mpsc::channel(state.outbound_queue);
    let conn = state.registry.create(tx);
    info!(connection = %conn, "WebSocket connection established");

    // Writer task: the only place this socket is written. Exits when
    // the registry drops the sender or the peer stops accepting.
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            match encode_frame(&outbound) {
                Ok(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "Failed to encode outbound frame"),
            }
        }
    });

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => match decode_frame(&text) {
                Ok(frame) => state.session.handle(conn, frame),
                Err(e) => {
                    // One bad frame does not end an otherwise-healthy session.
                    warn!(connection = %conn, error = %e, "Discarding malformed frame");
                }
            },
            Ok(Message::Binary(_)) => {
                warn!(connection = %conn, "Binary frames are not part of the protocol");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Keepalive handled at the transport layer.
            }
            Ok(Message::Close(_)) => {
                debug!(connection = %conn, "WebSocket close requested");
                break;
            }
            Err(e) => {
                debug!(connection = %conn, error = %e, "WebSocket read error");
                break;
            }
        }
    }

    state.session.on_socket_closed(conn);
    writer.abort();
    info!(connection = %conn, "WebSocket connection closed");
}
