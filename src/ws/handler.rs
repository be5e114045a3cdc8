//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::ws::protocol::{ClientFrame, ServerFrame};
use crate::ws::session;

/// Per-connection queue depth in each direction
const FRAME_QUEUE: usize = 64;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Guest identifier of the connecting player
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let user_id = query.user_id.trim().to_string();
    if user_id.is_empty() {
        warn!("WebSocket upgrade without a user id");
        return (StatusCode::BAD_REQUEST, "userId required").into_response();
    }

    info!(user_id = %user_id, "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

/// Bridge the socket to a messaging session
async fn handle_socket(socket: WebSocket, user_id: String, state: AppState) {
    info!(user_id = %user_id, "New WebSocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();
    let (in_tx, in_rx) = mpsc::channel::<ClientFrame>(FRAME_QUEUE);
    let (out_tx, mut out_rx) = mpsc::channel::<ServerFrame>(FRAME_QUEUE);

    let session_handle = tokio::spawn(session::serve(
        state.rooms.clone(),
        user_id.clone(),
        in_rx,
        out_tx.clone(),
    ));

    // Spawn writer task: session frames -> WebSocket
    let writer_user_id = user_id.clone();
    let writer_handle = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(e) => {
                    error!(user_id = %writer_user_id, error = %e, "Failed to encode frame");
                    continue;
                }
            };
            if let Err(e) = ws_sink.send(Message::Text(json)).await {
                debug!(user_id = %writer_user_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> session
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(frame) => {
                    if in_tx.send(frame).await.is_err() {
                        debug!(user_id = %user_id, "Session closed");
                        break;
                    }
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Failed to parse client frame");
                    let reply = ServerFrame::Error {
                        code: "invalid_frame".to_string(),
                        message: e.to_string(),
                    };
                    if out_tx.send(reply).await.is_err() {
                        break;
                    }
                }
            },
            Ok(Message::Binary(_)) => {
                warn!(user_id = %user_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(user_id = %user_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Closing the inbound queue ends the session and its forwarders
    drop(in_tx);
    drop(out_tx);
    if let Err(e) = session_handle.await {
        error!(user_id = %user_id, error = %e, "Session task failed");
    }
    writer_handle.abort();

    info!(user_id = %user_id, "WebSocket connection closed");
}
