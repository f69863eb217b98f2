//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and manages the consumer session
//! lifecycle.

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::state::BroadcastState;
use crate::registry::{Frame, RegistryError};

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// The registry dropped the session (eviction or shutdown)
    Released,
    ClientClosed,
    SendFailed,
    SendTimedOut,
    ReceiveError,
    TaskFailed,
}

/// WebSocket upgrade handler
///
/// This is the entry point for consumer connections.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<BroadcastState>>,
) -> Response {
    let sessions = state.sessions.clone();
    ws.on_upgrade(move |socket| sessions.track_future(handle_socket(socket, state)))
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<BroadcastState>) {
    let (mut sender, mut receiver) = socket.split();

    // Bounded queue filled by the registry's fan-out
    let (tx, mut rx) = mpsc::channel::<Frame>(state.registry.queue_capacity());

    let handle = match state.registry.register(tx).await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(error = %e, "Rejecting consumer connection");
            let code = match e {
                RegistryError::TooManySessions { .. } => close_code::AGAIN,
                RegistryError::Closed => close_code::AWAY,
            };
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code,
                    reason: e.to_string().into(),
                })))
                .await;
            return;
        }
    };
    let session_id = handle.id();
    let send_timeout = state.send_timeout;

    // Task to forward queued frames to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let send = sender.send(Message::Text(frame.to_string()));
            match tokio::time::timeout(send_timeout, send).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(session_id = %session_id, error = %e, "WebSocket send failed");
                    return SessionEnd::SendFailed;
                }
                Err(_) => {
                    tracing::warn!(session_id = %session_id, "WebSocket send timed out");
                    return SessionEnd::SendTimedOut;
                }
            }
        }

        // Queue drained and sender dropped by the registry
        let _ = tokio::time::timeout(send_timeout, sender.send(Message::Close(None))).await;
        SessionEnd::Released
    });

    // Task to watch the inbound side; consumers are not expected to talk
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => return SessionEnd::ClientClosed,
                Ok(Message::Text(text)) => {
                    tracing::debug!(session_id = %session_id, len = text.len(), "Ignoring inbound text frame");
                }
                Ok(Message::Binary(data)) => {
                    tracing::debug!(session_id = %session_id, len = data.len(), "Ignoring inbound binary frame");
                }
                // Axum answers pings itself
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Err(e) => {
                    tracing::debug!(session_id = %session_id, error = %e, "WebSocket receive error");
                    return SessionEnd::ReceiveError;
                }
            }
        }
        SessionEnd::ClientClosed
    });

    // Wait for either task to complete
    let end = tokio::select! {
        result = &mut send_task => {
            recv_task.abort();
            result.unwrap_or(SessionEnd::TaskFailed)
        }
        result = &mut recv_task => {
            send_task.abort();
            result.unwrap_or(SessionEnd::TaskFailed)
        }
    };

    // Cleanup: unregister from the registry
    state.registry.unregister(&session_id).await;
    tracing::info!(session_id = %session_id, reason = ?end, "Consumer disconnected");
}
