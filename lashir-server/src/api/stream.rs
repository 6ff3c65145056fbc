//! WebSocket streaming endpoint
//!
//! Binary frames carry audio chunks; each is answered by one JSON text frame.
//! Text frames are answered with an error frame in their position. Pings are
//! handled by axum and never reach the session.

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::workflow::{ChunkTransport, Inbound, ResultFrame, TransportError};
use crate::AppState;

/// [`ChunkTransport`] over an upgraded axum WebSocket
pub struct WebSocketTransport {
    socket: WebSocket,
}

impl WebSocketTransport {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl ChunkTransport for WebSocketTransport {
    async fn recv(&mut self) -> Option<Result<Inbound, TransportError>> {
        loop {
            let message = match self.socket.recv().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            };
            let inbound = match message {
                Message::Binary(bytes) => Inbound::Audio(bytes),
                Message::Text(_) => Inbound::Unsupported("text".to_string()),
                Message::Close(_) => Inbound::Close,
                Message::Ping(_) | Message::Pong(_) => continue,
            };
            return Some(Ok(inbound));
        }
    }

    async fn send(&mut self, frame: &ResultFrame) -> Result<(), TransportError> {
        let text =
            serde_json::to_string(frame).map_err(|e| TransportError::Send(e.to_string()))?;
        self.socket
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.socket.send(Message::Close(None)).await {
            debug!(error = %e, "WebSocket close frame not sent");
        }
    }
}

/// GET /stream
///
/// Rejected with 503 when every session slot is taken.
pub async fn stream_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    let permit = state
        .session_permits
        .clone()
        .try_acquire_owned()
        .map_err(|_| ApiError::Busy)?;
    let session = state.new_session();

    Ok(ws.on_upgrade(move |socket| async move {
        // Slot is released when the session ends
        let _permit = permit;
        session.run(WebSocketTransport::new(socket)).await;
    }))
}

/// Build streaming routes
pub fn stream_routes() -> Router<AppState> {
    Router::new().route("/stream", get(stream_handler))
}
