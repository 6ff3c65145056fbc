//! HTTP and WebSocket API
//!
//! - `GET /stream`: WebSocket, one JSON result frame per inbound audio chunk
//! - `POST /upload`: multipart upload, answers with the rendered score URL
//! - `GET /health`: liveness and uptime

pub mod health;
pub mod stream;
pub mod upload;

pub use health::{health_check, health_routes, HealthResponse};
pub use stream::{stream_handler, stream_routes, WebSocketTransport};
pub use upload::{upload_handler, upload_routes, UploadResponse};
