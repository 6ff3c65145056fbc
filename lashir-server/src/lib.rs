//! lashir-server library interface
//!
//! Sound-to-solfa service: audio arrives over a WebSocket stream or as an
//! upload, an external detector turns it into pitch readings, and each pitch
//! is named with a movable-do syllable relative to an inferred key.

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use lashir_common::config::TomlConfig;
use lashir_common::{KeyDetectorConfig, PitchClassifier};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::services::{NotationRenderer, PitchDetector};
use crate::workflow::{BatchPipeline, StreamSession};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Detector shared by every streaming session
    pub detector: Arc<dyn PitchDetector>,
    /// Upload pipeline
    pub pipeline: Arc<BatchPipeline>,
    pub classifier: PitchClassifier,
    /// Key detector settings for each new streaming session
    pub stream_key_config: KeyDetectorConfig,
    /// One permit per open streaming session
    pub session_permits: Arc<Semaphore>,
    pub max_sessions: usize,
    /// One permit per upload being processed
    pub upload_permits: Arc<Semaphore>,
    pub max_upload_bytes: usize,
    /// Where uploads are staged while the pipeline runs
    pub upload_dir: PathBuf,
    /// Rendered artifacts served under `artifact_path`
    pub artifact_dir: PathBuf,
    pub artifact_path: String,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: &TomlConfig,
        detector: Arc<dyn PitchDetector>,
        renderer: Arc<dyn NotationRenderer>,
    ) -> Self {
        let classifier = config::classifier(config);
        let pipeline = BatchPipeline::new(
            Arc::clone(&detector),
            renderer,
            classifier,
            config::batch_config(config),
        );

        Self {
            detector,
            pipeline: Arc::new(pipeline),
            classifier,
            stream_key_config: config::stream_key_config(config),
            session_permits: Arc::new(Semaphore::new(config.limits.max_sessions)),
            max_sessions: config.limits.max_sessions,
            upload_permits: Arc::new(Semaphore::new(config.limits.max_uploads)),
            max_upload_bytes: config.limits.max_upload_bytes,
            upload_dir: std::env::temp_dir(),
            artifact_dir: config.renderer.output_dir.clone(),
            artifact_path: config.renderer.public_path.clone(),
            startup_time: Utc::now(),
        }
    }

    /// Stage uploads under `dir` instead of the system temp directory
    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = dir.into();
        self
    }

    /// Fresh session bound to the shared detector
    pub fn new_session(&self) -> StreamSession {
        StreamSession::new(
            Arc::clone(&self.detector),
            self.classifier,
            self.stream_key_config,
        )
    }

    pub fn active_sessions(&self) -> usize {
        self.max_sessions
            .saturating_sub(self.session_permits.available_permits())
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .merge(api::health_routes())
        .merge(api::stream_routes())
        .merge(api::upload_routes(state.max_upload_bytes));

    let artifact_path = state.artifact_path.trim_end_matches('/');
    if artifact_path.starts_with('/') && artifact_path.len() > 1 {
        router = router.nest_service(artifact_path, ServeDir::new(&state.artifact_dir));
    } else {
        warn!(
            "Artifact path {:?} is not a URL path, artifacts will not be served",
            state.artifact_path
        );
    }

    router
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
