//! Runtime settings resolution
//!
//! The binary collects overrides from the command line (clap also reads the
//! `LASHIR_*` environment variables for each flag) and layers them over the
//! TOML config, which already carries compiled defaults for anything unset.

use lashir_common::config::{self, DetectorKind, TomlConfig};
use lashir_common::{KeyDetectorConfig, PitchClassifier};
use std::path::Path;
use tracing::info;

use crate::workflow::BatchConfig;

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    /// Switches the detector to HTTP mode at this endpoint
    pub detector_url: Option<String>,
    pub artifact_dir: Option<std::path::PathBuf>,
}

/// Load the TOML layer and apply overrides on top
pub fn resolve(config_path: Option<&Path>, overrides: &Overrides) -> lashir_common::Result<TomlConfig> {
    let path = config::resolve_config_path(config_path);
    let loaded = config::load_or_default(path.as_deref())?;
    Ok(apply_overrides(loaded, overrides))
}

/// Higher-priority values win field by field
pub fn apply_overrides(mut config: TomlConfig, overrides: &Overrides) -> TomlConfig {
    if let Some(host) = &overrides.host {
        config.server.host = host.clone();
    }
    if let Some(port) = overrides.port {
        config.server.port = port;
    }
    if let Some(level) = &overrides.log_level {
        config.logging.level = level.clone();
    }
    if let Some(url) = &overrides.detector_url {
        info!("Detector endpoint overridden: {}", url);
        config.detector.kind = DetectorKind::Http;
        config.detector.url = url.clone();
    }
    if let Some(dir) = &overrides.artifact_dir {
        config.renderer.output_dir = dir.clone();
    }
    config
}

/// Classifier tuned by `[analysis]`
pub fn classifier(config: &TomlConfig) -> PitchClassifier {
    PitchClassifier::new(config.analysis.reference_a4_hz)
}

/// Key detector settings for streaming sessions
pub fn stream_key_config(config: &TomlConfig) -> KeyDetectorConfig {
    KeyDetectorConfig {
        decay: config.analysis.stream_decay,
        min_observations: config.analysis.min_observations,
    }
}

/// Batch settings: uniform weights over the whole recording
pub fn batch_config(config: &TomlConfig) -> BatchConfig {
    BatchConfig {
        key: KeyDetectorConfig {
            decay: 1.0,
            min_observations: config.analysis.min_observations,
        },
        collapse_repeats: config.analysis.collapse_repeats,
    }
}
