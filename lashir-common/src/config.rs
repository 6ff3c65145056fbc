//! Bootstrap configuration loading
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (highest priority, handled by the binary)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing TOML file is not an error: startup continues on defaults with a
//! warning. A file that exists but cannot be read or parsed is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "LASHIR_CONFIG";

/// Complete bootstrap configuration as read from TOML
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub limits: LimitsConfig,
    pub analysis: AnalysisConfig,
    pub detector: DetectorConfig,
    pub renderer: RendererConfig,
    pub logging: LoggingConfig,
}

impl TomlConfig {
    /// Reject combinations that parse but can never run
    pub fn validate(&self) -> Result<()> {
        if self.renderer.kind == RendererKind::Command && self.renderer.program.is_none() {
            return Err(Error::Config(
                "[renderer] kind = \"command\" requires a program".to_string(),
            ));
        }
        Ok(())
    }
}

/// Listen address
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Resource limits for concurrent work
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Concurrent streaming sessions
    pub max_sessions: usize,
    /// Concurrent uploads being processed
    pub max_uploads: usize,
    /// Upload body limit in bytes
    pub max_upload_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_sessions: 64,
            max_uploads: 4,
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Pitch and key analysis tuning
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Reference tuning for frequency readings
    pub reference_a4_hz: f64,
    /// Histogram decay per observation in streaming sessions (1.0 = none)
    pub stream_decay: f64,
    /// Observations before a key mode is reported
    pub min_observations: usize,
    /// Merge consecutive identical pitches in uploads before analysis
    pub collapse_repeats: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            reference_a4_hz: crate::pitch::DEFAULT_REFERENCE_A4_HZ,
            stream_decay: crate::key::DEFAULT_STREAM_DECAY,
            min_observations: crate::key::DEFAULT_MIN_OBSERVATIONS,
            collapse_repeats: false,
        }
    }
}

/// How the pitch detector is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    /// Run a program with the audio file path appended to `args`
    Command,
    /// POST the audio to an HTTP endpoint
    Http,
}

/// External pitch detector settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub kind: DetectorKind,
    pub program: String,
    pub args: Vec<String>,
    /// Endpoint for the HTTP detector
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            kind: DetectorKind::Command,
            program: "python3".to_string(),
            args: vec!["detect.py".to_string()],
            url: "http://127.0.0.1:5000/detect".to_string(),
            timeout_secs: 30,
        }
    }
}

/// How scores are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    /// Run a program with the score JSON appended to `args`; stdout is the artifact
    Command,
    /// Write LilyPond source and engrave it to PDF
    Lilypond,
}

/// External notation renderer settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RendererConfig {
    pub kind: RendererKind,
    /// Program to run; defaults per kind when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    pub args: Vec<String>,
    /// Directory rendered artifacts are written to and served from
    pub output_dir: PathBuf,
    /// URL path prefix under which `output_dir` is served
    pub public_path: String,
    pub timeout_secs: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            kind: RendererKind::Lilypond,
            program: None,
            args: Vec::new(),
            output_dir: std::env::temp_dir().join("lashir-artifacts"),
            public_path: "/artifacts".to_string(),
            timeout_secs: 120,
        }
    }
}

impl RendererConfig {
    /// Configured program, or the conventional one for this kind
    ///
    /// A command renderer has no useful default; [`TomlConfig::validate`]
    /// rejects it without an explicit program.
    pub fn program(&self) -> String {
        match (&self.program, self.kind) {
            (Some(program), _) => program.clone(),
            (None, RendererKind::Lilypond) => "lilypond".to_string(),
            (None, RendererKind::Command) => "python3".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Conventional per-user config location: `<config_dir>/lashir/lashir.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lashir").join("lashir.toml"))
}

/// Pick the config file: CLI path, then `LASHIR_CONFIG`, then the default
/// location if a file exists there
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    default_config_path().filter(|path| path.exists())
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    config
        .validate()
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    Ok(config)
}

/// Load the config at `path`, degrading to defaults when there is no file
pub fn load_or_default(path: Option<&Path>) -> Result<TomlConfig> {
    match path {
        Some(path) if path.exists() => {
            let config = load_toml_config(path)?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        Some(path) => {
            warn!(
                "Config file {} not found, using built-in defaults",
                path.display()
            );
            Ok(TomlConfig::default())
        }
        None => {
            info!("No config file, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Write a config file, creating parent directories
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize config failed: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}
