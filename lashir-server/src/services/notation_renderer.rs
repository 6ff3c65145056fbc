//! Notation renderer capability
//!
//! A renderer turns an ordered sequence of solfa notes into a score artifact
//! (normally a PDF) and answers with where the artifact can be fetched.

use async_trait::async_trait;
use lashir_common::config::{RendererConfig, RendererKind};
use lashir_common::{KeyContext, SolfaNote};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use super::lilypond::LilypondRenderer;

/// Notation renderer errors
#[derive(Debug, Error)]
pub enum RendererError {
    /// Renderer program could not be started
    #[error("Failed to start renderer: {0}")]
    Spawn(String),

    /// Renderer ran but reported failure
    #[error("Renderer failed: {0}")]
    Failed(String),

    /// Renderer did not finish in time
    #[error("Renderer timed out after {0:?}")]
    Timeout(Duration),

    /// Renderer finished without naming an artifact
    #[error("Renderer produced no artifact")]
    NoArtifact,

    /// Score could not be serialized
    #[error("Score serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Path or URL of a rendered artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capability: ordered solfa notes in, artifact reference out
#[async_trait]
pub trait NotationRenderer: Send + Sync {
    /// Short identifier for logs
    fn name(&self) -> &str;

    /// Render `notes` (already mapped under `key`) as one artifact
    async fn render(&self, notes: &[SolfaNote], key: &KeyContext)
        -> Result<ArtifactRef, RendererError>;
}

/// Renderer input document, as handed to external renderer programs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub key: KeyContext,
    pub notes: Vec<ScoreNote>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreNote {
    pub pitch: String,
    pub solfa: String,
}

impl Score {
    pub fn new(notes: &[SolfaNote], key: &KeyContext) -> Self {
        Self {
            key: *key,
            notes: notes
                .iter()
                .map(|note| ScoreNote {
                    pitch: note.pitch.name(),
                    solfa: note.syllable.to_string(),
                })
                .collect(),
        }
    }
}

/// Renderer run as a local program: `<program> <args...> <score JSON>`
///
/// The last non-empty line of stdout is taken as the artifact reference.
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRenderer {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

#[async_trait]
impl NotationRenderer for CommandRenderer {
    fn name(&self) -> &str {
        "command"
    }

    async fn render(
        &self,
        notes: &[SolfaNote],
        key: &KeyContext,
    ) -> Result<ArtifactRef, RendererError> {
        let score = serde_json::to_string(&Score::new(notes, key))?;
        debug!(program = %self.program, notes = notes.len(), "Running notation renderer");

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(&score)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RendererError::Spawn(format!("{}: {}", self.program, e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| RendererError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RendererError::Failed(format!(
                "Exit code: {:?}, stderr: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .map(ArtifactRef::new)
            .ok_or(RendererError::NoArtifact)
    }
}

/// Build the renderer selected by configuration
pub fn build_renderer(config: &RendererConfig) -> Arc<dyn NotationRenderer> {
    let timeout = Duration::from_secs(config.timeout_secs.max(1));
    match config.kind {
        RendererKind::Command => Arc::new(CommandRenderer::new(
            config.program(),
            config.args.clone(),
            timeout,
        )),
        RendererKind::Lilypond => Arc::new(LilypondRenderer::new(
            config.program(),
            config.output_dir.clone(),
            config.public_path.clone(),
            timeout,
        )),
    }
}
