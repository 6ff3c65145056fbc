//! External pitch detector clients
//!
//! The detector is an opaque collaborator: it takes audio and returns a text
//! blob of pitch readings, which `lashir_common::readings` turns into tokens.
//! Two transports are supported, a local program and an HTTP service.

use async_trait::async_trait;
use lashir_common::config::{DetectorConfig, DetectorKind};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

const USER_AGENT: &str = concat!("lashir/", env!("CARGO_PKG_VERSION"));

/// Pitch detector errors
#[derive(Debug, Error)]
pub enum DetectorError {
    /// Detector program could not be started
    #[error("Failed to start detector: {0}")]
    Spawn(String),

    /// Detector ran but reported failure
    #[error("Detector failed: {0}")]
    Failed(String),

    /// Detector did not answer in time
    #[error("Detector timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP transport error
    #[error("Detector request failed: {0}")]
    Network(String),

    /// Output could not be parsed into readings
    #[error("Malformed detector output: {0}")]
    Malformed(String),

    /// Staging the audio for the detector failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio handed to a detector
#[derive(Debug, Clone)]
pub enum AudioInput {
    /// In-memory chunk, e.g. one WebSocket frame
    Bytes(Vec<u8>),
    /// Audio already on disk, e.g. a saved upload
    File(PathBuf),
}

/// Capability: audio in, raw reading blob out
#[async_trait]
pub trait PitchDetector: Send + Sync {
    /// Short identifier for logs
    fn name(&self) -> &str;

    /// Run detection over one unit of audio
    async fn detect(&self, audio: AudioInput) -> Result<String, DetectorError>;
}

/// Detector run as a local program: `<program> <args...> <audio path>`
///
/// Stdout is the reading blob. In-memory chunks are staged in a temporary file
/// that is removed after the run.
pub struct CommandDetector {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    scratch_dir: PathBuf,
}

impl CommandDetector {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Stage chunks under `dir` instead of the system temp directory
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    async fn run(&self, path: &Path) -> Result<String, DetectorError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| DetectorError::Spawn(format!("{}: {}", self.program, e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| DetectorError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DetectorError::Failed(format!(
                "Exit code: {:?}, stderr: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| DetectorError::Malformed(format!("stdout is not UTF-8: {}", e)))
    }
}

#[async_trait]
impl PitchDetector for CommandDetector {
    fn name(&self) -> &str {
        "command"
    }

    async fn detect(&self, audio: AudioInput) -> Result<String, DetectorError> {
        match audio {
            AudioInput::File(path) => self.run(&path).await,
            AudioInput::Bytes(bytes) => {
                let path = self
                    .scratch_dir
                    .join(format!("lashir-chunk-{}.bin", uuid::Uuid::new_v4()));
                tokio::fs::write(&path, &bytes).await?;
                debug!(path = %path.display(), bytes = bytes.len(), "Staged audio chunk");

                let result = self.run(&path).await;
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    debug!(path = %path.display(), error = %e, "Failed to remove staged chunk");
                }
                result
            }
        }
    }
}

/// Detector reached over HTTP: multipart POST with the audio in field `file`
///
/// The response body (normally `{"pitches": [...]}`) is returned as the blob.
pub struct HttpDetector {
    http_client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpDetector {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DetectorError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| DetectorError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            url: url.into(),
            timeout,
        })
    }
}

#[async_trait]
impl PitchDetector for HttpDetector {
    fn name(&self) -> &str {
        "http"
    }

    async fn detect(&self, audio: AudioInput) -> Result<String, DetectorError> {
        let (bytes, file_name) = match audio {
            AudioInput::Bytes(bytes) => (bytes, "chunk.bin".to_string()),
            AudioInput::File(path) => {
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "audio.bin".to_string());
                (tokio::fs::read(&path).await?, file_name)
            }
        };

        debug!(url = %self.url, bytes = bytes.len(), "Posting audio to detector");

        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(file_name));

        let response = self
            .http_client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DetectorError::Timeout(self.timeout)
                } else {
                    DetectorError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DetectorError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(DetectorError::Failed(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        Ok(body)
    }
}

/// Build the detector selected by configuration
pub fn build_detector(
    config: &DetectorConfig,
) -> Result<Arc<dyn PitchDetector>, DetectorError> {
    let timeout = Duration::from_secs(config.timeout_secs.max(1));
    Ok(match config.kind {
        DetectorKind::Command => Arc::new(CommandDetector::new(
            config.program.clone(),
            config.args.clone(),
            timeout,
        )),
        DetectorKind::Http => Arc::new(HttpDetector::new(config.url.clone(), timeout)?),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandDetector {
        CommandDetector::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), "detector".to_string()],
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_command_detector_returns_stdout() {
        let detector = sh("echo \"['C4', 'E4']\"");
        let blob = detector.detect(AudioInput::Bytes(vec![0u8; 16])).await.unwrap();
        assert_eq!(blob.trim(), "['C4', 'E4']");
    }

    #[tokio::test]
    async fn test_command_detector_receives_audio_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        // $1 is the appended audio path
        let detector = sh("cat \"$1\"");
        let blob = detector.detect(AudioInput::File(path)).await.unwrap();
        assert_eq!(blob, "RIFF");
    }

    #[tokio::test]
    async fn test_staged_chunk_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let detector = sh("echo \"$1\"").with_scratch_dir(dir.path());

        let blob = detector.detect(AudioInput::Bytes(vec![1, 2, 3])).await.unwrap();
        assert!(blob.trim().starts_with(dir.path().to_str().unwrap()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_command_detector_nonzero_exit() {
        let detector = sh("echo boom >&2; exit 3");
        let err = detector.detect(AudioInput::Bytes(vec![])).await.unwrap_err();
        match err {
            DetectorError::Failed(msg) => assert!(msg.contains("boom")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_command_detector_timeout() {
        let detector = CommandDetector::new(
            "sh",
            vec!["-c".to_string(), "sleep 5".to_string()],
            Duration::from_millis(100),
        );
        let err = detector.detect(AudioInput::Bytes(vec![])).await.unwrap_err();
        assert!(matches!(err, DetectorError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let detector = CommandDetector::new(
            "/nonexistent/lashir-detector",
            Vec::new(),
            Duration::from_secs(1),
        );
        let err = detector.detect(AudioInput::Bytes(vec![])).await.unwrap_err();
        assert!(matches!(err, DetectorError::Spawn(_)));
    }

    #[tokio::test]
    async fn test_http_detector_timeout() {
        // Accepts the connection but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let timeout = Duration::from_millis(200);
        let detector = HttpDetector::new(format!("http://{}/detect", addr), timeout).unwrap();
        let err = detector.detect(AudioInput::Bytes(vec![0u8; 8])).await.unwrap_err();
        match err {
            DetectorError::Timeout(after) => assert_eq!(after, timeout),
            other => panic!("unexpected error: {other:?}"),
        }
        server.abort();
    }

    #[test]
    fn test_build_detector_by_kind() {
        let mut config = DetectorConfig::default();
        assert_eq!(build_detector(&config).unwrap().name(), "command");

        config.kind = DetectorKind::Http;
        assert_eq!(build_detector(&config).unwrap().name(), "http");
    }
}
