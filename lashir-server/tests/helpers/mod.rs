//! Test Helper Utilities
//!
//! Stub collaborators for driving workflows without external programs.

#![allow(dead_code)]

use async_trait::async_trait;
use lashir_common::config::TomlConfig;
use lashir_common::{KeyContext, SolfaNote};
use lashir_server::services::{
    ArtifactRef, AudioInput, DetectorError, NotationRenderer, PitchDetector, RendererError,
};
use lashir_server::workflow::{ChunkTransport, Inbound, ResultFrame, TransportError};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Detector that answers each call with the next scripted result
///
/// `Err` entries become [`DetectorError::Failed`]. Once the script runs out
/// every call returns an empty blob.
#[derive(Clone, Default)]
pub struct ScriptedDetector {
    script: Arc<Mutex<VecDeque<Result<String, String>>>>,
    calls: Arc<Mutex<Vec<AudioInput>>>,
}

impl ScriptedDetector {
    pub fn new<I>(script: I) -> Self
    where
        I: IntoIterator<Item = Result<&'static str, &'static str>>,
    {
        let script = script
            .into_iter()
            .map(|r| r.map(str::to_string).map_err(str::to_string))
            .collect();
        Self {
            script: Arc::new(Mutex::new(script)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always answer with `blob`
    pub fn constant(blob: &'static str) -> Self {
        Self::new(std::iter::repeat(Ok(blob)).take(64))
    }

    pub fn calls(&self) -> Vec<AudioInput> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PitchDetector for ScriptedDetector {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn detect(&self, audio: AudioInput) -> Result<String, DetectorError> {
        self.calls.lock().unwrap().push(audio);
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(blob)) => Ok(blob),
            Some(Err(msg)) => Err(DetectorError::Failed(msg)),
            None => Ok(String::new()),
        }
    }
}

/// One recorded renderer call: (pitch name, syllable) pairs and the key
#[derive(Debug, Clone, PartialEq)]
pub struct RenderCall {
    pub notes: Vec<(String, String)>,
    pub key: KeyContext,
}

/// Renderer that records its input and returns a fixed artifact
#[derive(Clone)]
pub struct RecordingRenderer {
    artifact: Option<String>,
    calls: Arc<Mutex<Vec<RenderCall>>>,
}

impl RecordingRenderer {
    pub fn returning(artifact: &str) -> Self {
        Self {
            artifact: Some(artifact.to_string()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Renderer whose every call fails
    pub fn failing() -> Self {
        Self {
            artifact: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotationRenderer for RecordingRenderer {
    fn name(&self) -> &str {
        "recording"
    }

    async fn render(
        &self,
        notes: &[SolfaNote],
        key: &KeyContext,
    ) -> Result<ArtifactRef, RendererError> {
        self.calls.lock().unwrap().push(RenderCall {
            notes: notes
                .iter()
                .map(|n| (n.pitch.name(), n.syllable.to_string()))
                .collect(),
            key: *key,
        });
        match &self.artifact {
            Some(artifact) => Ok(ArtifactRef::new(artifact.clone())),
            None => Err(RendererError::Failed("renderer stub failure".to_string())),
        }
    }
}

/// In-memory transport fed from a fixed list of inbound messages
///
/// `None` entries simulate a receive failure at that point.
pub struct MemoryTransport {
    inbound: VecDeque<Option<Inbound>>,
    sent: Arc<Mutex<Vec<ResultFrame>>>,
    closed: Arc<Mutex<bool>>,
    fail_sends_after: Option<usize>,
}

impl MemoryTransport {
    pub fn new(inbound: Vec<Inbound>) -> Self {
        Self {
            inbound: inbound.into_iter().map(Some).collect(),
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(Mutex::new(false)),
            fail_sends_after: None,
        }
    }

    /// Inject a receive failure after the messages given so far
    pub fn then_receive_error(mut self) -> Self {
        self.inbound.push_back(None);
        self
    }

    /// Sends start failing once `n` frames have been delivered
    pub fn failing_sends_after(mut self, n: usize) -> Self {
        self.fail_sends_after = Some(n);
        self
    }

    /// Handles to inspect the transport after the session consumed it
    pub fn handles(&self) -> (Arc<Mutex<Vec<ResultFrame>>>, Arc<Mutex<bool>>) {
        (Arc::clone(&self.sent), Arc::clone(&self.closed))
    }
}

#[async_trait]
impl ChunkTransport for MemoryTransport {
    async fn recv(&mut self) -> Option<Result<Inbound, TransportError>> {
        match self.inbound.pop_front()? {
            Some(inbound) => Some(Ok(inbound)),
            None => Some(Err(TransportError::Receive("connection reset".to_string()))),
        }
    }

    async fn send(&mut self, frame: &ResultFrame) -> Result<(), TransportError> {
        let mut sent = self.sent.lock().unwrap();
        if self.fail_sends_after.is_some_and(|n| sent.len() >= n) {
            return Err(TransportError::Send("broken pipe".to_string()));
        }
        sent.push(frame.clone());
        Ok(())
    }

    async fn close(&mut self) {
        *self.closed.lock().unwrap() = true;
    }
}

/// Audio chunk payload; contents are irrelevant to the stubs
pub fn chunk() -> Inbound {
    Inbound::Audio(vec![0u8; 32])
}

/// Config with artifacts under `dir`
pub fn test_config(dir: &Path) -> TomlConfig {
    let mut config = TomlConfig::default();
    config.renderer.output_dir = dir.join("artifacts");
    config
}
