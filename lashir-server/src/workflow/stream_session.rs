//! Streaming solfa session
//!
//! One session per connected client. Each inbound audio chunk goes through
//! detect → classify → key update → map, and produces exactly one outbound
//! frame, in arrival order. The session owns its key state; nothing is shared
//! with other sessions except the detector handle.
//!
//! # Lifecycle
//! `Open` (no pitch yet) → `Active` (first pitch classified) → `Closing`
//! (client closed, stream ended or transport failed) → `Closed`.
//!
//! A failed detector call yields an error frame for that chunk only: the key
//! estimate is left as it was and the session keeps going.

use async_trait::async_trait;
use lashir_common::key::{KeyContext, KeyDetector, KeyDetectorConfig};
use lashir_common::readings::parse_readings;
use lashir_common::{Error as CommonError, PitchClassifier, SolfaMapper, SolfaNote};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::services::{AudioInput, PitchDetector};

/// User-visible message for a failed detector call
pub const DETECTION_FAILED: &str = "Pitch detection failed";

/// User-visible message for a non-audio inbound message
pub const UNSUPPORTED_MESSAGE: &str = "Unsupported message: send audio as binary frames";

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Open,
    Active,
    Closing,
    Closed,
}

/// Transport failure; ends the session without an error frame
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Send failed: {0}")]
    Send(String),
}

/// One inbound message as the session sees it
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Audio chunk
    Audio(Vec<u8>),
    /// Anything that is not audio (e.g. a text frame); named for the log
    Unsupported(String),
    /// Client asked to close
    Close,
}

/// Bidirectional message channel a session runs over
///
/// `recv` returns `None` once the peer is gone.
#[async_trait]
pub trait ChunkTransport: Send {
    async fn recv(&mut self) -> Option<Result<Inbound, TransportError>>;

    async fn send(&mut self, frame: &ResultFrame) -> Result<(), TransportError>;

    /// Best-effort close; failures are not reported
    async fn close(&mut self);
}

/// One mapped note as sent to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteView {
    /// Spelled pitch, e.g. `"C#4"`
    pub pitch: String,
    pub letter: String,
    pub octave: i32,
    pub chroma: u8,
    pub solfa: String,
    pub degree: u8,
    pub chromatic: bool,
    pub sequence: u64,
}

impl From<&SolfaNote> for NoteView {
    fn from(note: &SolfaNote) -> Self {
        Self {
            pitch: note.pitch.name(),
            letter: note.pitch.letter.to_string(),
            octave: note.pitch.octave,
            chroma: note.pitch.chroma.value(),
            solfa: note.syllable.to_string(),
            degree: note.degree,
            chromatic: note.chromatic,
            sequence: note.pitch.sequence,
        }
    }
}

/// Key estimate as sent to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyView {
    pub tonic: String,
    /// `major`, `minor` or `undetermined`
    pub mode: String,
    pub confidence: f64,
    pub observations: usize,
}

impl From<&KeyContext> for KeyView {
    fn from(key: &KeyContext) -> Self {
        Self {
            tonic: key.tonic.name().to_string(),
            mode: key.mode.as_str().to_string(),
            confidence: key.confidence,
            observations: key.observations,
        }
    }
}

/// Outbound frame: the result of exactly one inbound message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultFrame {
    /// Zero-based index of the inbound message this answers
    pub chunk: u64,
    /// Syllables of this chunk, space separated (empty on error)
    pub solfa: String,
    /// Pitch names of this chunk, space separated (empty on error)
    pub pitches: String,
    #[serde(default)]
    pub notes: Vec<NoteView>,
    pub key: KeyView,
    /// Readings that could not be classified
    #[serde(default, skip_serializing_if = "is_zero")]
    pub skipped: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl ResultFrame {
    fn mapped(chunk: u64, notes: &[SolfaNote], key: &KeyContext, skipped: usize) -> Self {
        Self {
            chunk,
            solfa: join(notes.iter().map(|n| n.syllable.to_string())),
            pitches: join(notes.iter().map(|n| n.pitch.name())),
            notes: notes.iter().map(NoteView::from).collect(),
            key: KeyView::from(key),
            skipped,
            error: None,
        }
    }

    fn failed(chunk: u64, key: &KeyContext, message: &str) -> Self {
        Self {
            chunk,
            solfa: String::new(),
            pitches: String::new(),
            notes: Vec::new(),
            key: KeyView::from(key),
            skipped: 0,
            error: Some(message.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

fn join(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join(" ")
}

/// Counters reported when a session ends
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub state: SessionState,
    /// Inbound messages handled
    pub chunks: u64,
    pub frames_sent: u64,
    pub error_frames: u64,
    pub observations: u64,
    pub skipped: u64,
    pub final_key: KeyContext,
}

/// One client's streaming session
pub struct StreamSession {
    id: Uuid,
    detector: Arc<dyn PitchDetector>,
    classifier: PitchClassifier,
    key_detector: KeyDetector,
    state: SessionState,
    next_chunk: u64,
    next_sequence: u64,
    frames_sent: u64,
    error_frames: u64,
    skipped: u64,
}

impl StreamSession {
    pub fn new(
        detector: Arc<dyn PitchDetector>,
        classifier: PitchClassifier,
        key_config: KeyDetectorConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            detector,
            classifier,
            key_detector: KeyDetector::new(key_config),
            state: SessionState::Open,
            next_chunk: 0,
            next_sequence: 0,
            frames_sent: 0,
            error_frames: 0,
            skipped: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Current key estimate
    pub fn key(&self) -> KeyContext {
        self.key_detector.current()
    }

    /// Handle one audio chunk and build its frame
    pub async fn process_chunk(&mut self, audio: Vec<u8>) -> ResultFrame {
        let chunk = self.take_chunk_index();

        let blob = match self.detector.detect(AudioInput::Bytes(audio)).await {
            Ok(blob) => blob,
            Err(e) => {
                warn!(session_id = %self.id, chunk, error = %e, "Pitch detection failed");
                return self.error_frame(chunk, DETECTION_FAILED);
            }
        };

        let tokens = match parse_readings(&blob) {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(session_id = %self.id, chunk, error = %e, "Detector output unusable");
                return self.error_frame(chunk, DETECTION_FAILED);
            }
        };

        let mut notes = Vec::with_capacity(tokens.len());
        let mut skipped = 0;
        for token in &tokens {
            let observation = match self.classifier.classify(token, self.next_sequence) {
                Ok(observation) => observation,
                Err(CommonError::UnrecognizedPitch(raw)) => {
                    debug!(session_id = %self.id, chunk, reading = %raw, "Skipping unrecognized reading");
                    skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!(session_id = %self.id, chunk, error = %e, "Dropping invalid observation");
                    skipped += 1;
                    continue;
                }
            };
            self.next_sequence += 1;

            if self.state == SessionState::Open {
                self.state = SessionState::Active;
                debug!(session_id = %self.id, "Session active");
            }

            let key = self.key_detector.update(&observation);
            notes.push(SolfaMapper::map(&observation, &key));
        }

        self.skipped += skipped as u64;
        let frame = ResultFrame::mapped(chunk, &notes, &self.key_detector.current(), skipped);
        debug!(
            session_id = %self.id,
            chunk,
            notes = notes.len(),
            skipped,
            key = %self.key_detector.current(),
            "Chunk mapped"
        );
        frame
    }

    /// Frame answering a non-audio message, in its position in the stream
    pub fn reject_message(&mut self, kind: &str) -> ResultFrame {
        let chunk = self.take_chunk_index();
        debug!(session_id = %self.id, chunk, kind, "Rejecting non-audio message");
        self.error_frame(chunk, UNSUPPORTED_MESSAGE)
    }

    /// Drive the session until the client leaves or the transport fails
    pub async fn run<T: ChunkTransport>(mut self, mut transport: T) -> SessionSummary {
        info!(session_id = %self.id, detector = self.detector.name(), "Stream session opened");

        loop {
            let frame = match transport.recv().await {
                None | Some(Ok(Inbound::Close)) => break,
                Some(Err(e)) => {
                    debug!(session_id = %self.id, error = %e, "Transport receive failed");
                    break;
                }
                Some(Ok(Inbound::Audio(bytes))) => self.process_chunk(bytes).await,
                Some(Ok(Inbound::Unsupported(kind))) => self.reject_message(&kind),
            };

            if let Err(e) = transport.send(&frame).await {
                debug!(session_id = %self.id, error = %e, "Transport send failed");
                break;
            }
            self.frames_sent += 1;
        }

        self.state = SessionState::Closing;
        transport.close().await;
        self.state = SessionState::Closed;

        let summary = self.summary();
        info!(
            session_id = %self.id,
            chunks = summary.chunks,
            observations = summary.observations,
            error_frames = summary.error_frames,
            key = %summary.final_key,
            "Stream session closed"
        );
        summary
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id,
            state: self.state,
            chunks: self.next_chunk,
            frames_sent: self.frames_sent,
            error_frames: self.error_frames,
            observations: self.next_sequence,
            skipped: self.skipped,
            final_key: self.key_detector.current(),
        }
    }

    fn take_chunk_index(&mut self) -> u64 {
        let chunk = self.next_chunk;
        self.next_chunk += 1;
        chunk
    }

    fn error_frame(&mut self, chunk: u64, message: &str) -> ResultFrame {
        self.error_frames += 1;
        ResultFrame::failed(chunk, &self.key_detector.current(), message)
    }
}
