//! Batch pipeline for uploaded recordings
//!
//! Detects pitches over the whole file once, infers a single key from the
//! complete sequence, maps every note under that one key and asks the
//! renderer for one artifact. Any collaborator failure aborts the run; there
//! is no partial output.

use lashir_common::key::{KeyContext, KeyDetector, KeyDetectorConfig};
use lashir_common::readings::parse_readings;
use lashir_common::{Error as CommonError, PitchClassifier, PitchObservation, SolfaMapper, SolfaNote};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::services::{
    ArtifactRef, AudioInput, DetectorError, NotationRenderer, PitchDetector, RendererError,
};

/// Batch run failures
#[derive(Debug, Error)]
pub enum BatchError {
    /// Detector call failed or its output was unusable
    #[error("Pitch detection failed: {0}")]
    Detector(#[from] DetectorError),

    /// Nothing classifiable came back
    #[error("No pitches detected")]
    NoPitches,

    #[error("Notation generation failed: {0}")]
    Renderer(#[from] RendererError),
}

/// Batch tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchConfig {
    pub key: KeyDetectorConfig,
    /// Merge runs of the same spelled pitch and octave before analysis
    pub collapse_repeats: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            key: KeyDetector::uniform().config(),
            collapse_repeats: false,
        }
    }
}

/// Result of one successful batch run
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub source: PathBuf,
    pub observations: Vec<PitchObservation>,
    /// The single key every note was mapped under
    pub key: KeyContext,
    pub notes: Vec<SolfaNote>,
    pub artifact: ArtifactRef,
    /// Readings that could not be classified
    pub skipped: usize,
}

impl BatchOutcome {
    /// Syllables joined with spaces
    pub fn solfa_line(&self) -> String {
        self.notes
            .iter()
            .map(|note| note.syllable.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Upload-to-artifact pipeline; cheap to share between requests
pub struct BatchPipeline {
    detector: Arc<dyn PitchDetector>,
    renderer: Arc<dyn NotationRenderer>,
    classifier: PitchClassifier,
    config: BatchConfig,
}

impl BatchPipeline {
    pub fn new(
        detector: Arc<dyn PitchDetector>,
        renderer: Arc<dyn NotationRenderer>,
        classifier: PitchClassifier,
        config: BatchConfig,
    ) -> Self {
        Self {
            detector,
            renderer,
            classifier,
            config,
        }
    }

    /// Run the whole pipeline over one audio file
    pub async fn run(&self, source: &Path) -> Result<BatchOutcome, BatchError> {
        debug!(source = %source.display(), detector = self.detector.name(), "Batch detection");
        let blob = self
            .detector
            .detect(AudioInput::File(source.to_path_buf()))
            .await?;

        let tokens = parse_readings(&blob)
            .map_err(|e| BatchError::Detector(DetectorError::Malformed(e.to_string())))?;

        let (mut observations, skipped) = self.classify_all(&tokens);
        if self.config.collapse_repeats {
            observations = collapse_repeats(observations);
        }
        if observations.is_empty() {
            return Err(BatchError::NoPitches);
        }

        let key = KeyDetector::new(self.config.key).infer_from(&observations);
        let notes = SolfaMapper::map_all(&observations, &key);

        let artifact = self.renderer.render(&notes, &key).await?;

        info!(
            source = %source.display(),
            notes = notes.len(),
            skipped,
            key = %key,
            artifact = %artifact,
            "Batch complete"
        );

        Ok(BatchOutcome {
            source: source.to_path_buf(),
            observations,
            key,
            notes,
            artifact,
            skipped,
        })
    }

    fn classify_all(&self, tokens: &[String]) -> (Vec<PitchObservation>, usize) {
        let mut observations = Vec::with_capacity(tokens.len());
        let mut skipped = 0;
        for token in tokens {
            match self.classifier.classify(token, observations.len() as u64) {
                Ok(observation) => observations.push(observation),
                Err(CommonError::UnrecognizedPitch(raw)) => {
                    debug!(reading = %raw, "Skipping unrecognized reading");
                    skipped += 1;
                }
                Err(e) => {
                    error!(error = %e, "Dropping invalid observation");
                    skipped += 1;
                }
            }
        }
        (observations, skipped)
    }
}

/// Merge consecutive observations of the same pitch, renumbering sequences
pub fn collapse_repeats(observations: Vec<PitchObservation>) -> Vec<PitchObservation> {
    let mut collapsed: Vec<PitchObservation> = Vec::with_capacity(observations.len());
    for observation in observations {
        if collapsed
            .last()
            .is_some_and(|last| last.same_pitch(&observation))
        {
            continue;
        }
        collapsed.push(PitchObservation {
            sequence: collapsed.len() as u64,
            ..observation
        });
    }
    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observations(names: &[&str]) -> Vec<PitchObservation> {
        let classifier = PitchClassifier::default();
        names
            .iter()
            .enumerate()
            .map(|(i, n)| classifier.classify(n, i as u64).unwrap())
            .collect()
    }

    #[test]
    fn test_collapse_repeats_merges_runs_only() {
        let collapsed = collapse_repeats(observations(&["C4", "C4", "C4", "E4", "C4", "C5", "C5"]));
        let names: Vec<String> = collapsed.iter().map(|o| o.name()).collect();
        assert_eq!(names, vec!["C4", "E4", "C4", "C5"]);

        let sequences: Vec<u64> = collapsed.iter().map(|o| o.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_collapse_repeats_keeps_distinct_spellings() {
        let collapsed = collapse_repeats(observations(&["C#4", "Db4"]));
        assert_eq!(collapsed.len(), 2);
    }

    #[test]
    fn test_solfa_line() {
        let observations = observations(&["C4", "E4", "G4"]);
        let key = KeyDetector::infer(&observations);
        let outcome = BatchOutcome {
            source: PathBuf::from("take.wav"),
            notes: SolfaMapper::map_all(&observations, &key),
            observations,
            key,
            artifact: ArtifactRef::new("/artifacts/x.pdf"),
            skipped: 0,
        };
        assert_eq!(outcome.solfa_line(), "Do Mi Sol");
    }
}
