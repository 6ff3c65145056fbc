//! Batch pipeline tests

mod helpers;

use helpers::{RecordingRenderer, ScriptedDetector};
use lashir_common::{Mode, PitchClassifier, Syllable};
use lashir_server::services::AudioInput;
use lashir_server::workflow::{BatchConfig, BatchError, BatchPipeline};
use std::path::Path;
use std::sync::Arc;

fn pipeline(
    detector: &ScriptedDetector,
    renderer: &RecordingRenderer,
    config: BatchConfig,
) -> BatchPipeline {
    BatchPipeline::new(
        Arc::new(detector.clone()),
        Arc::new(renderer.clone()),
        PitchClassifier::default(),
        config,
    )
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(p, s)| (p.to_string(), s.to_string()))
        .collect()
}

#[tokio::test]
async fn test_arpeggio_maps_to_do_mi_sol_do() {
    let detector = ScriptedDetector::new([Ok("['C4', 'E4', 'G4', 'C5']")]);
    let renderer = RecordingRenderer::returning("/artifacts/score.pdf");

    let outcome = pipeline(&detector, &renderer, BatchConfig::default())
        .run(Path::new("take.wav"))
        .await
        .unwrap();

    let syllables: Vec<Syllable> = outcome.notes.iter().map(|n| n.syllable).collect();
    assert_eq!(
        syllables,
        vec![Syllable::Do, Syllable::Mi, Syllable::Sol, Syllable::Do]
    );
    assert_eq!(outcome.key.mode, Mode::Major);
    assert_eq!(outcome.key.tonic.value(), 0);
    assert_eq!(outcome.artifact.as_str(), "/artifacts/score.pdf");
    assert_eq!(outcome.solfa_line(), "Do Mi Sol Do");

    // Exactly one renderer call with the ordered (pitch, solfa) sequence
    let calls = renderer.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].notes,
        pairs(&[("C4", "Do"), ("E4", "Mi"), ("G4", "Sol"), ("C5", "Do")])
    );
    assert_eq!(calls[0].key, outcome.key);

    // The detector saw the file, once
    let detector_calls = detector.calls();
    assert_eq!(detector_calls.len(), 1);
    assert!(matches!(&detector_calls[0], AudioInput::File(p) if p == Path::new("take.wav")));
}

#[tokio::test]
async fn test_every_note_shares_one_key() {
    let detector = ScriptedDetector::new([Ok(
        "['A4', 'C5', 'E5', 'A4', 'C5', 'E5', 'G#4', 'A4', 'B4', 'C5', 'D5', 'E5']",
    )]);
    let renderer = RecordingRenderer::returning("/artifacts/a.pdf");

    let outcome = pipeline(&detector, &renderer, BatchConfig::default())
        .run(Path::new("minor.wav"))
        .await
        .unwrap();

    assert_eq!(outcome.key.mode, Mode::Minor);
    assert_eq!(outcome.key.tonic.value(), 9);
    assert!(outcome.notes.iter().all(|n| n.key == outcome.key));
    assert_eq!(outcome.notes[0].syllable, Syllable::La);
    assert_eq!(outcome.notes[6].syllable, Syllable::Si);
}

#[tokio::test]
async fn test_unrecognized_readings_are_skipped() {
    let detector = ScriptedDetector::new([Ok("['C4', 'hiss', 'E4', 0, 'G4']")]);
    let renderer = RecordingRenderer::returning("/artifacts/x.pdf");

    let outcome = pipeline(&detector, &renderer, BatchConfig::default())
        .run(Path::new("take.wav"))
        .await
        .unwrap();

    assert_eq!(outcome.skipped, 2);
    let sequences: Vec<u64> = outcome.observations.iter().map(|o| o.sequence).collect();
    assert_eq!(sequences, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_detector_failure_aborts_without_rendering() {
    let detector = ScriptedDetector::new([Err("model missing")]);
    let renderer = RecordingRenderer::returning("/artifacts/x.pdf");

    let result = pipeline(&detector, &renderer, BatchConfig::default())
        .run(Path::new("take.wav"))
        .await;

    assert!(matches!(result, Err(BatchError::Detector(_))));
    assert!(renderer.calls().is_empty());
}

#[tokio::test]
async fn test_malformed_detector_output_is_detector_failure() {
    let detector = ScriptedDetector::new([Ok("{\"status\": \"ok\"}")]);
    let renderer = RecordingRenderer::returning("/artifacts/x.pdf");

    let result = pipeline(&detector, &renderer, BatchConfig::default())
        .run(Path::new("take.wav"))
        .await;

    assert!(matches!(result, Err(BatchError::Detector(_))));
    assert!(renderer.calls().is_empty());
}

#[tokio::test]
async fn test_no_pitches() {
    for blob in ["[]", "['noise', 'silence']"] {
        let detector = ScriptedDetector::new([Ok(blob)]);
        let renderer = RecordingRenderer::returning("/artifacts/x.pdf");

        let result = pipeline(&detector, &renderer, BatchConfig::default())
            .run(Path::new("quiet.wav"))
            .await;

        assert!(matches!(result, Err(BatchError::NoPitches)), "{}", blob);
        assert!(renderer.calls().is_empty());
    }
}

#[tokio::test]
async fn test_renderer_failure_aborts() {
    let detector = ScriptedDetector::new([Ok("['C4', 'E4', 'G4']")]);
    let renderer = RecordingRenderer::failing();

    let result = pipeline(&detector, &renderer, BatchConfig::default())
        .run(Path::new("take.wav"))
        .await;

    assert!(matches!(result, Err(BatchError::Renderer(_))));
    assert_eq!(renderer.calls().len(), 1);
}

#[tokio::test]
async fn test_collapse_repeats() {
    let blob = "['C4', 'C4', 'C4', 'E4', 'E4', 'G4', 'G4', 'G4', 'C5']";

    let detector = ScriptedDetector::new([Ok(blob), Ok(blob)]);
    let renderer = RecordingRenderer::returning("/artifacts/x.pdf");

    let plain = pipeline(&detector, &renderer, BatchConfig::default())
        .run(Path::new("take.wav"))
        .await
        .unwrap();
    assert_eq!(plain.notes.len(), 9);

    let collapsing = BatchConfig {
        collapse_repeats: true,
        ..BatchConfig::default()
    };
    let collapsed = pipeline(&detector, &renderer, collapsing)
        .run(Path::new("take.wav"))
        .await
        .unwrap();
    assert_eq!(collapsed.solfa_line(), "Do Mi Sol Do");
    assert_eq!(
        renderer.calls()[1].notes,
        pairs(&[("C4", "Do"), ("E4", "Mi"), ("G4", "Sol"), ("C5", "Do")])
    );
}

#[tokio::test]
async fn test_batch_is_deterministic() {
    let blob = "['D4', 'F#4', 'A4', 'D5', 'C#5', 'B4', 'A4', 'G4', 'F#4', 'E4', 'D4']";
    let detector = ScriptedDetector::new([Ok(blob), Ok(blob)]);
    let renderer = RecordingRenderer::returning("/artifacts/x.pdf");
    let pipeline = pipeline(&detector, &renderer, BatchConfig::default());

    let first = pipeline.run(Path::new("a.wav")).await.unwrap();
    let second = pipeline.run(Path::new("a.wav")).await.unwrap();

    assert_eq!(first.key, second.key);
    assert_eq!(first.notes, second.notes);
    assert_eq!(first.key.tonic.value(), 2);
    assert_eq!(first.key.mode, Mode::Major);
}
