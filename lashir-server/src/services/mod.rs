//! External collaborators: pitch detection and notation rendering
//!
//! Both are reached through narrow async traits so workflows can be driven by
//! test stubs as easily as by real programs or HTTP services.

pub mod lilypond;
pub mod notation_renderer;
pub mod pitch_detector;

pub use lilypond::LilypondRenderer;
pub use notation_renderer::{
    build_renderer, ArtifactRef, CommandRenderer, NotationRenderer, RendererError, Score,
    ScoreNote,
};
pub use pitch_detector::{
    build_detector, AudioInput, CommandDetector, DetectorError, HttpDetector, PitchDetector,
};
