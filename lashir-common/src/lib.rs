//! # Lashir Common Library
//!
//! Shared code for the Lashir sound-to-solfa service:
//! - Pitch classification (note names and frequencies to pitch classes)
//! - Parsing of pitch detector output
//! - Key inference from observed pitch classes
//! - Movable-do solfa mapping
//! - Bootstrap configuration loading

pub mod config;
pub mod error;
pub mod key;
pub mod pitch;
pub mod readings;
pub mod solfa;

pub use error::{Error, Result};
pub use key::{KeyContext, KeyDetector, KeyDetectorConfig, Mode};
pub use pitch::{Accidental, Chroma, Letter, PitchClassifier, PitchObservation};
pub use solfa::{SolfaMapper, SolfaNote, Syllable};
