//! Pitch classification
//!
//! Normalizes whatever the external pitch detector emits (a note name such as
//! `C#4` / `D♭5`, or a frequency in Hz) into a [`PitchObservation`] carrying the
//! letter spelling and the octave-independent pitch class (chroma 0-11).
//!
//! Frequencies are mapped with 12-tone equal temperament against a reference
//! tuning (A4 = 440 Hz by default) and rounded to the nearest semitone.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference tuning used when none is configured
pub const DEFAULT_REFERENCE_A4_HZ: f64 = 440.0;

/// Octave assumed for note names that omit one (e.g. `"E"`)
pub const DEFAULT_OCTAVE: i32 = 4;

/// MIDI note number of A4
const A4_MIDI: f64 = 69.0;

/// Pitch class (0 = C, 1 = C#/Db, ..., 11 = B)
///
/// Only constructible in range, so everything downstream (key scoring, solfa
/// lookup) can index the 12-slot tables without checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Chroma(u8);

/// Sharp spellings indexed by chroma
const SHARP_SPELLINGS: [(Letter, Accidental); 12] = [
    (Letter::C, Accidental::Natural),
    (Letter::C, Accidental::Sharp),
    (Letter::D, Accidental::Natural),
    (Letter::D, Accidental::Sharp),
    (Letter::E, Accidental::Natural),
    (Letter::F, Accidental::Natural),
    (Letter::F, Accidental::Sharp),
    (Letter::G, Accidental::Natural),
    (Letter::G, Accidental::Sharp),
    (Letter::A, Accidental::Natural),
    (Letter::A, Accidental::Sharp),
    (Letter::B, Accidental::Natural),
];

impl Chroma {
    /// Pitch class of C, the default tonic
    pub const C: Chroma = Chroma(0);

    /// Create a chroma, rejecting values outside 0-11
    pub fn new(value: u8) -> Result<Self> {
        if value < 12 {
            Ok(Self(value))
        } else {
            Err(Error::InvalidChroma(value))
        }
    }

    /// Wrap any semitone offset into a pitch class
    pub fn from_semitones(semitones: i32) -> Self {
        Self(semitones.rem_euclid(12) as u8)
    }

    /// All twelve pitch classes in ascending order
    pub fn all() -> impl Iterator<Item = Chroma> {
        (0u8..12).map(Chroma)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    /// Ascending interval in semitones (0-11) from `tonic` up to this pitch class
    pub fn interval_from(self, tonic: Chroma) -> u8 {
        (self.0 + 12 - tonic.0) % 12
    }

    /// Sharp spelling of this pitch class (e.g. `"F#"`)
    pub fn name(self) -> &'static str {
        const NAMES: [&str; 12] = [
            "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
        ];
        NAMES[self.index()]
    }

    fn sharp_spelling(self) -> (Letter, Accidental) {
        SHARP_SPELLINGS[self.index()]
    }
}

impl TryFrom<u8> for Chroma {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Chroma::new(value)
    }
}

impl From<Chroma> for u8 {
    fn from(chroma: Chroma) -> u8 {
        chroma.0
    }
}

impl fmt::Display for Chroma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Natural note letter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Letter {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Letter {
    /// Pitch class of the natural letter
    pub fn natural_chroma(self) -> u8 {
        match self {
            Letter::C => 0,
            Letter::D => 2,
            Letter::E => 4,
            Letter::F => 5,
            Letter::G => 7,
            Letter::A => 9,
            Letter::B => 11,
        }
    }

    /// Parse a letter, case-insensitively
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'C' => Some(Letter::C),
            'D' => Some(Letter::D),
            'E' => Some(Letter::E),
            'F' => Some(Letter::F),
            'G' => Some(Letter::G),
            'A' => Some(Letter::A),
            'B' => Some(Letter::B),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Letter::C => "C",
            Letter::D => "D",
            Letter::E => "E",
            Letter::F => "F",
            Letter::G => "G",
            Letter::A => "A",
            Letter::B => "B",
        }
    }
}

impl fmt::Display for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accidental attached to a letter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accidental {
    Natural,
    Sharp,
    Flat,
}

impl Accidental {
    /// Semitone offset applied to the natural letter
    pub fn offset(self) -> i32 {
        match self {
            Accidental::Natural => 0,
            Accidental::Sharp => 1,
            Accidental::Flat => -1,
        }
    }

    /// ASCII symbol used when spelling the pitch
    pub fn symbol(self) -> &'static str {
        match self {
            Accidental::Natural => "",
            Accidental::Sharp => "#",
            Accidental::Flat => "b",
        }
    }

    fn from_char(c: char) -> Option<Self> {
        match c {
            '#' | '♯' => Some(Accidental::Sharp),
            'b' | '♭' => Some(Accidental::Flat),
            _ => None,
        }
    }
}

/// One classified pitch reading
///
/// Immutable once produced. `sequence` is assigned by the caller (stream
/// session or batch run) and increases monotonically within that unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitchObservation {
    pub letter: Letter,
    pub accidental: Accidental,
    pub octave: i32,
    pub chroma: Chroma,
    pub sequence: u64,
}

impl PitchObservation {
    /// Build an observation from its spelling; the chroma is derived
    pub fn new(letter: Letter, accidental: Accidental, octave: i32, sequence: u64) -> Self {
        let chroma = Chroma::from_semitones(letter.natural_chroma() as i32 + accidental.offset());
        Self {
            letter,
            accidental,
            octave,
            chroma,
            sequence,
        }
    }

    /// Spelled name with octave, e.g. `"C#4"`
    pub fn name(&self) -> String {
        self.to_string()
    }

    /// MIDI note number implied by the spelling (C4 = 60)
    pub fn midi(&self) -> i32 {
        (self.octave + 1) * 12 + self.letter.natural_chroma() as i32 + self.accidental.offset()
    }

    /// True when both observations spell the same sounding note
    pub fn same_pitch(&self, other: &PitchObservation) -> bool {
        self.letter == other.letter
            && self.accidental == other.accidental
            && self.octave == other.octave
    }
}

impl fmt::Display for PitchObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.letter, self.accidental.symbol(), self.octave)
    }
}

/// Converts raw detector readings into [`PitchObservation`]s
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchClassifier {
    reference_a4_hz: f64,
}

impl Default for PitchClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_REFERENCE_A4_HZ)
    }
}

impl PitchClassifier {
    /// Create a classifier tuned to the given A4 frequency
    ///
    /// Non-finite or non-positive references fall back to 440 Hz.
    pub fn new(reference_a4_hz: f64) -> Self {
        let reference_a4_hz = if reference_a4_hz.is_finite() && reference_a4_hz > 0.0 {
            reference_a4_hz
        } else {
            DEFAULT_REFERENCE_A4_HZ
        };
        Self { reference_a4_hz }
    }

    pub fn reference_a4_hz(&self) -> f64 {
        self.reference_a4_hz
    }

    /// Classify one raw reading (note name or frequency)
    ///
    /// # Errors
    /// [`Error::UnrecognizedPitch`] when the token is neither a note name nor a
    /// usable frequency. Callers treat this as "no observation".
    pub fn classify(&self, raw: &str, sequence: u64) -> Result<PitchObservation> {
        let token = raw.trim();
        if token.is_empty() {
            return Err(Error::UnrecognizedPitch(raw.to_string()));
        }

        if let Some(hz) = parse_frequency(token) {
            return self.classify_frequency(hz, sequence);
        }

        parse_note_name(token, sequence).ok_or_else(|| Error::UnrecognizedPitch(token.to_string()))
    }

    /// Classify a frequency in Hz by rounding to the nearest equal-tempered semitone
    pub fn classify_frequency(&self, hz: f64, sequence: u64) -> Result<PitchObservation> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(Error::UnrecognizedPitch(format!("{} Hz", hz)));
        }

        let midi = (A4_MIDI + 12.0 * (hz / self.reference_a4_hz).log2()).round();
        if !(0.0..=127.0).contains(&midi) {
            return Err(Error::UnrecognizedPitch(format!("{} Hz", hz)));
        }

        let midi = midi as i32;
        let (letter, accidental) = Chroma::from_semitones(midi).sharp_spelling();
        Ok(PitchObservation::new(
            letter,
            accidental,
            midi.div_euclid(12) - 1,
            sequence,
        ))
    }
}

/// Parse `"440"`, `"261.63"`, `"440Hz"` or `"440 hz"`
fn parse_frequency(token: &str) -> Option<f64> {
    let lower = token.to_ascii_lowercase();
    let number = lower.strip_suffix("hz").unwrap_or(&lower).trim_end();
    if !number.starts_with(|c: char| c.is_ascii_digit() || c == '.' || c == '-' || c == '+') {
        return None;
    }
    number.parse::<f64>().ok()
}

/// Parse `<letter>[accidental][octave]`
fn parse_note_name(token: &str, sequence: u64) -> Option<PitchObservation> {
    let mut chars = token.chars().peekable();
    let letter = Letter::from_char(chars.next()?)?;

    let accidental = match chars.peek().copied().and_then(Accidental::from_char) {
        Some(accidental) => {
            chars.next();
            accidental
        }
        None => Accidental::Natural,
    };

    let rest: String = chars.collect();
    let octave = if rest.is_empty() {
        DEFAULT_OCTAVE
    } else {
        rest.parse::<i32>().ok().filter(|o| (-1..=9).contains(o))?
    };

    Some(PitchObservation::new(letter, accidental, octave, sequence))
}
