//! Movable-do solfa mapping
//!
//! Maps a pitch to its syllable relative to the current key. Major keys are
//! do-based (the tonic sings Do); minor keys are la-based (the tonic sings La,
//! so the relative major shares syllables). Non-diatonic intervals take the
//! raised form of the diatonic syllable below them (Di, Ri, Fi, Si, Li).
//!
//! Both interval tables cover all 12 intervals, so every pitch class maps.
//! An undetermined key maps under the default key, C major.

use crate::key::{KeyContext, Mode};
use crate::pitch::{Chroma, PitchObservation};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The 12-entry chromatic solfa set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Syllable {
    Do,
    Di,
    Re,
    Ri,
    Mi,
    Fa,
    Fi,
    Sol,
    Si,
    La,
    Li,
    Ti,
}

impl Syllable {
    /// All syllables in ascending chromatic order from Do
    pub const ALL: [Syllable; 12] = [
        Syllable::Do,
        Syllable::Di,
        Syllable::Re,
        Syllable::Ri,
        Syllable::Mi,
        Syllable::Fa,
        Syllable::Fi,
        Syllable::Sol,
        Syllable::Si,
        Syllable::La,
        Syllable::Li,
        Syllable::Ti,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Syllable::Do => "Do",
            Syllable::Di => "Di",
            Syllable::Re => "Re",
            Syllable::Ri => "Ri",
            Syllable::Mi => "Mi",
            Syllable::Fa => "Fa",
            Syllable::Fi => "Fi",
            Syllable::Sol => "Sol",
            Syllable::Si => "Si",
            Syllable::La => "La",
            Syllable::Li => "Li",
            Syllable::Ti => "Ti",
        }
    }

    /// Diatonic syllable this one is an alteration of (itself if diatonic)
    pub fn diatonic(self) -> Syllable {
        match self {
            Syllable::Di => Syllable::Do,
            Syllable::Ri => Syllable::Re,
            Syllable::Fi => Syllable::Fa,
            Syllable::Si => Syllable::Sol,
            Syllable::Li => Syllable::La,
            other => other,
        }
    }

    /// True for the raised (non-diatonic) syllables
    pub fn is_chromatic(self) -> bool {
        self.diatonic() != self
    }
}

impl fmt::Display for Syllable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// (syllable, scale degree) indexed by semitones above a major tonic
const MAJOR_TABLE: [(Syllable, u8); 12] = [
    (Syllable::Do, 1),
    (Syllable::Di, 1),
    (Syllable::Re, 2),
    (Syllable::Ri, 2),
    (Syllable::Mi, 3),
    (Syllable::Fa, 4),
    (Syllable::Fi, 4),
    (Syllable::Sol, 5),
    (Syllable::Si, 5),
    (Syllable::La, 6),
    (Syllable::Li, 6),
    (Syllable::Ti, 7),
];

/// (syllable, scale degree) indexed by semitones above a minor tonic
const MINOR_TABLE: [(Syllable, u8); 12] = [
    (Syllable::La, 1),
    (Syllable::Li, 1),
    (Syllable::Ti, 2),
    (Syllable::Do, 3),
    (Syllable::Di, 3),
    (Syllable::Re, 4),
    (Syllable::Ri, 4),
    (Syllable::Mi, 5),
    (Syllable::Fa, 6),
    (Syllable::Fi, 6),
    (Syllable::Sol, 7),
    (Syllable::Si, 7),
];

/// A pitch named relative to the key it was mapped under
///
/// Never patched: when the key changes, callers map again.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolfaNote {
    pub pitch: PitchObservation,
    pub syllable: Syllable,
    /// Scale degree 1-7 of the (nearest diatonic) syllable
    pub degree: u8,
    pub chromatic: bool,
    /// Key the syllable was computed against
    pub key: KeyContext,
}

/// Stateless pitch-to-syllable mapper
#[derive(Debug, Clone, Copy, Default)]
pub struct SolfaMapper;

impl SolfaMapper {
    /// Name `observation` relative to `key`
    pub fn map(observation: &PitchObservation, key: &KeyContext) -> SolfaNote {
        let (syllable, degree) = Self::lookup(observation.chroma, key);
        SolfaNote {
            pitch: *observation,
            syllable,
            degree,
            chromatic: syllable.is_chromatic(),
            key: *key,
        }
    }

    /// Map every observation under one fixed key
    pub fn map_all(observations: &[PitchObservation], key: &KeyContext) -> Vec<SolfaNote> {
        observations
            .iter()
            .map(|observation| Self::map(observation, key))
            .collect()
    }

    /// Syllable and scale degree of `chroma` in `key`
    pub fn lookup(chroma: Chroma, key: &KeyContext) -> (Syllable, u8) {
        let (tonic, table) = match key.mode {
            Mode::Major => (key.tonic, &MAJOR_TABLE),
            Mode::Minor => (key.tonic, &MINOR_TABLE),
            Mode::Undetermined => (Chroma::C, &MAJOR_TABLE),
        };
        table[chroma.interval_from(tonic) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::PitchClassifier;

    fn key(tonic: u8, mode: Mode) -> KeyContext {
        KeyContext {
            tonic: Chroma::new(tonic).unwrap(),
            mode,
            confidence: 0.5,
            observations: 8,
        }
    }

    fn syllable(name: &str, key: &KeyContext) -> Syllable {
        let obs = PitchClassifier::default().classify(name, 0).unwrap();
        SolfaMapper::map(&obs, key).syllable
    }

    #[test]
    fn test_c_major_scale() {
        let c_major = key(0, Mode::Major);
        let scale: Vec<Syllable> = ["C4", "D4", "E4", "F4", "G4", "A4", "B4", "C5"]
            .iter()
            .map(|n| syllable(n, &c_major))
            .collect();
        assert_eq!(
            scale,
            vec![
                Syllable::Do,
                Syllable::Re,
                Syllable::Mi,
                Syllable::Fa,
                Syllable::Sol,
                Syllable::La,
                Syllable::Ti,
                Syllable::Do
            ]
        );
    }

    #[test]
    fn test_movable_do_follows_tonic() {
        let g_major = key(7, Mode::Major);
        assert_eq!(syllable("G3", &g_major), Syllable::Do);
        assert_eq!(syllable("F#4", &g_major), Syllable::Ti);
        assert_eq!(syllable("C4", &g_major), Syllable::Fa);
        // Raised fourth in G
        assert_eq!(syllable("C#4", &g_major), Syllable::Fi);
    }

    #[test]
    fn test_la_based_minor() {
        let a_minor = key(9, Mode::Minor);
        assert_eq!(syllable("A4", &a_minor), Syllable::La);
        assert_eq!(syllable("C5", &a_minor), Syllable::Do);
        assert_eq!(syllable("E4", &a_minor), Syllable::Mi);
        // Harmonic-minor leading tone
        assert_eq!(syllable("G#4", &a_minor), Syllable::Si);
        // Melodic-minor raised sixth
        assert_eq!(syllable("F#4", &a_minor), Syllable::Fi);
    }

    #[test]
    fn test_undetermined_uses_c_major() {
        let mut pending = key(7, Mode::Undetermined);
        pending.confidence = 0.0;
        assert_eq!(syllable("C4", &pending), Syllable::Do);
        assert_eq!(syllable("G4", &pending), Syllable::Sol);
    }

    #[test]
    fn test_every_interval_maps_in_both_modes() {
        for mode in [Mode::Major, Mode::Minor, Mode::Undetermined] {
            for tonic in Chroma::all() {
                let context = KeyContext {
                    tonic,
                    mode,
                    confidence: 0.0,
                    observations: 3,
                };
                let mut seen = Vec::new();
                for chroma in Chroma::all() {
                    let (syllable, degree) = SolfaMapper::lookup(chroma, &context);
                    assert!(Syllable::ALL.contains(&syllable));
                    assert!((1..=7).contains(&degree));
                    seen.push(syllable);
                }
                // Each key uses all 12 syllables exactly once
                seen.sort_by_key(|s| s.as_str());
                seen.dedup();
                assert_eq!(seen.len(), 12, "{:?} {}", mode, tonic);
            }
        }
    }

    #[test]
    fn test_degrees_and_chromatic_flag() {
        let c_major = key(0, Mode::Major);
        let obs = PitchClassifier::default().classify("F#4", 0).unwrap();
        let note = SolfaMapper::map(&obs, &c_major);
        assert_eq!(note.syllable, Syllable::Fi);
        assert_eq!(note.syllable.diatonic(), Syllable::Fa);
        assert_eq!(note.degree, 4);
        assert!(note.chromatic);

        let obs = PitchClassifier::default().classify("B4", 0).unwrap();
        let note = SolfaMapper::map(&obs, &c_major);
        assert_eq!(note.degree, 7);
        assert!(!note.chromatic);
    }

    #[test]
    fn test_mapping_is_idempotent() {
        let e_minor = key(4, Mode::Minor);
        let obs = PitchClassifier::default().classify("D#5", 3).unwrap();
        assert_eq!(SolfaMapper::map(&obs, &e_minor), SolfaMapper::map(&obs, &e_minor));
    }

    #[test]
    fn test_same_chroma_differs_across_keys() {
        let obs = PitchClassifier::default().classify("G4", 0).unwrap();
        assert_eq!(SolfaMapper::map(&obs, &key(0, Mode::Major)).syllable, Syllable::Sol);
        assert_eq!(SolfaMapper::map(&obs, &key(7, Mode::Major)).syllable, Syllable::Do);
    }
}
