//! Key inference from observed pitch classes
//!
//! Keeps a 12-slot weighted histogram of chroma occurrences and correlates it
//! against the Krumhansl-Schmuckler major and minor profiles rotated to every
//! tonic (24 candidate keys). The best-correlated candidate is the key.
//!
//! Streaming use decays the histogram on every update so the estimate can
//! follow a modulation; batch use keeps uniform weights. [`KeyDetector::infer`]
//! is exactly a fold of [`KeyDetector::update`] over the sequence from a fresh
//! uniform detector.
//!
//! Scoring is fully deterministic: candidates are visited major C..B then
//! minor C..B and only a strictly higher score replaces the current best, so
//! exact ties prefer major, then the lower tonic.

use crate::pitch::{Chroma, PitchObservation};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Krumhansl-Schmuckler major profile (tonic at index 0)
const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

/// Krumhansl-Schmuckler minor profile (tonic at index 0)
const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// Observations needed before a mode is reported
pub const DEFAULT_MIN_OBSERVATIONS: usize = 3;

/// Per-update histogram decay for streaming sessions
pub const DEFAULT_STREAM_DECAY: f64 = 0.9;

/// Below this a variance counts as zero
const VARIANCE_EPSILON: f64 = 1e-12;

/// Tonal mode of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Major,
    Minor,
    /// Not enough observations yet
    Undetermined,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Major => "major",
            Mode::Minor => "minor",
            Mode::Undetermined => "undetermined",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current key estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyContext {
    pub tonic: Chroma,
    pub mode: Mode,
    /// Normalized margin of the winning key over the runner-up, 0.0-1.0
    pub confidence: f64,
    /// Observations folded into the estimate
    pub observations: usize,
}

impl KeyContext {
    /// State at session start: tonic C, mode undetermined
    pub fn undetermined() -> Self {
        Self {
            tonic: Chroma::C,
            mode: Mode::Undetermined,
            confidence: 0.0,
            observations: 0,
        }
    }

    pub fn is_determined(&self) -> bool {
        self.mode != Mode::Undetermined
    }
}

impl Default for KeyContext {
    fn default() -> Self {
        Self::undetermined()
    }
}

impl fmt::Display for KeyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            Mode::Undetermined => f.write_str("undetermined"),
            mode => write!(f, "{} {}", self.tonic, mode),
        }
    }
}

/// Key detector tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyDetectorConfig {
    /// Multiplier applied to every histogram slot before each update
    /// (1.0 = uniform weights)
    pub decay: f64,
    /// Observations required before mode becomes major/minor
    pub min_observations: usize,
}

impl Default for KeyDetectorConfig {
    fn default() -> Self {
        Self {
            decay: DEFAULT_STREAM_DECAY,
            min_observations: DEFAULT_MIN_OBSERVATIONS,
        }
    }
}

/// Score of one candidate key
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    tonic: Chroma,
    mode: Mode,
    score: f64,
}

/// Running key estimator
///
/// Owned by exactly one stream session or batch run; never shared.
#[derive(Debug, Clone)]
pub struct KeyDetector {
    config: KeyDetectorConfig,
    histogram: [f64; 12],
    observations: usize,
    current: KeyContext,
}

impl KeyDetector {
    pub fn new(config: KeyDetectorConfig) -> Self {
        let decay = if config.decay.is_finite() && config.decay > 0.0 {
            config.decay.min(1.0)
        } else {
            1.0
        };
        Self {
            config: KeyDetectorConfig { decay, ..config },
            histogram: [0.0; 12],
            observations: 0,
            current: KeyContext::undetermined(),
        }
    }

    /// Decaying detector for live streams
    pub fn streaming() -> Self {
        Self::new(KeyDetectorConfig::default())
    }

    /// Uniform-weight detector for whole recordings
    pub fn uniform() -> Self {
        Self::new(KeyDetectorConfig {
            decay: 1.0,
            min_observations: DEFAULT_MIN_OBSERVATIONS,
        })
    }

    /// Infer one key over a complete, ordered sequence
    pub fn infer<'a, I>(observations: I) -> KeyContext
    where
        I: IntoIterator<Item = &'a PitchObservation>,
    {
        Self::uniform().infer_from(observations)
    }

    /// Fold a sequence into this detector, returning the final estimate
    pub fn infer_from<'a, I>(mut self, observations: I) -> KeyContext
    where
        I: IntoIterator<Item = &'a PitchObservation>,
    {
        for observation in observations {
            self.update(observation);
        }
        self.current
    }

    pub fn config(&self) -> KeyDetectorConfig {
        self.config
    }

    /// Latest estimate without consuming an observation
    pub fn current(&self) -> KeyContext {
        self.current
    }

    /// Forget all observations
    pub fn reset(&mut self) {
        self.histogram = [0.0; 12];
        self.observations = 0;
        self.current = KeyContext::undetermined();
    }

    /// Fold one observation into the histogram and re-score all 24 keys
    pub fn update(&mut self, observation: &PitchObservation) -> KeyContext {
        if self.config.decay < 1.0 {
            for weight in self.histogram.iter_mut() {
                *weight *= self.config.decay;
            }
        }
        self.histogram[observation.chroma.index()] += 1.0;
        self.observations += 1;

        self.current = if self.observations < self.config.min_observations {
            KeyContext {
                observations: self.observations,
                ..KeyContext::undetermined()
            }
        } else {
            let (best, runner_up) = rank_candidates(&self.histogram);
            KeyContext {
                tonic: best.tonic,
                mode: best.mode,
                confidence: confidence(best.score, runner_up),
                observations: self.observations,
            }
        };

        self.current
    }
}

impl Default for KeyDetector {
    fn default() -> Self {
        Self::streaming()
    }
}

/// Best candidate and the runner-up score
fn rank_candidates(histogram: &[f64; 12]) -> (Candidate, f64) {
    let mut best: Option<Candidate> = None;
    let mut runner_up = f64::NEG_INFINITY;

    for (mode, profile) in [(Mode::Major, &MAJOR_PROFILE), (Mode::Minor, &MINOR_PROFILE)] {
        for tonic in Chroma::all() {
            let score = correlate(histogram, profile, tonic);
            match best {
                Some(current) if score <= current.score => {
                    runner_up = runner_up.max(score);
                }
                _ => {
                    if let Some(previous) = best {
                        runner_up = runner_up.max(previous.score);
                    }
                    best = Some(Candidate { tonic, mode, score });
                }
            }
        }
    }

    // Chroma::all() is never empty, so best is always set
    let best = best.unwrap_or(Candidate {
        tonic: Chroma::C,
        mode: Mode::Major,
        score: 0.0,
    });
    (best, runner_up)
}

/// Pearson correlation of the histogram against `profile` rotated to `tonic`
fn correlate(histogram: &[f64; 12], profile: &[f64; 12], tonic: Chroma) -> f64 {
    let histogram_mean = histogram.iter().sum::<f64>() / 12.0;
    let profile_mean = profile.iter().sum::<f64>() / 12.0;

    let mut covariance = 0.0;
    let mut histogram_variance = 0.0;
    let mut profile_variance = 0.0;
    for (degree, &weight) in profile.iter().enumerate() {
        let h = histogram[(degree + tonic.index()) % 12] - histogram_mean;
        let p = weight - profile_mean;
        covariance += h * p;
        histogram_variance += h * h;
        profile_variance += p * p;
    }

    if histogram_variance <= VARIANCE_EPSILON || profile_variance <= VARIANCE_EPSILON {
        return 0.0;
    }
    covariance / (histogram_variance * profile_variance).sqrt()
}

fn confidence(best: f64, runner_up: f64) -> f64 {
    if best <= 0.0 || !runner_up.is_finite() {
        return 0.0;
    }
    ((best - runner_up) / best.abs()).clamp(0.0, 1.0)
}
