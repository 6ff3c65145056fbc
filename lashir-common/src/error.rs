//! Common error types for Lashir

use thiserror::Error;

/// Common result type for Lashir operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the Lashir crates
#[derive(Error, Debug)]
pub enum Error {
    /// A single pitch reading could not be parsed as a note name or frequency
    #[error("Unrecognized pitch: {0}")]
    UnrecognizedPitch(String),

    /// Pitch class outside 0-11 (contract violation, never user input)
    #[error("Invalid chroma: {0} (expected 0-11)")]
    InvalidChroma(u8),

    /// Pitch detector output could not be split into readings
    #[error("Malformed detector output: {0}")]
    MalformedReadings(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
