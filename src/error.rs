//! Error types shared by the metronome core and the settings layer.

use thiserror::Error;

/// Conditions raised by the beat pattern and the scheduler.
///
/// None of these are fatal: pass-level conditions are reported on the event
/// channel, call-level ones are returned to the caller and leave state as it was.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetronomeError {
    /// Tempo is zero, negative, NaN or infinite.
    #[error("Invalid tempo: {0} bpm")]
    InvalidTempo(f64),

    /// A pattern with no beats was supplied.
    #[error("Pattern must contain at least one beat")]
    InvalidPattern,

    /// A beat index past the end of the pattern.
    #[error("Beat index {index} out of range for pattern of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Resize to fewer than one beat.
    #[error("Invalid pattern length: {0}")]
    InvalidLength(usize),
}

/// Errors from loading or saving the settings file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to serialize settings: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,
}

pub type Result<T> = std::result::Result<T, MetronomeError>;
