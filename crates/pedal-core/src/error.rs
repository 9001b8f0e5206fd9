//! Unified error type for the pedal workspace
//!
//! Library crates return [`PedalResult`] so callers can distinguish structural
//! misconfiguration (fatal) from data problems. Row-level gaps are never errors;
//! they are counted in an exclusion report and the run continues.
//!
//! # Example
//!
//! ```ignore
//! use pedal_core::{PedalError, PedalResult};
//!
//! fn load(path: &str) -> PedalResult<StudyConfig> {
//!     let config = StudyConfig::from_path(path)?;
//!     config.validate()?;
//!     Ok(config)
//! }
//! ```

use thiserror::Error;

/// Error type for all pedal operations.
#[derive(Error, Debug)]
pub enum PedalError {
    /// I/O errors (file access)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Data or ordering invariant violated
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Overlapping or non-exhaustive train/test partitions. Always fatal and
    /// raised before any model is fitted.
    #[error("Split violation: {0}")]
    SplitViolation(String),

    /// Estimator could not produce coefficients (empty or singular design)
    #[error("Degenerate model: {0}")]
    Degenerate(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using PedalError.
pub type PedalResult<T> = Result<T, PedalError>;

impl From<anyhow::Error> for PedalError {
    fn from(err: anyhow::Error) -> Self {
        PedalError::Other(err.to_string())
    }
}

impl From<String> for PedalError {
    fn from(s: String) -> Self {
        PedalError::Other(s)
    }
}

impl From<&str> for PedalError {
    fn from(s: &str) -> Self {
        PedalError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for PedalError {
    fn from(err: serde_json::Error) -> Self {
        PedalError::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for PedalError {
    fn from(err: toml::de::Error) -> Self {
        PedalError::Config(err.to_string())
    }
}

impl PedalError {
    /// True for errors that must abort a run rather than be recovered per row.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PedalError::Degenerate(_))
    }
}
