//! Error handling for the EEG feature pipeline
//!
//! Every failure is terminal for the request that hit it. Variants carry
//! enough context (path, channel counts, window index) for a caller to
//! diagnose the problem without access to pipeline internals.

use std::fmt;
use std::path::PathBuf;

/// Result type alias for EEG pipeline operations
pub type EegResult<T> = Result<T, EegError>;

/// Error type for all pipeline operations
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum EegError {
    /// Recording could not be read or does not have the expected layout
    Load {
        /// File that failed to load
        path: PathBuf,
        /// What went wrong
        failure: LoadFailure,
    },

    /// Recording is shorter than a single analysis window
    TooShort {
        /// Samples per channel in the recording
        samples: usize,
        /// Samples required for one window
        window_samples: usize,
        /// Sampling rate of the recording
        sampling_rate: f64,
    },

    /// Power spectral density estimation failed
    SpectralEstimation {
        /// Window being processed, when known
        window_index: Option<usize>,
        /// Channel being processed, when known
        channel: Option<usize>,
        /// Description of the failure
        reason: String,
    },

    /// Invalid pipeline or service configuration
    Configuration {
        /// Description of the configuration error
        message: String,
    },

    /// Classifier invocation or output interpretation failed
    Inference {
        /// Description of the inference error
        message: String,
    },
}

/// Specific reasons a recording failed to load
#[derive(Debug, Clone, PartialEq)]
pub enum LoadFailure {
    /// Underlying I/O error
    Io(String),
    /// File content does not follow the expected structure
    Malformed(String),
    /// File format (or format variant) is not supported
    UnsupportedFormat(String),
    /// Channel count differs from the deployment's expectation
    ChannelCount {
        expected: usize,
        actual: usize,
    },
    /// A required header field is absent
    MissingField(&'static str),
    /// Sample data lives in a companion file that could not be found
    MissingCompanion {
        /// Candidate paths that were checked
        tried: Vec<PathBuf>,
    },
    /// Dataset is already epoched (more than one trial)
    EpochedData {
        trials: usize,
    },
    /// Sampling rate too low for the configured band-pass
    UnsupportedSamplingRate {
        rate: f64,
        minimum: f64,
    },
}

/// Coarse error classification used at the service boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Load,
    TooShort,
    SpectralEstimation,
    Configuration,
    Inference,
}

impl ErrorKind {
    /// Stable snake_case identifier for responses and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Load => "load",
            ErrorKind::TooShort => "too_short",
            ErrorKind::SpectralEstimation => "spectral_estimation",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Inference => "inference",
        }
    }
}

impl EegError {
    /// Build a load error for `path`
    pub fn load(path: impl Into<PathBuf>, failure: LoadFailure) -> Self {
        EegError::Load {
            path: path.into(),
            failure,
        }
    }

    /// Build a spectral estimation error without window context
    pub fn spectral(reason: impl Into<String>) -> Self {
        EegError::SpectralEstimation {
            window_index: None,
            channel: None,
            reason: reason.into(),
        }
    }

    /// Build a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        EegError::Configuration {
            message: message.into(),
        }
    }

    /// Build an inference error
    pub fn inference(message: impl Into<String>) -> Self {
        EegError::Inference {
            message: message.into(),
        }
    }

    /// Attach a window index to a spectral estimation error
    pub fn in_window(self, index: usize) -> Self {
        match self {
            EegError::SpectralEstimation { channel, reason, .. } => EegError::SpectralEstimation {
                window_index: Some(index),
                channel,
                reason,
            },
            other => other,
        }
    }

    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            EegError::Load { .. } => ErrorKind::Load,
            EegError::TooShort { .. } => ErrorKind::TooShort,
            EegError::SpectralEstimation { .. } => ErrorKind::SpectralEstimation,
            EegError::Configuration { .. } => ErrorKind::Configuration,
            EegError::Inference { .. } => ErrorKind::Inference,
        }
    }
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadFailure::Io(reason) => write!(f, "I/O error: {}", reason),
            LoadFailure::Malformed(reason) => write!(f, "malformed recording: {}", reason),
            LoadFailure::UnsupportedFormat(reason) => write!(f, "unsupported format: {}", reason),
            LoadFailure::ChannelCount { expected, actual } => {
                write!(f, "expected {} channels, found {}", expected, actual)
            }
            LoadFailure::MissingField(field) => write!(f, "missing required field '{}'", field),
            LoadFailure::MissingCompanion { tried } => {
                let tried: Vec<String> = tried.iter().map(|p| p.display().to_string()).collect();
                write!(f, "companion data file not found (tried: {})", tried.join(", "))
            }
            LoadFailure::EpochedData { trials } => {
                write!(f, "dataset is epoched ({} trials), continuous data required", trials)
            }
            LoadFailure::UnsupportedSamplingRate { rate, minimum } => {
                write!(f, "sampling rate {}Hz too low, must exceed {}Hz", rate, minimum)
            }
        }
    }
}

impl fmt::Display for EegError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EegError::Load { path, failure } => {
                write!(f, "Failed to load {}: {}", path.display(), failure)
            }
            EegError::TooShort { samples, window_samples, sampling_rate } => {
                write!(f, "Recording too short: {} samples at {}Hz, one window needs {}",
                       samples, sampling_rate, window_samples)
            }
            EegError::SpectralEstimation { window_index, channel, reason } => {
                write!(f, "Spectral estimation failed")?;
                if let Some(window) = window_index {
                    write!(f, " in window {}", window)?;
                }
                if let Some(channel) = channel {
                    write!(f, " on channel {}", channel)?;
                }
                write!(f, ": {}", reason)
            }
            EegError::Configuration { message } => {
                write!(f, "Configuration error: {}", message)
            }
            EegError::Inference { message } => {
                write!(f, "Inference error: {}", message)
            }
        }
    }
}

impl std::error::Error for EegError {}

impl From<ndarray::ShapeError> for EegError {
    fn from(err: ndarray::ShapeError) -> Self {
        EegError::config(format!("array shape mismatch: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = EegError::load(
            "/tmp/subject.set",
            LoadFailure::ChannelCount { expected: 19, actual: 18 },
        );
        let display = format!("{}", error);
        assert!(display.contains("/tmp/subject.set"));
        assert!(display.contains("19"));
        assert!(display.contains("18"));
    }

    #[test]
    fn test_spectral_error_carries_window() {
        let error = EegError::spectral("segment longer than window").in_window(3);
        assert_eq!(error.kind(), ErrorKind::SpectralEstimation);
        assert!(error.to_string().contains("window 3"));
    }

    #[test]
    fn test_error_kinds_are_distinct() {
        let errors = [
            EegError::load("a.set", LoadFailure::Io("denied".into())),
            EegError::TooShort { samples: 10, window_samples: 512, sampling_rate: 256.0 },
            EegError::spectral("x"),
            EegError::config("x"),
            EegError::inference("x"),
        ];
        let mut names: Vec<&str> = errors.iter().map(|e| e.kind().as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), errors.len());
    }

    #[test]
    fn test_error_equality() {
        let error1 = EegError::config("test");
        let error2 = EegError::config("test");
        assert_eq!(error1, error2);
    }
}
