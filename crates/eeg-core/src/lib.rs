//! EEG-Core: Foundation types for EEG feature extraction
//!
//! Recordings, frequency bands, feature tensors, the error taxonomy, and
//! the EEGLAB file format.

pub mod bands;
pub mod error;
pub mod format;
pub mod recording;
pub mod tensor;

pub use bands::{BandSet, FrequencyBand};
pub use error::{EegError, EegResult, ErrorKind, LoadFailure};
pub use format::RecordingFormat;
pub use recording::{Recording, SignalUnit};
pub use tensor::FeatureTensor;
