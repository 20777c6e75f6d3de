//! Core signal processor trait and types

use eeg_core::{EegResult, Recording};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Core trait for recording-to-recording processing stages
pub trait SignalProcessor: Send + Sync {
    /// Process a recording and return the processed result
    fn process(&self, input: Recording) -> EegResult<Recording>;

    /// Get processor name/identifier
    fn name(&self) -> &str;

    /// Check if processor can handle the given recording
    fn can_process(&self, recording: &Recording) -> bool {
        recording.channel_count() > 0 && recording.sampling_rate() > 0.0
    }

    /// Get processor type for pipeline organization
    fn processor_type(&self) -> ProcessorType {
        ProcessorType::Filter
    }
}

/// Stages of the feature pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorType {
    /// Recording loading and validation
    Loader,
    /// Pre-processing filters
    Filter,
    /// Fixed-length windowing
    Segmenter,
    /// Spectral feature extraction
    FeatureExtractor,
}

/// Performance metrics for one processing stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingMetrics {
    /// Stage that produced these metrics
    pub stage: ProcessorType,
    /// Actual processing time in microseconds
    pub processing_time_us: u64,
    /// Success/failure status
    pub success: bool,
    /// Error message if processing failed
    pub error_message: Option<String>,
}

impl ProcessingMetrics {
    /// Start timing a processing stage
    pub fn start_timing(stage: ProcessorType) -> ProcessingTimer {
        ProcessingTimer {
            start_time: Instant::now(),
            stage,
        }
    }
}

/// Helper for timing processing stages
pub struct ProcessingTimer {
    start_time: Instant,
    stage: ProcessorType,
}

impl ProcessingTimer {
    /// Finish timing and return metrics
    pub fn finish(self) -> ProcessingMetrics {
        ProcessingMetrics {
            stage: self.stage,
            processing_time_us: self.start_time.elapsed().as_micros() as u64,
            success: true,
            error_message: None,
        }
    }

    /// Finish with error
    pub fn finish_with_error(self, error: &str) -> ProcessingMetrics {
        let mut metrics = self.finish();
        metrics.success = false;
        metrics.error_message = Some(error.to_string());
        metrics
    }

    /// Finish according to the outcome of `result`
    pub fn finish_for<T>(self, result: &EegResult<T>) -> ProcessingMetrics {
        match result {
            Ok(_) => self.finish(),
            Err(e) => self.finish_with_error(&e.to_string()),
        }
    }
}
