//! Recording: continuous multichannel EEG held in memory

use crate::error::{EegError, EegResult};
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Physical unit of stored sample values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalUnit {
    Volts,
    Microvolts,
}

impl SignalUnit {
    /// Multiplier converting microvolts into this unit
    pub fn scale_from_microvolts(&self) -> f64 {
        match self {
            SignalUnit::Volts => 1e-6,
            SignalUnit::Microvolts => 1.0,
        }
    }
}

/// Continuous multichannel recording, shape `(channels, samples)`
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    data: Array2<f64>,
    sampling_rate: f64,
    channel_names: Vec<String>,
    unit: SignalUnit,
    source: Option<PathBuf>,
}

impl Recording {
    /// Create a recording from channel-major data.
    ///
    /// Channel names default to `EEG000`, `EEG001`, ... when `channel_names`
    /// is empty.
    pub fn new(
        data: Array2<f64>,
        sampling_rate: f64,
        channel_names: Vec<String>,
        unit: SignalUnit,
    ) -> EegResult<Self> {
        if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
            return Err(EegError::config(format!(
                "sampling rate must be positive, got {}",
                sampling_rate
            )));
        }

        let channel_count = data.nrows();
        if channel_count == 0 {
            return Err(EegError::config("recording has no channels"));
        }

        let channel_names = if channel_names.is_empty() {
            (0..channel_count).map(|i| format!("EEG{:03}", i)).collect()
        } else if channel_names.len() == channel_count {
            channel_names
        } else {
            return Err(EegError::config(format!(
                "{} channel names for {} channels",
                channel_names.len(),
                channel_count
            )));
        };

        Ok(Recording {
            data,
            sampling_rate,
            channel_names,
            unit,
            source: None,
        })
    }

    /// Remember where this recording was read from
    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// Replace the sample data, keeping metadata. Shape must not change.
    pub fn with_data(mut self, data: Array2<f64>) -> EegResult<Self> {
        if data.dim() != self.data.dim() {
            return Err(EegError::config(format!(
                "replacement data shape {:?} differs from {:?}",
                data.dim(),
                self.data.dim()
            )));
        }
        self.data = data;
        Ok(self)
    }

    /// Number of channels
    pub fn channel_count(&self) -> usize {
        self.data.nrows()
    }

    /// Samples per channel
    pub fn samples_per_channel(&self) -> usize {
        self.data.ncols()
    }

    /// Sampling rate in Hz
    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.samples_per_channel() as f64 / self.sampling_rate
    }

    pub fn unit(&self) -> SignalUnit {
        self.unit
    }

    pub fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    pub fn source(&self) -> Option<&PathBuf> {
        self.source.as_ref()
    }

    /// Borrow the full `(channels, samples)` array
    pub fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// Samples of one channel
    pub fn channel(&self, index: usize) -> EegResult<ArrayView1<'_, f64>> {
        if index >= self.channel_count() {
            return Err(EegError::config(format!(
                "channel index {} out of bounds (0-{})",
                index,
                self.channel_count() - 1
            )));
        }
        Ok(self.data.row(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_creation() {
        let data = Array2::zeros((19, 2560));
        let recording = Recording::new(data, 256.0, Vec::new(), SignalUnit::Volts).unwrap();

        assert_eq!(recording.channel_count(), 19);
        assert_eq!(recording.samples_per_channel(), 2560);
        assert!((recording.duration() - 10.0).abs() < 1e-12);
        assert_eq!(recording.channel_names()[0], "EEG000");
        assert_eq!(recording.channel_names()[18], "EEG018");
    }

    #[test]
    fn test_invalid_sampling_rate() {
        let data = Array2::zeros((2, 10));
        assert!(Recording::new(data.clone(), 0.0, Vec::new(), SignalUnit::Volts).is_err());
        assert!(Recording::new(data, f64::NAN, Vec::new(), SignalUnit::Volts).is_err());
    }

    #[test]
    fn test_channel_names_must_match() {
        let data = Array2::zeros((2, 10));
        let names = vec!["Fp1".to_string()];
        assert!(Recording::new(data, 100.0, names, SignalUnit::Volts).is_err());
    }

    #[test]
    fn test_channel_access() {
        let data = Array2::from_shape_fn((2, 4), |(c, t)| (c * 10 + t) as f64);
        let recording = Recording::new(data, 100.0, Vec::new(), SignalUnit::Microvolts).unwrap();

        let ch1 = recording.channel(1).unwrap();
        assert_eq!(ch1.to_vec(), vec![10.0, 11.0, 12.0, 13.0]);
        assert!(recording.channel(2).is_err());
    }

    #[test]
    fn test_with_data_rejects_shape_change() {
        let recording =
            Recording::new(Array2::zeros((2, 4)), 100.0, Vec::new(), SignalUnit::Volts).unwrap();
        assert!(recording.clone().with_data(Array2::zeros((2, 5))).is_err());
        assert!(recording.with_data(Array2::ones((2, 4))).is_ok());
    }

    #[test]
    fn test_unit_scale() {
        assert_eq!(SignalUnit::Volts.scale_from_microvolts(), 1e-6);
        assert_eq!(SignalUnit::Microvolts.scale_from_microvolts(), 1.0);
    }
}
