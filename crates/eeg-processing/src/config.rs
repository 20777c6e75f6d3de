//! Configuration for the feature pipeline

use crate::epochs::EpochConfig;
use crate::features::{Aggregation, DEFAULT_EPSILON};
use crate::filters::BandpassConfig;
use crate::psd::WelchConfig;
use eeg_core::{BandSet, EegError, EegResult, SignalUnit};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Channel count of the 10-20 montage the classifier was trained on
pub const DEFAULT_EXPECTED_CHANNELS: usize = 19;

/// Full pipeline configuration, validated before any recording is read.
///
/// Every field has a default matching the training pipeline, so a JSON file
/// only needs the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Channels every recording must have
    pub expected_channels: usize,
    /// Unit samples are converted to after loading
    pub signal_unit: SignalUnit,
    pub bandpass: BandpassConfig,
    pub epochs: EpochConfig,
    pub welch: WelchConfig,
    /// Band order fixes the feature layout
    pub bands: BandSet,
    /// Added to each channel's band power sum before normalizing
    pub epsilon: f64,
    pub aggregation: Aggregation,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            expected_channels: DEFAULT_EXPECTED_CHANNELS,
            signal_unit: SignalUnit::Volts,
            bandpass: BandpassConfig::default(),
            epochs: EpochConfig::default(),
            welch: WelchConfig::default(),
            bands: BandSet::canonical(),
            epsilon: DEFAULT_EPSILON,
            aggregation: Aggregation::Mean,
        }
    }
}

impl PipelineConfig {
    /// Validate configuration
    pub fn validate(&self) -> EegResult<()> {
        if self.expected_channels == 0 {
            return Err(EegError::config("expected channel count must be greater than 0"));
        }

        self.bandpass.validate()?;
        self.epochs.validate()?;
        self.welch.validate()?;
        self.bands.validate()?;

        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(EegError::config(format!(
                "epsilon must be non-negative, got {}",
                self.epsilon
            )));
        }

        for band in self.bands.iter() {
            if band.low_hz < self.welch.fmin || band.high_hz > self.welch.fmax {
                return Err(EegError::config(format!(
                    "band '{}' ({}-{}Hz) lies outside the PSD range {}-{}Hz",
                    band.name, band.low_hz, band.high_hz, self.welch.fmin, self.welch.fmax
                )));
            }
        }

        Ok(())
    }

    /// Lowest sampling rate recordings may have (exclusive)
    pub fn minimum_sampling_rate(&self) -> f64 {
        self.bandpass.minimum_sampling_rate()
    }

    /// Export configuration to JSON
    pub fn to_json(&self) -> EegResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| EegError::config(format!("Failed to serialize configuration: {}", e)))
    }

    /// Import configuration from JSON
    pub fn from_json(json: &str) -> EegResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| EegError::config(format!("Failed to deserialize configuration: {}", e)))
    }

    /// Read and validate a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> EegResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            EegError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_json(&json)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eeg_core::FrequencyBand;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.expected_channels, 19);
        assert_eq!(config.signal_unit, SignalUnit::Volts);
        assert_eq!(config.bands.len(), 5);
        assert_eq!(config.epsilon, 1e-12);
        assert_eq!(config.minimum_sampling_rate(), 90.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = PipelineConfig::default();
        config.expected_channels = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.epsilon = -1.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.bands = BandSet::new(vec![FrequencyBand::new("high", 40.0, 60.0)]).unwrap();
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.epochs.overlap_secs = 3.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_serialization() {
        let mut config = PipelineConfig::default();
        config.aggregation = Aggregation::Median;
        config.signal_unit = SignalUnit::Microvolts;

        let json = config.to_json().unwrap();
        assert!(json.contains("\"median\""));
        assert!(json.contains("\"microvolts\""));

        let restored = PipelineConfig::from_json(&json).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = PipelineConfig::from_json(r#"{"expected_channels": 32, "aggregation": "median"}"#).unwrap();
        assert_eq!(config.expected_channels, 32);
        assert_eq!(config.aggregation, Aggregation::Median);
        assert_eq!(config.welch, WelchConfig::default());
        assert_eq!(config.bands, BandSet::canonical());
    }

    #[test]
    fn test_malformed_json() {
        let err = PipelineConfig::from_json("{ not json").unwrap_err();
        assert_eq!(err.kind(), eeg_core::ErrorKind::Configuration);
    }
}
