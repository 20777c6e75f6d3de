//! Frequency band definitions for relative band power features

use crate::error::{EegError, EegResult};
use serde::{Deserialize, Serialize};

/// Named frequency interval, inclusive on both ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub name: String,
    pub low_hz: f64,
    pub high_hz: f64,
}

impl FrequencyBand {
    pub fn new(name: &str, low_hz: f64, high_hz: f64) -> Self {
        Self {
            name: name.to_string(),
            low_hz,
            high_hz,
        }
    }

    /// Whether `freq` lies within `[low_hz, high_hz]`
    pub fn contains(&self, freq: f64) -> bool {
        freq >= self.low_hz && freq <= self.high_hz
    }
}

/// Ordered band list. The order fixes the band axis of the feature tensor
/// and must match the layout the classifier was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BandSet {
    bands: Vec<FrequencyBand>,
}

impl BandSet {
    pub fn new(bands: Vec<FrequencyBand>) -> EegResult<Self> {
        let set = Self { bands };
        set.validate()?;
        Ok(set)
    }

    /// Delta, theta, alpha, beta, gamma
    pub fn canonical() -> Self {
        Self {
            bands: vec![
                FrequencyBand::new("delta", 0.5, 4.0),
                FrequencyBand::new("theta", 4.0, 8.0),
                FrequencyBand::new("alpha", 8.0, 13.0),
                FrequencyBand::new("beta", 13.0, 25.0),
                FrequencyBand::new("gamma", 25.0, 45.0),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrequencyBand> {
        self.bands.iter()
    }

    pub fn as_slice(&self) -> &[FrequencyBand] {
        &self.bands
    }

    /// Position of the band called `name`
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.bands.iter().position(|b| b.name == name)
    }

    pub fn validate(&self) -> EegResult<()> {
        if self.bands.is_empty() {
            return Err(EegError::config("band set is empty"));
        }

        for band in &self.bands {
            if band.name.trim().is_empty() {
                return Err(EegError::config("band name cannot be empty"));
            }
            if !band.low_hz.is_finite() || !band.high_hz.is_finite() || band.low_hz < 0.0 {
                return Err(EegError::config(format!(
                    "band '{}' has invalid edges {}-{}Hz",
                    band.name, band.low_hz, band.high_hz
                )));
            }
            if band.low_hz >= band.high_hz {
                return Err(EegError::config(format!(
                    "band '{}' low edge {}Hz must be below high edge {}Hz",
                    band.name, band.low_hz, band.high_hz
                )));
            }
        }

        for (i, band) in self.bands.iter().enumerate() {
            if self.bands[..i].iter().any(|b| b.name == band.name) {
                return Err(EegError::config(format!("duplicate band '{}'", band.name)));
            }
        }

        Ok(())
    }
}

impl Default for BandSet {
    fn default() -> Self {
        Self::canonical()
    }
}
