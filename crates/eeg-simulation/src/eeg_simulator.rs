//! Multichannel EEG simulator: rhythm patterns plus Gaussian noise

use crate::signal_patterns::SignalPattern;
use eeg_core::{EegError, EegResult, Recording, SignalUnit};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Electrode labels of the 19-channel 10-20 montage
pub const STANDARD_10_20: [&str; 19] = [
    "Fp1", "Fp2", "F7", "F3", "Fz", "F4", "F8", "T3", "C3", "Cz", "C4", "T4", "T5", "P3", "Pz",
    "P4", "T6", "O1", "O2",
];

/// Pattern added to a single channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelPattern {
    pub channel: usize,
    pub pattern: SignalPattern,
}

/// Configuration for EEG simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EegSimConfig {
    /// Sampling rate in Hz
    pub sampling_rate: f64,
    /// Number of channels to simulate
    pub channel_count: usize,
    /// Patterns added to every channel
    pub background: Vec<SignalPattern>,
    /// Patterns added to individual channels
    pub channel_patterns: Vec<ChannelPattern>,
    /// Gaussian noise standard deviation in microvolts (0.0 = no noise)
    pub noise_std: f64,
    /// Random seed for reproducibility
    pub seed: Option<u64>,
}

impl Default for EegSimConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 256.0,
            channel_count: STANDARD_10_20.len(),
            background: Vec::new(),
            channel_patterns: Vec::new(),
            noise_std: 2.0,
            seed: None,
        }
    }
}

impl EegSimConfig {
    /// Default montage with a strong 10 Hz tone on `channel`
    pub fn alpha_on_channel(channel: usize) -> Self {
        Self {
            channel_patterns: vec![ChannelPattern {
                channel,
                pattern: SignalPattern::tone(10.0, 20.0),
            }],
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> EegResult<()> {
        if !self.sampling_rate.is_finite() || self.sampling_rate <= 0.0 {
            return Err(EegError::config(format!(
                "simulation sampling rate must be positive, got {}",
                self.sampling_rate
            )));
        }
        if self.channel_count == 0 {
            return Err(EegError::config("simulation needs at least one channel"));
        }
        if !self.noise_std.is_finite() || self.noise_std < 0.0 {
            return Err(EegError::config(format!(
                "noise standard deviation must be non-negative, got {}",
                self.noise_std
            )));
        }
        if let Some(p) = self.channel_patterns.iter().find(|p| p.channel >= self.channel_count) {
            return Err(EegError::config(format!(
                "pattern targets channel {} of {}",
                p.channel, self.channel_count
            )));
        }
        Ok(())
    }

    /// 10-20 labels for a 19-channel montage, generated names otherwise
    fn channel_names(&self) -> Vec<String> {
        if self.channel_count == STANDARD_10_20.len() {
            STANDARD_10_20.iter().map(|s| s.to_string()).collect()
        } else {
            Vec::new()
        }
    }
}

/// EEG signal simulator
pub struct EegSimulator {
    config: EegSimConfig,
    rng: StdRng,
    noise: Normal<f64>,
    time_offset: f64,
}

impl EegSimulator {
    /// Create new EEG simulator with configuration
    pub fn new(config: EegSimConfig) -> EegResult<Self> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let noise = Normal::new(0.0, config.noise_std).map_err(|e| {
            EegError::config(format!("Failed to create normal distribution: {}", e))
        })?;

        Ok(EegSimulator {
            config,
            rng,
            noise,
            time_offset: 0.0,
        })
    }

    /// Generate `duration` seconds of microvolt data, continuing from the
    /// previous call
    pub fn generate(&mut self, duration: f64) -> EegResult<Recording> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(EegError::config(format!(
                "simulation duration must be positive, got {}s",
                duration
            )));
        }

        let fs = self.config.sampling_rate;
        let samples = (duration * fs).round() as usize;
        let mut data = Array2::zeros((self.config.channel_count, samples));

        for ((channel, t), value) in data.indexed_iter_mut() {
            let time = self.time_offset + t as f64 / fs;
            let mut sample: f64 = self.config.background.iter().map(|p| p.value_at(time)).sum();
            sample += self
                .config
                .channel_patterns
                .iter()
                .filter(|p| p.channel == channel)
                .map(|p| p.pattern.value_at(time))
                .sum::<f64>();
            *value = sample;
        }

        // Noise drawn after the deterministic part so patterns do not shift the stream
        if self.config.noise_std > 0.0 {
            for value in data.iter_mut() {
                *value += self.noise.sample(&mut self.rng);
            }
        }

        self.time_offset += samples as f64 / fs;

        Recording::new(data, fs, self.config.channel_names(), SignalUnit::Microvolts)
    }

    /// Reset time offset (useful for restarting simulation)
    pub fn reset_time(&mut self) {
        self.time_offset = 0.0;
    }

    /// Get current configuration
    pub fn config(&self) -> &EegSimConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulator_basic() {
        let mut simulator = EegSimulator::new(EegSimConfig::default().with_seed(1)).unwrap();
        let recording = simulator.generate(10.0).unwrap();

        assert_eq!(recording.channel_count(), 19);
        assert_eq!(recording.samples_per_channel(), 2560);
        assert_eq!(recording.sampling_rate(), 256.0);
        assert_eq!(recording.unit(), SignalUnit::Microvolts);
        assert_eq!(recording.channel_names()[0], "Fp1");
        assert_eq!(recording.channel_names()[18], "O2");
    }

    #[test]
    fn test_seed_reproducibility() {
        let config = EegSimConfig::alpha_on_channel(0).with_seed(42);
        let a = EegSimulator::new(config.clone()).unwrap().generate(2.0).unwrap();
        let b = EegSimulator::new(config).unwrap().generate(2.0).unwrap();
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn test_channel_pattern_only_on_target() {
        let config = EegSimConfig { noise_std: 0.0, ..EegSimConfig::alpha_on_channel(3) };
        let recording = EegSimulator::new(config).unwrap().generate(1.0).unwrap();

        let energy = |c: usize| recording.data().row(c).iter().map(|v| v * v).sum::<f64>();
        assert!(energy(3) > 1000.0);
        assert_eq!(energy(0), 0.0);
    }

    #[test]
    fn test_continuous_generation() {
        let config = EegSimConfig {
            noise_std: 0.0,
            background: vec![SignalPattern::tone(3.0, 1.0)],
            ..Default::default()
        };
        let mut simulator = EegSimulator::new(config).unwrap();
        let first = simulator.generate(1.0).unwrap();
        let second = simulator.generate(1.0).unwrap();

        let expected = (2.0 * std::f64::consts::PI * 3.0 * 1.0).sin();
        assert!((second.data()[[0, 0]] - expected).abs() < 1e-9);

        simulator.reset_time();
        let again = simulator.generate(1.0).unwrap();
        assert_eq!(again.data(), first.data());
    }

    #[test]
    fn test_invalid_config() {
        assert!(EegSimulator::new(EegSimConfig { channel_count: 0, ..Default::default() }).is_err());
        assert!(EegSimulator::new(EegSimConfig { noise_std: -1.0, ..Default::default() }).is_err());
        let mut config = EegSimConfig::alpha_on_channel(19);
        config.seed = Some(0);
        assert!(EegSimulator::new(config).is_err());
    }
}
