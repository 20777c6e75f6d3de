//! Pre-defined EEG rhythm patterns for synthetic recordings

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Deterministic component added to a channel, in microvolts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalPattern {
    /// Continuous sinusoid
    Tone {
        frequency: f64,
        amplitude: f64,
        phase: f64,
    },
    /// Sinusoid gated on and off, like alpha spindles
    Burst {
        frequency: f64,
        amplitude: f64,
        on_secs: f64,
        off_secs: f64,
    },
    /// Slow baseline wander below the band-pass
    Drift { frequency: f64, amplitude: f64 },
}

impl SignalPattern {
    pub fn tone(frequency: f64, amplitude: f64) -> Self {
        SignalPattern::Tone {
            frequency,
            amplitude,
            phase: 0.0,
        }
    }

    /// Value at `time` seconds
    pub fn value_at(&self, time: f64) -> f64 {
        match *self {
            SignalPattern::Tone { frequency, amplitude, phase } => {
                amplitude * (2.0 * PI * frequency * time + phase).sin()
            }

            SignalPattern::Burst { frequency, amplitude, on_secs, off_secs } => {
                let cycle = on_secs + off_secs;
                if cycle <= 0.0 || time % cycle < on_secs {
                    amplitude * (2.0 * PI * frequency * time).sin()
                } else {
                    0.0
                }
            }

            SignalPattern::Drift { frequency, amplitude } => {
                amplitude * (2.0 * PI * frequency * time).sin()
            }
        }
    }

    /// Dominant frequency of the pattern
    pub fn frequency(&self) -> f64 {
        match *self {
            SignalPattern::Tone { frequency, .. }
            | SignalPattern::Burst { frequency, .. }
            | SignalPattern::Drift { frequency, .. } => frequency,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SignalPattern::Tone { .. } => "Continuous tone",
            SignalPattern::Burst { .. } => "Gated bursts",
            SignalPattern::Drift { .. } => "Baseline drift",
        }
    }

    /// One representative tone per canonical band
    pub fn presets() -> Vec<(&'static str, SignalPattern)> {
        vec![
            ("Delta", SignalPattern::tone(2.0, 30.0)),
            ("Theta", SignalPattern::tone(6.0, 20.0)),
            ("Alpha", SignalPattern::tone(10.0, 20.0)),
            ("Beta", SignalPattern::tone(20.0, 8.0)),
            ("Gamma", SignalPattern::tone(35.0, 4.0)),
            ("Alpha Spindles", SignalPattern::Burst {
                frequency: 10.0, amplitude: 25.0, on_secs: 1.0, off_secs: 1.0
            }),
            ("Sweat Drift", SignalPattern::Drift { frequency: 0.1, amplitude: 40.0 }),
        ]
    }

    /// Preset by name, case-insensitive
    pub fn preset(name: &str) -> Option<SignalPattern> {
        Self::presets()
            .into_iter()
            .find(|(preset, _)| preset.eq_ignore_ascii_case(name))
            .map(|(_, pattern)| pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_values() {
        let tone = SignalPattern::tone(10.0, 5.0);
        assert!(tone.value_at(0.0).abs() < 1e-12);
        assert!((tone.value_at(0.025) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_burst_gating() {
        let burst = SignalPattern::Burst { frequency: 10.0, amplitude: 1.0, on_secs: 1.0, off_secs: 1.0 };
        assert!(burst.value_at(0.025).abs() > 0.9);
        assert_eq!(burst.value_at(1.525), 0.0);
    }

    #[test]
    fn test_presets() {
        assert_eq!(SignalPattern::preset("alpha").map(|p| p.frequency()), Some(10.0));
        assert!(SignalPattern::preset("kappa").is_none());
    }
}
