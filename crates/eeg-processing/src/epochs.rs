//! Fixed-length overlapping windows over a continuous recording

use eeg_core::{EegError, EegResult, Recording};
use ndarray::{s, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Window length and overlap in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpochConfig {
    pub duration_secs: f64,
    pub overlap_secs: f64,
}

impl Default for EpochConfig {
    fn default() -> Self {
        Self {
            duration_secs: 2.0,
            overlap_secs: 1.0,
        }
    }
}

impl EpochConfig {
    pub fn validate(&self) -> EegResult<()> {
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(EegError::config(format!(
                "epoch duration must be positive, got {}s",
                self.duration_secs
            )));
        }
        if !self.overlap_secs.is_finite()
            || self.overlap_secs < 0.0
            || self.overlap_secs >= self.duration_secs
        {
            return Err(EegError::config(format!(
                "epoch overlap must be in [0, {}), got {}s",
                self.duration_secs, self.overlap_secs
            )));
        }
        Ok(())
    }

    /// Samples per window at `sampling_rate`
    pub fn window_samples(&self, sampling_rate: f64) -> usize {
        (self.duration_secs * sampling_rate).round() as usize
    }

    /// Samples between consecutive window starts at `sampling_rate`
    pub fn step_samples(&self, sampling_rate: f64) -> usize {
        ((self.duration_secs - self.overlap_secs) * sampling_rate).round() as usize
    }
}

/// Number of windows of `window` samples, `step` apart, that fit in `samples`
pub fn window_count(samples: usize, window: usize, step: usize) -> usize {
    if window == 0 || step == 0 || samples < window {
        0
    } else {
        (samples - window) / step + 1
    }
}

/// Windowed copy of a recording, shape `(windows, channels, samples)`
#[derive(Debug, Clone)]
pub struct Epochs {
    data: Array3<f64>,
    sampling_rate: f64,
}

impl Epochs {
    pub fn len(&self) -> usize {
        self.data.dim().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channel_count(&self) -> usize {
        self.data.dim().1
    }

    pub fn window_samples(&self) -> usize {
        self.data.dim().2
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    /// `(channels, samples)` view of one window
    pub fn window(&self, index: usize) -> Option<ArrayView2<'_, f64>> {
        (index < self.len()).then(|| self.data.index_axis(Axis(0), index))
    }

    pub fn iter(&self) -> impl Iterator<Item = ArrayView2<'_, f64>> {
        self.data.outer_iter()
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }
}

/// Cut `recording` into fixed-length windows.
///
/// Windows start every `duration - overlap` seconds and never wrap; trailing
/// samples that do not fill a window are dropped. A recording shorter than
/// one window is a [`EegError::TooShort`].
pub fn make_fixed_length_epochs(recording: &Recording, config: &EpochConfig) -> EegResult<Epochs> {
    config.validate()?;

    let fs = recording.sampling_rate();
    let window = config.window_samples(fs);
    let step = config.step_samples(fs);
    if window == 0 || step == 0 {
        return Err(EegError::config(format!(
            "epochs of {}s with {}s overlap round to zero samples at {}Hz",
            config.duration_secs, config.overlap_secs, fs
        )));
    }

    let samples = recording.samples_per_channel();
    let count = window_count(samples, window, step);
    if count == 0 {
        return Err(EegError::TooShort {
            samples,
            window_samples: window,
            sampling_rate: fs,
        });
    }

    let source = recording.data();
    let mut data = Array3::zeros((count, recording.channel_count(), window));
    for (index, mut epoch) in data.outer_iter_mut().enumerate() {
        let start = index * step;
        epoch.assign(&source.slice(s![.., start..start + window]));
    }

    debug!(windows = count, window_samples = window, step_samples = step, "epoched recording");

    Ok(Epochs {
        data,
        sampling_rate: fs,
    })
}
