//! Welch power spectral density estimation

use eeg_core::{EegError, EegResult};
use ndarray::{Array2, ArrayView1, ArrayView2};
use realfft::{RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

/// Welch estimator parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WelchConfig {
    /// FFT length per segment
    pub n_fft: usize,
    /// Segment length, `n_fft` when unset
    pub n_per_seg: Option<usize>,
    /// Samples shared by consecutive segments
    pub n_overlap: usize,
    /// Lowest frequency kept (Hz, inclusive)
    pub fmin: f64,
    /// Highest frequency kept (Hz, inclusive)
    pub fmax: f64,
}

impl Default for WelchConfig {
    fn default() -> Self {
        Self {
            n_fft: 256,
            n_per_seg: None,
            n_overlap: 0,
            fmin: 0.5,
            fmax: 45.0,
        }
    }
}

impl WelchConfig {
    pub fn segment_length(&self) -> usize {
        self.n_per_seg.unwrap_or(self.n_fft)
    }

    pub fn validate(&self) -> EegResult<()> {
        let n_per_seg = self.segment_length();
        if self.n_fft == 0 || n_per_seg == 0 {
            return Err(EegError::config("Welch n_fft and n_per_seg must be positive"));
        }
        if n_per_seg > self.n_fft {
            return Err(EegError::config(format!(
                "Welch n_per_seg ({}) cannot exceed n_fft ({})",
                n_per_seg, self.n_fft
            )));
        }
        if self.n_overlap >= n_per_seg {
            return Err(EegError::config(format!(
                "Welch n_overlap ({}) must be smaller than n_per_seg ({})",
                self.n_overlap, n_per_seg
            )));
        }
        if !self.fmin.is_finite() || !self.fmax.is_finite() || self.fmin < 0.0 || self.fmin >= self.fmax {
            return Err(EegError::config(format!(
                "Welch frequency range {}-{}Hz is invalid",
                self.fmin, self.fmax
            )));
        }
        Ok(())
    }
}

/// One-sided power spectral density, `power` shaped `(channels, freqs)`
#[derive(Debug, Clone, PartialEq)]
pub struct Psd {
    pub freqs: Vec<f64>,
    pub power: Array2<f64>,
}

/// Periodic Hamming window
pub fn hamming_periodic(length: usize) -> Vec<f64> {
    (0..length)
        .map(|n| 0.54 - 0.46 * (2.0 * PI * n as f64 / length as f64).cos())
        .collect()
}

/// Welch estimator bound to one sampling rate
pub struct Welch {
    config: WelchConfig,
    sampling_rate: f64,
    window: Vec<f64>,
    scale: f64,
    /// Indices into the full one-sided spectrum kept by `[fmin, fmax]`
    bins: Vec<usize>,
    freqs: Vec<f64>,
    fft: Arc<dyn RealToComplex<f64>>,
}

impl fmt::Debug for Welch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Welch")
            .field("config", &self.config)
            .field("sampling_rate", &self.sampling_rate)
            .field("freqs", &self.freqs.len())
            .finish()
    }
}

impl Welch {
    pub fn new(config: &WelchConfig, sampling_rate: f64) -> EegResult<Self> {
        config.validate()?;
        if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
            return Err(EegError::config(format!("invalid sampling rate {}", sampling_rate)));
        }

        let n_per_seg = config.segment_length();
        let window = hamming_periodic(n_per_seg);
        let scale = 1.0 / (sampling_rate * window.iter().map(|w| w * w).sum::<f64>());

        let resolution = sampling_rate / config.n_fft as f64;
        let (bins, freqs): (Vec<usize>, Vec<f64>) = (0..=config.n_fft / 2)
            .map(|k| (k, k as f64 * resolution))
            .filter(|&(_, f)| f >= config.fmin && f <= config.fmax)
            .unzip();

        if bins.is_empty() {
            return Err(EegError::spectral(format!(
                "no frequency bins in {}-{}Hz at {}Hz resolution",
                config.fmin, config.fmax, resolution
            )));
        }

        let fft = RealFftPlanner::<f64>::new().plan_fft_forward(config.n_fft);

        Ok(Self {
            config: config.clone(),
            sampling_rate,
            window,
            scale,
            bins,
            freqs,
            fft,
        })
    }

    pub fn freqs(&self) -> &[f64] {
        &self.freqs
    }

    pub fn config(&self) -> &WelchConfig {
        &self.config
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    /// Segments averaged for a signal of `samples` length
    pub fn segment_count(&self, samples: usize) -> usize {
        let n_per_seg = self.config.segment_length();
        if samples < n_per_seg {
            return 0;
        }
        let step = n_per_seg - self.config.n_overlap;
        (samples - n_per_seg) / step + 1
    }

    /// PSD of every row of a `(channels, samples)` window
    pub fn compute(&self, data: ArrayView2<'_, f64>) -> EegResult<Psd> {
        let (channels, samples) = data.dim();
        let n_per_seg = self.config.segment_length();
        if samples < n_per_seg {
            return Err(EegError::spectral(format!(
                "{} samples is shorter than the {}-sample Welch segment",
                samples, n_per_seg
            )));
        }

        let mut power = Array2::zeros((channels, self.bins.len()));
        for (channel, row) in data.rows().into_iter().enumerate() {
            let spectrum = self.channel_psd(row)?;
            if spectrum.iter().any(|p| !p.is_finite()) {
                return Err(EegError::SpectralEstimation {
                    window_index: None,
                    channel: Some(channel),
                    reason: "non-finite power spectral density".to_string(),
                });
            }
            power.row_mut(channel).assign(&ArrayView1::from(&spectrum[..]));
        }

        Ok(Psd {
            freqs: self.freqs.clone(),
            power,
        })
    }

    fn channel_psd(&self, x: ArrayView1<'_, f64>) -> EegResult<Vec<f64>> {
        let n_fft = self.config.n_fft;
        let n_per_seg = self.config.segment_length();
        let step = n_per_seg - self.config.n_overlap;
        let segments = self.segment_count(x.len());

        let mut input = self.fft.make_input_vec();
        let mut output = self.fft.make_output_vec();
        let mut accumulated = vec![0.0; self.bins.len()];

        for segment in 0..segments {
            let start = segment * step;
            let chunk = x.slice(ndarray::s![start..start + n_per_seg]);
            let mean = chunk.sum() / n_per_seg as f64;

            input.iter_mut().for_each(|v| *v = 0.0);
            for ((slot, &sample), &w) in input.iter_mut().zip(chunk.iter()).zip(&self.window) {
                *slot = (sample - mean) * w;
            }

            self.fft
                .process(&mut input, &mut output)
                .map_err(|e| EegError::spectral(format!("FFT failed: {}", e)))?;

            for (acc, &bin) in accumulated.iter_mut().zip(&self.bins) {
                *acc += output[bin].norm_sqr();
            }
        }

        let nyquist_bin = if n_fft % 2 == 0 { Some(n_fft / 2) } else { None };
        let norm = self.scale / segments as f64;
        for (acc, &bin) in accumulated.iter_mut().zip(&self.bins) {
            let one_sided = if bin == 0 || Some(bin) == nyquist_bin { 1.0 } else { 2.0 };
            *acc *= norm * one_sided;
        }

        Ok(accumulated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f64, amplitude: f64, fs: f64, samples: usize) -> Array2<f64> {
        Array2::from_shape_fn((1, samples), |(_, t)| {
            amplitude * (2.0 * PI * freq * t as f64 / fs).sin()
        })
    }

    #[test]
    fn test_default_bins_at_256hz() {
        let welch = Welch::new(&WelchConfig::default(), 256.0).unwrap();
        let freqs = welch.freqs();
        assert_eq!(freqs.first(), Some(&1.0));
        assert_eq!(freqs.last(), Some(&45.0));
        assert_eq!(freqs.len(), 45);
        assert_eq!(welch.segment_count(512), 2);
    }

    #[test]
    fn test_tone_peak_and_power() {
        let fs = 256.0;
        let welch = Welch::new(&WelchConfig::default(), fs).unwrap();
        let psd = welch.compute(tone(10.0, 2.0, fs, 512).view()).unwrap();

        let (peak, _) = psd
            .power
            .row(0)
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |best, (i, &p)| if p > best.1 { (i, p) } else { best });
        assert_eq!(psd.freqs[peak], 10.0);

        // Density integrates to the signal variance (A^2 / 2)
        let resolution = fs / 256.0;
        let total: f64 = psd.power.row(0).sum() * resolution;
        assert!((total - 2.0).abs() < 0.05, "total power {}", total);
    }

    #[test]
    fn test_constant_is_detrended() {
        let welch = Welch::new(&WelchConfig::default(), 256.0).unwrap();
        let psd = welch.compute(Array2::from_elem((2, 512), 3.0).view()).unwrap();
        assert!(psd.power.iter().all(|p| p.abs() < 1e-20));
    }

    #[test]
    fn test_window_shorter_than_segment() {
        let welch = Welch::new(&WelchConfig::default(), 100.0).unwrap();
        let err = welch.compute(Array2::zeros((19, 200)).view()).unwrap_err();
        assert_eq!(err.kind(), eeg_core::ErrorKind::SpectralEstimation);
    }

    #[test]
    fn test_non_finite_input_reports_channel() {
        let welch = Welch::new(&WelchConfig::default(), 256.0).unwrap();
        let mut data = Array2::zeros((3, 256));
        data[[2, 10]] = f64::INFINITY;
        match welch.compute(data.view()) {
            Err(EegError::SpectralEstimation { channel, .. }) => assert_eq!(channel, Some(2)),
            other => panic!("expected spectral error, got {:?}", other),
        }
    }

    #[test]
    fn test_config_validation() {
        let config = WelchConfig { n_overlap: 256, ..Default::default() };
        assert!(config.validate().is_err());

        let config = WelchConfig { n_per_seg: Some(512), ..Default::default() };
        assert!(config.validate().is_err());

        let config = WelchConfig { fmin: 50.0, fmax: 10.0, ..Default::default() };
        assert!(Welch::new(&config, 256.0).is_err());
    }

    #[test]
    fn test_overlapping_segments() {
        let config = WelchConfig { n_overlap: 128, ..Default::default() };
        let welch = Welch::new(&config, 256.0).unwrap();
        assert_eq!(welch.segment_count(512), 3);
    }
}
