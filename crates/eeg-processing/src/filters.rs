//! Zero-phase FIR band-pass filtering
//!
//! Design follows the MNE `firwin` conventions the classifier was trained
//! with: automatic transition bandwidths, Hamming-windowed sinc kernels and
//! reflect-limited edge padding.

use crate::processor::{ProcessorType, SignalProcessor};
use eeg_core::{EegError, EegResult, Recording};
use ndarray::{Array2, ArrayView2};
use num_complex::Complex;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

/// Filter length per Hz of transition band for a Hamming window
pub const HAMMING_LENGTH_FACTOR: f64 = 3.3;

/// Band-pass edges in Hz
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandpassConfig {
    /// Lower pass-band edge (Hz)
    pub l_freq: f64,
    /// Upper pass-band edge (Hz)
    pub h_freq: f64,
}

impl Default for BandpassConfig {
    fn default() -> Self {
        Self {
            l_freq: 0.5,
            h_freq: 45.0,
        }
    }
}

impl BandpassConfig {
    pub fn new(l_freq: f64, h_freq: f64) -> Self {
        Self { l_freq, h_freq }
    }

    /// Edges must satisfy `0 < l_freq < h_freq`
    pub fn validate(&self) -> EegResult<()> {
        if !self.l_freq.is_finite() || !self.h_freq.is_finite() {
            return Err(EegError::config("band-pass edges must be finite"));
        }
        if self.l_freq <= 0.0 || self.l_freq >= self.h_freq {
            return Err(EegError::config(format!(
                "band-pass requires 0 < l_freq < h_freq, got {}-{}Hz",
                self.l_freq, self.h_freq
            )));
        }
        Ok(())
    }

    /// Lowest sampling rate the upper edge allows (exclusive)
    pub fn minimum_sampling_rate(&self) -> f64 {
        2.0 * self.h_freq
    }
}

/// Automatic transition bandwidths `(low, high)` in Hz
pub fn transition_bandwidths(l_freq: f64, h_freq: f64, sampling_rate: f64) -> (f64, f64) {
    let nyquist = sampling_rate / 2.0;
    let l_trans = (0.25 * l_freq).max(2.0).min(l_freq);
    let h_trans = (0.25 * h_freq).max(2.0).min(nyquist - h_freq);
    (l_trans, h_trans)
}

/// Odd kernel length resolving a transition band of `transition` Hz
pub fn filter_length(transition: f64, sampling_rate: f64) -> usize {
    let length = ((HAMMING_LENGTH_FACTOR * sampling_rate / transition).ceil() as usize).max(1);
    if length % 2 == 0 {
        length + 1
    } else {
        length
    }
}

/// Symmetric Hamming window
pub fn hamming_symmetric(length: usize) -> Vec<f64> {
    if length == 1 {
        return vec![1.0];
    }
    let denom = (length - 1) as f64;
    (0..length)
        .map(|n| 0.54 - 0.46 * (2.0 * PI * n as f64 / denom).cos())
        .collect()
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// Hamming-windowed sinc low-pass with unity DC gain
pub fn firwin_lowpass(num_taps: usize, cutoff_hz: f64, sampling_rate: f64) -> Vec<f64> {
    let cutoff = 2.0 * cutoff_hz / sampling_rate;
    let alpha = (num_taps - 1) as f64 / 2.0;
    let window = hamming_symmetric(num_taps);

    let mut taps: Vec<f64> = window
        .iter()
        .enumerate()
        .map(|(n, w)| w * cutoff * sinc(cutoff * (n as f64 - alpha)))
        .collect();

    let gain: f64 = taps.iter().sum();
    taps.iter_mut().for_each(|t| *t /= gain);
    taps
}

/// Zero-phase FIR band-pass designed for one sampling rate
#[derive(Debug, Clone)]
pub struct FirBandpass {
    config: BandpassConfig,
    sampling_rate: f64,
    taps: Vec<f64>,
}

impl FirBandpass {
    /// Design the kernel for `sampling_rate`
    pub fn design(config: &BandpassConfig, sampling_rate: f64) -> EegResult<Self> {
        config.validate()?;
        if sampling_rate <= config.minimum_sampling_rate() {
            return Err(EegError::config(format!(
                "upper band-pass edge {}Hz needs a sampling rate above {}Hz, got {}Hz",
                config.h_freq,
                config.minimum_sampling_rate(),
                sampling_rate
            )));
        }

        let (l_trans, h_trans) = transition_bandwidths(config.l_freq, config.h_freq, sampling_rate);
        let length = filter_length(l_trans.min(h_trans), sampling_rate);

        // Low-pass above the upper edge minus low-pass below the lower edge,
        // each only as long as its own transition needs
        let mut taps = vec![0.0; length];
        let pieces = [
            (config.h_freq + h_trans / 2.0, h_trans, 1.0),
            (config.l_freq - l_trans / 2.0, l_trans, -1.0),
        ];
        for (cutoff, transition, sign) in pieces {
            let mut piece_len = (HAMMING_LENGTH_FACTOR * sampling_rate / transition).round() as usize;
            piece_len += 1 - piece_len % 2;
            let piece_len = piece_len.min(length);
            let offset = (length - piece_len) / 2;

            for (k, v) in firwin_lowpass(piece_len, cutoff, sampling_rate).into_iter().enumerate() {
                taps[offset + k] += sign * v;
            }
        }

        debug!(
            l_freq = config.l_freq,
            h_freq = config.h_freq,
            l_trans,
            h_trans,
            taps = length,
            "designed FIR band-pass"
        );

        Ok(Self {
            config: config.clone(),
            sampling_rate,
            taps,
        })
    }

    pub fn taps(&self) -> &[f64] {
        &self.taps
    }

    pub fn filter_length(&self) -> usize {
        self.taps.len()
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn config(&self) -> &BandpassConfig {
        &self.config
    }

    /// Magnitude response at `freq` Hz
    pub fn gain_at(&self, freq: f64) -> f64 {
        let omega = 2.0 * PI * freq / self.sampling_rate;
        let response: Complex<f64> = self
            .taps
            .iter()
            .enumerate()
            .map(|(k, &h)| Complex::from_polar(h, -omega * k as f64))
            .sum();
        response.norm()
    }

    /// Filter every row of `(channels, samples)` data with zero phase delay
    pub fn filter_channels(&self, data: ArrayView2<'_, f64>) -> EegResult<Array2<f64>> {
        let (channels, samples) = data.dim();
        if samples == 0 {
            return Ok(Array2::zeros((channels, 0)));
        }

        let taps = self.taps.len();
        let n_edge = taps.min(samples) - 1;
        let padded_len = samples + 2 * n_edge;
        let fft_len = (padded_len + taps - 1).next_power_of_two();
        let delay = (taps - 1) / 2;

        let mut planner = RealFftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(fft_len);
        let inverse = planner.plan_fft_inverse(fft_len);
        let fft_error = |e: realfft::FftError| EegError::spectral(format!("FFT convolution failed: {}", e));

        let mut kernel = forward.make_input_vec();
        kernel[..taps].copy_from_slice(&self.taps);
        let mut kernel_spectrum = forward.make_output_vec();
        forward.process(&mut kernel, &mut kernel_spectrum).map_err(fft_error)?;

        let mut buffer = forward.make_input_vec();
        let mut spectrum = forward.make_output_vec();
        let mut convolved = inverse.make_output_vec();
        let scale = 1.0 / fft_len as f64;
        let mut output = Array2::zeros((channels, samples));

        for (channel, row) in data.rows().into_iter().enumerate() {
            let row = row.to_vec();
            let padded = reflect_limited_pad(&row, n_edge);

            buffer.iter_mut().for_each(|v| *v = 0.0);
            buffer[..padded.len()].copy_from_slice(&padded);
            forward.process(&mut buffer, &mut spectrum).map_err(fft_error)?;

            for (s, k) in spectrum.iter_mut().zip(kernel_spectrum.iter()) {
                *s *= *k;
            }
            spectrum[0].im = 0.0;
            if let Some(last) = spectrum.last_mut() {
                last.im = 0.0;
            }
            inverse.process(&mut spectrum, &mut convolved).map_err(fft_error)?;

            let start = n_edge + delay;
            for (out, value) in output
                .row_mut(channel)
                .iter_mut()
                .zip(&convolved[start..start + samples])
            {
                *out = value * scale;
            }
        }

        Ok(output)
    }
}

/// Odd reflection about each edge sample, zero-filled past the signal length
fn reflect_limited_pad(x: &[f64], n_pad: usize) -> Vec<f64> {
    let n = x.len();
    let reflected = n_pad.min(n.saturating_sub(1));
    let zeros = n_pad - reflected;

    let mut out = Vec::with_capacity(n + 2 * n_pad);
    out.extend(std::iter::repeat(0.0).take(zeros));
    out.extend((1..=reflected).rev().map(|k| 2.0 * x[0] - x[k]));
    out.extend_from_slice(x);
    out.extend((0..reflected).map(|k| 2.0 * x[n - 1] - x[n - 2 - k]));
    out.extend(std::iter::repeat(0.0).take(zeros));
    out
}

impl SignalProcessor for FirBandpass {
    fn process(&self, input: Recording) -> EegResult<Recording> {
        if !self.can_process(&input) {
            return Err(EegError::config(format!(
                "filter designed for {}Hz cannot process a {}Hz recording",
                self.sampling_rate,
                input.sampling_rate()
            )));
        }
        let filtered = self.filter_channels(input.data())?;
        input.with_data(filtered)
    }

    fn name(&self) -> &str {
        "fir_bandpass"
    }

    fn can_process(&self, recording: &Recording) -> bool {
        recording.channel_count() > 0 && recording.sampling_rate() == self.sampling_rate
    }

    fn processor_type(&self) -> ProcessorType {
        ProcessorType::Filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eeg_core::SignalUnit;

    fn sine(freq: f64, fs: f64, samples: usize) -> Vec<f64> {
        (0..samples)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    #[test]
    fn test_transition_bandwidths() {
        let (l_trans, h_trans) = transition_bandwidths(0.5, 45.0, 256.0);
        assert_eq!(l_trans, 0.5);
        assert_eq!(h_trans, 11.25);

        // Upper transition limited by Nyquist
        let (_, h_trans) = transition_bandwidths(0.5, 45.0, 100.0);
        assert_eq!(h_trans, 5.0);
    }

    #[test]
    fn test_filter_length_is_odd() {
        assert_eq!(filter_length(0.5, 256.0), 1691);
        assert_eq!(filter_length(0.5, 500.0) % 2, 1);

        let filter = FirBandpass::design(&BandpassConfig::default(), 256.0).unwrap();
        assert_eq!(filter.filter_length(), 1691);
    }

    #[test]
    fn test_kernel_is_symmetric() {
        let filter = FirBandpass::design(&BandpassConfig::default(), 256.0).unwrap();
        let taps = filter.taps();
        let n = taps.len();
        for k in 0..n / 2 {
            assert!((taps[k] - taps[n - 1 - k]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_frequency_response() {
        let filter = FirBandpass::design(&BandpassConfig::default(), 256.0).unwrap();
        assert!(filter.gain_at(0.0) < 1e-9);
        assert!((filter.gain_at(10.0) - 1.0).abs() < 0.01);
        assert!((filter.gain_at(30.0) - 1.0).abs() < 0.01);
        assert!(filter.gain_at(80.0) < 0.01);
    }

    #[test]
    fn test_passband_sine_keeps_phase() {
        let fs = 256.0;
        let input = sine(10.0, fs, 2560);
        let data = Array2::from_shape_vec((1, input.len()), input.clone()).unwrap();
        let filter = FirBandpass::design(&BandpassConfig::default(), fs).unwrap();
        let output = filter.filter_channels(data.view()).unwrap();

        for t in 1000..1500 {
            assert!((output[[0, t]] - input[t]).abs() < 0.02, "sample {}", t);
        }
    }

    #[test]
    fn test_stopband_sine_is_removed() {
        let fs = 256.0;
        let data = Array2::from_shape_vec((1, 2560), sine(100.0, fs, 2560)).unwrap();
        let filter = FirBandpass::design(&BandpassConfig::default(), fs).unwrap();
        let output = filter.filter_channels(data.view()).unwrap();

        let rms = (output.row(0).slice(ndarray::s![1000..1500]).mapv(|v| v * v).mean().unwrap()).sqrt();
        assert!(rms < 0.01);
    }

    #[test]
    fn test_constant_offset_is_removed() {
        let data = Array2::from_elem((2, 1024), 5.0);
        let filter = FirBandpass::design(&BandpassConfig::default(), 256.0).unwrap();
        let output = filter.filter_channels(data.view()).unwrap();
        assert!(output.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_signal_shorter_than_kernel() {
        let data = Array2::from_shape_fn((3, 100), |(c, t)| ((c + 1) * t) as f64 * 0.01);
        let filter = FirBandpass::design(&BandpassConfig::default(), 256.0).unwrap();
        let output = filter.filter_channels(data.view()).unwrap();
        assert_eq!(output.dim(), (3, 100));
        assert!(output.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_reflect_limited_pad() {
        let padded = reflect_limited_pad(&[1.0, 2.0, 4.0], 2);
        assert_eq!(padded, vec![-2.0, 0.0, 1.0, 2.0, 4.0, 6.0, 7.0]);

        let padded = reflect_limited_pad(&[1.0, 3.0], 3);
        assert_eq!(padded, vec![0.0, 0.0, -1.0, 1.0, 3.0, 5.0, 0.0, 0.0]);
    }

    #[test]
    fn test_design_rejects_low_sampling_rate() {
        assert!(FirBandpass::design(&BandpassConfig::default(), 90.0).is_err());
        assert!(FirBandpass::design(&BandpassConfig::new(10.0, 5.0), 256.0).is_err());
    }

    #[test]
    fn test_processor_keeps_shape_and_rate() {
        let recording = Recording::new(
            Array2::from_shape_fn((4, 512), |(c, t)| (c as f64 + 1.0) * (t as f64 * 0.3).sin()),
            256.0,
            Vec::new(),
            SignalUnit::Volts,
        )
        .unwrap();
        let filter = FirBandpass::design(&BandpassConfig::default(), 256.0).unwrap();
        let filtered = filter.process(recording.clone()).unwrap();

        assert_eq!(filtered.channel_count(), 4);
        assert_eq!(filtered.samples_per_channel(), 512);
        assert_eq!(filtered.sampling_rate(), 256.0);
        assert_eq!(filter.name(), "fir_bandpass");

        let other_rate = FirBandpass::design(&BandpassConfig::default(), 500.0).unwrap();
        assert!(other_rate.process(recording).is_err());
    }
}
