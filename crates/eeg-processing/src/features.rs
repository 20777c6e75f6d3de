//! Relative band power features

use crate::epochs::Epochs;
use crate::psd::{Psd, Welch};
use eeg_core::{BandSet, EegError, EegResult, FeatureTensor};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Guard added to the per-channel power sum before normalizing
pub const DEFAULT_EPSILON: f64 = 1e-12;

/// How per-window features are combined into one tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Elementwise arithmetic mean
    #[default]
    Mean,
    /// Elementwise median. Per-channel sums are no longer guaranteed to be 1.
    Median,
}

/// Mean PSD of the bins inside each band, shape `(channels, bands)`
pub fn absolute_band_power(psd: &Psd, band_bins: &[Vec<usize>]) -> Array2<f64> {
    let channels = psd.power.nrows();
    Array2::from_shape_fn((channels, band_bins.len()), |(c, b)| {
        let bins = &band_bins[b];
        let sum: f64 = bins.iter().map(|&k| psd.power[[c, k]]).sum();
        sum / bins.len() as f64
    })
}

/// Normalize each channel's band powers by their sum plus `epsilon`
pub fn relative_band_power(absolute: ArrayView2<'_, f64>, epsilon: f64) -> Array2<f64> {
    let mut relative = absolute.to_owned();
    for mut row in relative.rows_mut() {
        let total = row.sum() + epsilon;
        row.mapv_inplace(|p| p / total);
    }
    relative
}

/// Combine `(windows, channels, bands)` features into `(channels, bands)`
pub fn aggregate(per_window: &Array3<f64>, aggregation: Aggregation) -> EegResult<Array2<f64>> {
    if per_window.len_of(Axis(0)) == 0 {
        return Err(EegError::spectral("no windows to aggregate"));
    }

    match aggregation {
        Aggregation::Mean => per_window
            .mean_axis(Axis(0))
            .ok_or_else(|| EegError::spectral("no windows to aggregate")),
        Aggregation::Median => {
            let (_, channels, bands) = per_window.dim();
            Ok(Array2::from_shape_fn((channels, bands), |(c, b)| {
                let mut values: Vec<f64> = per_window.slice(ndarray::s![.., c, b]).to_vec();
                values.sort_by(|x, y| x.total_cmp(y));
                let mid = values.len() / 2;
                if values.len() % 2 == 0 {
                    (values[mid - 1] + values[mid]) / 2.0
                } else {
                    values[mid]
                }
            }))
        }
    }
}

/// Relative band power extractor for windows of one sampling rate
#[derive(Debug)]
pub struct FeatureExtractor {
    welch: Welch,
    bands: BandSet,
    /// PSD bin indices per band
    band_bins: Vec<Vec<usize>>,
    epsilon: f64,
    aggregation: Aggregation,
}

impl FeatureExtractor {
    /// Bind bands to the estimator's frequency grid.
    ///
    /// Fails when a band contains no PSD bin at this resolution.
    pub fn new(welch: Welch, bands: BandSet, epsilon: f64, aggregation: Aggregation) -> EegResult<Self> {
        bands.validate()?;
        if !epsilon.is_finite() || epsilon < 0.0 {
            return Err(EegError::config(format!("epsilon must be non-negative, got {}", epsilon)));
        }

        let mut band_bins = Vec::with_capacity(bands.len());
        for band in bands.iter() {
            let bins: Vec<usize> = welch
                .freqs()
                .iter()
                .enumerate()
                .filter(|(_, &f)| band.contains(f))
                .map(|(k, _)| k)
                .collect();
            if bins.is_empty() {
                return Err(EegError::spectral(format!(
                    "band '{}' ({}-{}Hz) has no PSD bins at {}Hz sampling rate",
                    band.name,
                    band.low_hz,
                    band.high_hz,
                    welch.sampling_rate()
                )));
            }
            band_bins.push(bins);
        }

        Ok(Self {
            welch,
            bands,
            band_bins,
            epsilon,
            aggregation,
        })
    }

    pub fn bands(&self) -> &BandSet {
        &self.bands
    }

    pub fn welch(&self) -> &Welch {
        &self.welch
    }

    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    /// Relative band power of one `(channels, samples)` window
    pub fn window_features(&self, window: ArrayView2<'_, f64>) -> EegResult<Array2<f64>> {
        let psd = self.welch.compute(window)?;
        let absolute = absolute_band_power(&psd, &self.band_bins);
        Ok(relative_band_power(absolute.view(), self.epsilon))
    }

    /// Relative band power of every window, shape `(windows, channels, bands)`
    pub fn extract_per_window(&self, epochs: &Epochs) -> EegResult<Array3<f64>> {
        let mut features = Array3::zeros((epochs.len(), epochs.channel_count(), self.bands.len()));
        for (index, window) in epochs.iter().enumerate() {
            let rbp = self.window_features(window).map_err(|e| e.in_window(index))?;
            features.index_axis_mut(Axis(0), index).assign(&rbp);
        }
        Ok(features)
    }

    /// Aggregated feature tensor `(channels, bands, 1)`
    pub fn extract(&self, epochs: &Epochs) -> EegResult<FeatureTensor> {
        let per_window = self.extract_per_window(epochs)?;
        let aggregated = aggregate(&per_window, self.aggregation)?;

        debug!(
            windows = epochs.len(),
            channels = aggregated.nrows(),
            bands = aggregated.ncols(),
            aggregation = ?self.aggregation,
            "extracted relative band power"
        );

        FeatureTensor::from_channel_bands(aggregated.mapv(|v| v as f32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epochs::{make_fixed_length_epochs, EpochConfig};
    use crate::psd::WelchConfig;
    use eeg_core::{Recording, SignalUnit};
    use std::f64::consts::PI;

    fn extractor(fs: f64, aggregation: Aggregation) -> FeatureExtractor {
        let welch = Welch::new(&WelchConfig::default(), fs).unwrap();
        FeatureExtractor::new(welch, BandSet::canonical(), DEFAULT_EPSILON, aggregation).unwrap()
    }

    fn tones(channels: usize, seconds: f64, fs: f64) -> Recording {
        let samples = (seconds * fs) as usize;
        let data = Array2::from_shape_fn((channels, samples), |(c, t)| {
            let freq = 2.0 + 8.0 * c as f64;
            10.0 * (2.0 * PI * freq * t as f64 / fs).sin()
        });
        Recording::new(data, fs, Vec::new(), SignalUnit::Microvolts).unwrap()
    }

    #[test]
    fn test_relative_power_sums_to_one() {
        let recording = tones(4, 10.0, 256.0);
        let epochs = make_fixed_length_epochs(&recording, &EpochConfig::default()).unwrap();
        let per_window = extractor(256.0, Aggregation::Mean).extract_per_window(&epochs).unwrap();

        assert_eq!(per_window.dim(), (9, 4, 5));
        for window in per_window.outer_iter() {
            for row in window.rows() {
                assert!((row.sum() - 1.0).abs() < 1e-6);
                assert!(row.iter().all(|&v| (0.0..=1.0).contains(&v)));
            }
        }
    }

    #[test]
    fn test_dominant_band_follows_tone() {
        // Channel 1 carries a 10 Hz tone, channel 2 an 18 Hz tone
        let recording = tones(3, 4.0, 256.0);
        let epochs = make_fixed_length_epochs(&recording, &EpochConfig::default()).unwrap();
        let tensor = extractor(256.0, Aggregation::Mean).extract(&epochs).unwrap();

        let argmax = |c: usize| {
            (0..5)
                .max_by(|&a, &b| tensor.get(c, a).unwrap().total_cmp(&tensor.get(c, b).unwrap()))
                .unwrap()
        };
        assert_eq!(argmax(0), 0);
        assert_eq!(argmax(1), 2);
        assert_eq!(argmax(2), 3);
    }

    #[test]
    fn test_zero_signal_is_finite_zero() {
        let recording =
            Recording::new(Array2::zeros((19, 1024)), 256.0, Vec::new(), SignalUnit::Volts).unwrap();
        let epochs = make_fixed_length_epochs(&recording, &EpochConfig::default()).unwrap();
        let tensor = extractor(256.0, Aggregation::Mean).extract(&epochs).unwrap();

        assert_eq!(tensor.shape(), (19, 5, 1));
        assert!(tensor.to_flat().iter().all(|v| v.is_finite() && *v == 0.0));
    }

    #[test]
    fn test_mean_aggregation_is_order_invariant() {
        let per_window = Array3::from_shape_fn((4, 2, 3), |(w, c, b)| ((w * 7 + c * 3 + b) % 5) as f64 / 10.0);
        let mut reversed = per_window.clone();
        reversed.invert_axis(Axis(0));

        let a = aggregate(&per_window, Aggregation::Mean).unwrap();
        let b = aggregate(&reversed, Aggregation::Mean).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn test_single_window_mean_equals_window() {
        let per_window = Array3::from_shape_fn((1, 2, 2), |(_, c, b)| (c * 2 + b) as f64 / 4.0);
        let aggregated = aggregate(&per_window, Aggregation::Mean).unwrap();
        assert_eq!(aggregated, per_window.index_axis(Axis(0), 0).to_owned());
    }

    #[test]
    fn test_median_aggregation() {
        let values = [0.1, 0.9, 0.2, 0.3];
        let per_window = Array3::from_shape_fn((4, 1, 1), |(w, _, _)| values[w]);
        let median = aggregate(&per_window, Aggregation::Median).unwrap();
        assert!((median[[0, 0]] - 0.25).abs() < 1e-12);

        let odd = Array3::from_shape_fn((3, 1, 1), |(w, _, _)| values[w]);
        assert_eq!(aggregate(&odd, Aggregation::Median).unwrap()[[0, 0]], 0.2);
    }

    #[test]
    fn test_band_without_bins() {
        let config = WelchConfig { n_fft: 64, ..Default::default() };
        let welch = Welch::new(&config, 256.0).unwrap();
        let bands = BandSet::new(vec![eeg_core::FrequencyBand::new("narrow", 1.0, 3.0)]).unwrap();
        let err = FeatureExtractor::new(welch, bands, DEFAULT_EPSILON, Aggregation::Mean).unwrap_err();
        assert_eq!(err.kind(), eeg_core::ErrorKind::SpectralEstimation);
    }

    #[test]
    fn test_short_window_error_carries_index() {
        // 2 s windows at 100 Hz are shorter than a 256-sample segment
        let recording = tones(2, 4.0, 100.0);
        let epochs = make_fixed_length_epochs(&recording, &EpochConfig::default()).unwrap();
        let welch = Welch::new(&WelchConfig::default(), 100.0).unwrap();
        let extractor =
            FeatureExtractor::new(welch, BandSet::canonical(), DEFAULT_EPSILON, Aggregation::Mean).unwrap();

        match extractor.extract(&epochs) {
            Err(EegError::SpectralEstimation { window_index, .. }) => assert_eq!(window_index, Some(0)),
            other => panic!("expected spectral error, got {:?}", other),
        }
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let recording = tones(3, 6.0, 256.0);
        let epochs = make_fixed_length_epochs(&recording, &EpochConfig::default()).unwrap();
        let extractor = extractor(256.0, Aggregation::Mean);
        assert_eq!(extractor.extract(&epochs).unwrap(), extractor.extract(&epochs).unwrap());
    }
}
