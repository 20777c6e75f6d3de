//! Feature tensor handed to the classifier

use crate::error::{EegError, EegResult};
use ndarray::{Array2, Array3, Array4, ArrayView3, Axis};

/// Relative band power per channel, shape `(channels, bands, 1)`.
///
/// Entries are in `[0, 1]` and finite. Element order is row-major,
/// channel-major.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTensor {
    values: Array3<f32>,
}

impl FeatureTensor {
    /// Wrap a `(channels, bands)` matrix, appending the trailing axis
    pub fn from_channel_bands(values: Array2<f32>) -> EegResult<Self> {
        Self::new(values.insert_axis(Axis(2)))
    }

    pub fn new(values: Array3<f32>) -> EegResult<Self> {
        let (channels, bands, depth) = values.dim();
        if channels == 0 || bands == 0 || depth != 1 {
            return Err(EegError::config(format!(
                "feature tensor must be (channels, bands, 1), got {:?}",
                values.dim()
            )));
        }

        if let Some(((c, b, _), v)) = values
            .indexed_iter()
            .find(|(_, v)| !v.is_finite() || **v < 0.0 || **v > 1.0 + 1e-6)
        {
            return Err(EegError::spectral(format!(
                "feature value {} at channel {}, band {} outside [0, 1]",
                v, c, b
            )));
        }

        Ok(Self { values })
    }

    pub fn channels(&self) -> usize {
        self.values.dim().0
    }

    pub fn bands(&self) -> usize {
        self.values.dim().1
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.values.dim()
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.values.view()
    }

    /// Value for one channel and band
    pub fn get(&self, channel: usize, band: usize) -> Option<f32> {
        self.values.get((channel, band, 0)).copied()
    }

    /// Sum across bands for every channel
    pub fn channel_sums(&self) -> Vec<f32> {
        self.values
            .index_axis(Axis(2), 0)
            .rows()
            .into_iter()
            .map(|row| row.sum())
            .collect()
    }

    /// Copy with a leading batch axis: `(1, channels, bands, 1)`
    pub fn with_batch_axis(&self) -> Array4<f32> {
        self.values.clone().insert_axis(Axis(0))
    }

    /// Nested `[channel][band]` representation for JSON output
    pub fn to_nested(&self) -> Vec<Vec<f32>> {
        self.values
            .index_axis(Axis(2), 0)
            .rows()
            .into_iter()
            .map(|row| row.to_vec())
            .collect()
    }

    /// Flat row-major values
    pub fn to_flat(&self) -> Vec<f32> {
        self.values.iter().copied().collect()
    }
}
