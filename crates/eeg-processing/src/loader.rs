//! Recording loader: file on disk to validated in-memory recording

use crate::config::PipelineConfig;
use eeg_core::format::EeglabDataset;
use eeg_core::{EegError, EegResult, LoadFailure, Recording, RecordingFormat, SignalUnit};
use std::path::Path;
use tracing::{debug, info};

/// Reads recordings and enforces the deployment's layout
#[derive(Debug, Clone)]
pub struct RecordingLoader {
    expected_channels: usize,
    unit: SignalUnit,
    minimum_sampling_rate: f64,
}

impl RecordingLoader {
    pub fn new(expected_channels: usize, unit: SignalUnit, minimum_sampling_rate: f64) -> Self {
        Self {
            expected_channels,
            unit,
            minimum_sampling_rate,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.expected_channels,
            config.signal_unit,
            config.minimum_sampling_rate(),
        )
    }

    pub fn expected_channels(&self) -> usize {
        self.expected_channels
    }

    /// Load `path`, checking the header before the sample payload is decoded.
    ///
    /// A companion `.fdt` is looked up next to the file when the dataset
    /// stores its samples externally.
    pub fn load(&self, path: impl AsRef<Path>) -> EegResult<Recording> {
        let path = path.as_ref();
        match RecordingFormat::detect(path)? {
            RecordingFormat::EeglabSet => self.load_eeglab(path),
        }
    }

    fn load_eeglab(&self, path: &Path) -> EegResult<Recording> {
        let dataset = EeglabDataset::open(path)?;
        self.check_header(path, dataset.channel_count, dataset.sampling_rate)?;

        let mut samples = dataset.read_samples()?;
        let scale = self.unit.scale_from_microvolts();
        if scale != 1.0 {
            samples.mapv_inplace(|v| v * scale);
        }

        let recording = Recording::new(
            samples,
            dataset.sampling_rate,
            dataset.channel_labels,
            self.unit,
        )
        .map_err(|e| EegError::load(path, LoadFailure::Malformed(e.to_string())))?
        .with_source(path);

        info!(
            path = %path.display(),
            channels = recording.channel_count(),
            samples = recording.samples_per_channel(),
            srate = recording.sampling_rate(),
            "loaded recording"
        );
        Ok(recording)
    }

    /// Channel count and sampling rate checks shared by file and in-memory input
    pub fn check_header(&self, path: &Path, channels: usize, sampling_rate: f64) -> EegResult<()> {
        if channels != self.expected_channels {
            return Err(EegError::load(
                path,
                LoadFailure::ChannelCount {
                    expected: self.expected_channels,
                    actual: channels,
                },
            ));
        }
        if sampling_rate <= self.minimum_sampling_rate {
            return Err(EegError::load(
                path,
                LoadFailure::UnsupportedSamplingRate {
                    rate: sampling_rate,
                    minimum: self.minimum_sampling_rate,
                },
            ));
        }
        debug!(channels, sampling_rate, "recording header accepted");
        Ok(())
    }
}
