//! Feature pipeline: recording file to classifier-ready tensor

use crate::config::PipelineConfig;
use crate::epochs::make_fixed_length_epochs;
use crate::features::FeatureExtractor;
use crate::filters::FirBandpass;
use crate::loader::RecordingLoader;
use crate::processor::{ProcessingMetrics, ProcessorType, SignalProcessor};
use crate::psd::Welch;
use eeg_core::{EegError, EegResult, FeatureTensor, Recording};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Output of one pipeline run with per-stage timings
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub tensor: FeatureTensor,
    pub window_count: usize,
    pub metrics: Vec<ProcessingMetrics>,
    pub total_latency_us: u64,
}

/// Load, filter, window and extract relative band power.
///
/// Immutable once built, so one instance can serve concurrent requests.
/// Filters and PSD estimators are designed per recording since they depend on
/// its sampling rate.
#[derive(Debug, Clone)]
pub struct FeaturePipeline {
    config: PipelineConfig,
    loader: RecordingLoader,
}

impl FeaturePipeline {
    pub fn new(config: PipelineConfig) -> EegResult<Self> {
        config.validate()?;
        let loader = RecordingLoader::from_config(&config);
        Ok(Self { config, loader })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn loader(&self) -> &RecordingLoader {
        &self.loader
    }

    /// Read and validate a recording without processing it
    pub fn load(&self, path: impl AsRef<Path>) -> EegResult<Recording> {
        self.loader.load(path)
    }

    /// Feature tensor for the recording at `path`
    pub fn run(&self, path: impl AsRef<Path>) -> EegResult<FeatureTensor> {
        Ok(self.run_with_metrics(path)?.tensor)
    }

    /// Feature tensor plus timings of every stage
    pub fn run_with_metrics(&self, path: impl AsRef<Path>) -> EegResult<PipelineRun> {
        let path = path.as_ref();
        let start = Instant::now();

        let timer = ProcessingMetrics::start_timing(ProcessorType::Loader);
        let loaded = self.loader.load(path);
        let load_metrics = timer.finish_for(&loaded);
        let recording = loaded?;

        let mut run = self.process(recording)?;
        run.metrics.insert(0, load_metrics);
        run.total_latency_us = start.elapsed().as_micros() as u64;

        info!(
            path = %path.display(),
            windows = run.window_count,
            latency_us = run.total_latency_us,
            "feature pipeline finished"
        );
        Ok(run)
    }

    /// Feature tensor for an in-memory recording
    pub fn features_from_recording(&self, recording: Recording) -> EegResult<FeatureTensor> {
        Ok(self.process(recording)?.tensor)
    }

    fn process(&self, recording: Recording) -> EegResult<PipelineRun> {
        let start = Instant::now();
        let fs = recording.sampling_rate();
        let source = recording
            .source()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("<memory>"));

        // Same header rules as files, so in-memory input cannot bypass them
        self.loader
            .check_header(&source, recording.channel_count(), fs)?;

        // Reject short input before spending time on the filter
        let window = self.config.epochs.window_samples(fs);
        if recording.samples_per_channel() < window {
            return Err(EegError::TooShort {
                samples: recording.samples_per_channel(),
                window_samples: window,
                sampling_rate: fs,
            });
        }

        let mut metrics = Vec::with_capacity(3);

        let timer = ProcessingMetrics::start_timing(ProcessorType::Filter);
        let filtered = FirBandpass::design(&self.config.bandpass, fs)
            .and_then(|filter| stage(&filter, recording));
        metrics.push(timer.finish_for(&filtered));
        let filtered = filtered?;

        let timer = ProcessingMetrics::start_timing(ProcessorType::Segmenter);
        let epochs = make_fixed_length_epochs(&filtered, &self.config.epochs);
        metrics.push(timer.finish_for(&epochs));
        let epochs = epochs?;
        drop(filtered);

        let timer = ProcessingMetrics::start_timing(ProcessorType::FeatureExtractor);
        let tensor = Welch::new(&self.config.welch, fs)
            .and_then(|welch| {
                FeatureExtractor::new(
                    welch,
                    self.config.bands.clone(),
                    self.config.epsilon,
                    self.config.aggregation,
                )
            })
            .and_then(|extractor| extractor.extract(&epochs));
        metrics.push(timer.finish_for(&tensor));
        let tensor = tensor?;

        for m in &metrics {
            debug!(stage = ?m.stage, time_us = m.processing_time_us, "pipeline stage");
        }

        Ok(PipelineRun {
            tensor,
            window_count: epochs.len(),
            metrics,
            total_latency_us: start.elapsed().as_micros() as u64,
        })
    }
}

fn stage(processor: &dyn SignalProcessor, recording: Recording) -> EegResult<Recording> {
    if !processor.can_process(&recording) {
        return Err(EegError::config(format!(
            "processor '{}' cannot handle a {}-channel recording at {}Hz",
            processor.name(),
            recording.channel_count(),
            recording.sampling_rate()
        )));
    }
    processor.process(recording)
}

#[cfg(test)]
mod tests {
    use super::*;
    use eeg_core::format::{write_set, EeglabWriteOptions};
    use eeg_core::LoadFailure;
    use eeg_simulation::{EegSimConfig, EegSimulator};
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("eeg-pipeline-{}-{}", std::process::id(), name));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn simulate(config: EegSimConfig, seconds: f64) -> Recording {
        EegSimulator::new(config).unwrap().generate(seconds).unwrap()
    }

    /// In-memory recordings keep their microvolt scale
    fn microvolt_pipeline() -> FeaturePipeline {
        let mut config = PipelineConfig::default();
        config.signal_unit = eeg_core::SignalUnit::Microvolts;
        FeaturePipeline::new(config).unwrap()
    }

    #[test]
    fn test_alpha_tone_dominates_channel_zero() {
        let dir = scratch_dir("alpha");
        let path = dir.join("alpha.set");
        let recording = simulate(EegSimConfig::alpha_on_channel(0).with_seed(7), 10.0);
        write_set(&path, &recording, &EeglabWriteOptions::default()).unwrap();

        let pipeline = FeaturePipeline::new(PipelineConfig::default()).unwrap();
        let run = pipeline.run_with_metrics(&path).unwrap();

        assert_eq!(run.window_count, 9);
        assert_eq!(run.tensor.shape(), (19, 5, 1));
        assert_eq!(run.metrics.len(), 4);
        assert!(run.metrics.iter().all(|m| m.success));

        let alpha = pipeline.config().bands.index_of("alpha").unwrap();
        let channel0: Vec<f32> = (0..5).map(|b| run.tensor.get(0, b).unwrap()).collect();
        for (b, &value) in channel0.iter().enumerate() {
            if b != alpha {
                assert!(channel0[alpha] > value, "alpha {:?} not dominant", channel0);
            }
        }
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_tensor_values_in_unit_interval() {
        let recording = simulate(EegSimConfig::default().with_seed(3), 6.0);
        let tensor = microvolt_pipeline().features_from_recording(recording).unwrap();

        assert!(tensor.to_flat().iter().all(|v| v.is_finite() && (0.0..=1.0).contains(v)));
        for sum in tensor.channel_sums() {
            assert!((sum - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_default_volts_unit_shrinks_channel_sums() {
        // At volt scale EEG band power is within an order of magnitude of the
        // 1e-12 epsilon, so relative powers sum visibly below 1.
        let dir = scratch_dir("volts");
        let path = dir.join("noise.set");
        let config = EegSimConfig { noise_std: 20.0, ..EegSimConfig::default() }.with_seed(5);
        write_set(&path, &simulate(config, 6.0), &EeglabWriteOptions::default()).unwrap();

        let volts = FeaturePipeline::new(PipelineConfig::default()).unwrap().run(&path).unwrap();
        let microvolts = microvolt_pipeline().run(&path).unwrap();

        for (v, uv) in volts.channel_sums().iter().zip(microvolts.channel_sums()) {
            assert!((uv - 1.0).abs() < 1e-4, "microvolt sum {}", uv);
            assert!(*v > 0.8 && *v < 0.99, "volt sum {}", v);
        }
        assert!(volts.to_flat().iter().all(|v| v.is_finite() && (0.0..=1.0).contains(v)));
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_exact_window_length_gives_one_window() {
        let pipeline = microvolt_pipeline();
        let recording = simulate(EegSimConfig::default().with_seed(11), 2.0);
        assert_eq!(recording.samples_per_channel(), 512);

        let run = pipeline.process(recording).unwrap();
        assert_eq!(run.window_count, 1);
        assert_eq!(run.tensor.shape(), (19, 5, 1));
    }

    #[test]
    fn test_missing_channels_fail_before_filtering() {
        let dir = scratch_dir("channels");
        let path = dir.join("short-montage.set");
        let config = EegSimConfig { channel_count: 18, ..EegSimConfig::default().with_seed(5) };
        write_set(&path, &simulate(config, 4.0), &EeglabWriteOptions::default()).unwrap();

        let pipeline = FeaturePipeline::new(PipelineConfig::default()).unwrap();
        match pipeline.run(&path) {
            Err(EegError::Load { failure: LoadFailure::ChannelCount { expected, actual }, .. }) => {
                assert_eq!((expected, actual), (19, 18));
            }
            other => panic!("expected channel count error, got {:?}", other),
        }

        // In-memory input is held to the same rule
        let config = EegSimConfig { channel_count: 18, ..EegSimConfig::default().with_seed(5) };
        let err = pipeline.features_from_recording(simulate(config, 4.0)).unwrap_err();
        assert_eq!(err.kind(), eeg_core::ErrorKind::Load);
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_too_short_recording() {
        let recording = simulate(EegSimConfig::default().with_seed(2), 1.5);
        match microvolt_pipeline().features_from_recording(recording) {
            Err(EegError::TooShort { samples, window_samples, .. }) => {
                assert_eq!(samples, 384);
                assert_eq!(window_samples, 512);
            }
            other => panic!("expected TooShort, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_signal_gives_finite_zeros() {
        let config = EegSimConfig { noise_std: 0.0, ..Default::default() };
        let tensor = microvolt_pipeline()
            .features_from_recording(simulate(config, 4.0))
            .unwrap();
        assert!(tensor.to_flat().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_pipeline_is_idempotent() {
        let dir = scratch_dir("idempotent");
        let path = dir.join("rec.set");
        let options = EeglabWriteOptions { companion: true, ..Default::default() };
        write_set(&path, &simulate(EegSimConfig::default().with_seed(9), 5.0), &options).unwrap();

        let pipeline = FeaturePipeline::new(PipelineConfig::default()).unwrap();
        assert_eq!(pipeline.run(&path).unwrap(), pipeline.run(&path).unwrap());
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_low_rate_fails_in_feature_stage() {
        // 100 Hz passes the 90 Hz header check but a 2 s window is shorter
        // than one 256-sample Welch segment
        let config = EegSimConfig { sampling_rate: 100.0, ..EegSimConfig::default().with_seed(4) };
        let err = microvolt_pipeline()
            .features_from_recording(simulate(config, 6.0))
            .unwrap_err();
        assert_eq!(err.kind(), eeg_core::ErrorKind::SpectralEstimation);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = PipelineConfig::default();
        config.expected_channels = 0;
        assert!(FeaturePipeline::new(config).is_err());
    }
}
