//! EEG-Processing: recording to relative band power features
//!
//! Zero-phase FIR band-pass, fixed-length epoching, Welch PSD and relative
//! band power, plus the classifier boundary the features are handed to.

pub mod config;
pub mod epochs;
pub mod features;
pub mod filters;
pub mod inference;
pub mod loader;
pub mod pipeline;
pub mod processor;
pub mod psd;

pub use config::{PipelineConfig, DEFAULT_EXPECTED_CHANNELS};
pub use epochs::{make_fixed_length_epochs, EpochConfig, Epochs};
pub use features::{Aggregation, FeatureExtractor, DEFAULT_EPSILON};
pub use filters::{BandpassConfig, FirBandpass};
pub use inference::{
    classify, ClassLabels, Classifier, ClassifierHandle, DenseClassifier, Prediction,
    PredictionResponse, DEFAULT_CLASS_LABELS,
};
pub use loader::RecordingLoader;
pub use pipeline::{FeaturePipeline, PipelineRun};
pub use processor::{ProcessingMetrics, ProcessingTimer, ProcessorType, SignalProcessor};
pub use psd::{Psd, Welch, WelchConfig};
