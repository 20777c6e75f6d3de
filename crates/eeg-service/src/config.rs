//! Service configuration from the environment or a JSON file

use crate::error::ServiceError;
use eeg_processing::{ClassLabels, PipelineConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Key used when a demo request does not name one
pub const DEFAULT_DEMO_KEY: &str = "sample_data/sample_eeg.set";

/// Everything the service needs at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Root of the object store; a directory for the local store
    pub bucket: String,
    pub demo_key: String,
    /// Classifier artifact loaded once at startup
    pub model_path: PathBuf,
    pub class_labels: ClassLabels,
    pub request_timeout_secs: u64,
    /// Parent of the per-request scratch directories
    pub work_dir: PathBuf,
    pub pipeline: PipelineConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            demo_key: DEFAULT_DEMO_KEY.to_string(),
            model_path: PathBuf::from("model.json"),
            class_labels: ClassLabels::default(),
            request_timeout_secs: 30,
            work_dir: std::env::temp_dir().join("eeg-service"),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Build from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source.
    ///
    /// Recognized: `BUCKET_NAME`, `DEMO_KEY`, `MODEL_PATH`, `CLASS_LABELS`,
    /// `REQUEST_TIMEOUT_SECS`, `WORK_DIR` and `PIPELINE_CONFIG` (path to a
    /// pipeline JSON file).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServiceError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(bucket) = lookup("BUCKET_NAME") {
            config.bucket = bucket;
        }
        if let Some(key) = lookup("DEMO_KEY") {
            config.demo_key = key;
        }
        if let Some(path) = lookup("MODEL_PATH") {
            config.model_path = PathBuf::from(path);
        }
        if let Some(labels) = lookup("CLASS_LABELS") {
            config.class_labels = ClassLabels::parse(&labels);
        }
        if let Some(secs) = lookup("REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = secs.trim().parse().map_err(|_| {
                ServiceError::Configuration(format!("REQUEST_TIMEOUT_SECS is not a number: '{}'", secs))
            })?;
        }
        if let Some(dir) = lookup("WORK_DIR") {
            config.work_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("PIPELINE_CONFIG") {
            config.pipeline = PipelineConfig::from_file(&path)?;
        }

        Ok(config)
    }

    /// Read a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ServiceError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ServiceError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&json).map_err(|e| {
            ServiceError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Checks required before serving predictions
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.bucket.trim().is_empty() {
            return Err(ServiceError::Configuration("BUCKET_NAME not configured".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ServiceError::Configuration(
                "request timeout must be at least one second".to_string(),
            ));
        }
        if self.class_labels.is_empty() {
            return Err(ServiceError::Configuration("no class labels configured".to_string()));
        }
        self.pipeline.validate()?;
        Ok(())
    }
}
