//! Prediction service: request to stored recording to classifier response

use crate::config::ServiceConfig;
use crate::error::{ErrorResponse, ServiceError};
use crate::storage::{fetch_recording, LocalObjectStore, ObjectStore, ScratchDir};
use eeg_processing::{
    classify, ClassLabels, ClassifierHandle, DenseClassifier, FeaturePipeline, PredictionResponse,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

/// Body of a prediction request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictRequest {
    /// Use the demo recording instead of `s3_key`
    pub demo: bool,
    /// Overrides the configured demo key
    pub demo_key: Option<String>,
    /// Key of an uploaded recording
    pub s3_key: Option<String>,
}

impl PredictRequest {
    pub fn for_key(key: impl Into<String>) -> Self {
        Self {
            s3_key: Some(key.into()),
            ..Default::default()
        }
    }

    pub fn demo() -> Self {
        Self {
            demo: true,
            ..Default::default()
        }
    }

    /// Parse a JSON body; unparseable bodies count as empty requests
    pub fn from_body(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    /// Object key this request refers to
    pub fn object_key<'a>(&'a self, default_demo_key: &'a str) -> Result<&'a str, ServiceError> {
        let key = if self.demo {
            self.demo_key.as_deref().unwrap_or(default_demo_key)
        } else {
            self.s3_key.as_deref().unwrap_or_default()
        };
        if key.is_empty() {
            return Err(ServiceError::BadRequest(
                "Provide 's3_key' or set 'demo': true".to_string(),
            ));
        }
        Ok(key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Status and JSON body of a handled request
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: serde_json::Value,
}

/// Shared state for serving predictions.
///
/// Pipeline, classifier and store are immutable and shared through `Arc`, so
/// concurrent requests need no locking.
pub struct PredictionService {
    pipeline: Arc<FeaturePipeline>,
    classifier: ClassifierHandle,
    labels: ClassLabels,
    store: Arc<dyn ObjectStore>,
    work_dir: PathBuf,
    demo_key: String,
    timeout: Duration,
}

impl PredictionService {
    /// Validate `config` and wire up the collaborators
    pub fn new(
        config: &ServiceConfig,
        classifier: ClassifierHandle,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self, ServiceError> {
        config.validate()?;
        let pipeline = FeaturePipeline::new(config.pipeline.clone())?;
        config.class_labels.check_against(classifier.as_ref())?;

        Ok(Self {
            pipeline: Arc::new(pipeline),
            classifier,
            labels: config.class_labels.clone(),
            store,
            work_dir: config.work_dir.clone(),
            demo_key: config.demo_key.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    /// Load the dense classifier artifact and use the bucket directory as store
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ServiceError> {
        config.validate()?;
        let classifier = DenseClassifier::load(&config.model_path)?;
        info!(
            model = %config.model_path.display(),
            bucket = %config.bucket,
            labels = %config.class_labels,
            "prediction service ready"
        );
        let store = LocalObjectStore::new(&config.bucket);
        Self::new(config, Arc::new(classifier), Arc::new(store))
    }

    pub fn pipeline(&self) -> &FeaturePipeline {
        &self.pipeline
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "ok".to_string(),
        }
    }

    /// Fetch, extract and classify on the blocking pool, bounded by the timeout
    pub async fn predict(&self, request: &PredictRequest) -> Result<PredictionResponse, ServiceError> {
        let key = request.object_key(&self.demo_key)?.to_string();
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("predict", %request_id, key = %key);

        let pipeline = Arc::clone(&self.pipeline);
        let classifier = Arc::clone(&self.classifier);
        let store = Arc::clone(&self.store);
        let labels = self.labels.clone();
        let work_dir = self.work_dir.clone();
        let worker_span = span.clone();

        let task = tokio::task::spawn_blocking(move || {
            let _entered = worker_span.enter();
            let scratch = ScratchDir::create(&work_dir)?;
            let path = fetch_recording(store.as_ref(), &key, scratch.path())?;
            let tensor = pipeline.run(&path)?;
            let prediction = classify(classifier.as_ref(), &tensor)?;
            Ok::<_, ServiceError>(PredictionResponse::new(&prediction, &labels))
        });

        let outcome = match tokio::time::timeout(self.timeout, task).instrument(span.clone()).await {
            Err(_) => Err(ServiceError::Timeout {
                secs: self.timeout.as_secs(),
            }),
            Ok(Err(join)) => Err(ServiceError::Internal(join.to_string())),
            Ok(Ok(result)) => result,
        };

        let _entered = span.enter();
        match &outcome {
            Ok(response) => info!(
                predicted_class = %response.predicted_class,
                confidence = response.confidence,
                "prediction served"
            ),
            Err(e) => warn!(kind = e.kind(), error = %e, "prediction failed"),
        }
        outcome
    }

    /// Handle a raw JSON body the way the HTTP gateway would
    pub async fn handle(&self, body: &str) -> Reply {
        let request = PredictRequest::from_body(body);
        match self.predict(&request).await {
            Ok(response) => Reply {
                status: 200,
                body: serde_json::to_value(&response).unwrap_or_default(),
            },
            Err(e) => Reply {
                status: e.status(),
                body: serde_json::to_value(ErrorResponse::from(&e)).unwrap_or_default(),
            },
        }
    }
}
