//! Classifier boundary: batch the feature tensor, interpret probabilities

use eeg_core::{EegError, EegResult, FeatureTensor};
use ndarray::{Array1, Array2, ArrayView4};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default label order of the three-class model
pub const DEFAULT_CLASS_LABELS: &str = "Alzheimer,FTD,Control";

/// Trained model that maps a `(1, channels, bands, 1)` tensor to class
/// probabilities. Implementations are read-only after loading.
pub trait Classifier: Send + Sync {
    /// Ordered class probabilities for one batched tensor
    fn predict(&self, input: ArrayView4<'_, f32>) -> EegResult<Vec<f32>>;

    /// Number of classes, when the model knows it
    fn output_len(&self) -> Option<usize> {
        None
    }

    fn name(&self) -> &str {
        "classifier"
    }
}

/// Shared, immutable classifier built once at startup
pub type ClassifierHandle = Arc<dyn Classifier>;

/// Interpreted classifier output
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub top_index: usize,
    pub confidence: f32,
    pub probabilities: Vec<f32>,
}

impl Prediction {
    /// Argmax (first on ties) and its probability
    pub fn from_probabilities(probabilities: Vec<f32>) -> EegResult<Self> {
        if probabilities.is_empty() {
            return Err(EegError::inference("classifier returned no probabilities"));
        }
        if let Some(bad) = probabilities.iter().find(|p| !p.is_finite()) {
            return Err(EegError::inference(format!("classifier returned non-finite value {}", bad)));
        }

        let mut top_index = 0;
        for (i, &p) in probabilities.iter().enumerate() {
            if p > probabilities[top_index] {
                top_index = i;
            }
        }

        Ok(Self {
            top_index,
            confidence: probabilities[top_index],
            probabilities,
        })
    }
}

/// Add the batch axis, invoke the classifier and interpret its output
pub fn classify(classifier: &dyn Classifier, tensor: &FeatureTensor) -> EegResult<Prediction> {
    let batched = tensor.with_batch_axis();
    let probabilities = classifier.predict(batched.view())?;
    let prediction = Prediction::from_probabilities(probabilities)?;
    debug!(
        classifier = classifier.name(),
        top_index = prediction.top_index,
        confidence = prediction.confidence,
        "classified feature tensor"
    );
    Ok(prediction)
}

/// Class names indexed by classifier output position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassLabels(Vec<String>);

impl ClassLabels {
    pub fn new(labels: Vec<String>) -> Self {
        Self(labels)
    }

    /// Parse a comma separated list, trimming whitespace around each label
    pub fn parse(list: &str) -> Self {
        Self(
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Label for `index`, or the index itself as decimal text
    pub fn label_for(&self, index: usize) -> String {
        self.0.get(index).cloned().unwrap_or_else(|| index.to_string())
    }

    /// Compare against a classifier's output count.
    ///
    /// More labels than outputs is a configuration error; fewer is allowed,
    /// unlabeled indices are reported as numbers.
    pub fn check_against(&self, classifier: &dyn Classifier) -> EegResult<()> {
        match classifier.output_len() {
            Some(outputs) if self.len() > outputs => Err(EegError::config(format!(
                "{} class labels configured but classifier '{}' has {} outputs",
                self.len(),
                classifier.name(),
                outputs
            ))),
            Some(outputs) if self.len() < outputs => {
                warn!(labels = self.len(), outputs, "fewer class labels than classifier outputs");
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl Default for ClassLabels {
    fn default() -> Self {
        Self::parse(DEFAULT_CLASS_LABELS)
    }
}

impl fmt::Display for ClassLabels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}

/// Response body of a successful prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predicted_class: String,
    pub confidence: f32,
    pub probs: Vec<f32>,
    pub top_index: usize,
}

impl PredictionResponse {
    pub fn new(prediction: &Prediction, labels: &ClassLabels) -> Self {
        Self {
            predicted_class: labels.label_for(prediction.top_index),
            confidence: prediction.confidence,
            probs: prediction.probabilities.clone(),
            top_index: prediction.top_index,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DenseArtifact {
    input_shape: Vec<usize>,
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

/// Single dense layer with softmax over the flattened feature tensor
#[derive(Debug, Clone)]
pub struct DenseClassifier {
    input_shape: Vec<usize>,
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl DenseClassifier {
    /// `weights` is `(classes, features)` where features is the product of
    /// `input_shape` (without batch axis)
    pub fn new(input_shape: Vec<usize>, weights: Array2<f32>, bias: Array1<f32>) -> EegResult<Self> {
        let features: usize = input_shape.iter().product();
        if input_shape.is_empty() || features == 0 {
            return Err(EegError::config("classifier input shape must be non-empty"));
        }
        if weights.ncols() != features {
            return Err(EegError::config(format!(
                "classifier weights have {} columns, input shape {:?} has {} features",
                weights.ncols(),
                input_shape,
                features
            )));
        }
        if weights.nrows() == 0 || weights.nrows() != bias.len() {
            return Err(EegError::config(format!(
                "classifier has {} weight rows and {} biases",
                weights.nrows(),
                bias.len()
            )));
        }
        if weights.iter().chain(bias.iter()).any(|v| !v.is_finite()) {
            return Err(EegError::config("classifier parameters must be finite"));
        }

        Ok(Self {
            input_shape,
            weights,
            bias,
        })
    }

    /// Parse a JSON artifact with `input_shape`, `weights` and `bias`
    pub fn from_json(json: &str) -> EegResult<Self> {
        let artifact: DenseArtifact = serde_json::from_str(json)
            .map_err(|e| EegError::config(format!("Failed to parse classifier artifact: {}", e)))?;

        let rows = artifact.weights.len();
        let cols = artifact.weights.first().map(Vec::len).unwrap_or(0);
        if artifact.weights.iter().any(|row| row.len() != cols) {
            return Err(EegError::config("classifier weight rows differ in length"));
        }
        let flat: Vec<f32> = artifact.weights.into_iter().flatten().collect();
        let weights = Array2::from_shape_vec((rows, cols), flat)?;

        Self::new(artifact.input_shape, weights, Array1::from(artifact.bias))
    }

    /// Load the artifact at `path`
    pub fn load(path: impl AsRef<Path>) -> EegResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            EegError::config(format!("Failed to read classifier {}: {}", path.display(), e))
        })?;
        let classifier = Self::from_json(&json)?;
        debug!(
            path = %path.display(),
            classes = classifier.bias.len(),
            input_shape = ?classifier.input_shape,
            "loaded dense classifier"
        );
        Ok(classifier)
    }

    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }
}

fn softmax(logits: &Array1<f32>) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exp.iter().sum();
    exp.into_iter().map(|e| e / sum).collect()
}

impl Classifier for DenseClassifier {
    fn predict(&self, input: ArrayView4<'_, f32>) -> EegResult<Vec<f32>> {
        let shape = input.shape();
        if shape[0] != 1 || shape[1..] != self.input_shape[..] {
            return Err(EegError::inference(format!(
                "classifier expects input (1, {:?}), got {:?}",
                self.input_shape, shape
            )));
        }

        let features: Array1<f32> = input.iter().copied().collect();
        let logits = self.weights.dot(&features) + &self.bias;
        Ok(softmax(&logits))
    }

    fn output_len(&self) -> Option<usize> {
        Some(self.bias.len())
    }

    fn name(&self) -> &str {
        "dense"
    }
}
