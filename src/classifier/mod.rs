mod labels;
mod mobilenet;
mod preprocess;

pub use labels::Labels;
pub use mobilenet::MobileNetClassifier;

use crate::capture::Frame;
use anyhow::Result;
use std::path::Path;

/// One labelled guess returned by a classifier
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub label: String,
    pub confidence: f32,
}

impl Candidate {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Trait for image classifiers
/// Allows swapping the ONNX backend for other runtimes or test doubles
pub trait Classifier: Send {
    /// Classify a frame
    ///
    /// # Returns
    /// * Candidates in the classifier's own order (usually most confident
    ///   first). An empty list means nothing was recognised.
    fn classify(&mut self, frame: &Frame) -> Result<Vec<Candidate>>;

    /// Get the model's input dimensions
    ///
    /// Returns (width, height)
    fn input_size(&self) -> (u32, u32);
}

/// Create the default classifier (MobileNetV2 via ONNX Runtime)
pub fn create_default_classifier(
    model_path: &Path,
    labels_path: Option<&Path>,
    top_k: usize,
) -> Result<Box<dyn Classifier>> {
    let labels = match labels_path {
        Some(path) => Labels::from_file(path)?,
        None => {
            tracing::warn!("No label file given, classes will be reported by index");
            Labels::default()
        }
    };

    let model = MobileNetClassifier::new(model_path, labels, top_k)?;
    Ok(Box::new(model))
}

/// Pick the single most confident candidate.
///
/// Ties keep the earliest candidate, so the classifier's own ordering
/// decides between equally confident labels. NaN scores are ignored.
pub fn select_best(candidates: Vec<Candidate>) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;
    for candidate in candidates {
        if candidate.confidence.is_nan() {
            continue;
        }
        match &best {
            Some(current) if candidate.confidence <= current.confidence => {}
            _ => best = Some(candidate),
        }
    }
    best
}
