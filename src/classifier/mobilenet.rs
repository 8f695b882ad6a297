use super::labels::Labels;
use super::preprocess::Preprocessor;
use super::{Candidate, Classifier};
use crate::capture::Frame;
use anyhow::{bail, Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;

const INPUT_SIZE: u32 = 224;

/// MobileNetV2 image classifier
///
/// Expects a single NCHW float input and a single `[1, classes]` output
/// holding either logits or probabilities.
pub struct MobileNetClassifier {
    session: Session,
    preprocessor: Preprocessor,
    labels: Labels,
    top_k: usize,
}

impl MobileNetClassifier {
    /// Create a classifier from an ONNX file
    ///
    /// # Arguments
    /// * `model_path` - Path to the ONNX model file
    /// * `labels` - Class names in output order
    /// * `top_k` - Number of candidates returned per frame
    pub fn new<P: AsRef<Path>>(model_path: P, labels: Labels, top_k: usize) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading classifier model from {}", path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("Classifier model loaded successfully");
        tracing::debug!(
            "Model inputs: {:?}, outputs: {:?}",
            session.inputs.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
            session.outputs.iter().map(|o| o.name.as_str()).collect::<Vec<_>>()
        );

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(INPUT_SIZE, INPUT_SIZE),
            labels,
            top_k: top_k.max(1),
        })
    }
}

impl Classifier for MobileNetClassifier {
    fn classify(&mut self, frame: &Frame) -> Result<Vec<Candidate>> {
        let _span = tracing::debug_span!("classify", sequence = frame.sequence).entered();

        let input = self.preprocessor.preprocess(&frame.image)?;
        let tensor = Tensor::from_array(input)?;

        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("Failed to run inference")?;
        drop(_infer_span);

        if outputs.len() < 1 {
            bail!("model returned no outputs");
        }

        let scores: Vec<f32> = outputs[0]
            .try_extract_array::<f32>()?
            .iter()
            .copied()
            .collect();
        drop(outputs);
        if scores.is_empty() {
            bail!("model returned an empty score tensor");
        }

        let probabilities = to_probabilities(&scores);
        let candidates = top_k(&probabilities, self.top_k)
            .into_iter()
            .map(|(index, confidence)| Candidate::new(self.labels.name(index), confidence))
            .collect();

        Ok(candidates)
    }

    fn input_size(&self) -> (u32, u32) {
        (INPUT_SIZE, INPUT_SIZE)
    }
}

/// Turn raw scores into a probability distribution.
///
/// Scores that already look like probabilities (all in [0, 1], summing to
/// one) are passed through; anything else is treated as logits.
fn to_probabilities(scores: &[f32]) -> Vec<f32> {
    let in_range = scores.iter().all(|s| (0.0..=1.0).contains(s));
    let sum: f32 = scores.iter().sum();
    if in_range && (sum - 1.0).abs() < 1e-3 {
        return scores.to_vec();
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// Indices and values of the `k` largest entries, largest first. Equal
/// values keep index order.
fn top_k(values: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .collect();
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
    indexed.truncate(k);
    indexed
}
