use thiserror::Error;

/// The three failure classes the pipeline distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Classifier could not be loaded; the pipeline stays disabled.
    ModelLoad,
    /// A single inference failed; only that frame is affected.
    Inference,
    /// The capture session failed; it is not restarted.
    Session,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to load classifier: {0:#}")]
    ModelLoad(anyhow::Error),

    #[error("inference failed: {0:#}")]
    Inference(anyhow::Error),

    #[error("capture session failed: {0:#}")]
    Session(anyhow::Error),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::ModelLoad(_) => ErrorKind::ModelLoad,
            PipelineError::Inference(_) => ErrorKind::Inference,
            PipelineError::Session(_) => ErrorKind::Session,
        }
    }
}
