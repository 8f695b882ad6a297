//! Drop-on-busy inference scheduling.
//!
//! Frames are offered from the capture thread; at most one of them is being
//! classified at any time and everything offered meanwhile is discarded.
//! A single worker thread owns the classifier.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::Instant,
};

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::{
    capture::Frame,
    classifier::{select_best, Classifier},
    error::{ErrorKind, PipelineError},
};

/// Best label for one frame
#[derive(Clone, Debug, PartialEq)]
pub struct ClassificationResult {
    pub label: String,
    /// Always within [0, 1]
    pub confidence: f32,
    pub timestamp: Instant,
    pub sequence: u64,
}

/// What a single inference produced.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    NoResult,
    Classification(ClassificationResult),
    Error(ErrorKind),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub accepted: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    dropped: AtomicU64,
}

pub struct InferenceScheduler {
    pending: Arc<AtomicBool>,
    job_tx: Option<Sender<Frame>>,
    counters: Counters,
    worker: Option<thread::JoinHandle<()>>,
}

impl InferenceScheduler {
    /// Start the worker for `classifier`, publishing outcomes on `outcome_tx`.
    ///
    /// A classifier that failed to load leaves the scheduler permanently
    /// disabled: the failure is logged here once and every later submission
    /// is rejected.
    pub fn spawn(
        classifier: Result<Box<dyn Classifier>, PipelineError>,
        outcome_tx: Sender<Outcome>,
    ) -> Result<Self> {
        let pending = Arc::new(AtomicBool::new(false));

        let classifier = match classifier {
            Ok(classifier) => classifier,
            Err(err) => {
                tracing::error!("{err}; classification disabled");
                return Ok(Self {
                    pending,
                    job_tx: None,
                    counters: Counters::default(),
                    worker: None,
                });
            }
        };

        let (width, height) = classifier.input_size();
        tracing::info!("Inference worker starting ({}x{} model input)", width, height);

        let (job_tx, job_rx) = bounded(1);
        let worker_pending = pending.clone();
        let worker = thread::Builder::new()
            .name("inference".into())
            .spawn(move || run_worker(classifier, job_rx, worker_pending, outcome_tx))
            .context("Failed to spawn inference worker")?;

        Ok(Self {
            pending,
            job_tx: Some(job_tx),
            counters: Counters::default(),
            worker: Some(worker),
        })
    }

    /// Offer a frame for classification.
    ///
    /// Returns `true` if the frame was handed to the worker. Frames offered
    /// while an inference is pending, or while disabled, are dropped.
    pub fn submit(&self, frame: Frame) -> bool {
        let Some(job_tx) = &self.job_tx else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        if self
            .pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        match job_tx.try_send(frame) {
            Ok(()) => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.pending.store(false, Ordering::Release);
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.job_tx.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

impl Drop for InferenceScheduler {
    fn drop(&mut self) {
        // Closing the job channel lets the worker finish its current frame and exit.
        self.job_tx.take();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn run_worker(
    mut classifier: Box<dyn Classifier>,
    job_rx: Receiver<Frame>,
    pending: Arc<AtomicBool>,
    outcome_tx: Sender<Outcome>,
) {
    tracing::debug!("inference worker started");

    for frame in job_rx.iter() {
        let outcome = classify_frame(classifier.as_mut(), &frame);
        drop(frame);

        // Cleared before publishing so whoever sees the outcome can submit again.
        pending.store(false, Ordering::Release);

        if outcome_tx.send(outcome).is_err() {
            tracing::debug!("outcome receiver gone, stopping inference worker");
            break;
        }
    }

    tracing::debug!("inference worker stopped");
}

fn classify_frame(classifier: &mut dyn Classifier, frame: &Frame) -> Outcome {
    match classifier.classify(frame) {
        Ok(candidates) => match select_best(candidates) {
            Some(best) => {
                tracing::debug!(
                    "frame {}: {} ({:.3})",
                    frame.sequence,
                    best.label,
                    best.confidence
                );
                Outcome::Classification(ClassificationResult {
                    label: best.label,
                    confidence: best.confidence.clamp(0.0, 1.0),
                    timestamp: frame.timestamp,
                    sequence: frame.sequence,
                })
            }
            None => Outcome::NoResult,
        },
        Err(err) => {
            let err = PipelineError::Inference(err);
            tracing::warn!("frame {}: {err}", frame.sequence);
            Outcome::Error(err.kind())
        }
    }
}
