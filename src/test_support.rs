//! Test doubles shared by the unit tests.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use anyhow::{anyhow, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use image::RgbImage;

use crate::{
    capture::{Frame, FrameSource, SessionConfig},
    classifier::{Candidate, Classifier},
    render::{Position, Scene},
};

pub fn test_frame(sequence: u64) -> Frame {
    Frame::new(RgbImage::from_pixel(4, 4, image::Rgb([90, 90, 90])), sequence)
}

/// Observes what a test classifier was asked to do.
#[derive(Clone, Default)]
pub struct CallTracker {
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    classified: Arc<Mutex<Vec<u64>>>,
}

impl CallTracker {
    fn enter(&self, frame: &Frame) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.classified.lock().unwrap().push(frame.sequence);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn classified(&self) -> Vec<u64> {
        self.classified.lock().unwrap().clone()
    }
}

/// Always answers with the same candidates.
pub struct FixedClassifier {
    candidates: Vec<Candidate>,
    tracker: CallTracker,
}

impl FixedClassifier {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            tracker: CallTracker::default(),
        }
    }

    pub fn tracker(&self) -> CallTracker {
        self.tracker.clone()
    }
}

impl Classifier for FixedClassifier {
    fn classify(&mut self, frame: &Frame) -> Result<Vec<Candidate>> {
        self.tracker.enter(frame);
        let candidates = self.candidates.clone();
        self.tracker.exit();
        Ok(candidates)
    }

    fn input_size(&self) -> (u32, u32) {
        (4, 4)
    }
}

/// Blocks every inference until the test sends its answer through the gate.
pub struct GatedClassifier {
    gate: Receiver<Result<Vec<Candidate>, String>>,
    tracker: CallTracker,
}

impl GatedClassifier {
    pub fn new() -> (Self, Sender<Result<Vec<Candidate>, String>>, CallTracker) {
        let (gate_tx, gate_rx) = unbounded();
        let tracker = CallTracker::default();
        let classifier = Self {
            gate: gate_rx,
            tracker: tracker.clone(),
        };
        (classifier, gate_tx, tracker)
    }
}

impl Classifier for GatedClassifier {
    fn classify(&mut self, frame: &Frame) -> Result<Vec<Candidate>> {
        self.tracker.enter(frame);
        let answer = self.gate.recv();
        self.tracker.exit();
        match answer {
            Ok(Ok(candidates)) => Ok(candidates),
            Ok(Err(message)) => Err(anyhow!(message)),
            Err(_) => Err(anyhow!("gate closed")),
        }
    }

    fn input_size(&self) -> (u32, u32) {
        (4, 4)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SceneCall {
    Clear,
    Add(String, Position),
}

#[derive(Default)]
struct SceneLog {
    calls: Vec<SceneCall>,
    visible: Vec<String>,
    presented: usize,
    max_visible: usize,
}

/// Scene that records every call for later inspection.
#[derive(Clone, Default)]
pub struct RecordingScene {
    log: Arc<Mutex<SceneLog>>,
}

impl RecordingScene {
    pub fn calls(&self) -> Vec<SceneCall> {
        self.log.lock().unwrap().calls.clone()
    }

    pub fn visible(&self) -> Vec<String> {
        self.log.lock().unwrap().visible.clone()
    }

    pub fn max_visible(&self) -> usize {
        self.log.lock().unwrap().max_visible
    }

    pub fn presented(&self) -> usize {
        self.log.lock().unwrap().presented
    }
}

impl Scene for RecordingScene {
    fn clear(&mut self) {
        let mut log = self.log.lock().unwrap();
        log.calls.push(SceneCall::Clear);
        log.visible.clear();
    }

    fn add_annotation(&mut self, text: &str, position: Position) {
        let mut log = self.log.lock().unwrap();
        log.calls.push(SceneCall::Add(text.to_string(), position));
        log.visible.push(text.to_string());
        log.max_visible = log.max_visible.max(log.visible.len());
    }

    fn present(&mut self, _frame: &Frame) -> Result<()> {
        self.log.lock().unwrap().presented += 1;
        Ok(())
    }
}

/// Finite frame source for pipeline tests.
pub struct ScriptedSource {
    total: u64,
    delivered: u64,
    fail_at_end: bool,
    fail_start: bool,
    started: Arc<Mutex<Vec<SessionConfig>>>,
}

impl ScriptedSource {
    pub fn frames(total: u64) -> Self {
        Self {
            total,
            delivered: 0,
            fail_at_end: false,
            fail_start: false,
            started: Arc::default(),
        }
    }

    /// Delivers `total` frames, then reports a session failure.
    pub fn failing_after(total: u64) -> Self {
        Self {
            fail_at_end: true,
            ..Self::frames(total)
        }
    }

    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::frames(0)
        }
    }

    pub fn start_calls(&self) -> Arc<Mutex<Vec<SessionConfig>>> {
        self.started.clone()
    }
}

impl FrameSource for ScriptedSource {
    fn start(&mut self, config: &SessionConfig) -> Result<()> {
        self.started.lock().unwrap().push(config.clone());
        if self.fail_start {
            return Err(anyhow!("sensor unavailable"));
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.delivered == self.total {
            if self.fail_at_end {
                return Err(anyhow!("sensor disconnected"));
            }
            return Ok(None);
        }
        self.delivered += 1;
        Ok(Some(test_frame(self.delivered)))
    }

    fn describe(&self) -> String {
        "scripted source".into()
    }
}
