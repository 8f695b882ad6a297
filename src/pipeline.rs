//! Wires capture, inference and rendering together.
//!
//! Frames are pulled on the calling thread, which keeps camera handles on
//! the thread that opened them. Each frame is offered to the scheduler and,
//! as a preview, to the render thread. The render thread owns the scene and
//! is the only place visual state changes.

use std::{
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, never, select, unbounded, Receiver, Sender};

use crate::{
    capture::{Frame, FrameSource, SessionConfig},
    classifier::Classifier,
    error::PipelineError,
    render::{ResultRenderer, Scene},
    scheduler::{InferenceScheduler, Outcome},
};

/// Log throughput every this many frames.
const STATS_INTERVAL: u64 = 30;

/// The three collaborators a pipeline runs against.
pub struct PipelineContext {
    pub source: Box<dyn FrameSource>,
    /// A load failure is kept rather than propagated: the feed still runs,
    /// just without classification.
    pub classifier: Result<Box<dyn Classifier>, PipelineError>,
    pub scene: Box<dyn Scene + Send>,
}

/// Counters gathered over one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub frames: u64,
    pub accepted: u64,
    pub dropped: u64,
    pub rendered: u64,
    pub empty: u64,
    pub failed: u64,
}

#[derive(Default)]
struct RenderStats {
    rendered: u64,
    empty: u64,
    failed: u64,
}

enum RenderEvent {
    Outcome(Outcome),
    Preview(Frame),
    OutcomesClosed,
    PreviewsClosed,
}

pub struct Pipeline {
    context: PipelineContext,
    session: SessionConfig,
}

impl Pipeline {
    pub fn new(context: PipelineContext, session: SessionConfig) -> Self {
        Self { context, session }
    }

    /// Run until the frame source ends or fails.
    ///
    /// Only a failure to start the session is returned as an error; every
    /// later failure is logged and ends the run normally.
    pub fn run(self) -> Result<PipelineReport> {
        let Pipeline { context, session } = self;
        let PipelineContext {
            mut source,
            classifier,
            scene,
        } = context;

        tracing::info!("Starting session on {}", source.describe());
        source
            .start(&session)
            .map_err(PipelineError::Session)
            .context("Failed to start capture session")?;

        let (outcome_tx, outcome_rx) = unbounded();
        let (preview_tx, preview_rx) = bounded(1);

        let render = thread::Builder::new()
            .name("render".into())
            .spawn(move || render_loop(scene, outcome_rx, preview_rx))
            .context("Failed to spawn render thread")?;

        let scheduler = InferenceScheduler::spawn(classifier, outcome_tx)?;
        if scheduler.is_enabled() {
            tracing::info!("Classification enabled, press Ctrl+C to stop");
        } else {
            tracing::info!("Running camera feed without classification");
        }

        let frames = deliver_frames(source.as_mut(), &scheduler, &preview_tx);

        let stats = scheduler.stats();
        drop(preview_tx);
        // Waits for the in-flight inference, which closes the outcome channel.
        drop(scheduler);

        let render_stats = render
            .join()
            .map_err(|_| anyhow!("render thread panicked"))?;

        let report = PipelineReport {
            frames,
            accepted: stats.accepted,
            dropped: stats.dropped,
            rendered: render_stats.rendered,
            empty: render_stats.empty,
            failed: render_stats.failed,
        };
        tracing::info!(
            "Pipeline finished: {} frames, {} classified, {} dropped, {} rendered, {} empty, {} failed",
            report.frames,
            report.accepted,
            report.dropped,
            report.rendered,
            report.empty,
            report.failed
        );
        Ok(report)
    }
}

/// Frame-delivery loop. Returns the number of frames delivered.
fn deliver_frames(
    source: &mut dyn FrameSource,
    scheduler: &InferenceScheduler,
    preview_tx: &Sender<Frame>,
) -> u64 {
    let mut frame_count = 0u64;
    let mut total_capture_time = Duration::ZERO;

    loop {
        let capture_start = Instant::now();
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::info!("Frame source exhausted after {} frames", frame_count);
                break;
            }
            Err(err) => {
                tracing::error!("{}", PipelineError::Session(err));
                break;
            }
        };
        total_capture_time += capture_start.elapsed();
        frame_count += 1;

        if frame_count == 1 {
            let (width, height) = frame.dimensions();
            tracing::info!("First frame received: {}x{}", width, height);
        }

        // The preview is best effort; a busy renderer just skips frames.
        let _ = preview_tx.try_send(frame.clone());
        scheduler.submit(frame);

        if frame_count % STATS_INTERVAL == 0 {
            let stats = scheduler.stats();
            let avg_capture_ms = total_capture_time.as_secs_f64() * 1000.0 / frame_count as f64;
            tracing::info!(
                "Frame {}: capture={:.1}ms, classified={}, dropped={}, busy={}",
                frame_count,
                avg_capture_ms,
                stats.accepted,
                stats.dropped,
                scheduler.is_busy()
            );
        }
    }

    frame_count
}

fn render_loop(
    scene: Box<dyn Scene + Send>,
    outcome_rx: Receiver<Outcome>,
    preview_rx: Receiver<Frame>,
) -> RenderStats {
    let mut renderer = ResultRenderer::new(scene);
    let mut stats = RenderStats::default();
    let mut outcome_rx = outcome_rx;
    let mut preview_rx = preview_rx;
    let mut outcomes_open = true;
    let mut previews_open = true;

    while outcomes_open || previews_open {
        let event = select! {
            recv(outcome_rx) -> msg => msg.map_or(RenderEvent::OutcomesClosed, RenderEvent::Outcome),
            recv(preview_rx) -> msg => msg.map_or(RenderEvent::PreviewsClosed, RenderEvent::Preview),
        };

        match event {
            RenderEvent::Outcome(outcome) => match outcome {
                Outcome::Classification(_) => {
                    if renderer.render(&outcome) {
                        stats.rendered += 1;
                    }
                }
                Outcome::NoResult => stats.empty += 1,
                Outcome::Error(_) => stats.failed += 1,
            },
            RenderEvent::Preview(frame) => renderer.present(&frame),
            RenderEvent::OutcomesClosed => {
                outcomes_open = false;
                outcome_rx = never();
            }
            RenderEvent::PreviewsClosed => {
                previews_open = false;
                preview_rx = never();
            }
        }
    }

    if let Some(annotation) = renderer.current() {
        tracing::debug!("Last annotation: {}", annotation.text);
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Candidate;
    use crate::test_support::{FixedClassifier, GatedClassifier, RecordingScene, ScriptedSource};

    fn context(
        source: ScriptedSource,
        classifier: Result<Box<dyn Classifier>, PipelineError>,
        scene: &RecordingScene,
    ) -> PipelineContext {
        PipelineContext {
            source: Box::new(source),
            classifier,
            scene: Box::new(scene.clone()),
        }
    }

    #[test]
    fn runs_until_source_is_exhausted() {
        let scene = RecordingScene::default();
        let source = ScriptedSource::frames(50);
        let started = source.start_calls();
        let classifier = FixedClassifier::new(vec![
            Candidate::new("keyboard", 0.1),
            Candidate::new("laptop", 0.8734),
        ]);
        let tracker = classifier.tracker();

        let report = Pipeline::new(
            context(source, Ok(Box::new(classifier)), &scene),
            SessionConfig::default(),
        )
        .run()
        .unwrap();

        assert_eq!(report.frames, 50);
        assert_eq!(report.accepted + report.dropped, 50);
        assert!(report.accepted >= 1);
        assert_eq!(report.rendered, report.accepted);
        assert_eq!(tracker.max_in_flight(), 1);

        assert_eq!(scene.visible(), vec!["laptop 0.87".to_string()]);
        assert_eq!(scene.max_visible(), 1);
        assert!(scene.presented() <= 50);

        let started = started.lock().unwrap();
        assert_eq!(started.len(), 1);
        assert!(started[0].scene_depth);
    }

    #[test]
    fn load_failure_never_annotates() {
        let scene = RecordingScene::default();
        let report = Pipeline::new(
            context(
                ScriptedSource::frames(20),
                Err(PipelineError::ModelLoad(anyhow!("model asset missing"))),
                &scene,
            ),
            SessionConfig::default(),
        )
        .run()
        .unwrap();

        assert_eq!(report.frames, 20);
        assert_eq!(report.accepted, 0);
        assert_eq!(report.dropped, 20);
        assert_eq!(report.rendered, 0);
        assert!(scene.calls().is_empty());
    }

    #[test]
    fn inference_failures_are_skipped() {
        let scene = RecordingScene::default();
        let (classifier, gate, _tracker) = GatedClassifier::new();
        // A closed gate makes every inference fail immediately.
        drop(gate);

        let report = Pipeline::new(
            context(ScriptedSource::frames(10), Ok(Box::new(classifier)), &scene),
            SessionConfig::default(),
        )
        .run()
        .unwrap();

        assert!(report.accepted >= 1);
        assert_eq!(report.failed, report.accepted);
        assert_eq!(report.rendered, 0);
        assert!(scene.visible().is_empty());
    }

    #[test]
    fn session_failure_ends_run_quietly() {
        let scene = RecordingScene::default();
        let report = Pipeline::new(
            context(
                ScriptedSource::failing_after(5),
                Ok(Box::new(FixedClassifier::new(vec![Candidate::new("cup", 0.5)]))),
                &scene,
            ),
            SessionConfig::default(),
        )
        .run()
        .unwrap();

        assert_eq!(report.frames, 5);
        assert_eq!(report.rendered, report.accepted);
    }

    #[test]
    fn start_failure_is_an_error() {
        let scene = RecordingScene::default();
        let err = Pipeline::new(
            context(
                ScriptedSource::failing_start(),
                Ok(Box::new(FixedClassifier::new(Vec::new()))),
                &scene,
            ),
            SessionConfig::default(),
        )
        .run()
        .unwrap_err();

        assert!(format!("{err:#}").contains("sensor unavailable"));
        assert!(scene.calls().is_empty());
    }
}
