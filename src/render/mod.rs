mod console;
mod glyphs;
mod overlay;

pub use console::ConsoleScene;
pub use overlay::{OverlayScene, PinholeCamera};

use anyhow::Result;

use crate::{capture::Frame, scheduler::Outcome};

/// Point in viewer space, metres. `-z` is straight ahead, `+y` is up.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Where every annotation is placed: half a metre in front of the viewer.
pub const ANNOTATION_OFFSET: Position = Position::new(0.0, 0.0, -0.5);

/// A positioned text label
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub text: String,
    pub position: Position,
}

/// Trait for whatever displays annotations
pub trait Scene {
    /// Remove every annotation
    fn clear(&mut self);

    /// Add a text annotation anchored at `position`
    fn add_annotation(&mut self, text: &str, position: Position);

    /// Show a camera frame beneath the current annotations
    fn present(&mut self, _frame: &Frame) -> Result<()> {
        Ok(())
    }
}

impl<S: Scene + ?Sized> Scene for Box<S> {
    fn clear(&mut self) {
        (**self).clear()
    }

    fn add_annotation(&mut self, text: &str, position: Position) {
        (**self).add_annotation(text, position)
    }

    fn present(&mut self, frame: &Frame) -> Result<()> {
        (**self).present(frame)
    }
}

/// Text shown for a classification, confidence always with two decimals.
pub fn format_label(label: &str, confidence: f32) -> String {
    format!("{label} {confidence:.2}")
}

/// Keeps exactly one annotation in the scene, replacing it per result.
pub struct ResultRenderer<S> {
    scene: S,
    current: Option<Annotation>,
}

impl<S: Scene> ResultRenderer<S> {
    pub fn new(scene: S) -> Self {
        Self {
            scene,
            current: None,
        }
    }

    /// Apply an inference outcome. Returns `true` if the annotation was
    /// replaced; `NoResult` and errors leave the scene as it is.
    pub fn render(&mut self, outcome: &Outcome) -> bool {
        let Outcome::Classification(result) = outcome else {
            return false;
        };

        self.scene.clear();
        self.current = None;

        let annotation = Annotation {
            text: format_label(&result.label, result.confidence),
            position: ANNOTATION_OFFSET,
        };
        self.scene.add_annotation(&annotation.text, annotation.position);
        self.current = Some(annotation);
        true
    }

    /// Forward a camera frame to the scene. Display failures are logged.
    pub fn present(&mut self, frame: &Frame) {
        if let Err(err) = self.scene.present(frame) {
            tracing::warn!("Failed to present frame {}: {err:#}", frame.sequence);
        }
    }

    pub fn current(&self) -> Option<&Annotation> {
        self.current.as_ref()
    }
}
