mod still;
mod webcam;

pub use still::StillImageSource;
pub use webcam::WebcamSource;

use anyhow::Result;
use image::RgbImage;
use std::sync::Arc;
use std::time::Instant;

/// One captured camera image.
///
/// The pixel buffer is shared so the frame can be handed to the inference
/// worker and the preview path without copying.
#[derive(Clone, Debug)]
pub struct Frame {
    pub image: Arc<RgbImage>,
    pub timestamp: Instant,
    pub sequence: u64,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self::shared(Arc::new(image), sequence)
    }

    pub fn shared(image: Arc<RgbImage>, sequence: u64) -> Self {
        Self {
            image,
            timestamp: Instant::now(),
            sequence,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Settings passed to [`FrameSource::start`].
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Request depth-aware scene semantics from the sensor
    pub scene_depth: bool,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scene_depth: true,
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

/// A capture session producing frames at the sensor's own cadence
pub trait FrameSource {
    /// Start the session. Called exactly once, before the first frame.
    fn start(&mut self, config: &SessionConfig) -> Result<()>;

    /// Block until the next frame is available.
    ///
    /// Returns `Ok(None)` once a finite source is exhausted. An error ends
    /// the session; sources are never restarted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Human readable name used in logs
    fn describe(&self) -> String;
}
