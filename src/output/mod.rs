mod loopback;

pub use loopback::LoopbackSink;

use anyhow::Result;
use image::RgbImage;

/// Trait for output destinations
pub trait OutputSink {
    /// Write a frame of exactly `resolution()` pixels
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Frame size the sink accepts
    fn resolution(&self) -> (u32, u32);
}
