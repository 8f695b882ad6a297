use super::OutputSink;
use anyhow::{bail, Context, Result};
use image::RgbImage;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Raw YUYV frames written to a v4l2loopback device file.
///
/// The device is configured for one frame size; callers render at
/// `resolution()` and anything else is rejected.
pub struct LoopbackSink {
    path: PathBuf,
    file: File,
    width: u32,
    height: u32,
    packed: Vec<u8>,
}

impl LoopbackSink {
    pub fn open(path: impl AsRef<Path>, width: u32, height: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::options()
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        tracing::info!(
            "Writing {}x{} YUYV frames to {}",
            width,
            height,
            path.display()
        );
        Ok(Self {
            path,
            file,
            width,
            height,
            packed: Vec::with_capacity(width as usize * height as usize * 2),
        })
    }
}

impl OutputSink for LoopbackSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if frame.dimensions() != (self.width, self.height) {
            bail!(
                "frame is {}x{} but {} expects {}x{}",
                frame.width(),
                frame.height(),
                self.path.display(),
                self.width,
                self.height
            );
        }

        pack_yuyv(frame, &mut self.packed);
        self.file
            .write_all(&self.packed)
            .with_context(|| format!("Failed to write frame to {}", self.path.display()))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Pack `frame` as YUYV 4:2:2 into `out`.
///
/// Each horizontal pixel pair becomes `Y0 U Y1 V` with chroma taken from the
/// pair's mean colour. An odd trailing pixel is paired with itself.
fn pack_yuyv(frame: &RgbImage, out: &mut Vec<u8>) {
    out.clear();
    let stride = frame.width() as usize * 3;
    if stride == 0 {
        return;
    }

    for row in frame.as_raw().chunks_exact(stride) {
        for pair in row.chunks(6) {
            let (first, second) = pair.split_at(3);
            let second = if second.is_empty() { first } else { second };
            let mean = [
                mean_u8(first[0], second[0]),
                mean_u8(first[1], second[1]),
                mean_u8(first[2], second[2]),
            ];
            let (u, v) = chroma(mean);
            out.extend_from_slice(&[luma(first), u, luma(second), v]);
        }
    }
}

fn mean_u8(a: u8, b: u8) -> i32 {
    (a as i32 + b as i32 + 1) / 2
}

// Full-range BT.601 in 8.8 fixed point.
fn luma(rgb: &[u8]) -> u8 {
    let (r, g, b) = (rgb[0] as i32, rgb[1] as i32, rgb[2] as i32);
    ((77 * r + 150 * g + 29 * b + 128) >> 8).clamp(0, 255) as u8
}

fn chroma([r, g, b]: [i32; 3]) -> (u8, u8) {
    let u = ((-43 * r - 85 * g + 128 * b + 128) >> 8) + 128;
    let v = ((128 * r - 107 * g - 21 * b + 128) >> 8) + 128;
    (u.clamp(0, 255) as u8, v.clamp(0, 255) as u8)
}
