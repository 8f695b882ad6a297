use super::glyphs::{glyph_bits, text_width, GLYPH_ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH};
use super::{Position, Scene};
use crate::capture::Frame;
use crate::output::OutputSink;
use anyhow::Result;
use image::{imageops, Rgb, RgbImage};

/// Physical height of annotation text, metres.
const FONT_SIZE: f32 = 0.15;
/// Closest distance in front of the viewer that is still drawn.
const NEAR_PLANE: f32 = 0.01;
const TEXT_COLOR: Rgb<u8> = Rgb([0, 122, 255]);
const BACKDROP_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const BACKDROP_ALPHA: f32 = 0.6;
/// Backdrop margin around the text, in font pixels.
const BACKDROP_PAD: u32 = 2;

/// Simple pinhole model used to place 3-D annotations on a frame.
#[derive(Clone, Copy, Debug)]
pub struct PinholeCamera {
    horizontal_fov_deg: f32,
}

impl PinholeCamera {
    pub fn new(horizontal_fov_deg: f32) -> Self {
        Self {
            horizontal_fov_deg: horizontal_fov_deg.clamp(1.0, 179.0),
        }
    }

    /// Focal length in pixels for an image `width` pixels wide
    pub fn focal_length(&self, width: u32) -> f32 {
        let half_fov = self.horizontal_fov_deg.to_radians() / 2.0;
        (width as f32 / 2.0) / half_fov.tan()
    }

    /// Pixel coordinates of `position`, or `None` if it is behind the viewer.
    pub fn project(&self, position: Position, width: u32, height: u32) -> Option<(f32, f32)> {
        let depth = -position.z;
        if depth < NEAR_PLANE {
            return None;
        }
        let focal = self.focal_length(width);
        let u = width as f32 / 2.0 + focal * position.x / depth;
        let v = height as f32 / 2.0 - focal * position.y / depth;
        Some((u, v))
    }

    /// Integer scale for the bitmap font so text at `position` appears
    /// `FONT_SIZE` metres tall.
    pub fn text_scale(&self, position: Position, width: u32) -> u32 {
        let depth = (-position.z).max(NEAR_PLANE);
        let pixels = self.focal_length(width) * FONT_SIZE / depth;
        ((pixels / GLYPH_HEIGHT as f32).round() as u32).max(1)
    }

    /// `text_scale`, shrunk until `text` and its backdrop fit across `width`.
    pub fn label_scale(&self, text: &str, position: Position, width: u32) -> u32 {
        let span = text_width(text) + 2 * BACKDROP_PAD;
        self.text_scale(position, width).min(width / span).max(1)
    }
}

struct Placed {
    text: String,
    position: Position,
}

/// Draws the current annotation onto each presented frame and sends the
/// result to an output sink.
pub struct OverlayScene<O: OutputSink> {
    output: O,
    camera: PinholeCamera,
    annotation: Option<Placed>,
}

impl<O: OutputSink> OverlayScene<O> {
    pub fn new(output: O, camera: PinholeCamera) -> Self {
        let (width, height) = output.resolution();
        tracing::info!(
            "Overlay scene writing {}x{} frames, fov {:.0}°",
            width,
            height,
            camera.horizontal_fov_deg
        );
        Self {
            output,
            camera,
            annotation: None,
        }
    }

    /// Composite the current annotation onto `image` in place
    pub fn draw(&self, image: &mut RgbImage) {
        let Some(placed) = &self.annotation else {
            return;
        };

        let (width, height) = image.dimensions();
        let Some((u, v)) = self.camera.project(placed.position, width, height) else {
            return;
        };

        let scale = self.camera.label_scale(&placed.text, placed.position, width) as i64;
        let text_w = text_width(&placed.text) as i64 * scale;
        let text_h = GLYPH_HEIGHT as i64 * scale;
        let left = u.round() as i64 - text_w / 2;
        let top = v.round() as i64 - text_h / 2;

        let pad = scale * BACKDROP_PAD as i64;
        blend_rect(
            image,
            left - pad,
            top - pad,
            left + text_w + pad,
            top + text_h + pad,
            BACKDROP_COLOR,
            BACKDROP_ALPHA,
        );
        draw_text(image, left, top, scale, &placed.text, TEXT_COLOR);
    }

    #[cfg(test)]
    fn output(&self) -> &O {
        &self.output
    }
}

impl<O: OutputSink> Scene for OverlayScene<O> {
    fn clear(&mut self) {
        self.annotation = None;
    }

    fn add_annotation(&mut self, text: &str, position: Position) {
        self.annotation = Some(Placed {
            text: text.to_string(),
            position,
        });
    }

    fn present(&mut self, frame: &Frame) -> Result<()> {
        let _span = tracing::debug_span!("present", sequence = frame.sequence).entered();
        // Text is laid out at the output resolution so its size does not
        // depend on the capture format.
        let (width, height) = self.output.resolution();
        let mut canvas = if frame.dimensions() == (width, height) {
            frame.image.as_ref().clone()
        } else {
            imageops::resize(
                frame.image.as_ref(),
                width,
                height,
                imageops::FilterType::Triangle,
            )
        };
        self.draw(&mut canvas);
        self.output.write_frame(&canvas)
    }
}

fn put_pixel_checked(image: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && x < image.width() as i64 && y < image.height() as i64 {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn blend_rect(
    image: &mut RgbImage,
    left: i64,
    top: i64,
    right: i64,
    bottom: i64,
    color: Rgb<u8>,
    alpha: f32,
) {
    let left = left.max(0);
    let top = top.max(0);
    let right = right.min(image.width() as i64);
    let bottom = bottom.min(image.height() as i64);

    for y in top..bottom {
        for x in left..right {
            let pixel = image.get_pixel_mut(x as u32, y as u32);
            for channel in 0..3 {
                let base = pixel[channel] as f32;
                let over = color[channel] as f32;
                pixel[channel] = (base * (1.0 - alpha) + over * alpha).round() as u8;
            }
        }
    }
}

fn draw_text(image: &mut RgbImage, left: i64, top: i64, scale: i64, text: &str, color: Rgb<u8>) {
    let mut origin_x = left;
    for ch in text.chars() {
        if let Some(rows) = glyph_bits(ch) {
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 0 {
                        continue;
                    }
                    let x0 = origin_x + col as i64 * scale;
                    let y0 = top + row as i64 * scale;
                    for dy in 0..scale {
                        for dx in 0..scale {
                            put_pixel_checked(image, x0 + dx, y0 + dy, color);
                        }
                    }
                }
            }
        }
        origin_x += GLYPH_ADVANCE as i64 * scale;
    }
}
