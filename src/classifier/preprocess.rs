use anyhow::{bail, Result};
use image::{imageops, RgbImage};
use ndarray::Array4;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Preprocessor for converting camera frames to classifier input tensors
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Crop the largest centred square out of the image
    pub fn center_crop(image: &RgbImage) -> RgbImage {
        let (width, height) = image.dimensions();
        let side = width.min(height);
        let x = (width - side) / 2;
        let y = (height - side) / 2;
        imageops::crop_imm(image, x, y, side, side).to_image()
    }

    /// Preprocess an RGB image into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Centre crop to a square
    /// 2. Resize to target dimensions
    /// 3. Scale to [0, 1] and apply ImageNet mean/std
    /// 4. Transpose from HWC to NCHW format
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, image: &RgbImage) -> Result<Array4<f32>> {
        let _span = tracing::debug_span!("preprocess").entered();

        if image.width() == 0 || image.height() == 0 {
            bail!("cannot classify an empty frame");
        }

        let cropped = Self::center_crop(image);
        let resized = if cropped.dimensions() != (self.target_width, self.target_height) {
            imageops::resize(
                &cropped,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            )
        } else {
            cropped
        };

        let (width, height) = resized.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in resized.enumerate_pixels() {
            for channel in 0..3 {
                let value = pixel[channel] as f32 / 255.0;
                tensor[[0, channel, y as usize, x as usize]] =
                    (value - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel];
            }
        }

        Ok(tensor)
    }
}
