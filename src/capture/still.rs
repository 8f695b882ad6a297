use super::{Frame, FrameSource, SessionConfig};
use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Replays one image file as a camera feed at a fixed frame rate.
pub struct StillImageSource {
    path: PathBuf,
    limit: Option<u64>,
    image: Option<Arc<RgbImage>>,
    frame_interval: Duration,
    last_delivery: Option<Instant>,
    sequence: u64,
}

impl StillImageSource {
    /// `limit` bounds the number of frames delivered; `None` replays forever.
    pub fn new<P: AsRef<Path>>(path: P, limit: Option<u64>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            limit,
            image: None,
            frame_interval: Duration::ZERO,
            last_delivery: None,
            sequence: 0,
        }
    }

    fn pace(&mut self) {
        if let Some(last) = self.last_delivery {
            let elapsed = last.elapsed();
            if elapsed < self.frame_interval {
                std::thread::sleep(self.frame_interval - elapsed);
            }
        }
        self.last_delivery = Some(Instant::now());
    }
}

impl FrameSource for StillImageSource {
    fn start(&mut self, config: &SessionConfig) -> Result<()> {
        tracing::info!("Loading still image from {}", self.path.display());

        let image = image::open(&self.path)
            .with_context(|| format!("Failed to open image {}", self.path.display()))?
            .to_rgb8();

        if config.scene_depth {
            tracing::debug!("Scene depth has no effect on a still image");
        }

        self.frame_interval = if config.fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f32(1.0 / config.fps as f32)
        };
        self.image = Some(Arc::new(image));
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let image = self
            .image
            .clone()
            .ok_or_else(|| anyhow!("still image session not started"))?;

        if self.limit.is_some_and(|limit| self.sequence >= limit) {
            return Ok(None);
        }

        self.pace();
        self.sequence += 1;
        Ok(Some(Frame::shared(image, self.sequence)))
    }

    fn describe(&self) -> String {
        format!("still image {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_image(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "live-label-{}-{}.png",
            name,
            std::process::id()
        ));
        RgbImage::from_pixel(8, 6, image::Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn delivers_limited_number_of_frames() {
        let path = write_test_image("limited");
        let mut source = StillImageSource::new(&path, Some(3));
        let config = SessionConfig {
            fps: 0,
            ..SessionConfig::default()
        };
        source.start(&config).unwrap();

        let mut sequences = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            assert_eq!(frame.dimensions(), (8, 6));
            sequences.push(frame.sequence);
        }
        assert_eq!(sequences, vec![1, 2, 3]);
        assert!(source.next_frame().unwrap().is_none());

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn frames_share_one_buffer() {
        let path = write_test_image("shared");
        let mut source = StillImageSource::new(&path, None);
        source
            .start(&SessionConfig {
                fps: 0,
                ..SessionConfig::default()
            })
            .unwrap();

        let first = source.next_frame().unwrap().unwrap();
        let second = source.next_frame().unwrap().unwrap();
        assert!(Arc::ptr_eq(&first.image, &second.image));
        assert!(second.timestamp >= first.timestamp);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn next_frame_before_start_is_an_error() {
        let mut source = StillImageSource::new("/nonexistent.png", None);
        assert!(source.next_frame().is_err());
    }

    #[test]
    fn missing_file_fails_to_start() {
        let mut source = StillImageSource::new("/nonexistent/live-label.png", None);
        let err = source.start(&SessionConfig::default()).unwrap_err();
        assert!(err.to_string().contains("Failed to open image"));
    }
}
