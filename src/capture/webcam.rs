use super::{Frame, FrameSource, SessionConfig};
use anyhow::{anyhow, Context, Result};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;

/// Local camera opened through nokhwa.
///
/// The camera handle is created in [`FrameSource::start`] so it lives on the
/// thread that pulls frames.
pub struct WebcamSource {
    device_index: u32,
    camera: Option<Camera>,
    sequence: u64,
}

impl WebcamSource {
    pub fn new(device_index: u32) -> Self {
        Self {
            device_index,
            camera: None,
            sequence: 0,
        }
    }

    fn open(&self, config: &SessionConfig) -> Result<Camera> {
        let index = CameraIndex::Index(self.device_index);
        let closest = CameraFormat::new(
            Resolution::new(config.width, config.height),
            FrameFormat::MJPEG,
            config.fps,
        );
        let attempts = [
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(closest)),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution),
        ];

        let mut last_err = None;
        for requested in attempts {
            match Camera::new(index.clone(), requested) {
                Ok(mut camera) => match camera.open_stream() {
                    Ok(()) => return Ok(camera),
                    Err(err) => last_err = Some(anyhow::Error::from(err)),
                },
                Err(err) => last_err = Some(anyhow::Error::from(err)),
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("no usable camera format")))
            .context("Failed to open camera stream")
    }
}

impl FrameSource for WebcamSource {
    fn start(&mut self, config: &SessionConfig) -> Result<()> {
        tracing::info!(
            "Initializing webcam {} at {}x{} ({} fps)",
            self.device_index,
            config.width,
            config.height,
            config.fps
        );

        if config.scene_depth {
            tracing::warn!("Scene depth requested but webcams provide no depth; continuing without it");
        }

        let camera = self.open(config)?;
        let format = camera.camera_format();
        tracing::info!(
            "Webcam streaming at {}x{} {:?}",
            format.width(),
            format.height(),
            format.format()
        );

        self.camera = Some(camera);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let camera = self
            .camera
            .as_mut()
            .ok_or_else(|| anyhow!("webcam session not started"))?;

        let buffer = camera.frame().context("Failed to capture frame")?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;

        self.sequence += 1;
        Ok(Some(Frame::new(decoded, self.sequence)))
    }

    fn describe(&self) -> String {
        format!("webcam #{}", self.device_index)
    }
}
