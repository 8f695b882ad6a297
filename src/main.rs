mod capture;
mod classifier;
mod error;
mod output;
mod pipeline;
mod render;
mod scheduler;
#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use capture::{FrameSource, SessionConfig, StillImageSource, WebcamSource};
use clap::Parser;
use error::PipelineError;
use output::LoopbackSink;
use pipeline::{Pipeline, PipelineContext};
use render::{ConsoleScene, OverlayScene, PinholeCamera, Scene};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Replay this image file instead of reading a webcam
    #[arg(long)]
    image: Option<PathBuf>,

    /// Stop after this many frames of the replayed image
    #[arg(long, requires = "image")]
    frames: Option<u64>,

    /// Capture resolution width
    #[arg(long, default_value_t = 1280)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 720)]
    capture_height: u32,

    /// Target frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Path to the classification model (ONNX file)
    /// If it cannot be loaded the feed runs without labels
    #[arg(long, default_value = "models/mobilenetv2-7.onnx")]
    model: PathBuf,

    /// Class names, one per line, in model output order
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Number of candidates requested from the classifier per frame
    #[arg(long, default_value_t = 5)]
    top_k: usize,

    /// Write the annotated feed to this v4l2loopback device
    /// If not provided, labels are printed to stdout
    #[arg(short, long)]
    output_device: Option<PathBuf>,

    /// Output resolution width
    #[arg(long, default_value_t = 1280)]
    output_width: u32,

    /// Output resolution height
    #[arg(long, default_value_t = 720)]
    output_height: u32,

    /// Horizontal field of view of the camera, degrees
    #[arg(long, default_value_t = 60.0)]
    fov: f32,

    /// Do not request depth-aware scene semantics
    #[arg(long)]
    disable_scene_depth: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("live-label starting");

    let session = SessionConfig {
        scene_depth: !args.disable_scene_depth,
        width: args.capture_width,
        height: args.capture_height,
        fps: args.fps,
    };

    let source: Box<dyn FrameSource> = match &args.image {
        Some(path) => Box::new(StillImageSource::new(path, args.frames)),
        None => Box::new(WebcamSource::new(args.input_device)),
    };

    let classifier =
        classifier::create_default_classifier(&args.model, args.labels.as_deref(), args.top_k)
            .map_err(PipelineError::ModelLoad);

    let scene: Box<dyn Scene + Send> = match &args.output_device {
        Some(device) => {
            let output = LoopbackSink::open(device, args.output_width, args.output_height)
                .context("Failed to initialize v4l2loopback output")?;
            Box::new(OverlayScene::new(output, PinholeCamera::new(args.fov)))
        }
        None => Box::new(ConsoleScene::stdout()),
    };

    let context = PipelineContext {
        source,
        classifier,
        scene,
    };
    Pipeline::new(context, session).run()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn defaults_request_scene_depth_and_console_output() {
        let args = Args::try_parse_from(["live-label"]).unwrap();
        assert!(!args.disable_scene_depth);
        assert!(args.output_device.is_none());
        assert_eq!(args.top_k, 5);
        assert_eq!(args.model, PathBuf::from("models/mobilenetv2-7.onnx"));
    }

    #[test]
    fn frames_requires_image() {
        assert!(Args::try_parse_from(["live-label", "--frames", "10"]).is_err());
        let args =
            Args::try_parse_from(["live-label", "--image", "cat.png", "--frames", "10"]).unwrap();
        assert_eq!(args.frames, Some(10));
    }
}
