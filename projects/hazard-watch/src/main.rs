mod classify;
mod cli;
mod pipeline;
mod snapshots;
mod video;
mod web;

use anyhow::{bail, Result};
use classify::hsv::HsvPatchClassifier;
use cli::Args;
use pipeline::alert::{AlertSink, LogAlertSink};
use pipeline::detection_worker::FrameDetector;
use pipeline::orchestrator::Pipeline;
use pipeline::slicing::TileScanner;
use snapshots::SnapshotAlertSink;
use std::sync::atomic::Ordering;
use std::time::Duration;
use video::image_dir::ImageDirSource;
use video::FrameSource;
use web::server::run_server;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse_args();

    let source = open_source(&args)?;
    let detectors = build_detectors(&args)?;
    let alert_sinks: Vec<Box<dyn AlertSink>> = vec![
        Box::new(LogAlertSink),
        Box::new(SnapshotAlertSink::new(&args.output_dir)?),
    ];

    let pipeline = Pipeline::start(
        source,
        detectors,
        alert_sinks,
        None,
        args.pipeline_config(),
    )?;
    let state = pipeline.state();

    let served = if args.no_server {
        shutdown_signal().await;
        Ok(())
    } else {
        run_server(args.host, args.port, pipeline.status_slot(), shutdown_signal()).await
    };

    // Joining blocks on worker threads
    tokio::task::spawn_blocking(move || pipeline.shutdown()).await?;
    tracing::info!(
        "Captured {} frames in {:.1}s",
        state.frames_captured.load(Ordering::Relaxed),
        state.elapsed().as_secs_f64()
    );

    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install CTRL+C handler: {}", e);
        return;
    }
    tracing::info!("Received shutdown signal");
}

fn open_source(args: &Args) -> Result<Box<dyn FrameSource>> {
    if let Some(dir) = &args.image_dir {
        let source = ImageDirSource::new(
            dir,
            args.loop_images,
            Duration::from_millis(args.frame_interval_ms),
        )?;
        return Ok(Box::new(source));
    }

    match args.camera {
        Some(index) => open_camera(index, args.camera_size),
        None => bail!("No frame source given; pass --image-dir or --camera"),
    }
}

#[cfg(feature = "opencv-camera")]
fn open_camera(index: i32, size: Option<(u32, u32)>) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(video::opencv_camera::OpencvCamera::new(index, size)?))
}

#[cfg(not(feature = "opencv-camera"))]
fn open_camera(index: i32, _size: Option<(u32, u32)>) -> Result<Box<dyn FrameSource>> {
    bail!(
        "Camera {} requested but hazard-watch was built without the opencv-camera feature",
        index
    )
}

fn build_detectors(args: &Args) -> Result<Vec<Box<dyn FrameDetector>>> {
    let classifier = HsvPatchClassifier::new(args.hsv_config())?;
    let mut detectors: Vec<Box<dyn FrameDetector>> = vec![Box::new(TileScanner::new(
        classifier,
        args.tile_scan_config(),
    ))];

    if let Some(model_path) = &args.model_path {
        detectors.push(person_detector(model_path, args.person_confidence)?);
    }

    Ok(detectors)
}

#[cfg(feature = "rtdetr")]
fn person_detector(model_path: &str, min_confidence: f32) -> Result<Box<dyn FrameDetector>> {
    use classify::rtdetr::RtDetrPersonDetector;
    use pipeline::detection_worker::ResizingDetector;

    let model = RtDetrPersonDetector::new(model_path)?;
    Ok(Box::new(ResizingDetector::new(model, min_confidence)))
}

#[cfg(not(feature = "rtdetr"))]
fn person_detector(model_path: &str, _min_confidence: f32) -> Result<Box<dyn FrameDetector>> {
    bail!(
        "Model {} given but hazard-watch was built without the rtdetr feature",
        model_path
    )
}
