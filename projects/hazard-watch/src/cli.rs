use crate::classify::hsv::HsvClassifierConfig;
use crate::pipeline::orchestrator::PipelineConfig;
use crate::pipeline::slicing::TileScanConfig;
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Host to bind to
    #[arg(long, env = "HAZARD_WATCH_HOST", default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Port to bind to (the next free port is used if taken)
    #[arg(long, env = "HAZARD_WATCH_PORT", default_value_t = 12206)]
    pub port: u16,

    /// Run without the status API; stop with Ctrl+C
    #[arg(long, env = "HAZARD_WATCH_NO_SERVER")]
    pub no_server: bool,

    /// Replay a directory of images instead of a camera
    #[arg(long, env = "HAZARD_WATCH_IMAGE_DIR", conflicts_with = "camera")]
    pub image_dir: Option<PathBuf>,

    /// Start over when the image directory is exhausted
    #[arg(long = "loop", env = "HAZARD_WATCH_LOOP")]
    pub loop_images: bool,

    /// Delay between replayed images
    #[arg(long, env = "HAZARD_WATCH_FRAME_INTERVAL_MS", default_value_t = 33)]
    pub frame_interval_ms: u64,

    /// Camera device index (requires the opencv-camera feature)
    #[arg(long, env = "HAZARD_WATCH_CAMERA")]
    pub camera: Option<i32>,

    /// Requested camera resolution, e.g. 1280x720
    #[arg(long, env = "HAZARD_WATCH_CAMERA_SIZE", value_parser = parse_size)]
    pub camera_size: Option<(u32, u32)>,

    /// Publish every n-th captured frame
    #[arg(long, env = "HAZARD_WATCH_FRAME_SKIP", default_value_t = 1)]
    pub frame_skip: u32,

    /// Minimum seconds between alerts
    #[arg(long, env = "HAZARD_WATCH_COOLDOWN_SECS", default_value_t = 45)]
    pub cooldown_secs: u64,

    /// Monitor refresh period
    #[arg(long, env = "HAZARD_WATCH_REFRESH_MS", default_value_t = 33)]
    pub refresh_ms: u64,

    #[arg(long, env = "HAZARD_WATCH_PATCH_SIZE", default_value_t = 64)]
    pub patch_size: u32,

    #[arg(long, env = "HAZARD_WATCH_FIRE_THRESHOLD", default_value_t = 0.4)]
    pub fire_threshold: f32,

    #[arg(long, env = "HAZARD_WATCH_SMOKE_THRESHOLD", default_value_t = 0.65)]
    pub smoke_threshold: f32,

    /// IoU above which smoke boxes are merged
    #[arg(long, env = "HAZARD_WATCH_MERGE_IOU", default_value_t = 0.3)]
    pub merge_iou: f32,

    /// Directory for alert snapshots and alerts.csv
    #[arg(long, env = "HAZARD_WATCH_OUTPUT_DIR", default_value = "alerts")]
    pub output_dir: PathBuf,

    /// RT-DETR ONNX model for person detection (requires the rtdetr feature)
    #[arg(long, env = "HAZARD_WATCH_MODEL_PATH")]
    pub model_path: Option<String>,

    /// Minimum confidence for a person box
    #[arg(long, env = "HAZARD_WATCH_PERSON_CONFIDENCE", default_value_t = 0.5)]
    pub person_confidence: f32,
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let w = w.trim().parse::<u32>().map_err(|e| e.to_string())?;
    let h = h.trim().parse::<u32>().map_err(|e| e.to_string())?;
    Ok((w, h))
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn hsv_config(&self) -> HsvClassifierConfig {
        HsvClassifierConfig {
            patch_size: self.patch_size,
            ..HsvClassifierConfig::default()
        }
    }

    pub fn tile_scan_config(&self) -> TileScanConfig {
        TileScanConfig {
            fire_threshold: self.fire_threshold,
            smoke_threshold: self.smoke_threshold,
            merge_iou_threshold: self.merge_iou,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            frame_skip: self.frame_skip,
            refresh_interval_ms: self.refresh_ms,
            alert_cooldown_secs: self.cooldown_secs,
            ..PipelineConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_pipeline_defaults() {
        let args = Args::try_parse_from(["hazard-watch", "--image-dir", "frames"]).unwrap();
        assert_eq!(args.image_dir, Some(PathBuf::from("frames")));
        assert!(!args.loop_images);

        let tiles = args.tile_scan_config();
        assert_eq!(tiles.fire_threshold, 0.4);
        assert_eq!(tiles.smoke_threshold, 0.65);
        assert_eq!(tiles.merge_iou_threshold, 0.3);
        assert_eq!(args.hsv_config().patch_size, 64);

        let pipeline = args.pipeline_config();
        assert_eq!(pipeline.frame_skip, 1);
        assert_eq!(pipeline.alert_cooldown_secs, 45);
    }

    #[test]
    fn test_camera_and_image_dir_conflict() {
        let res = Args::try_parse_from(["hazard-watch", "--image-dir", "a", "--camera", "0"]);
        assert!(res.is_err());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1280x720"), Ok((1280, 720)));
        assert!(parse_size("1280").is_err());
        assert!(parse_size("axb").is_err());
    }
}
