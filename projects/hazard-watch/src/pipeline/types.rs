use image::RgbImage;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Byte order of the three channels in a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChannelOrder {
    Rgb,
    /// OpenCV native order
    Bgr,
}

/// A captured frame. Immutable once published; readers share it through an `Arc`.
#[derive(Debug, Clone)]
pub struct Frame {
    pub seq: u64,
    pub image: RgbImage,
    pub order: ChannelOrder,
}

impl Frame {
    pub fn new(seq: u64, image: RgbImage, order: ChannelOrder) -> Self {
        Self { seq, image, order }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Returns the pixels in RGB order, swapping channels only when needed.
    pub fn to_rgb(&self) -> Cow<'_, RgbImage> {
        match self.order {
            ChannelOrder::Rgb => Cow::Borrowed(&self.image),
            ChannelOrder::Bgr => {
                let mut rgb = self.image.clone();
                for px in rgb.pixels_mut() {
                    px.0.swap(0, 2);
                }
                Cow::Owned(rgb)
            }
        }
    }
}

/// Labels a detector may emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionLabel {
    Person,
    Fire,
    Smoke,
}

impl DetectionLabel {
    /// The hazard this label represents, if any
    pub fn hazard(self) -> Option<HazardLabel> {
        match self {
            DetectionLabel::Person => None,
            DetectionLabel::Fire => Some(HazardLabel::Fire),
            DetectionLabel::Smoke => Some(HazardLabel::Smoke),
        }
    }
}

/// Hazards that can raise an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HazardLabel {
    Fire,
    Smoke,
}

impl HazardLabel {
    pub fn other(self) -> Self {
        match self {
            HazardLabel::Fire => HazardLabel::Smoke,
            HazardLabel::Smoke => HazardLabel::Fire,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HazardLabel::Fire => "fire",
            HazardLabel::Smoke => "smoke",
        }
    }
}

impl std::fmt::Display for HazardLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HazardLabel::Fire => write!(f, "Fire"),
            HazardLabel::Smoke => write!(f, "Smoke"),
        }
    }
}

/// Output classes of a patch classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchClass {
    Fire,
    Smoke,
    Neutral,
}

/// Axis-aligned box as top-left / bottom-right corners, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionBox {
    pub label: DetectionLabel,
    pub confidence: f32,
    pub bbox: BBox,
}

impl DetectionBox {
    pub fn new(label: DetectionLabel, confidence: f32, bbox: BBox) -> Self {
        Self {
            label,
            confidence,
            bbox,
        }
    }
}

/// Everything one detector found in one frame
#[derive(Debug, Clone, Serialize)]
pub struct DetectionSet {
    pub worker: String,
    /// Sequence number of the frame this set was computed from
    pub frame_seq: u64,
    pub detections: Vec<DetectionBox>,
}

#[derive(Debug, Serialize, Clone, Default)]
pub struct StageProgress {
    pub current: u64,
    pub ms_per_frame: f64,
}

impl StageProgress {
    pub fn fps(&self) -> f64 {
        if self.ms_per_frame > 0.0 {
            1000.0 / self.ms_per_frame
        } else {
            0.0
        }
    }
}

/// Metrics shared between the capture loop, the workers and the status API
#[derive(Debug)]
pub struct ProcessingState {
    /// Progress per unit (e.g. "capture", "person", "fire-smoke")
    pub stages: RwLock<BTreeMap<String, StageProgress>>,
    pub frames_captured: AtomicU64,
    pub start_time: Instant,
}

impl ProcessingState {
    pub fn new() -> Self {
        Self {
            stages: RwLock::new(BTreeMap::new()),
            frames_captured: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn register_stage(&self, stage: &str) {
        if let Ok(mut stages) = self.stages.write() {
            stages.entry(stage.to_string()).or_default();
        }
    }

    /// Records one completed cycle of `stage` that took `ms_per_frame`.
    pub fn update_stage(&self, stage: &str, ms_per_frame: f64) {
        if let Ok(mut stages) = self.stages.write() {
            let progress = stages.entry(stage.to_string()).or_default();
            progress.current += 1;
            // Simple exponential moving average for smoothing durations
            if progress.ms_per_frame == 0.0 {
                progress.ms_per_frame = ms_per_frame;
            } else {
                progress.ms_per_frame = progress.ms_per_frame * 0.9 + ms_per_frame * 0.1;
            }
        }
    }

    pub fn record_capture(&self) -> u64 {
        self.frames_captured.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn stage_snapshot(&self) -> BTreeMap<String, StageProgress> {
        self.stages
            .read()
            .map(|stages| stages.clone())
            .unwrap_or_default()
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Default for ProcessingState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_bgr_frame_to_rgb_swaps_channels() {
        let image = RgbImage::from_pixel(2, 2, Rgb([10, 20, 30]));
        let frame = Frame::new(1, image, ChannelOrder::Bgr);
        let rgb = frame.to_rgb();
        assert_eq!(rgb.get_pixel(1, 1).0, [30, 20, 10]);
        // Source is untouched
        assert_eq!(frame.image.get_pixel(1, 1).0, [10, 20, 30]);
    }

    #[test]
    fn test_hazard_alternation() {
        assert_eq!(HazardLabel::Fire.other(), HazardLabel::Smoke);
        assert_eq!(HazardLabel::Smoke.other(), HazardLabel::Fire);
        assert_eq!(DetectionLabel::Person.hazard(), None);
        assert_eq!(DetectionLabel::Smoke.hazard(), Some(HazardLabel::Smoke));
    }

    #[test]
    fn test_update_stage_smooths_duration() {
        let state = ProcessingState::new();
        state.register_stage("capture");
        state.update_stage("capture", 10.0);
        state.update_stage("capture", 20.0);
        let stages = state.stage_snapshot();
        let capture = &stages["capture"];
        assert_eq!(capture.current, 2);
        assert!((capture.ms_per_frame - 11.0).abs() < 1e-9);
        assert!((capture.fps() - 1000.0 / 11.0).abs() < 1e-9);
    }
}
