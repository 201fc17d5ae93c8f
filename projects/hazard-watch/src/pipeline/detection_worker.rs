use crate::classify::{Classifier, PatchClassifier};
use crate::pipeline::cancel::CancellationToken;
use crate::pipeline::geometry::{clamp_to_frame, rescale_bbox, sanitize_confidence, scale_factors};
use crate::pipeline::slicing::TileScanner;
use crate::pipeline::slot::SharedSlot;
use crate::pipeline::types::{DetectionBox, DetectionSet, Frame, ProcessingState};
use anyhow::{anyhow, bail, Result};
use image::imageops::{self, FilterType};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Something that turns a whole frame into detections in frame coordinates.
pub trait FrameDetector: Send {
    fn name(&self) -> &str;
    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectionBox>>;
}

/// Runs a fixed-resolution classifier on a downscaled copy of the frame and maps the
/// boxes back to the frame.
#[cfg_attr(not(feature = "rtdetr"), allow(dead_code))]
pub struct ResizingDetector<C: Classifier> {
    classifier: C,
    min_confidence: f32,
}

#[cfg_attr(not(feature = "rtdetr"), allow(dead_code))]
impl<C: Classifier> ResizingDetector<C> {
    pub fn new(classifier: C, min_confidence: f32) -> Self {
        Self {
            classifier,
            min_confidence,
        }
    }
}

impl<C: Classifier> FrameDetector for ResizingDetector<C> {
    fn name(&self) -> &str {
        self.classifier.name()
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectionBox>> {
        let (input_w, input_h) = self.classifier.input_size();
        if input_w == 0 || input_h == 0 {
            bail!("Classifier {} reports an empty input size", self.classifier.name());
        }

        let rgb = frame.to_rgb();
        let resized = imageops::resize(&*rgb, input_w, input_h, FilterType::Triangle);
        let raw = self.classifier.classify(&resized)?;

        Ok(rescale_detections(
            raw,
            (frame.width(), frame.height()),
            (input_w, input_h),
        )
        .into_iter()
        .filter(|d| d.confidence >= self.min_confidence)
        .collect())
    }
}

/// Map model-space detections to source-frame space.
///
/// The scale is taken from the resize actually performed (`input`), not from anything
/// the model reports. Results are clamped to the frame; boxes left with no area inside
/// it are dropped.
#[cfg_attr(not(feature = "rtdetr"), allow(dead_code))]
pub fn rescale_detections(
    raw: Vec<DetectionBox>,
    (source_w, source_h): (u32, u32),
    (input_w, input_h): (u32, u32),
) -> Vec<DetectionBox> {
    let (scale_x, scale_y) = scale_factors(source_w, source_h, input_w, input_h);
    raw.into_iter()
        .map(|d| DetectionBox {
            label: d.label,
            confidence: sanitize_confidence(d.confidence),
            bbox: clamp_to_frame(&rescale_bbox(&d.bbox, scale_x, scale_y), source_w, source_h),
        })
        .filter(|d| d.bbox.area() > 0.0)
        .collect()
}

impl<P: PatchClassifier> FrameDetector for TileScanner<P> {
    fn name(&self) -> &str {
        TileScanner::name(self)
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectionBox>> {
        TileScanner::detect(self, frame)
    }
}

/// Worker that repeatedly runs one detector on whatever frame is currently latest.
///
/// The worker never waits for a new frame and never blocks capture; if the frame slot
/// is still empty, or still holds the frame it last processed, it idles for
/// `idle_interval` and tries again. A failing or panicking
/// detector costs that cycle only: the failure is logged and an empty set is published.
pub fn inference_worker(
    mut detector: Box<dyn FrameDetector>,
    frames: Arc<SharedSlot<Frame>>,
    results: Arc<SharedSlot<DetectionSet>>,
    state: Arc<ProcessingState>,
    cancel: CancellationToken,
    idle_interval: Duration,
) -> Result<()> {
    let name = detector.name().to_string();
    state.register_stage(&name);
    tracing::info!("Inference worker {} started", name);

    let mut last_seq = None;
    while !cancel.is_cancelled() {
        let frame = match frames.get() {
            Some(frame) if last_seq != Some(frame.seq) => frame,
            _ => {
                std::thread::sleep(idle_interval);
                continue;
            }
        };
        last_seq = Some(frame.seq);

        let start_inst = Instant::now();
        let detections = match run_detector(detector.as_mut(), &frame) {
            Ok(detections) => detections,
            Err(e) => {
                tracing::warn!("Worker {} failed on frame {}: {:#}", name, frame.seq, e);
                Vec::new()
            }
        };

        results.put(DetectionSet {
            worker: name.clone(),
            frame_seq: frame.seq,
            detections,
        });

        let duration_ms = start_inst.elapsed().as_secs_f64() * 1000.0;
        state.update_stage(&name, duration_ms);
    }

    tracing::info!("Inference worker {} observed cancellation", name);
    Ok(())
}

fn run_detector(detector: &mut dyn FrameDetector, frame: &Frame) -> Result<Vec<DetectionBox>> {
    match panic::catch_unwind(AssertUnwindSafe(|| detector.detect(frame))) {
        Ok(result) => result,
        Err(payload) => Err(anyhow!("detector panicked: {}", panic_message(&*payload))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
