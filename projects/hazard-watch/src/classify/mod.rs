// Classifier backends consumed by the inference workers

pub mod hsv;
#[cfg(feature = "rtdetr")]
pub mod rtdetr;

use crate::pipeline::types::{DetectionBox, PatchClass};
use anyhow::Result;
use image::RgbImage;

/// A model with a fixed input resolution that localises objects in a whole image.
///
/// Boxes are returned in the coordinate space of the `input_size()` image; the worker
/// maps them back to the source frame.
#[cfg_attr(not(feature = "rtdetr"), allow(dead_code))]
pub trait Classifier: Send {
    fn name(&self) -> &str;
    /// (width, height) the image is resized to before `classify`
    fn input_size(&self) -> (u32, u32);
    fn classify(&mut self, image: &RgbImage) -> Result<Vec<DetectionBox>>;
}

/// Result of classifying one square patch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatchPrediction {
    pub class: PatchClass,
    pub confidence: f32,
}

/// A model whose native input is a small square patch, classified as a whole.
pub trait PatchClassifier: Send {
    fn name(&self) -> &str;
    fn patch_size(&self) -> u32;
    fn classify_patch(&mut self, patch: &RgbImage) -> Result<PatchPrediction>;
}
