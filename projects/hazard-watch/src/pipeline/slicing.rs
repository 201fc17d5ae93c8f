use crate::classify::PatchClassifier;
use crate::pipeline::geometry::sanitize_confidence;
use crate::pipeline::merge::{merge_smoke_detections, DEFAULT_MERGE_IOU};
use crate::pipeline::types::{BBox, DetectionBox, DetectionLabel, Frame, PatchClass};
use anyhow::Result;
use image::imageops;
use serde::{Deserialize, Serialize};

/// Configuration for grid (tile) inference
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TileScanConfig {
    /// Minimum confidence for a fire tile
    pub fire_threshold: f32,
    /// Minimum confidence for a smoke tile; kept well above fire to ignore haze
    pub smoke_threshold: f32,
    /// IoU above which smoke boxes are merged
    pub merge_iou_threshold: f32,
}

impl Default for TileScanConfig {
    fn default() -> Self {
        Self {
            fire_threshold: 0.4,
            smoke_threshold: 0.65,
            merge_iou_threshold: DEFAULT_MERGE_IOU,
        }
    }
}

/// A tile's rectangle in frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub size: u32,
}

impl Tile {
    pub fn bbox(&self) -> BBox {
        BBox::new(
            self.x as f32,
            self.y as f32,
            (self.x + self.size) as f32,
            (self.y + self.size) as f32,
        )
    }
}

/// Helper to generate tile offsets along one dimension.
/// Stride equals the patch size; a trailing strip narrower than a patch is dropped.
fn generate_offsets(total_size: u32, patch_size: u32) -> Vec<u32> {
    if patch_size == 0 {
        return Vec::new();
    }
    (0..total_size / patch_size).map(|i| i * patch_size).collect()
}

/// Partition a `width` x `height` frame into a non-overlapping row-major grid of patches.
pub fn generate_tiles(width: u32, height: u32, patch_size: u32) -> Vec<Tile> {
    let x_offsets = generate_offsets(width, patch_size);
    let y_offsets = generate_offsets(height, patch_size);

    let mut tiles = Vec::with_capacity(x_offsets.len() * y_offsets.len());
    for &y in &y_offsets {
        for &x in &x_offsets {
            tiles.push(Tile {
                x,
                y,
                size: patch_size,
            });
        }
    }
    tiles
}

/// Runs a patch classifier over every tile of a frame and merges the smoke hits.
pub struct TileScanner<P: PatchClassifier> {
    classifier: P,
    config: TileScanConfig,
}

impl<P: PatchClassifier> TileScanner<P> {
    pub fn new(classifier: P, config: TileScanConfig) -> Self {
        if config.smoke_threshold <= config.fire_threshold {
            tracing::warn!(
                "Smoke threshold {:.2} is not above fire threshold {:.2}; haze may alert",
                config.smoke_threshold,
                config.fire_threshold
            );
        }
        Self { classifier, config }
    }

    pub fn name(&self) -> &str {
        self.classifier.name()
    }

    /// Candidate detections, one per qualifying tile, in scan order.
    pub fn scan(&mut self, frame: &Frame) -> Result<Vec<DetectionBox>> {
        let patch_size = self.classifier.patch_size();
        let tiles = generate_tiles(frame.width(), frame.height(), patch_size);
        if tiles.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!("Scanning {} tiles of {}px", tiles.len(), patch_size);

        let rgb = frame.to_rgb();
        let mut candidates = Vec::new();

        for tile in &tiles {
            let patch = imageops::crop_imm(&*rgb, tile.x, tile.y, tile.size, tile.size).to_image();
            let prediction = self.classifier.classify_patch(&patch)?;
            let confidence = sanitize_confidence(prediction.confidence);

            let label = match prediction.class {
                PatchClass::Fire if confidence >= self.config.fire_threshold => {
                    DetectionLabel::Fire
                }
                PatchClass::Smoke if confidence >= self.config.smoke_threshold => {
                    DetectionLabel::Smoke
                }
                PatchClass::Fire | PatchClass::Smoke | PatchClass::Neutral => continue,
            };

            candidates.push(DetectionBox::new(label, confidence, tile.bbox()));
        }

        Ok(candidates)
    }

    /// Scan then merge overlapping smoke boxes.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectionBox>> {
        let candidates = self.scan(frame)?;
        Ok(merge_smoke_detections(
            candidates,
            self.config.merge_iou_threshold,
        ))
    }
}
