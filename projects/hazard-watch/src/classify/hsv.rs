use super::{PatchClassifier, PatchPrediction};
use crate::pipeline::types::PatchClass;
use anyhow::{bail, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Inclusive HSV window in OpenCV units (H 0-179, S/V 0-255).
/// `h_min > h_max` wraps around the red end of the hue circle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HsvRange {
    pub h_min: u8,
    pub h_max: u8,
    pub s_min: u8,
    pub s_max: u8,
    pub v_min: u8,
    pub v_max: u8,
}

impl HsvRange {
    pub fn contains(&self, (h, s, v): (u8, u8, u8)) -> bool {
        let hue_ok = if self.h_min <= self.h_max {
            h >= self.h_min && h <= self.h_max
        } else {
            h >= self.h_min || h <= self.h_max
        };
        hue_ok && (self.s_min..=self.s_max).contains(&s) && (self.v_min..=self.v_max).contains(&v)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HsvClassifierConfig {
    pub patch_size: u32,
    pub fire: HsvRange,
    pub smoke: HsvRange,
}

impl Default for HsvClassifierConfig {
    fn default() -> Self {
        Self {
            patch_size: 64,
            // Saturated red through yellow
            fire: HsvRange {
                h_min: 170,
                h_max: 30,
                s_min: 120,
                s_max: 255,
                v_min: 150,
                v_max: 255,
            },
            // Washed-out greys, neither black nor blown out
            smoke: HsvRange {
                h_min: 0,
                h_max: 179,
                s_min: 0,
                s_max: 40,
                v_min: 80,
                v_max: 220,
            },
        }
    }
}

/// Colour-range patch classifier.
///
/// Class probabilities are the fraction of pixels falling in the fire range, the smoke
/// range, and neither; the prediction is the most likely class with its probability.
pub struct HsvPatchClassifier {
    config: HsvClassifierConfig,
}

impl HsvPatchClassifier {
    pub fn new(config: HsvClassifierConfig) -> Result<Self> {
        if config.patch_size == 0 {
            bail!("HSV classifier patch size must be positive");
        }
        Ok(Self { config })
    }
}

/// RGB to HSV using OpenCV's 8-bit conventions
pub fn rgb_to_hsv([r, g, b]: [u8; 3]) -> (u8, u8, u8) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max > 0.0 { delta / max * 255.0 } else { 0.0 };
    let mut h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    ((h / 2.0).round() as u8 % 180, s.round() as u8, max as u8)
}

impl PatchClassifier for HsvPatchClassifier {
    fn name(&self) -> &str {
        "hsv"
    }

    fn patch_size(&self) -> u32 {
        self.config.patch_size
    }

    fn classify_patch(&mut self, patch: &RgbImage) -> Result<PatchPrediction> {
        let total = patch.width() as usize * patch.height() as usize;
        if total == 0 {
            bail!("Cannot classify an empty patch");
        }

        let mut fire = 0usize;
        let mut smoke = 0usize;
        for px in patch.pixels() {
            let hsv = rgb_to_hsv(px.0);
            if self.config.fire.contains(hsv) {
                fire += 1;
            } else if self.config.smoke.contains(hsv) {
                smoke += 1;
            }
        }

        let probs = [
            (PatchClass::Fire, fire as f32 / total as f32),
            (PatchClass::Smoke, smoke as f32 / total as f32),
            (PatchClass::Neutral, (total - fire - smoke) as f32 / total as f32),
        ];

        // First maximum wins, like an argmax over the class vector
        let (class, confidence) = probs
            .iter()
            .copied()
            .fold(probs[0], |best, p| if p.1 > best.1 { p } else { best });

        Ok(PatchPrediction { class, confidence })
    }
}
