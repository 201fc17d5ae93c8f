use super::Classifier;
use crate::pipeline::types::{BBox, DetectionBox, DetectionLabel};
use anyhow::Result;
use image::{DynamicImage, RgbImage};
use usls::models::RTDETR;
use usls::{Config, Image};

pub const RTDETR_INPUT_SIZE: u32 = 640;

/// RT-DETR (COCO) through usls, reporting people only.
pub struct RtDetrPersonDetector {
    model: RTDETR,
}

impl RtDetrPersonDetector {
    pub fn new(model_path: &str) -> Result<Self> {
        let config = Config::default()
            .with_model_file(model_path)
            .with_class_names(&usls::NAMES_COCO_80)
            .commit()?;
        let model = RTDETR::new(config)?;
        tracing::info!("Loaded RT-DETR person detector from {}", model_path);
        Ok(Self { model })
    }
}

/// Scale applied to usls RT-DETR boxes on non-square inputs, which come back
/// squeezed along the longer side.
fn aspect_correction(width: u32, height: u32) -> (f32, f32) {
    let (w, h) = (width as f32, height as f32);
    if w > h {
        (w / h, 1.0)
    } else if h > w {
        (1.0, h / w)
    } else {
        (1.0, 1.0)
    }
}

impl Classifier for RtDetrPersonDetector {
    fn name(&self) -> &str {
        "person"
    }

    fn input_size(&self) -> (u32, u32) {
        (RTDETR_INPUT_SIZE, RTDETR_INPUT_SIZE)
    }

    fn classify(&mut self, image: &RgbImage) -> Result<Vec<DetectionBox>> {
        let (x_corr, y_corr) = aspect_correction(image.width(), image.height());
        let input = Image::from(DynamicImage::ImageRgb8(image.clone()));
        let results = self.model.forward(&[input])?;

        let detections = results
            .into_iter()
            .flat_map(|y| y.hbbs.into_iter())
            .filter(|hbb| hbb.name() == Some("person"))
            .map(|hbb| {
                let x = hbb.xmin() * x_corr;
                let y = hbb.ymin() * y_corr;
                let w = hbb.width() * x_corr;
                let h = hbb.height() * y_corr;
                DetectionBox::new(
                    DetectionLabel::Person,
                    hbb.confidence().unwrap_or(0.0),
                    BBox::new(x, y, x + w, y + h),
                )
            })
            .collect();

        Ok(detections)
    }
}
