use super::{FrameSource, RawFrame};
use crate::pipeline::types::ChannelOrder;
use anyhow::{anyhow, Result};
use image::RgbImage;
use opencv::{
    core::{Mat, CV_8UC3},
    prelude::*,
    videoio::{VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH},
};

/// Live capture device opened through OpenCV. Frames come out in BGR order.
pub struct OpencvCamera {
    capture: VideoCapture,
    index: i32,
}

impl OpencvCamera {
    pub fn new(index: i32, requested_size: Option<(u32, u32)>) -> Result<Self> {
        let mut capture = VideoCapture::new(index, CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(anyhow!("Failed to open camera device {}", index));
        }

        if let Some((width, height)) = requested_size {
            capture.set(CAP_PROP_FRAME_WIDTH, width as f64)?;
            capture.set(CAP_PROP_FRAME_HEIGHT, height as f64)?;
        }

        let mut fps = capture.get(CAP_PROP_FPS)?;
        if fps <= 0.0 {
            tracing::warn!("OpencvCamera: device did not report FPS, assuming 30.0");
            fps = 30.0;
        }

        tracing::info!(
            "OpencvCamera: opened device {}, {}x{} @ {:.1} fps",
            index,
            capture.get(CAP_PROP_FRAME_WIDTH)?,
            capture.get(CAP_PROP_FRAME_HEIGHT)?,
            fps
        );

        Ok(Self { capture, index })
    }
}

/// Copy a continuous 8-bit 3-channel Mat into an image buffer without reordering channels.
fn mat_to_image(mat: &Mat) -> Result<RgbImage> {
    if mat.typ() != CV_8UC3 {
        return Err(anyhow!("Unsupported Mat type {}", mat.typ()));
    }
    if !mat.is_continuous() {
        return Err(anyhow!("Mat is not continuous"));
    }

    let size = mat.size()?;
    let buffer = mat.data_bytes()?.to_vec();

    RgbImage::from_vec(size.width as u32, size.height as u32, buffer)
        .ok_or_else(|| anyhow!("Failed to create ImageBuffer from Mat data"))
}

impl FrameSource for OpencvCamera {
    fn describe(&self) -> String {
        format!("camera:{}", self.index)
    }

    fn read_frame(&mut self) -> Result<Option<RawFrame>> {
        let mut frame = Mat::default();
        let success = self.capture.read(&mut frame)?;
        if !success || frame.empty() {
            return Ok(None);
        }

        Ok(Some(RawFrame {
            image: mat_to_image(&frame)?,
            order: ChannelOrder::Bgr,
        }))
    }
}
