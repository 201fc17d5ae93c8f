pub mod image_dir;
#[cfg(feature = "opencv-camera")]
pub mod opencv_camera;

use crate::pipeline::types::ChannelOrder;
use anyhow::Result;
use image::RgbImage;

/// Pixels as delivered by a source, before the capture loop numbers them
pub struct RawFrame {
    pub image: RgbImage,
    pub order: ChannelOrder,
}

/// A sequential frame producer (camera, file replay, ...).
///
/// Opening a source is fallible and fatal; once open, `read_frame` returning
/// `Ok(None)` or `Err` is a transient miss that the capture loop retries.
pub trait FrameSource: Send {
    fn describe(&self) -> String;
    fn read_frame(&mut self) -> Result<Option<RawFrame>>;
}
