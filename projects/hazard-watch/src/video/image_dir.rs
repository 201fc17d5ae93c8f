use super::{FrameSource, RawFrame};
use crate::pipeline::types::ChannelOrder;
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

pub fn list_images(root: &Path) -> Vec<PathBuf> {
    let mut images: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|s| IMAGE_EXTENSIONS.contains(&s.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    images.sort();
    images
}

/// Replays a directory of still images as if they came from a camera.
pub struct ImageDirSource {
    root: PathBuf,
    images: Vec<PathBuf>,
    next: usize,
    looping: bool,
    frame_interval: Duration,
    last_read: Option<Instant>,
}

impl ImageDirSource {
    pub fn new(root: &Path, looping: bool, frame_interval: Duration) -> Result<Self> {
        if !root.is_dir() {
            return Err(anyhow!("Image directory NOT FOUND at: {:?}", root));
        }
        let images = list_images(root);
        if images.is_empty() {
            return Err(anyhow!("No images found under {:?}", root));
        }

        tracing::info!(
            "ImageDirSource: opened {:?}, images={}, interval={:?}, looping={}",
            root,
            images.len(),
            frame_interval,
            looping
        );

        Ok(Self {
            root: root.to_path_buf(),
            images,
            next: 0,
            looping,
            frame_interval,
            last_read: None,
        })
    }

    fn pace(&mut self) {
        if let Some(last) = self.last_read {
            let elapsed = last.elapsed();
            if elapsed < self.frame_interval {
                std::thread::sleep(self.frame_interval - elapsed);
            }
        }
        self.last_read = Some(Instant::now());
    }
}

impl FrameSource for ImageDirSource {
    fn describe(&self) -> String {
        format!("images:{}", self.root.display())
    }

    fn read_frame(&mut self) -> Result<Option<RawFrame>> {
        if self.next >= self.images.len() {
            if !self.looping {
                return Ok(None);
            }
            self.next = 0;
        }

        self.pace();
        let path = &self.images[self.next];
        self.next += 1;

        let image = image::open(path)
            .with_context(|| format!("Failed to decode image at: '{}'", path.display()))?
            .to_rgb8();

        Ok(Some(RawFrame {
            image,
            order: ChannelOrder::Rgb,
        }))
    }
}
