use std::path::Path;

use crate::capture::domain::video_source::{CaptureError, VideoSource};
use crate::shared::frame::Frame;

/// Presents a single image file as a source that never ends.
///
/// Every capture returns the same pixels with an increasing sequence number.
pub struct StillImageSource {
    frame: Frame,
    captured: u64,
}

impl StillImageSource {
    pub fn open(path: &Path) -> Result<Self, image::ImageError> {
        let img = image::open(path)?.to_rgb8();
        Ok(Self::from_frame(Frame::from_rgb_image(img, 0)))
    }

    pub fn from_frame(frame: Frame) -> Self {
        Self { frame, captured: 0 }
    }
}

impl VideoSource for StillImageSource {
    fn is_active(&self) -> bool {
        true
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some(self.frame.dimensions())
    }

    fn capture(&mut self) -> Result<Frame, CaptureError> {
        let (w, h) = self.frame.dimensions();
        let frame = Frame::new(self.frame.data().to_vec(), w, h, self.captured);
        self.captured += 1;
        Ok(frame)
    }
}
