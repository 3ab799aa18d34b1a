use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::shared::encoded_frame::EncodedFrame;

/// A single captured frame: contiguous RGB24 bytes in row-major order.
///
/// Encoding happens right before the frame leaves the process; every other
/// stage works on raw pixels.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    sequence: u64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * 3,
            "data length must equal width * height * 3"
        );
        Self {
            data,
            width,
            height,
            sequence,
        }
    }

    pub fn from_rgb_image(image: RgbImage, sequence: u64) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, sequence)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Capture order within a source. Sources restart numbering at 0.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Copies the pixels into an `image` buffer for drawing.
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// Compresses the frame to JPEG at the given quality (1-100).
    pub fn encode_jpeg(&self, quality: u8) -> Result<EncodedFrame, image::ImageError> {
        let mut bytes = Vec::with_capacity(self.data.len() / 8);
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
        encoder.encode(
            &self.data,
            self.width,
            self.height,
            image::ExtendedColorType::Rgb8,
        )?;
        Ok(EncodedFrame::new(
            bytes,
            "image/jpeg",
            self.width,
            self.height,
        ))
    }
}
