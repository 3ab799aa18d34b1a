/// A compressed frame ready to be uploaded.
///
/// Dimensions are those of the raw frame it was encoded from.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedFrame {
    bytes: Vec<u8>,
    mime_type: &'static str,
    width: u32,
    height: u32,
}

impl EncodedFrame {
    pub fn new(bytes: Vec<u8>, mime_type: &'static str, width: u32, height: u32) -> Self {
        Self {
            bytes,
            mime_type,
            width,
            height,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
