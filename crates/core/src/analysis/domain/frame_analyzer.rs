use thiserror::Error;

use crate::analysis::domain::face_box::FaceBoxInput;
use crate::shared::encoded_frame::EncodedFrame;

/// Any failure while producing or analyzing one frame.
///
/// The real-time loop retries every variant the same way; the variants
/// exist for logs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("frame capture failed: {0}")]
    Capture(String),
    #[error("frame encoding failed: {0}")]
    Encode(String),
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("analyzer responded with HTTP {status}")]
    Status { status: u16 },
    #[error("malformed analyzer response: {0}")]
    Malformed(String),
}

/// Remote face analysis: encoded frame in, detected faces out.
///
/// Returns the faces exactly as the service reported them; normalization
/// is the caller's concern. Implementations are shared between the caller
/// and the loop's worker thread, hence `&self` and `Sync`.
pub trait FrameAnalyzer: Send + Sync {
    fn analyze(&self, frame: &EncodedFrame) -> Result<Vec<FaceBoxInput>, AnalysisError>;
}
