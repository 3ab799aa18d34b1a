use std::time::{Duration, Instant};

use crate::shared::frame::Frame;

const FRAME_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub type CaptureError = Box<dyn std::error::Error + Send + Sync>;

/// A live, camera-like frame supplier.
///
/// Unlike a file reader, a source has no notion of "next" frame: `capture`
/// returns whatever the source is showing right now, at its current native
/// resolution.
pub trait VideoSource: Send {
    /// False once the source has ended or failed. The real-time loop never
    /// runs against an inactive source.
    fn is_active(&self) -> bool;

    /// Current native `(width, height)`, or `None` before the first frame.
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// Copies the current image out of the source.
    fn capture(&mut self) -> Result<Frame, CaptureError>;
}

/// Captures the first available frame, polling until `timeout`.
///
/// Decoding sources know their dimensions from the stream header but may not
/// have a picture yet right after opening.
pub fn wait_for_frame(source: &mut dyn VideoSource, timeout: Duration) -> Result<Frame, CaptureError> {
    let deadline = Instant::now() + timeout;
    loop {
        if !source.is_active() {
            return Err("video source is not active".into());
        }
        match source.capture() {
            Ok(frame) => return Ok(frame),
            Err(e) if Instant::now() >= deadline => return Err(e),
            Err(e) => log::trace!("Waiting for first frame: {e}"),
        }
        std::thread::sleep(FRAME_POLL_INTERVAL);
    }
}
