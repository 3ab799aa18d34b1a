use crate::overlay::domain::overlay::Overlay;
use crate::shared::frame::Frame;

pub type RenderError = Box<dyn std::error::Error + Send + Sync>;

/// The drawable the real-time loop paints on.
///
/// Each `render` replaces the previous picture entirely: the surface takes
/// the frame's dimensions, draws the frame, then the overlay on top.
pub trait OverlaySurface: Send {
    fn is_ready(&self) -> bool {
        true
    }

    fn render(&mut self, frame: &Frame, overlay: &Overlay) -> Result<(), RenderError>;

    /// Removes everything drawn so far.
    fn clear(&mut self);
}
