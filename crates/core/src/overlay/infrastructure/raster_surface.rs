use std::path::Path;

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use thiserror::Error;

use crate::analysis::domain::face_box::BoxRect;
use crate::overlay::domain::overlay::{Overlay, OverlayShape};
use crate::overlay::domain::overlay_surface::{OverlaySurface, RenderError};
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum FontError {
    #[error("failed to read font {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not a usable TrueType/OpenType font")]
    Invalid { path: String },
}

/// In-memory RGB canvas.
///
/// Rectangles are always drawn. Captions need a font; without one the
/// label bands are drawn empty.
pub struct RasterSurface {
    canvas: Option<RgbImage>,
    font: Option<FontVec>,
}

impl RasterSurface {
    pub fn new() -> Self {
        Self {
            canvas: None,
            font: None,
        }
    }

    pub fn with_font(font: FontVec) -> Self {
        Self {
            canvas: None,
            font: Some(font),
        }
    }

    pub fn load_font(path: &Path) -> Result<FontVec, FontError> {
        let bytes = std::fs::read(path).map_err(|source| FontError::Read {
            path: path.display().to_string(),
            source,
        })?;
        FontVec::try_from_vec(bytes).map_err(|_| FontError::Invalid {
            path: path.display().to_string(),
        })
    }

    /// The last rendered picture, or `None` if nothing is drawn.
    pub fn image(&self) -> Option<&RgbImage> {
        self.canvas.as_ref()
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    fn draw_shape(&self, img: &mut RgbImage, shape: &OverlayShape) {
        let bounds = img.dimensions();
        match shape {
            OverlayShape::StrokeRect {
                rect,
                color,
                line_width,
            } => {
                // Centered on the edge like a canvas stroke: half the line
                // falls outside the rectangle.
                let outside = (*line_width / 2) as i32;
                for offset in 0..*line_width as i32 {
                    let grow = outside - offset;
                    if let Some(r) = to_pixel_rect(rect, grow, bounds) {
                        draw_hollow_rect_mut(img, r, Rgb(*color));
                    }
                }
            }
            OverlayShape::FillRect { rect, color } => {
                if let Some(r) = to_pixel_rect(rect, 0, bounds) {
                    draw_filled_rect_mut(img, r, Rgb(*color));
                }
            }
            OverlayShape::Text {
                x,
                y,
                text,
                color,
                size,
            } => {
                let Some(font) = self.font.as_ref() else {
                    return;
                };
                let scale = PxScale::from(*size);
                let ascent = font.as_scaled(scale).ascent();
                let top = (*y as f32 - ascent).round() as i32;
                draw_text_mut(img, Rgb(*color), x.round() as i32, top, scale, font, text);
            }
        }
    }
}

impl Default for RasterSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlaySurface for RasterSurface {
    fn render(&mut self, frame: &Frame, overlay: &Overlay) -> Result<(), RenderError> {
        let mut img = frame
            .to_rgb_image()
            .ok_or("frame data does not match its dimensions")?;
        for shape in overlay.shapes() {
            self.draw_shape(&mut img, shape);
        }
        self.canvas = Some(img);
        Ok(())
    }

    fn clear(&mut self) {
        self.canvas = None;
    }
}

/// Rounds to whole pixels, growing each side by `grow`, and clips to the
/// canvas plus a one-pixel margin so off-canvas edges stay invisible.
/// Rectangles that end up empty yield `None`.
fn to_pixel_rect(rect: &BoxRect, grow: i32, (width, height): (u32, u32)) -> Option<Rect> {
    let grow = i64::from(grow);
    let (left, right) = clip_span(rect.x, rect.width, grow, width)?;
    let (top, bottom) = clip_span(rect.y, rect.height, grow, height)?;
    let x = i32::try_from(left).ok()?;
    let y = i32::try_from(top).ok()?;
    let w = u32::try_from(right - left).ok()?;
    let h = u32::try_from(bottom - top).ok()?;
    Some(Rect::at(x, y).of_size(w, h))
}

/// Half-open pixel span `[start, end)` of one axis, clipped to
/// `[-1, limit + 1)`.
fn clip_span(origin: f64, extent: f64, grow: i64, limit: u32) -> Option<(i64, i64)> {
    let extent = (extent.round() as i64).saturating_add(2 * grow);
    if extent <= 0 {
        return None;
    }
    let start = (origin.round() as i64).saturating_sub(grow);
    let end = start.saturating_add(extent);
    let start = start.max(-1);
    let end = end.min(i64::from(limit) + 1);
    (end > start).then_some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::domain::face_box::FaceBox;
    use rstest::rstest;

    const GREEN: [u8; 3] = [0, 255, 0];
    const GREY: [u8; 3] = [50, 50, 50];

    fn frame(width: u32, height: u32) -> Frame {
        let data = GREY
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Frame::new(data, width, height, 0)
    }

    fn face(x: f64, y: f64, width: f64, height: f64) -> FaceBox {
        FaceBox {
            rect: BoxRect {
                x,
                y,
                width,
                height,
            },
            label: "Alice".to_string(),
            score: 0.93,
        }
    }

    fn pixel(surface: &RasterSurface, x: u32, y: u32) -> [u8; 3] {
        surface.image().unwrap().get_pixel(x, y).0
    }

    #[test]
    fn test_render_without_overlay_copies_frame() {
        let mut surface = RasterSurface::new();
        surface.render(&frame(20, 10), &Overlay::default()).unwrap();
        assert_eq!(surface.image().unwrap().dimensions(), (20, 10));
        assert_eq!(pixel(&surface, 19, 9), GREY);
    }

    #[test]
    fn test_render_draws_two_pixel_outline() {
        let mut surface = RasterSurface::new();
        let overlay = Overlay::from_faces(&[face(30.0, 30.0, 40.0, 40.0)]);
        surface.render(&frame(100, 100), &overlay).unwrap();

        // Left edge straddles x=30: one pixel outside, one on the edge.
        assert_eq!(pixel(&surface, 29, 50), GREEN);
        assert_eq!(pixel(&surface, 30, 50), GREEN);
        assert_eq!(pixel(&surface, 31, 50), GREY);
        assert_eq!(pixel(&surface, 28, 50), GREY);
        // Interior untouched.
        assert_eq!(pixel(&surface, 50, 50), GREY);
    }

    #[test]
    fn test_render_fills_label_band_above_box() {
        let mut surface = RasterSurface::new();
        let overlay = Overlay::from_faces(&[face(30.0, 30.0, 40.0, 40.0)]);
        surface.render(&frame(100, 100), &overlay).unwrap();

        // Band spans y in [10, 30).
        assert_eq!(pixel(&surface, 50, 15), GREEN);
        assert_eq!(pixel(&surface, 50, 8), GREY);
    }

    #[test]
    fn test_render_clips_band_at_top_edge() {
        let mut surface = RasterSurface::new();
        let overlay = Overlay::from_faces(&[face(10.0, 10.0, 50.0, 60.0)]);
        surface.render(&frame(100, 100), &overlay).unwrap();
        assert_eq!(pixel(&surface, 30, 0), GREEN);
        assert_eq!(pixel(&surface, 30, 5), GREEN);
    }

    #[test]
    fn test_render_skips_degenerate_boxes() {
        let mut surface = RasterSurface::new();
        let overlay = Overlay::from_faces(&[face(0.0, 0.0, 0.0, 0.0)]);
        assert!(surface.render(&frame(10, 10), &overlay).is_ok());
    }

    #[test]
    fn test_render_clips_oversized_box() {
        let mut surface = RasterSurface::new();
        let overlay = Overlay::from_faces(&[face(10.0, 30.0, 4_294_967_296.0, 40.0)]);
        surface.render(&frame(100, 100), &overlay).unwrap();

        assert_eq!(pixel(&surface, 9, 50), GREEN);
        assert_eq!(pixel(&surface, 10, 50), GREEN);
        // Right edge lies far off the canvas.
        assert_eq!(pixel(&surface, 99, 50), GREY);
        assert_eq!(pixel(&surface, 99, 30), GREEN);
    }

    #[test]
    fn test_render_survives_extreme_coordinates() {
        let mut surface = RasterSurface::new();
        let overlay = Overlay::from_faces(&[
            face(-1e300, -1e300, 1e300, 1e300),
            face(f64::MAX, f64::MAX, f64::MAX, f64::MAX),
            face(f64::NAN, 5.0, f64::INFINITY, 5.0),
        ]);
        assert!(surface.render(&frame(10, 10), &overlay).is_ok());
    }

    #[rstest]
    #[case(BoxRect { x: 10.0, y: 30.0, width: 4_294_967_296.0, height: 40.0 }, 0, Some((10, 30, 91, 40)))]
    #[case(BoxRect { x: -50.0, y: -50.0, width: 20.0, height: 20.0 }, 0, None)]
    #[case(BoxRect { x: 200.0, y: 0.0, width: 20.0, height: 20.0 }, 0, None)]
    #[case(BoxRect { x: 5.0, y: 5.0, width: 10.0, height: 10.0 }, 1, Some((4, 4, 12, 12)))]
    #[case(BoxRect { x: -5.0, y: 0.0, width: 10.0, height: 10.0 }, 0, Some((-1, 0, 6, 10)))]
    fn test_to_pixel_rect_clips_to_canvas(
        #[case] rect: BoxRect,
        #[case] grow: i32,
        #[case] expected: Option<(i32, i32, u32, u32)>,
    ) {
        let clipped = to_pixel_rect(&rect, grow, (100, 100))
            .map(|r| (r.left(), r.top(), r.width(), r.height()));
        assert_eq!(clipped, expected);
    }

    #[test]
    fn test_render_follows_latest_frame_dimensions() {
        let mut surface = RasterSurface::new();
        surface.render(&frame(20, 10), &Overlay::default()).unwrap();
        surface.render(&frame(64, 48), &Overlay::default()).unwrap();
        assert_eq!(surface.image().unwrap().dimensions(), (64, 48));
    }

    #[test]
    fn test_text_without_font_is_skipped() {
        let mut surface = RasterSurface::new();
        assert!(!surface.has_font());
        let overlay = Overlay::from_faces(&[face(30.0, 30.0, 40.0, 40.0)]);
        surface.render(&frame(100, 100), &overlay).unwrap();
        // Band stays solid where text would be.
        assert_eq!(pixel(&surface, 36, 24), GREEN);
    }

    #[test]
    fn test_clear_discards_picture() {
        let mut surface = RasterSurface::new();
        surface.render(&frame(10, 10), &Overlay::default()).unwrap();
        surface.clear();
        assert!(surface.image().is_none());
    }

    #[test]
    fn test_load_font_missing_file() {
        let result = RasterSurface::load_font(Path::new("/nonexistent/font.ttf"));
        assert!(matches!(result, Err(FontError::Read { .. })));
    }

    #[test]
    fn test_load_font_rejects_non_font() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("font.ttf");
        std::fs::write(&path, b"definitely not a font").unwrap();
        let result = RasterSurface::load_font(&path);
        assert!(matches!(result, Err(FontError::Invalid { .. })));
    }
}
