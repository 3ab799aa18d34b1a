use crate::analysis::domain::face_box::{BoxRect, FaceBox};

pub const BOX_COLOR: [u8; 3] = [0, 255, 0];
pub const LABEL_TEXT_COLOR: [u8; 3] = [0, 0, 0];
pub const BOX_LINE_WIDTH: u32 = 2;
pub const LABEL_HEIGHT: f64 = 20.0;
pub const LABEL_FONT_SIZE: f32 = 12.0;
/// Text origin relative to the box's top-left corner. `y` is a baseline.
pub const LABEL_TEXT_OFFSET: (f64, f64) = (5.0, -5.0);

/// One primitive of the overlay scene, in frame pixel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub enum OverlayShape {
    StrokeRect {
        rect: BoxRect,
        color: [u8; 3],
        line_width: u32,
    },
    FillRect {
        rect: BoxRect,
        color: [u8; 3],
    },
    /// `(x, y)` is the left end of the text baseline.
    Text {
        x: f64,
        y: f64,
        text: String,
        color: [u8; 3],
        size: f32,
    },
}

/// Everything drawn on top of a frame, in paint order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Overlay {
    shapes: Vec<OverlayShape>,
}

impl Overlay {
    /// Builds the scene for a set of faces: per face, a green outline, a
    /// green label band sitting directly above the box, and the caption.
    pub fn from_faces(faces: &[FaceBox]) -> Self {
        let mut shapes = Vec::with_capacity(faces.len() * 3);
        for face in faces {
            let r = face.rect;
            shapes.push(OverlayShape::StrokeRect {
                rect: r,
                color: BOX_COLOR,
                line_width: BOX_LINE_WIDTH,
            });
            shapes.push(OverlayShape::FillRect {
                rect: BoxRect {
                    x: r.x,
                    y: r.y - LABEL_HEIGHT,
                    width: r.width,
                    height: LABEL_HEIGHT,
                },
                color: BOX_COLOR,
            });
            shapes.push(OverlayShape::Text {
                x: r.x + LABEL_TEXT_OFFSET.0,
                y: r.y + LABEL_TEXT_OFFSET.1,
                text: face.label_text(),
                color: LABEL_TEXT_COLOR,
                size: LABEL_FONT_SIZE,
            });
        }
        Self { shapes }
    }

    pub fn shapes(&self) -> &[OverlayShape] {
        &self.shapes
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Outlined face rectangles, in paint order.
    pub fn boxes(&self) -> Vec<BoxRect> {
        self.shapes
            .iter()
            .filter_map(|s| match s {
                OverlayShape::StrokeRect { rect, .. } => Some(*rect),
                _ => None,
            })
            .collect()
    }

    /// Caption strings, in paint order.
    pub fn labels(&self) -> Vec<&str> {
        self.shapes
            .iter()
            .filter_map(|s| match s {
                OverlayShape::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}
