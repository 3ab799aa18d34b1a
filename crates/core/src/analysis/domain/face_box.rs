use serde::Deserialize;

use crate::shared::constants::UNKNOWN_LABEL;

/// One face as reported by the recognition service.
///
/// The service is not consistent about rectangle conventions: some responses
/// carry `x/y/width/height`, others `left/top/right/bottom`. Every field is
/// optional so either shape deserializes; [`FaceBoxInput::normalize`] is the
/// only place that resolves them.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct FaceBoxInput {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub left: Option<f64>,
    pub top: Option<f64>,
    pub right: Option<f64>,
    pub bottom: Option<f64>,
    pub name: Option<String>,
    pub score: Option<f64>,
    pub confidence: Option<f64>,
}

/// Axis-aligned rectangle in frame pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoxRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A detected face in canonical form.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceBox {
    pub rect: BoxRect,
    pub label: String,
    /// Match score in `[0, 1]`.
    pub score: f64,
}

impl FaceBoxInput {
    /// Resolves the input into canonical `x/y/width/height` form.
    ///
    /// Precedence per field: explicit `x/y/width/height` first, then
    /// values derived from `left/top/right/bottom`, then 0. Extents are
    /// derived only when both edges are present and never go negative.
    /// `score` wins over `confidence`.
    pub fn normalize(&self) -> FaceBox {
        let x = self.x.or(self.left).unwrap_or(0.0);
        let y = self.y.or(self.top).unwrap_or(0.0);
        let width = self
            .width
            .or_else(|| span(self.left, self.right))
            .unwrap_or(0.0);
        let height = self
            .height
            .or_else(|| span(self.top, self.bottom))
            .unwrap_or(0.0);

        let score = self
            .score
            .or(self.confidence)
            .filter(|s| s.is_finite())
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);

        let label = match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => UNKNOWN_LABEL.to_string(),
        };

        FaceBox {
            rect: BoxRect {
                x: finite_or_zero(x),
                y: finite_or_zero(y),
                width: finite_or_zero(width).max(0.0),
                height: finite_or_zero(height).max(0.0),
            },
            label,
            score,
        }
    }
}

impl FaceBox {
    /// Overlay caption, e.g. `"Alice (93.0%)"`.
    pub fn label_text(&self) -> String {
        format!("{} ({:.1}%)", self.label, self.score * 100.0)
    }
}

/// Normalizes a batch of service faces.
pub fn normalize_all(inputs: &[FaceBoxInput]) -> Vec<FaceBox> {
    inputs.iter().map(FaceBoxInput::normalize).collect()
}

fn span(start: Option<f64>, end: Option<f64>) -> Option<f64> {
    Some(end? - start?)
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn parse(json: &str) -> FaceBoxInput {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_explicit_rectangle_is_kept() {
        let face = parse(r#"{"x":10,"y":10,"width":50,"height":60,"name":"Alice","score":0.93}"#)
            .normalize();
        assert_eq!(
            face.rect,
            BoxRect {
                x: 10.0,
                y: 10.0,
                width: 50.0,
                height: 60.0
            }
        );
        assert_eq!(face.label, "Alice");
        assert_relative_eq!(face.score, 0.93);
    }

    #[test]
    fn test_edges_derive_width_and_height() {
        let face = parse(r#"{"left":10,"top":10,"right":60,"bottom":70}"#).normalize();
        assert_relative_eq!(face.rect.x, 10.0);
        assert_relative_eq!(face.rect.y, 10.0);
        assert_relative_eq!(face.rect.width, 50.0);
        assert_relative_eq!(face.rect.height, 60.0);
    }

    #[test]
    fn test_explicit_fields_win_over_edges() {
        let face =
            parse(r#"{"x":1,"y":2,"width":3,"height":4,"left":100,"top":100,"right":500,"bottom":500}"#)
                .normalize();
        assert_eq!(
            face.rect,
            BoxRect {
                x: 1.0,
                y: 2.0,
                width: 3.0,
                height: 4.0
            }
        );
    }

    #[test]
    fn test_explicit_zero_is_not_treated_as_missing() {
        let face = parse(r#"{"x":0,"left":40,"width":0,"right":90}"#).normalize();
        assert_relative_eq!(face.rect.x, 0.0);
        assert_relative_eq!(face.rect.width, 0.0);
    }

    #[test]
    fn test_missing_everything_defaults_to_zero_and_unknown() {
        let face = parse("{}").normalize();
        assert_eq!(face.rect, BoxRect::default());
        assert_eq!(face.label, "Unknown");
        assert_relative_eq!(face.score, 0.0);
    }

    #[rstest]
    #[case::right_without_left(r#"{"right":60}"#, 0.0)]
    #[case::left_without_right(r#"{"left":60}"#, 0.0)]
    #[case::inverted_edges(r#"{"left":60,"right":10}"#, 0.0)]
    fn test_width_needs_both_edges(#[case] json: &str, #[case] expected: f64) {
        assert_relative_eq!(parse(json).normalize().rect.width, expected);
    }

    #[rstest]
    #[case::score_only(r#"{"score":0.5}"#, 0.5)]
    #[case::confidence_only(r#"{"confidence":0.25}"#, 0.25)]
    #[case::score_wins(r#"{"score":0.5,"confidence":0.9}"#, 0.5)]
    #[case::above_one_clamped(r#"{"score":1.7}"#, 1.0)]
    #[case::negative_clamped(r#"{"score":-0.2}"#, 0.0)]
    #[case::null_score_falls_back(r#"{"score":null,"confidence":0.4}"#, 0.4)]
    fn test_score_resolution(#[case] json: &str, #[case] expected: f64) {
        assert_relative_eq!(parse(json).normalize().score, expected);
    }

    #[rstest]
    #[case::missing("{}", "Unknown")]
    #[case::null(r#"{"name":null}"#, "Unknown")]
    #[case::empty(r#"{"name":""}"#, "Unknown")]
    #[case::present(r#"{"name":"Bob"}"#, "Bob")]
    fn test_label_resolution(#[case] json: &str, #[case] expected: &str) {
        assert_eq!(parse(json).normalize().label, expected);
    }

    #[rstest]
    #[case(0.93, "Alice (93.0%)")]
    #[case(1.0, "Alice (100.0%)")]
    #[case(0.0, "Alice (0.0%)")]
    #[case(0.12345, "Alice (12.3%)")]
    fn test_label_text(#[case] score: f64, #[case] expected: &str) {
        let face = FaceBox {
            rect: BoxRect::default(),
            label: "Alice".to_string(),
            score,
        };
        assert_eq!(face.label_text(), expected);
    }

    #[test]
    fn test_server_edge_shape_with_extra_fields() {
        let face = parse(
            r#"{"top":20,"right":120,"bottom":140,"left":40,"name":"Carol","score":0.8,"user_id":"abc"}"#,
        )
        .normalize();
        assert_relative_eq!(face.rect.x, 40.0);
        assert_relative_eq!(face.rect.y, 20.0);
        assert_relative_eq!(face.rect.width, 80.0);
        assert_relative_eq!(face.rect.height, 120.0);
        assert_eq!(face.label_text(), "Carol (80.0%)");
    }

    #[test]
    fn test_normalize_all_preserves_order() {
        let inputs = vec![
            parse(r#"{"name":"A"}"#),
            parse(r#"{"name":"B"}"#),
        ];
        let faces = normalize_all(&inputs);
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].label, "A");
        assert_eq!(faces[1].label, "B");
    }
}
