//! Eraser hit-testing against strokes and texts.

use crate::config::CanvasConfig;
use crate::model::{CanvasModel, RecordId, Stroke, TextAnnotation};
use kurbo::Point;

/// Erase radius around `point` for a stroke: the larger of the eraser radius
/// and the stroke's own width scaled by `width_factor`.
pub fn stroke_threshold(stroke: &Stroke, eraser_radius: f64, width_factor: f64) -> f64 {
    eraser_radius.max(stroke.width * width_factor)
}

/// True if any recorded point of `stroke` lies strictly within the threshold.
/// Segments between points are not considered.
pub fn stroke_hit(stroke: &Stroke, point: Point, eraser_radius: f64, width_factor: f64) -> bool {
    let threshold = stroke_threshold(stroke, eraser_radius, width_factor);
    stroke.points.iter().any(|p| p.distance(point) < threshold)
}

/// True if the text's anchor lies strictly within `radius`.
pub fn text_hit(text: &TextAnnotation, point: Point, radius: f64) -> bool {
    text.anchor().distance(point) < radius
}

/// What one eraser sample removes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EraseTargets {
    /// Every stroke hit.
    pub strokes: Vec<RecordId>,
    /// At most one text, the first hit in iteration order.
    pub text: Option<RecordId>,
}

impl EraseTargets {
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty() && self.text.is_none()
    }
}

/// Find what an eraser at `point` with the current `width` removes.
pub fn erase_targets(model: &CanvasModel, point: Point, width: f64, config: &CanvasConfig) -> EraseTargets {
    let eraser_radius = config.eraser_radius(width);
    let strokes = model
        .strokes()
        .filter(|s| stroke_hit(s, point, eraser_radius, config.stroke_hit_width_factor))
        .map(|s| s.id.clone())
        .collect();
    let text = model
        .texts()
        .find(|t| text_hit(t, point, config.text_erase_radius))
        .map(|t| t.id.clone());
    EraseTargets { strokes, text }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RgbHex, UserId};

    fn stroke(id: &str, width: f64, points: &[(f64, f64)]) -> Stroke {
        Stroke {
            id: id.to_string(),
            color: RgbHex::BLACK,
            width,
            points: points.iter().map(|&(x, y)| Point::new(x, y)).collect(),
            user_id: UserId::new("u"),
            timestamp: 0,
        }
    }

    fn text(id: &str, x: f64, y: f64) -> TextAnnotation {
        let mut t = TextAnnotation::new(id, Point::new(x, y), RgbHex::BLACK, 15.0, UserId::new("u"));
        t.id = id.to_string();
        t
    }

    #[test]
    fn test_threshold_uses_larger_radius() {
        let thin = stroke("a", 3.0, &[(0.0, 0.0)]);
        let thick = stroke("b", 10.0, &[(0.0, 0.0)]);
        assert_eq!(stroke_threshold(&thin, 9.0, 2.0), 9.0);
        assert_eq!(stroke_threshold(&thick, 9.0, 2.0), 20.0);
    }

    #[test]
    fn test_stroke_hit_is_strict() {
        let s = stroke("a", 3.0, &[(0.0, 0.0)]);
        assert!(stroke_hit(&s, Point::new(8.9, 0.0), 9.0, 2.0));
        assert!(!stroke_hit(&s, Point::new(9.0, 0.0), 9.0, 2.0));
    }

    #[test]
    fn test_stroke_hit_ignores_segments() {
        // Eraser sits on the segment midpoint but far from both recorded points.
        let s = stroke("a", 3.0, &[(0.0, 0.0), (100.0, 0.0)]);
        assert!(!stroke_hit(&s, Point::new(50.0, 0.0), 9.0, 2.0));
    }

    #[test]
    fn test_erase_targets_one_text_many_strokes() {
        let mut model = CanvasModel::new();
        model.insert_stroke(stroke("s1", 3.0, &[(10.0, 10.0)]));
        model.insert_stroke(stroke("s2", 3.0, &[(12.0, 10.0)]));
        model.insert_stroke(stroke("s3", 3.0, &[(300.0, 300.0)]));
        model.insert_text(text("t1", 20.0, 10.0));
        model.insert_text(text("t2", 25.0, 10.0));

        let targets = erase_targets(&model, Point::new(10.0, 10.0), 3.0, &CanvasConfig::default());
        assert_eq!(targets.strokes, vec!["s1".to_string(), "s2".to_string()]);
        assert_eq!(targets.text, Some("t1".to_string()));
    }

    #[test]
    fn test_text_radius_boundary() {
        let t = text("t", 0.0, 0.0);
        assert!(text_hit(&t, Point::new(49.9, 0.0), 50.0));
        assert!(!text_hit(&t, Point::new(50.0, 0.0), 50.0));
    }
}
