//! CPU renderer producing an RGBA image.

use crate::glyphs::{FontGlyphs, GlyphRasterizer};
use crate::raster::CoverageMask;
use crate::renderer::{to_rgba, RenderContext, Renderer};
use image::RgbaImage;
use inkroom_core::model::{Stroke, TextAnnotation};
use kurbo::{Point, Rect, Shape};

/// Renders a frame from scratch. Strokes first, then texts, each in map order.
pub fn render(ctx: &RenderContext) -> RgbaImage {
    let mut renderer = PixelRenderer::new();
    renderer.build_scene(ctx);
    renderer.take_image()
}

/// Renderer that keeps its last frame in an owned image buffer.
pub struct PixelRenderer {
    image: RgbaImage,
    glyphs: Box<dyn GlyphRasterizer>,
}

impl Default for PixelRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PixelRenderer {
    pub fn new() -> Self {
        Self::with_glyphs(Box::new(FontGlyphs::new()))
    }

    pub fn with_glyphs(glyphs: Box<dyn GlyphRasterizer>) -> Self {
        Self {
            image: RgbaImage::new(0, 0),
            glyphs,
        }
    }

    /// The last rendered frame.
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn take_image(&mut self) -> RgbaImage {
        std::mem::replace(&mut self.image, RgbaImage::new(0, 0))
    }

    fn draw_stroke(&mut self, stroke: &Stroke, scale: f64) {
        let Some(&first) = stroke.points.first() else {
            return;
        };
        let radius = stroke.width * scale / 2.0;
        let scaled = |p: Point| Point::new(p.x * scale, p.y * scale);

        let start = scaled(first);
        let bounds = stroke
            .points
            .iter()
            .fold(Rect::from_points(start, start), |r, &p| r.union_pt(scaled(p)))
            .inflate(radius + 1.0, radius + 1.0);
        let Some(mut mask) = CoverageMask::for_bounds(bounds, self.image.width(), self.image.height()) else {
            return;
        };

        if stroke.points.len() == 1 {
            mask.add_capsule(start, start, radius);
        } else {
            for pair in stroke.points.windows(2) {
                mask.add_capsule(scaled(pair[0]), scaled(pair[1]), radius);
            }
        }
        mask.composite(&mut self.image, to_rgba(stroke.color));
    }

    fn draw_text(&mut self, text: &TextAnnotation, scale: f64) {
        let origin = Point::new(text.x * scale, text.y * scale);
        let size = text.size * scale;
        let outline = self.glyphs.outline(&text.text, origin, size);
        if outline.elements().is_empty() {
            return;
        }
        let bounds = outline.bounding_box().inflate(1.0, 1.0);
        let Some(mut mask) = CoverageMask::for_bounds(bounds, self.image.width(), self.image.height()) else {
            return;
        };
        mask.fill_path(&outline);
        mask.composite(&mut self.image, to_rgba(text.color));
    }
}

impl Renderer for PixelRenderer {
    fn build_scene(&mut self, ctx: &RenderContext) {
        let background = self.background_color(ctx);
        if self.image.width() != ctx.width || self.image.height() != ctx.height {
            self.image = RgbaImage::from_pixel(ctx.width, ctx.height, background);
        } else {
            for pixel in self.image.pixels_mut() {
                *pixel = background;
            }
        }

        for stroke in ctx.model.strokes() {
            self.draw_stroke(stroke, ctx.scale_factor);
        }
        for text in ctx.model.texts() {
            self.draw_text(text, ctx.scale_factor);
        }
        log::debug!(
            "Rendered {} strokes and {} texts at {}x{}",
            ctx.model.stroke_count(),
            ctx.model.text_count(),
            ctx.width,
            ctx.height
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::TRANSPARENT;
    use image::Rgba;
    use inkroom_core::model::{CanvasModel, RgbHex, UserId};

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn stroke(id: &str, color: RgbHex, width: f64, points: &[(f64, f64)]) -> Stroke {
        let mut stroke = Stroke::begin(color, width, Point::new(points[0].0, points[0].1), UserId::new("u"));
        stroke.points = points.iter().map(|&(x, y)| Point::new(x, y)).collect();
        stroke.id = id.to_string();
        stroke
    }

    #[test]
    fn test_empty_model_is_background() {
        let model = CanvasModel::new();
        let image = render(&RenderContext::new(&model, 8, 6));
        assert_eq!(image.dimensions(), (8, 6));
        assert!(image.pixels().all(|p| *p == TRANSPARENT));

        let image = render(&RenderContext::new(&model, 4, 4).with_background(WHITE));
        assert!(image.pixels().all(|p| *p == WHITE));
    }

    #[test]
    fn test_stroke_pixels() {
        let mut model = CanvasModel::new();
        model.insert_stroke(stroke("a", RgbHex::new(255, 0, 0), 4.0, &[(5.0, 10.0), (25.0, 10.0)]));
        let image = render(&RenderContext::new(&model, 32, 20).with_background(WHITE));

        assert_eq!(*image.get_pixel(15, 10), Rgba([255, 0, 0, 255]));
        assert_eq!(*image.get_pixel(15, 2), WHITE);
        // Round cap extends past the end point.
        assert_eq!(*image.get_pixel(25, 10), Rgba([255, 0, 0, 255]));
        assert_eq!(*image.get_pixel(30, 10), WHITE);
    }

    #[test]
    fn test_single_point_is_a_dot() {
        let mut model = CanvasModel::new();
        model.insert_stroke(stroke("a", RgbHex::BLACK, 6.0, &[(10.0, 10.0)]));
        let image = render(&RenderContext::new(&model, 20, 20));

        assert_eq!(*image.get_pixel(10, 10), Rgba([0, 0, 0, 255]));
        assert_eq!(*image.get_pixel(11, 8), Rgba([0, 0, 0, 255]));
        assert_eq!(*image.get_pixel(16, 10), TRANSPARENT);
    }

    #[test]
    fn test_later_stroke_paints_over() {
        let mut model = CanvasModel::new();
        model.insert_stroke(stroke("a", RgbHex::new(255, 0, 0), 6.0, &[(0.0, 10.0), (20.0, 10.0)]));
        model.insert_stroke(stroke("b", RgbHex::new(0, 0, 255), 6.0, &[(10.0, 0.0), (10.0, 20.0)]));
        let image = render(&RenderContext::new(&model, 20, 20));
        assert_eq!(*image.get_pixel(10, 10), Rgba([0, 0, 255, 255]));
        assert_eq!(*image.get_pixel(3, 10), Rgba([255, 0, 0, 255]));
    }

    fn text_model(content: &str) -> CanvasModel {
        let mut model = CanvasModel::new();
        let mut text = TextAnnotation::new(content, Point::new(10.0, 30.0), RgbHex::new(0, 128, 0), 20.0, UserId::new("u"));
        text.id = "t".to_string();
        model.insert_text(text);
        model
    }

    #[test]
    fn test_text_pixels() {
        let image = render(&RenderContext::new(&text_model("HI"), 60, 40));

        // Left stem of the H is solid between the cap line and the baseline.
        assert_eq!(*image.get_pixel(12, 25), Rgba([0, 128, 0, 255]));
        assert_eq!(*image.get_pixel(12, 20), Rgba([0, 128, 0, 255]));
        // Nothing below the baseline or above the cap height.
        assert!((0..60).all(|x| image.get_pixel(x, 31).0[3] == 0));
        assert!((0..60).all(|x| image.get_pixel(x, 12).0[3] == 0));
        // Nothing left of the anchor.
        assert!((0..40).all(|y| image.get_pixel(9, y).0[3] == 0));
    }

    #[test]
    fn test_different_text_different_pixels() {
        let hi = render(&RenderContext::new(&text_model("HI"), 60, 40));
        let ok = render(&RenderContext::new(&text_model("OK"), 60, 40));
        assert_ne!(hi, ok);
        assert!(ok.pixels().any(|p| p.0[3] > 0));
    }

    #[test]
    fn test_scale_factor() {
        let mut model = CanvasModel::new();
        model.insert_stroke(stroke("a", RgbHex::BLACK, 2.0, &[(5.0, 5.0), (15.0, 5.0)]));
        let image = render(&RenderContext::new(&model, 40, 20).with_scale_factor(2.0));
        assert_eq!(*image.get_pixel(20, 10), Rgba([0, 0, 0, 255]));
        assert_eq!(*image.get_pixel(10, 5), TRANSPARENT);
    }

    #[test]
    fn test_renderer_reuses_buffer() {
        let mut model = CanvasModel::new();
        model.insert_stroke(stroke("a", RgbHex::BLACK, 4.0, &[(2.0, 2.0), (8.0, 2.0)]));
        let mut renderer = PixelRenderer::new();
        renderer.build_scene(&RenderContext::new(&model, 10, 10));
        assert_eq!(*renderer.image().get_pixel(5, 2), Rgba([0, 0, 0, 255]));

        model.remove_stroke("a");
        renderer.build_scene(&RenderContext::new(&model, 10, 10));
        assert!(renderer.image().pixels().all(|p| *p == TRANSPARENT));
    }
}
