//! Text layout and glyph outlines.
//!
//! Text is shaped with parley against a bundled font, then each positioned
//! glyph's outline is read with skrifa and appended to one path in pixel
//! space. The renderer fills that path into a coverage mask.

use kurbo::{BezPath, Point, Vec2};
use parley::fontique::Blob;
use parley::{
    Alignment, AlignmentOptions, FontContext, FontFamily, FontStack, Layout, LayoutContext, PositionedLayoutItem,
    StyleProperty,
};
use skrifa::instance::{LocationRef, Size};
use skrifa::outline::{DrawSettings, OutlinePen};
use skrifa::{FontRef, GlyphId, MetadataProvider};
use std::sync::Arc;

static DEJAVU_SANS: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");
const DEJAVU_SANS_FAMILY: &str = "DejaVu Sans";

/// Turns text into glyph outlines.
pub trait GlyphRasterizer: Send + Sync {
    /// Outlines of `text` in pixel coordinates, with the alphabetic baseline
    /// of the first line starting at `origin`. `size` is the font size in
    /// pixels. Empty when nothing is visible.
    fn outline(&mut self, text: &str, origin: Point, size: f64) -> BezPath;

    /// Width of the laid out `text` in pixels.
    fn measure(&mut self, text: &str, size: f64) -> f64;
}

/// Parley layout over a single registered font family.
pub struct FontGlyphs {
    font_cx: FontContext,
    layout_cx: LayoutContext<()>,
    family: String,
}

impl Default for FontGlyphs {
    fn default() -> Self {
        Self::new()
    }
}

impl FontGlyphs {
    /// Glyphs from the bundled DejaVu Sans.
    pub fn new() -> Self {
        Self::with_font(DEJAVU_SANS, DEJAVU_SANS_FAMILY)
    }

    /// Glyphs from the font file `data`, looked up by its `family` name.
    pub fn with_font(data: &'static [u8], family: &str) -> Self {
        let mut font_cx = FontContext::new();
        let registered = font_cx.collection.register_fonts(Blob::new(Arc::new(data)), None);
        if registered.is_empty() {
            log::warn!("No fonts found in data for family '{}'", family);
        }
        Self {
            font_cx,
            layout_cx: LayoutContext::new(),
            family: family.to_string(),
        }
    }

    fn layout(&mut self, text: &str, size: f64) -> Layout<()> {
        let mut builder = self.layout_cx.ranged_builder(&mut self.font_cx, text, 1.0, false);
        builder.push_default(StyleProperty::FontSize(size as f32));
        builder.push_default(StyleProperty::FontStack(FontStack::Single(FontFamily::Named(
            self.family.clone().into(),
        ))));
        let mut layout = builder.build(text);
        layout.break_all_lines(None);
        layout.align(None, Alignment::Start, AlignmentOptions::default());
        layout
    }
}

impl GlyphRasterizer for FontGlyphs {
    fn outline(&mut self, text: &str, origin: Point, size: f64) -> BezPath {
        let mut path = BezPath::new();
        if text.trim().is_empty() || size <= 0.0 {
            return path;
        }
        let layout = self.layout(text, size);
        let Some(first_baseline) = layout.lines().next().map(|line| line.metrics().baseline) else {
            return path;
        };
        // Layout y grows down from the top of the first line.
        let top = origin.y - first_baseline as f64;

        for line in layout.lines() {
            for item in line.items() {
                let PositionedLayoutItem::GlyphRun(glyph_run) = item else {
                    continue;
                };
                let run = glyph_run.run();
                let font = run.font();
                let font_ref = match FontRef::from_index(font.data.data(), font.index) {
                    Ok(font_ref) => font_ref,
                    Err(e) => {
                        log::warn!("Unreadable font in layout: {}", e);
                        continue;
                    }
                };
                let outlines = font_ref.outline_glyphs();
                let font_size = Size::new(run.font_size());

                let mut x = glyph_run.offset();
                let y = glyph_run.baseline();
                for glyph in glyph_run.glyphs() {
                    let position = Vec2::new(origin.x + (x + glyph.x) as f64, top + (y - glyph.y) as f64);
                    x += glyph.advance;
                    let Some(outline) = outlines.get(GlyphId::new(glyph.id.into())) else {
                        continue;
                    };
                    let mut pen = PathPen {
                        path: &mut path,
                        position,
                    };
                    if let Err(e) = outline.draw(DrawSettings::unhinted(font_size, LocationRef::default()), &mut pen) {
                        log::debug!("Skipping glyph {}: {}", glyph.id, e);
                    }
                }
            }
        }
        path
    }

    fn measure(&mut self, text: &str, size: f64) -> f64 {
        if text.is_empty() || size <= 0.0 {
            return 0.0;
        }
        self.layout(text, size).width() as f64
    }
}

/// Appends outlines to a path, flipping font y-up into pixel y-down.
struct PathPen<'a> {
    path: &'a mut BezPath,
    position: Vec2,
}

impl PathPen<'_> {
    fn point(&self, x: f32, y: f32) -> Point {
        Point::new(self.position.x + x as f64, self.position.y - y as f64)
    }
}

impl OutlinePen for PathPen<'_> {
    fn move_to(&mut self, x: f32, y: f32) {
        let p = self.point(x, y);
        self.path.move_to(p);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let p = self.point(x, y);
        self.path.line_to(p);
    }

    fn quad_to(&mut self, cx0: f32, cy0: f32, x: f32, y: f32) {
        let (c, p) = (self.point(cx0, cy0), self.point(x, y));
        self.path.quad_to(c, p);
    }

    fn curve_to(&mut self, cx0: f32, cy0: f32, cx1: f32, cy1: f32, x: f32, y: f32) {
        let (c0, c1, p) = (self.point(cx0, cy0), self.point(cx1, cy1), self.point(x, y));
        self.path.curve_to(c0, c1, p);
    }

    fn close(&mut self) {
        self.path.close_path();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Shape;

    #[test]
    fn test_measure_grows_with_text() {
        let mut glyphs = FontGlyphs::new();
        let one = glyphs.measure("H", 20.0);
        let two = glyphs.measure("HH", 20.0);
        assert!(one > 5.0, "width of H was {}", one);
        assert!((two - 2.0 * one).abs() < 0.5);
        assert_eq!(glyphs.measure("", 20.0), 0.0);
    }

    #[test]
    fn test_outline_sits_on_baseline() {
        let mut glyphs = FontGlyphs::new();
        let path = glyphs.outline("H", Point::new(10.0, 30.0), 20.0);
        let bounds = path.bounding_box();
        // Cap height of DejaVu Sans is about 0.73 em.
        assert!((bounds.y1 - 30.0).abs() < 0.5, "bottom {}", bounds.y1);
        assert!(bounds.y0 > 13.0 && bounds.y0 < 17.0, "top {}", bounds.y0);
        assert!(bounds.x0 >= 10.0 && bounds.x1 < 30.0);
    }

    #[test]
    fn test_descender_below_baseline() {
        let mut glyphs = FontGlyphs::new();
        let bounds = glyphs.outline("y", Point::new(0.0, 30.0), 20.0).bounding_box();
        assert!(bounds.y1 > 32.0, "bottom {}", bounds.y1);
    }

    #[test]
    fn test_whitespace_has_no_outline() {
        let mut glyphs = FontGlyphs::new();
        assert!(glyphs.outline("   ", Point::new(0.0, 30.0), 20.0).elements().is_empty());
        assert!(glyphs.outline("", Point::new(0.0, 30.0), 20.0).elements().is_empty());
    }

    #[test]
    fn test_different_text_different_outline() {
        let mut glyphs = FontGlyphs::new();
        let hi = glyphs.outline("HI", Point::new(0.0, 30.0), 20.0);
        let ok = glyphs.outline("OK", Point::new(0.0, 30.0), 20.0);
        assert_ne!(hi.elements(), ok.elements());
        // O is drawn with curves, H and I are straight lines only.
        let curved = |path: &BezPath| {
            path.elements()
                .iter()
                .any(|el| matches!(el, kurbo::PathEl::QuadTo(..) | kurbo::PathEl::CurveTo(..)))
        };
        assert!(!curved(&hi));
        assert!(curved(&ok));
    }
}
