//! A render target wired to a session's redraw notifications.

use crate::pixel::PixelRenderer;
use crate::renderer::{RenderContext, Renderer, TRANSPARENT};
use image::{Rgba, RgbaImage};
use inkroom_core::model::CanvasModel;
use std::cell::RefCell;
use std::rc::Rc;

/// Owns a renderer plus the output size, and counts frames drawn.
pub struct CanvasSurface {
    renderer: PixelRenderer,
    width: u32,
    height: u32,
    scale_factor: f64,
    background: Rgba<u8>,
    frames: u64,
}

impl CanvasSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            renderer: PixelRenderer::new(),
            width,
            height,
            scale_factor: 1.0,
            background: TRANSPARENT,
            frames: 0,
        }
    }

    pub fn with_scale_factor(mut self, scale_factor: f64) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    pub fn with_background(mut self, color: Rgba<u8>) -> Self {
        self.background = color;
        self
    }

    /// Re-render the whole model.
    pub fn redraw(&mut self, model: &CanvasModel) {
        let ctx = RenderContext::new(model, self.width, self.height)
            .with_scale_factor(self.scale_factor)
            .with_background(self.background);
        self.renderer.build_scene(&ctx);
        self.frames += 1;
    }

    pub fn image(&self) -> &RgbaImage {
        self.renderer.image()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Callback for `CanvasSession::on_redraw` that redraws this surface.
    pub fn redraw_callback(surface: &Rc<RefCell<Self>>) -> impl FnMut(&CanvasModel) + 'static {
        let surface = Rc::clone(surface);
        move |model| surface.borrow_mut().redraw(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkroom_core::model::{RgbHex, Stroke, UserId};
    use inkroom_core::{CanvasConfig, CanvasSession, CurrentUser, MemoryStore, RoomId};
    use kurbo::Point;
    use std::sync::Arc;

    #[test]
    fn test_redraw_counts_frames() {
        let mut surface = CanvasSurface::new(10, 10);
        let mut model = CanvasModel::new();
        surface.redraw(&model);
        assert_eq!(surface.frames(), 1);
        assert_eq!(*surface.image().get_pixel(5, 5), TRANSPARENT);

        let mut stroke = Stroke::begin(RgbHex::BLACK, 4.0, Point::new(5.0, 5.0), UserId::new("u"));
        stroke.id = "s".to_string();
        model.insert_stroke(stroke);
        surface.redraw(&model);
        assert_eq!(surface.frames(), 2);
        assert_eq!(*surface.image().get_pixel(5, 5), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_session_drives_surface() {
        let store = MemoryStore::new();
        let room = RoomId::parse("123456").unwrap();
        let mut session = CanvasSession::open(
            Arc::new(store),
            room,
            CurrentUser::new("u1", "u1@example.com"),
            CanvasConfig::default(),
        );
        let surface = Rc::new(RefCell::new(
            CanvasSurface::new(40, 40).with_background(Rgba([255, 255, 255, 255])),
        ));
        session.on_redraw(CanvasSurface::redraw_callback(&surface));

        session.pointer_down(Point::new(10.0, 20.0));
        session.pointer_move(Point::new(30.0, 20.0));
        session.pointer_up();
        session.pump();

        let surface = surface.borrow();
        assert!(surface.frames() >= 2);
        assert_eq!(*surface.image().get_pixel(20, 20), Rgba([0, 0, 0, 255]));
        assert_eq!(*surface.image().get_pixel(20, 5), Rgba([255, 255, 255, 255]));
    }
}
