//! Renderer trait abstraction.

use image::Rgba;
use inkroom_core::model::{CanvasModel, RgbHex};
use thiserror::Error;

/// Renderer errors.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("Invalid surface size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("PNG encoding failed: {0}")]
    Encode(String),
}

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RendererError>;

/// Fully transparent, matching a cleared canvas.
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Opaque pixel color for a model color.
pub fn to_rgba(color: RgbHex) -> Rgba<u8> {
    Rgba([color.r, color.g, color.b, 255])
}

/// Context for a single render frame.
pub struct RenderContext<'a> {
    /// The model to render.
    pub model: &'a CanvasModel,
    /// Output size in physical pixels.
    pub width: u32,
    pub height: u32,
    /// Physical pixels per canvas unit.
    pub scale_factor: f64,
    /// Background fill.
    pub background_color: Rgba<u8>,
}

impl<'a> RenderContext<'a> {
    /// Create a new render context with a transparent background.
    pub fn new(model: &'a CanvasModel, width: u32, height: u32) -> Self {
        Self {
            model,
            width,
            height,
            scale_factor: 1.0,
            background_color: TRANSPARENT,
        }
    }

    /// Set the scale factor for HiDPI.
    pub fn with_scale_factor(mut self, scale_factor: f64) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    /// Set the background color.
    pub fn with_background(mut self, color: Rgba<u8>) -> Self {
        self.background_color = color;
        self
    }
}

/// Trait for rendering backends.
pub trait Renderer: Send + Sync {
    /// Draw a full frame: clear, then every stroke, then every text.
    fn build_scene(&mut self, ctx: &RenderContext);

    /// Get the background color (for clearing).
    fn background_color(&self, ctx: &RenderContext) -> Rgba<u8> {
        ctx.background_color
    }
}
