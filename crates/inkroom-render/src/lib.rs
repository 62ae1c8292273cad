//! Inkroom Render Library
//!
//! Turns a `CanvasModel` into pixels. The built-in renderer rasterizes on
//! the CPU into an RGBA image that can be exported as PNG.

mod export;
mod glyphs;
mod pixel;
pub mod raster;
mod renderer;
mod surface;

pub use export::encode_png;
pub use glyphs::{FontGlyphs, GlyphRasterizer};
pub use pixel::{render, PixelRenderer};
pub use renderer::{to_rgba, RenderContext, RenderResult, Renderer, RendererError, TRANSPARENT};
pub use surface::CanvasSurface;
