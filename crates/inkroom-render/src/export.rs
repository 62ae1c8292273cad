//! PNG export.

use crate::renderer::{RenderResult, RendererError};
use image::RgbaImage;

/// Encode an RGBA image as PNG bytes.
pub fn encode_png(image: &RgbaImage) -> RenderResult<Vec<u8>> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(RendererError::InvalidSize { width, height });
    }

    let mut png_data = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut png_data, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);

        let mut writer = encoder.write_header().map_err(|e| {
            log::error!("Failed to write PNG header: {:?}", e);
            RendererError::Encode(e.to_string())
        })?;
        writer.write_image_data(image.as_raw()).map_err(|e| {
            log::error!("Failed to write PNG data: {:?}", e);
            RendererError::Encode(e.to_string())
        })?;
    }

    Ok(png_data)
}
