//! Renderer errors and image codecs shared by the raster backend.

use image::RgbaImage;
use thiserror::Error;

/// Renderer errors.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("Render failed: {0}")]
    RenderFailed(String),
    #[error("Image decode failed: {0}")]
    Decode(String),
    #[error("Image encode failed: {0}")]
    Encode(String),
    #[error("IO error: {0}")]
    Io(String),
}

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RendererError>;

/// Encode RGBA pixels as a PNG file.
pub fn encode_png(rgba_data: &[u8], width: u32, height: u32) -> RenderResult<Vec<u8>> {
    let mut png_data = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut png_data, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);

        let mut writer = encoder
            .write_header()
            .map_err(|e| RendererError::Encode(format!("PNG header: {}", e)))?;
        writer
            .write_image_data(rgba_data)
            .map_err(|e| RendererError::Encode(format!("PNG data: {}", e)))?;
    }
    Ok(png_data)
}

/// Decode an encoded image (PNG or JPEG) into RGBA pixels.
pub fn decode_image(bytes: &[u8]) -> RenderResult<RgbaImage> {
    image::load_from_memory(bytes)
        .map(|decoded| decoded.to_rgba8())
        .map_err(|e| RendererError::Decode(e.to_string()))
}

/// Wrap raw RGBA bytes of known size.
pub fn rgba_from_raw(width: u32, height: u32, rgba: Vec<u8>) -> RenderResult<RgbaImage> {
    let len = rgba.len();
    RgbaImage::from_raw(width, height, rgba).ok_or_else(|| {
        RendererError::Decode(format!(
            "{} bytes do not hold a {}x{} RGBA image",
            len, width, height
        ))
    })
}
