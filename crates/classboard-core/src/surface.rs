//! Contract of the live drawing surface.
//!
//! The surface is supplied by a rendering backend; the core only needs to
//! get and set its content, paint ops onto it and export it as an image.

use crate::deck::SlideContent;
use crate::op::DrawOp;
use crate::scene::{RasterSnapshot, Scene};
use thiserror::Error;

/// Errors raised while loading content onto a surface.
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("Failed to render slide content: {0}")]
    Render(String),
    #[error("Snapshot is {got_width}x{got_height}, surface is {width}x{height}")]
    SizeMismatch {
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
    },
}

/// A drawing surface holding the content of the current slide.
pub trait Surface {
    /// Pixel dimensions of the surface.
    fn dimensions(&self) -> (u32, u32);

    /// Paint one op exactly as replay would.
    fn apply_op(&mut self, op: &DrawOp);

    /// Reset to a blank background.
    fn clear(&mut self);

    /// Capture the live content for storage in the deck.
    fn capture(&self) -> SlideContent;

    /// Replace the live content with stored slide content.
    fn load(&mut self, content: &SlideContent) -> Result<(), SurfaceError>;

    /// Export the current content as an image.
    fn snapshot(&self) -> RasterSnapshot;

    /// Put a previously exported image back on the surface.
    fn restore(&mut self, snapshot: &RasterSnapshot) -> Result<(), SurfaceError>;

    /// Current content as a vector scene.
    fn scene(&self) -> Scene;

    /// Replace the current content with a vector scene.
    fn set_scene(&mut self, scene: &Scene) -> Result<(), SurfaceError> {
        self.load(&SlideContent::Scene(scene.clone()))
    }
}
