//! Classboard Render Library
//!
//! CPU raster backend for the whiteboard: the live drawing surface, the
//! replay engine that rebuilds slides from persisted ops, and deck export.

mod painter;
mod pdf;
mod raster;
mod renderer;
mod replay;
mod surface;

pub mod export;

pub use export::{ExportComposer, ExportError, MultiPageDocument, Page};
pub use painter::StrokePainter;
pub use raster::{Compositing, RasterCanvas};
pub use renderer::{RenderResult, RendererError, decode_image, encode_png};
pub use replay::ReplayEngine;
pub use surface::{CaptureMode, RasterSurface};
