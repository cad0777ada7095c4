//! Replay engine: materializes slides from persisted ops or scenes.

use crate::painter::StrokePainter;
use crate::raster::{Compositing, RasterCanvas};
use crate::renderer::{RenderResult, RendererError, decode_image, rgba_from_raw};
use classboard_core::scene::{FileData, RAW_RGBA_MIME};
use classboard_core::{DrawOp, Element, RgbColor, Scene, SlideContent, SlideIndex, Tool};
use image::RgbaImage;
use kurbo::Rect;

/// Renders slide content onto fresh canvases of a fixed size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayEngine {
    width: u32,
    height: u32,
    background: RgbColor,
}

impl ReplayEngine {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            background: RgbColor::WHITE,
        }
    }

    pub fn with_background(mut self, background: RgbColor) -> Self {
        self.background = background;
        self
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn background(&self) -> RgbColor {
        self.background
    }

    pub fn blank(&self) -> RasterCanvas {
        RasterCanvas::new(self.width, self.height, self.background)
    }

    /// Rebuild one slide from a flat, persisted op list.
    ///
    /// Ops for other slides are skipped; the remaining ops are painted in
    /// the given order. A slide with no ops yields a blank canvas.
    pub fn replay(&self, ops: &[DrawOp], slide: SlideIndex) -> RasterCanvas {
        let mut canvas = self.blank();
        let mut painter = StrokePainter::new();
        let mut painted = 0usize;
        for op in ops.iter().filter(|op| op.slide == slide) {
            painter.apply(&mut canvas, op);
            painted += 1;
        }
        log::debug!("Replayed {} of {} ops onto slide {}", painted, ops.len(), slide);
        canvas
    }

    /// Paint every op in order, regardless of its slide tag.
    pub fn render_ops(&self, ops: &[DrawOp]) -> RasterCanvas {
        let mut canvas = self.blank();
        let mut painter = StrokePainter::new();
        for op in ops {
            painter.apply(&mut canvas, op);
        }
        canvas
    }

    /// Render a vector scene. Image elements must resolve to a file.
    pub fn render_scene(&self, scene: &Scene) -> RenderResult<RasterCanvas> {
        let mut canvas = self.blank();
        for element in &scene.elements {
            match element {
                Element::Stroke {
                    tool,
                    color,
                    size,
                    points,
                    ..
                } => {
                    let (rgba, mode) = match tool {
                        Tool::Pen => (color.to_rgba(), Compositing::PaintOver),
                        Tool::Eraser => (canvas.background().to_rgba(), Compositing::Replace),
                    };
                    for pair in points.windows(2) {
                        canvas.draw_segment(pair[0], pair[1], rgba, *size, mode);
                    }
                }
                Element::Image {
                    file_id,
                    x,
                    y,
                    width,
                    height,
                    ..
                } => {
                    let file = scene.files.get(file_id).ok_or_else(|| {
                        RendererError::RenderFailed(format!("missing file {}", file_id))
                    })?;
                    let image = decode_file(file)?;
                    canvas.draw_image(&image, Rect::new(*x, *y, x + width, y + height));
                }
            }
        }
        Ok(canvas)
    }

    /// Render stored slide content.
    ///
    /// Raster content keeps its own pixel size; other content is rendered at
    /// the engine's size.
    pub fn render_content(&self, content: &SlideContent) -> RenderResult<RasterCanvas> {
        match content {
            SlideContent::Ops(ops) => Ok(self.render_ops(ops)),
            SlideContent::Scene(scene) => self.render_scene(scene),
            SlideContent::Raster(snapshot) => RasterCanvas::from_snapshot(snapshot, self.background),
        }
    }
}

fn decode_file(file: &FileData) -> RenderResult<RgbaImage> {
    if file.mime_type == RAW_RGBA_MIME {
        let (width, height) = file.dimensions.ok_or_else(|| {
            RendererError::Decode("raw RGBA file without dimensions".to_string())
        })?;
        rgba_from_raw(width, height, file.data.clone())
    } else {
        decode_image(&file.data)
    }
}
