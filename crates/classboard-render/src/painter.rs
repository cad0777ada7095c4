//! Freehand stroke painting shared by live drawing and replay.

use crate::raster::{Compositing, RasterCanvas};
use classboard_core::{DrawOp, Tool};
use kurbo::Point;

/// Connects consecutive ops into segments.
///
/// Live input and replay both go through this type, so a persisted op list
/// reproduces the live pixels exactly.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrokePainter {
    previous: Option<Point>,
}

impl StrokePainter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the previous point so the next op begins a new path.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    pub fn previous(&self) -> Option<Point> {
        self.previous
    }

    /// Paint one op. A start op (or the first op seen) only moves the pen.
    pub fn apply(&mut self, canvas: &mut RasterCanvas, op: &DrawOp) {
        let point = op.point();
        if let Some(previous) = self.previous.filter(|_| !op.is_start) {
            let (color, mode) = match op.tool {
                Tool::Pen => (op.color.to_rgba(), Compositing::PaintOver),
                Tool::Eraser => (canvas.background().to_rgba(), Compositing::Replace),
            };
            canvas.draw_segment(previous, point, color, op.size, mode);
        }
        self.previous = Some(point);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classboard_core::{RgbColor, StrokeStyle};

    fn op(x: f64, y: f64, style: StrokeStyle, is_start: bool) -> DrawOp {
        DrawOp::new(Point::new(x, y), style, 0, 0, is_start)
    }

    #[test]
    fn test_start_op_draws_nothing() {
        let mut canvas = RasterCanvas::blank(10, 10);
        let mut painter = StrokePainter::new();
        painter.apply(&mut canvas, &op(5.0, 5.0, StrokeStyle::pen(RgbColor::RED, 4.0), true));
        assert!(canvas.is_blank());
        assert_eq!(painter.previous(), Some(Point::new(5.0, 5.0)));
    }

    #[test]
    fn test_start_op_breaks_the_path() {
        let pen = StrokeStyle::pen(RgbColor::RED, 2.0);
        let mut canvas = RasterCanvas::blank(20, 20);
        let mut painter = StrokePainter::new();
        painter.apply(&mut canvas, &op(2.0, 2.0, pen, true));
        painter.apply(&mut canvas, &op(2.0, 18.0, pen, true));
        assert!(canvas.is_blank());

        painter.apply(&mut canvas, &op(18.0, 18.0, pen, false));
        assert_eq!(canvas.pixel(10, 17), Some([255, 0, 0, 255]));
        assert_eq!(canvas.pixel(2, 10), Some([255, 255, 255, 255]));
    }

    #[test]
    fn test_eraser_restores_background() {
        let pen = StrokeStyle::pen(RgbColor::BLACK, 6.0);
        let mut canvas = RasterCanvas::blank(20, 20);
        let mut painter = StrokePainter::new();
        painter.apply(&mut canvas, &op(0.0, 10.0, pen, true));
        painter.apply(&mut canvas, &op(20.0, 10.0, pen, false));
        assert!(!canvas.is_blank());

        let eraser = StrokeStyle::eraser(10.0);
        painter.apply(&mut canvas, &op(0.0, 10.0, eraser, true));
        painter.apply(&mut canvas, &op(20.0, 10.0, eraser, false));
        assert!(canvas.is_blank());
    }
}
