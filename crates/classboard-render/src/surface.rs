//! Raster implementation of the live drawing surface.

use crate::painter::StrokePainter;
use crate::raster::RasterCanvas;
use crate::replay::ReplayEngine;
use classboard_core::{
    DrawOp, RasterSnapshot, RgbColor, Scene, SlideContent, Surface, SurfaceError,
};

/// What the surface hands to the slide store when a slide is saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// Raster snapshot of the live pixels (incremental strategy).
    #[default]
    Raster,
    /// Vector scene mirrored from the applied ops (full-snapshot strategy).
    Scene,
}

/// A drawing surface backed by a [`RasterCanvas`].
///
/// Every op is painted onto the canvas and mirrored into a vector scene, so
/// the surface can serve both sync strategies.
#[derive(Debug, Clone)]
pub struct RasterSurface {
    engine: ReplayEngine,
    canvas: RasterCanvas,
    painter: StrokePainter,
    scene: Scene,
    mode: CaptureMode,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_engine(ReplayEngine::new(width, height))
    }

    pub fn with_engine(engine: ReplayEngine) -> Self {
        Self {
            canvas: engine.blank(),
            engine,
            painter: StrokePainter::new(),
            scene: Scene::new(),
            mode: CaptureMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: CaptureMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn engine(&self) -> &ReplayEngine {
        &self.engine
    }

    pub fn canvas(&self) -> &RasterCanvas {
        &self.canvas
    }

    pub fn background(&self) -> RgbColor {
        self.canvas.background()
    }

    fn replace(&mut self, canvas: RasterCanvas, scene: Scene) {
        self.canvas = canvas;
        self.scene = scene;
        self.painter.reset();
    }
}

impl Surface for RasterSurface {
    fn dimensions(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    fn apply_op(&mut self, op: &DrawOp) {
        self.painter.apply(&mut self.canvas, op);
        self.scene.apply_op(op);
    }

    fn clear(&mut self) {
        self.canvas.clear();
        self.scene.clear();
        self.painter.reset();
    }

    fn capture(&self) -> SlideContent {
        match self.mode {
            CaptureMode::Raster => SlideContent::Raster(self.canvas.to_snapshot()),
            CaptureMode::Scene => SlideContent::Scene(self.scene.clone()),
        }
    }

    fn load(&mut self, content: &SlideContent) -> Result<(), SurfaceError> {
        match content {
            SlideContent::Raster(snapshot) => self.restore(snapshot),
            SlideContent::Ops(ops) => {
                let canvas = self.engine.render_ops(ops);
                self.replace(canvas, Scene::from_ops(ops));
                Ok(())
            }
            SlideContent::Scene(scene) => {
                let canvas = self
                    .engine
                    .render_scene(scene)
                    .map_err(|e| SurfaceError::Render(e.to_string()))?;
                self.replace(canvas, scene.clone());
                Ok(())
            }
        }
    }

    fn snapshot(&self) -> RasterSnapshot {
        self.canvas.to_snapshot()
    }

    fn restore(&mut self, snapshot: &RasterSnapshot) -> Result<(), SurfaceError> {
        let (width, height) = self.canvas.dimensions();
        if (snapshot.width, snapshot.height) != (width, height) {
            return Err(SurfaceError::SizeMismatch {
                width,
                height,
                got_width: snapshot.width,
                got_height: snapshot.height,
            });
        }
        let canvas = RasterCanvas::from_snapshot(snapshot, self.canvas.background())
            .map_err(|e| SurfaceError::Render(e.to_string()))?;
        self.replace(canvas, Scene::from_raster(snapshot));
        Ok(())
    }

    fn scene(&self) -> Scene {
        self.scene.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classboard_core::{SlideDeck, StrokeStyle};
    use kurbo::Point;

    fn stroke(slide: usize) -> [DrawOp; 2] {
        let pen = StrokeStyle::pen(RgbColor::RED, 2.0);
        [
            DrawOp::new(Point::new(1.0, 4.0), pen, slide, 0, true),
            DrawOp::new(Point::new(9.0, 4.0), pen, slide, 1, false),
        ]
    }

    #[test]
    fn test_live_drawing_matches_replay() {
        let mut surface = RasterSurface::new(10, 10);
        for op in &stroke(0) {
            surface.apply_op(op);
        }
        assert_eq!(surface.canvas(), &surface.engine().replay(&stroke(0), 0));
        assert_eq!(surface.scene().len(), 1);
    }

    #[test]
    fn test_raster_capture_roundtrip() {
        let mut surface = RasterSurface::new(10, 10);
        for op in &stroke(0) {
            surface.apply_op(op);
        }
        let captured = surface.capture();
        assert!(matches!(captured, SlideContent::Raster(_)));

        let before = surface.canvas().clone();
        surface.clear();
        assert!(surface.canvas().is_blank());
        surface.load(&captured).unwrap();
        assert_eq!(surface.canvas(), &before);
    }

    #[test]
    fn test_scene_capture_mode() {
        let mut surface = RasterSurface::new(10, 10).with_mode(CaptureMode::Scene);
        for op in &stroke(0) {
            surface.apply_op(op);
        }
        let SlideContent::Scene(scene) = surface.capture() else {
            panic!("expected a scene");
        };
        assert_eq!(scene.len(), 1);

        let mut other = RasterSurface::new(10, 10);
        other.set_scene(&scene).unwrap();
        assert_eq!(other.canvas(), surface.canvas());
    }

    #[test]
    fn test_restore_rejects_wrong_size() {
        let mut surface = RasterSurface::new(10, 10);
        let result = surface.restore(&RasterSnapshot::filled(5, 5, RgbColor::WHITE));
        assert!(matches!(result, Err(SurfaceError::SizeMismatch { got_width: 5, .. })));
    }

    #[test]
    fn test_deck_navigation_keeps_slides() {
        let mut surface = RasterSurface::new(10, 10);
        let mut deck = SlideDeck::new();
        for op in &stroke(0) {
            surface.apply_op(op);
        }
        let drawn = surface.canvas().clone();

        deck.add_slide(&mut surface).unwrap();
        assert!(surface.canvas().is_blank());

        deck.goto_slide(0, &mut surface).unwrap();
        assert_eq!(surface.canvas(), &drawn);
    }
}
