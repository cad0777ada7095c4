//! Mapping from client (pointer) coordinates to surface pixel coordinates.
//!
//! Live drawing and replay both consume points in canvas space, so the
//! mapping lives here as a pure function rather than inside the surface.

use kurbo::{Affine, Point, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Placement and resolution of the drawing surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceGeometry {
    /// Top-left corner of the surface in client coordinates.
    pub origin: Point,
    /// Size of the surface as laid out on screen (CSS pixels).
    pub display_size: Size,
    /// Backing store resolution in device pixels.
    pub pixel_size: Size,
}

impl SurfaceGeometry {
    /// Geometry for a surface displayed 1:1 at the origin.
    pub fn identity(width: u32, height: u32) -> Self {
        let size = Size::new(width as f64, height as f64);
        Self {
            origin: Point::ORIGIN,
            display_size: size,
            pixel_size: size,
        }
    }

    /// Geometry for a surface laid out at `origin` with the given device pixel ratio.
    pub fn with_pixel_ratio(origin: Point, display_size: Size, pixel_ratio: f64) -> Self {
        Self {
            origin,
            display_size,
            pixel_size: Size::new(
                (display_size.width * pixel_ratio).round(),
                (display_size.height * pixel_ratio).round(),
            ),
        }
    }

    /// Transform converting client coordinates to canvas coordinates.
    pub fn transform(&self) -> Affine {
        let sx = if self.display_size.width > 0.0 {
            self.pixel_size.width / self.display_size.width
        } else {
            1.0
        };
        let sy = if self.display_size.height > 0.0 {
            self.pixel_size.height / self.display_size.height
        } else {
            1.0
        };
        Affine::scale_non_uniform(sx, sy) * Affine::translate(-self.origin.to_vec2())
    }

    /// Track a resize or scroll of the surface element.
    pub fn relayout(&mut self, origin: Point, display_size: Size) {
        self.origin = origin;
        self.display_size = display_size;
    }

    /// Shift the surface origin (e.g. after the page scrolled).
    pub fn scroll_by(&mut self, delta: Vec2) {
        self.origin -= delta;
    }
}

/// Convert a client-space pointer position to the point stored in a draw op.
pub fn to_canvas_space(geometry: &SurfaceGeometry, client: Point) -> Point {
    geometry.transform() * client
}
