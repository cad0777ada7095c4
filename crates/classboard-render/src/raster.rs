//! CPU raster canvas that strokes and images are painted onto.

use crate::renderer::{RenderResult, RendererError, encode_png, rgba_from_raw};
use classboard_core::{RasterSnapshot, RgbColor};
use image::{Rgba, RgbaImage};
use kurbo::{Point, Rect, Vec2};

/// How a painted pixel combines with the pixel already on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compositing {
    /// Source-over alpha blending (pen).
    PaintOver,
    /// Overwrite the destination (eraser).
    Replace,
}

/// An opaque RGBA raster with a background colour.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterCanvas {
    image: RgbaImage,
    background: RgbColor,
}

impl RasterCanvas {
    /// A canvas of the given size filled with `background`.
    pub fn new(width: u32, height: u32, background: RgbColor) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, Rgba(background.to_rgba())),
            background,
        }
    }

    /// A white canvas.
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(width, height, RgbColor::WHITE)
    }

    /// Canvas holding a copy of a snapshot's pixels.
    pub fn from_snapshot(snapshot: &RasterSnapshot, background: RgbColor) -> RenderResult<Self> {
        let image = rgba_from_raw(snapshot.width, snapshot.height, snapshot.rgba.clone())?;
        Ok(Self { image, background })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn background(&self) -> RgbColor {
        self.background
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Pixel at (x, y), or `None` outside the canvas.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        (x < self.width() && y < self.height()).then(|| self.image.get_pixel(x, y).0)
    }

    /// Reset every pixel to the background.
    pub fn clear(&mut self) {
        let fill = Rgba(self.background.to_rgba());
        for pixel in self.image.pixels_mut() {
            *pixel = fill;
        }
    }

    /// Whether no pixel differs from the background.
    pub fn is_blank(&self) -> bool {
        let fill = Rgba(self.background.to_rgba());
        self.image.pixels().all(|p| *p == fill)
    }

    pub fn to_snapshot(&self) -> RasterSnapshot {
        RasterSnapshot {
            width: self.width(),
            height: self.height(),
            rgba: self.image.as_raw().clone(),
        }
    }

    /// Replace the pixels with a snapshot of the same size.
    pub fn restore(&mut self, snapshot: &RasterSnapshot) -> RenderResult<()> {
        if (snapshot.width, snapshot.height) != self.dimensions() {
            return Err(RendererError::RenderFailed(format!(
                "snapshot is {}x{}, canvas is {}x{}",
                snapshot.width,
                snapshot.height,
                self.width(),
                self.height()
            )));
        }
        self.image = rgba_from_raw(snapshot.width, snapshot.height, snapshot.rgba.clone())?;
        Ok(())
    }

    /// Paint a round-capped segment of diameter `size`.
    ///
    /// A pixel is covered when its centre lies within `size / 2` of the
    /// segment, so the result depends only on the endpoints and the size.
    pub fn draw_segment(
        &mut self,
        from: Point,
        to: Point,
        color: [u8; 4],
        size: f64,
        mode: Compositing,
    ) {
        let radius = (size / 2.0).max(0.5);
        let bounds = Rect::from_points(from, to).inflate(radius, radius);
        let Some((x0, y0, x1, y1)) = self.clip(bounds) else {
            return;
        };

        let radius_sq = radius * radius;
        for y in y0..y1 {
            for x in x0..x1 {
                let center = Point::new(x as f64 + 0.5, y as f64 + 0.5);
                if distance_sq_to_segment(center, from, to) <= radius_sq {
                    self.put(x, y, color, mode);
                }
            }
        }
    }

    /// Paint an image scaled into `dest` (nearest-neighbour sampling).
    pub fn draw_image(&mut self, source: &RgbaImage, dest: Rect) {
        let (src_w, src_h) = source.dimensions();
        if src_w == 0 || src_h == 0 || dest.width() <= 0.0 || dest.height() <= 0.0 {
            return;
        }
        let Some((x0, y0, x1, y1)) = self.clip(dest) else {
            return;
        };

        let scale_x = src_w as f64 / dest.width();
        let scale_y = src_h as f64 / dest.height();
        for y in y0..y1 {
            let sy = ((y as f64 + 0.5 - dest.y0) * scale_y).floor();
            if sy < 0.0 || sy >= src_h as f64 {
                continue;
            }
            for x in x0..x1 {
                let sx = ((x as f64 + 0.5 - dest.x0) * scale_x).floor();
                if sx < 0.0 || sx >= src_w as f64 {
                    continue;
                }
                let color = source.get_pixel(sx as u32, sy as u32).0;
                self.put(x, y, color, Compositing::PaintOver);
            }
        }
    }

    pub fn encode_png(&self) -> RenderResult<Vec<u8>> {
        encode_png(self.image.as_raw(), self.width(), self.height())
    }

    /// Integer pixel range covered by `rect`, clipped to the canvas.
    fn clip(&self, rect: Rect) -> Option<(u32, u32, u32, u32)> {
        let x0 = rect.x0.floor().max(0.0);
        let y0 = rect.y0.floor().max(0.0);
        let x1 = rect.x1.ceil().min(self.width() as f64);
        let y1 = rect.y1.ceil().min(self.height() as f64);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }

    fn put(&mut self, x: u32, y: u32, color: [u8; 4], mode: Compositing) {
        let dst = self.image.get_pixel_mut(x, y);
        dst.0 = match mode {
            Compositing::Replace => color,
            Compositing::PaintOver => blend_over(color, dst.0),
        };
    }
}

/// Source-over blend of straight-alpha RGBA.
fn blend_over(src: [u8; 4], dst: [u8; 4]) -> [u8; 4] {
    match src[3] {
        255 => src,
        0 => dst,
        alpha => {
            let a = alpha as u32;
            let mix = |s: u8, d: u8| ((s as u32 * a + d as u32 * (255 - a) + 127) / 255) as u8;
            let out_a = a + dst[3] as u32 * (255 - a) / 255;
            [
                mix(src[0], dst[0]),
                mix(src[1], dst[1]),
                mix(src[2], dst[2]),
                out_a.min(255) as u8,
            ]
        }
    }
}

fn distance_sq_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let ab: Vec2 = b - a;
    let len_sq = ab.hypot2();
    if len_sq == 0.0 {
        return (p - a).hypot2();
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).hypot2()
}
