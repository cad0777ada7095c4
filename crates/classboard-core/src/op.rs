//! Draw operations: the atomic pen/eraser samples streamed to the backing store.

use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use thiserror::Error;

/// Zero-based, dense index of a slide in the deck.
pub type SlideIndex = usize;

/// Drawing tool that produced an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    /// Paints the stroke colour over existing pixels.
    #[default]
    Pen,
    /// Replaces pixels with the surface background.
    Eraser,
}

/// Error returned when a colour string cannot be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid colour: {0}")]
pub struct ColorParseError(pub String);

/// An opaque RGB colour, serialized as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub const BLACK: RgbColor = RgbColor::new(0, 0, 0);
    pub const WHITE: RgbColor = RgbColor::new(255, 255, 255);
    pub const RED: RgbColor = RgbColor::new(255, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rgb` or `#rrggbb` (the leading `#` is optional).
    pub fn from_hex(input: &str) -> Result<Self, ColorParseError> {
        let hex = input.trim().trim_start_matches('#');
        let err = || ColorParseError(input.to_string());
        let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| err());

        match hex.len() {
            6 => Ok(Self::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            3 => {
                let expand = |i: usize| channel(&hex[i..i + 1]).map(|v| v * 17);
                Ok(Self::new(expand(0)?, expand(1)?, expand(2)?))
            }
            _ => Err(err()),
        }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }
}

impl Default for RgbColor {
    fn default() -> Self {
        Self::BLACK
    }
}

impl fmt::Display for RgbColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for RgbColor {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<RgbColor> for String {
    fn from(color: RgbColor) -> Self {
        color.to_hex()
    }
}

/// Style applied to every op of a stroke.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokeStyle {
    pub tool: Tool,
    pub color: RgbColor,
    pub size: f64,
}

impl StrokeStyle {
    pub fn pen(color: RgbColor, size: f64) -> Self {
        Self {
            tool: Tool::Pen,
            color,
            size,
        }
    }

    pub fn eraser(size: f64) -> Self {
        Self {
            tool: Tool::Eraser,
            color: RgbColor::WHITE,
            size,
        }
    }
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self::pen(RgbColor::BLACK, 2.0)
    }
}

/// One pointer sample with style and slide tagging.
///
/// `is_start` begins a disjoint path segment; any other op connects to the
/// op immediately preceding it on the same slide. Ops are immutable once
/// produced and their order is significant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawOp {
    pub x: f64,
    pub y: f64,
    pub tool: Tool,
    pub color: RgbColor,
    pub size: f64,
    pub slide: SlideIndex,
    pub timestamp: u64,
    pub is_start: bool,
}

impl DrawOp {
    pub fn new(
        point: Point,
        style: StrokeStyle,
        slide: SlideIndex,
        timestamp: u64,
        is_start: bool,
    ) -> Self {
        Self {
            x: point.x,
            y: point.y,
            tool: style.tool,
            color: style.color,
            size: style.size,
            slide,
            timestamp,
            is_start,
        }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn style(&self) -> StrokeStyle {
        StrokeStyle {
            tool: self.tool,
            color: self.color,
            size: self.size,
        }
    }
}

/// Monotonic millisecond clock for op timestamps.
///
/// Successive calls never return the same value, even within one millisecond.
#[derive(Debug, Clone)]
pub struct OpClock {
    origin: Instant,
    last: Option<u64>,
}

impl OpClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last: None,
        }
    }

    /// Timestamp for a sample taken at `now`.
    pub fn stamp(&mut self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.origin).as_millis() as u64;
        let next = match self.last {
            Some(last) if elapsed <= last => last + 1,
            _ => elapsed,
        };
        self.last = Some(next);
        next
    }
}

impl Default for OpClock {
    fn default() -> Self {
        Self::new()
    }
}
