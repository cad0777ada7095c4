//! Scene model: the whole-slide vector description used by the full-snapshot
//! sync strategy, plus raster snapshots of a drawing surface.

use crate::op::{DrawOp, RgbColor, StrokeStyle, Tool};
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// Mime type used for uncompressed RGBA raster payloads.
pub const RAW_RGBA_MIME: &str = "image/x-raw-rgba";

/// Keys in the display state that describe live peers rather than the slide.
const PRESENCE_KEYS: &[&str] = &["collaborators", "cursor", "selectedElementIds"];

/// A primitive drawn on a slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Element {
    /// A freehand pen or eraser stroke.
    Stroke {
        id: Uuid,
        tool: Tool,
        color: RgbColor,
        size: f64,
        points: Vec<Point>,
    },
    /// A raster asset placed on the slide; `file_id` keys into `Scene::files`.
    Image {
        id: Uuid,
        file_id: String,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
}

impl Element {
    pub fn stroke(style: StrokeStyle, start: Point) -> Self {
        Element::Stroke {
            id: Uuid::new_v4(),
            tool: style.tool,
            color: style.color,
            size: style.size,
            points: vec![start],
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Element::Stroke { id, .. } | Element::Image { id, .. } => *id,
        }
    }

    pub fn bounds(&self) -> Rect {
        match self {
            Element::Stroke { points, size, .. } => {
                let Some(first) = points.first() else {
                    return Rect::ZERO;
                };
                points
                    .iter()
                    .fold(Rect::from_points(*first, *first), |r, p| r.union_pt(*p))
                    .inflate(size / 2.0, size / 2.0)
            }
            Element::Image {
                x,
                y,
                width,
                height,
                ..
            } => Rect::new(*x, *y, x + width, y + height),
        }
    }
}

/// Display attributes of a scene (camera, active tool, background).
///
/// Unknown attributes written by a host drawing widget are preserved in
/// `extra`, except presence data which is stripped by [`Scene::sanitize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppState {
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub zoom: f64,
    pub view_background_color: RgbColor,
    pub active_tool: Tool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            scroll_x: 0.0,
            scroll_y: 0.0,
            zoom: 1.0,
            view_background_color: RgbColor::WHITE,
            active_tool: Tool::Pen,
            extra: Map::new(),
        }
    }
}

/// Binary asset referenced by an image element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub mime_type: String,
    /// Pixel dimensions, required for raw RGBA payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<(u32, u32)>,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Full description of one slide's visible content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub app_state: AppState,
    #[serde(default)]
    pub files: BTreeMap<String, FileData>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a vector scene from an ordered op list (one stroke per start op).
    pub fn from_ops(ops: &[DrawOp]) -> Self {
        let mut scene = Self::new();
        for op in ops {
            scene.apply_op(op);
        }
        scene
    }

    /// Wrap a raster snapshot as a scene holding a single image element.
    pub fn from_raster(snapshot: &RasterSnapshot) -> Self {
        let mut scene = Self::new();
        let file_id = format!("raster-{}", Uuid::new_v4());
        scene.files.insert(
            file_id.clone(),
            FileData {
                mime_type: RAW_RGBA_MIME.to_string(),
                dimensions: Some((snapshot.width, snapshot.height)),
                data: snapshot.rgba.clone(),
            },
        );
        scene.elements.push(Element::Image {
            id: Uuid::new_v4(),
            file_id,
            x: 0.0,
            y: 0.0,
            width: snapshot.width as f64,
            height: snapshot.height as f64,
        });
        scene
    }

    /// Extend the scene with one op, mirroring how a live stroke grows.
    pub fn apply_op(&mut self, op: &DrawOp) {
        if !op.is_start {
            if let Some(Element::Stroke { points, .. }) = self.elements.last_mut() {
                points.push(op.point());
                return;
            }
        }
        self.elements.push(Element::stroke(op.style(), op.point()));
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn clear(&mut self) {
        self.elements.clear();
        self.files.clear();
    }

    /// Remove presence/collaborator data so it is never persisted or resent.
    pub fn sanitize(&mut self) {
        for key in PRESENCE_KEYS {
            self.app_state.extra.remove(*key);
        }
    }

    pub fn sanitized(mut self) -> Self {
        self.sanitize();
        self
    }

    /// Drop files no element references.
    pub fn prune_files(&mut self) {
        let referenced: HashSet<String> = self
            .elements
            .iter()
            .filter_map(|e| match e {
                Element::Image { file_id, .. } => Some(file_id.clone()),
                _ => None,
            })
            .collect();
        self.files.retain(|id, _| referenced.contains(id));
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(json).map(Self::sanitized)
    }
}

/// Uncompressed RGBA capture of a drawing surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterSnapshot {
    pub width: u32,
    pub height: u32,
    #[serde(with = "base64_bytes")]
    pub rgba: Vec<u8>,
}

impl RasterSnapshot {
    /// A snapshot filled with a single colour.
    pub fn filled(width: u32, height: u32, color: RgbColor) -> Self {
        let rgba = color
            .to_rgba()
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            rgba,
        }
    }

    /// Whether the buffer length matches the declared dimensions.
    pub fn is_well_formed(&self) -> bool {
        self.rgba.len() == self.width as usize * self.height as usize * 4
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(x: f64, y: f64, is_start: bool) -> DrawOp {
        DrawOp::new(Point::new(x, y), StrokeStyle::default(), 0, 0, is_start)
    }

    #[test]
    fn test_from_ops_groups_strokes() {
        let ops = [
            op(0.0, 0.0, true),
            op(5.0, 5.0, false),
            op(9.0, 1.0, true),
            op(9.0, 9.0, false),
            op(3.0, 3.0, false),
        ];
        let scene = Scene::from_ops(&ops);
        assert_eq!(scene.len(), 2);
        match &scene.elements[1] {
            Element::Stroke { points, .. } => assert_eq!(points.len(), 3),
            other => panic!("unexpected element {other:?}"),
        }
    }

    #[test]
    fn test_continuation_without_start_opens_stroke() {
        let scene = Scene::from_ops(&[op(1.0, 1.0, false)]);
        assert_eq!(scene.len(), 1);
    }

    #[test]
    fn test_sanitize_strips_presence() {
        let json = r##"{
            "elements": [],
            "appState": { "zoom": 2.0, "collaborators": {"a": 1}, "gridSize": 20 },
            "files": {}
        }"##;
        let scene = Scene::from_json(json).unwrap();
        assert_eq!(scene.app_state.zoom, 2.0);
        assert!(!scene.app_state.extra.contains_key("collaborators"));
        assert!(scene.app_state.extra.contains_key("gridSize"));
    }

    #[test]
    fn test_raster_scene_roundtrip() {
        let snapshot = RasterSnapshot::filled(2, 2, RgbColor::RED);
        assert!(snapshot.is_well_formed());
        let scene = Scene::from_raster(&snapshot);
        let json = scene.to_json().unwrap();
        let back = Scene::from_json(&json).unwrap();
        assert_eq!(back, scene);
        let file = back.files.values().next().unwrap();
        assert_eq!(file.dimensions, Some((2, 2)));
        assert_eq!(file.data, snapshot.rgba);
    }

    #[test]
    fn test_prune_files() {
        let mut scene = Scene::from_raster(&RasterSnapshot::filled(1, 1, RgbColor::WHITE));
        scene.elements.clear();
        scene.prune_files();
        assert!(scene.files.is_empty());
    }
}
