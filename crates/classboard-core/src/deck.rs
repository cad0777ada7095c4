//! Slide store: the ordered deck of slides and the current slide index.

use crate::op::{DrawOp, SlideIndex};
use crate::scene::{RasterSnapshot, Scene};
use crate::surface::{Surface, SurfaceError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Highest slide count accepted from a persisted history. Ops or scenes
/// tagged beyond it are dropped.
pub const MAX_SLIDES: usize = 1024;

/// Drop the ops of a removed slide from a slide-tagged op list and shift
/// the ops of later slides down by one.
pub fn remove_slide_ops(ops: &mut Vec<DrawOp>, removed: SlideIndex) {
    ops.retain(|op| op.slide != removed);
    for op in ops.iter_mut().filter(|op| op.slide > removed) {
        op.slide -= 1;
    }
}

fn in_range(index: SlideIndex) -> bool {
    if index < MAX_SLIDES {
        true
    } else {
        log::warn!("Ignoring history entry for slide {} (limit {})", index, MAX_SLIDES);
        false
    }
}

/// Stored content of one slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "content", rename_all = "snake_case")]
pub enum SlideContent {
    /// Ordered ops for this slide, replayed to materialize it.
    Ops(Vec<DrawOp>),
    /// Vector scene (full-snapshot strategy).
    Scene(Scene),
    /// Raster image captured from the live surface.
    Raster(RasterSnapshot),
}

impl Default for SlideContent {
    fn default() -> Self {
        SlideContent::Ops(Vec::new())
    }
}

impl SlideContent {
    /// Whether the slide has nothing drawn on it.
    pub fn is_blank(&self) -> bool {
        match self {
            SlideContent::Ops(ops) => ops.is_empty(),
            SlideContent::Scene(scene) => scene.is_empty(),
            SlideContent::Raster(_) => false,
        }
    }

    /// Vector view of the content.
    pub fn to_scene(&self) -> Scene {
        match self {
            SlideContent::Ops(ops) => Scene::from_ops(ops),
            SlideContent::Scene(scene) => scene.clone(),
            SlideContent::Raster(snapshot) => Scene::from_raster(snapshot),
        }
    }

    /// Retag stored ops after the slide moved to `index`.
    fn reindex(&mut self, index: SlideIndex) {
        if let SlideContent::Ops(ops) = self {
            for op in ops {
                op.slide = index;
            }
        }
    }
}

#[derive(Deserialize)]
struct DeckRepr {
    slides: Vec<SlideContent>,
    current: SlideIndex,
}

/// Ordered, never-empty collection of slides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DeckRepr")]
pub struct SlideDeck {
    slides: Vec<SlideContent>,
    current: SlideIndex,
}

impl TryFrom<DeckRepr> for SlideDeck {
    type Error = String;

    fn try_from(repr: DeckRepr) -> Result<Self, Self::Error> {
        if repr.slides.is_empty() {
            return Err("slide deck must contain at least one slide".to_string());
        }
        if repr.current >= repr.slides.len() {
            return Err(format!(
                "current slide {} out of range for {} slides",
                repr.current,
                repr.slides.len()
            ));
        }
        Ok(Self {
            slides: repr.slides,
            current: repr.current,
        })
    }
}

impl Default for SlideDeck {
    fn default() -> Self {
        Self::new()
    }
}

impl SlideDeck {
    /// A deck with a single blank slide.
    pub fn new() -> Self {
        Self {
            slides: vec![SlideContent::default()],
            current: 0,
        }
    }

    /// Group a persisted, slide-tagged op list into per-slide op lists.
    ///
    /// Slides with no ops become blank slides; op order within a slide is kept.
    /// Ops tagged at or beyond [`MAX_SLIDES`] are dropped.
    pub fn from_ops(ops: &[DrawOp]) -> Self {
        let mut slides: Vec<Vec<DrawOp>> = vec![Vec::new()];
        for op in ops.iter().filter(|op| in_range(op.slide)) {
            if op.slide >= slides.len() {
                slides.resize_with(op.slide + 1, Vec::new);
            }
            slides[op.slide].push(*op);
        }
        Self {
            slides: slides.into_iter().map(SlideContent::Ops).collect(),
            current: 0,
        }
    }

    /// Build a deck from a slide-index → scene mapping.
    pub fn from_scene_map(map: BTreeMap<SlideIndex, Scene>) -> Self {
        let mut slides = vec![SlideContent::Scene(Scene::new())];
        for (index, scene) in map.into_iter().filter(|(index, _)| in_range(*index)) {
            if index >= slides.len() {
                slides.resize_with(index + 1, || SlideContent::Scene(Scene::new()));
            }
            slides[index] = SlideContent::Scene(scene.sanitized());
        }
        Self { slides, current: 0 }
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    /// Always false; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    pub fn current_index(&self) -> SlideIndex {
        self.current
    }

    pub fn current(&self) -> &SlideContent {
        &self.slides[self.current]
    }

    pub fn slide(&self, index: SlideIndex) -> Option<&SlideContent> {
        self.slides.get(index)
    }

    pub fn slides(&self) -> &[SlideContent] {
        &self.slides
    }

    /// Scene of the current slide, if it is stored as one.
    pub fn current_scene(&self) -> Option<&Scene> {
        match self.current() {
            SlideContent::Scene(scene) => Some(scene),
            _ => None,
        }
    }

    /// Replace the current slide with a scene (presence data stripped).
    pub fn set_current_scene(&mut self, scene: Scene) {
        self.slides[self.current] = SlideContent::Scene(scene.sanitized());
    }

    /// Overwrite one slide's stored content. Returns false if out of range.
    pub fn set_slide(&mut self, index: SlideIndex, mut content: SlideContent) -> bool {
        match self.slides.get_mut(index) {
            Some(slot) => {
                content.reindex(index);
                *slot = content;
                true
            }
            None => false,
        }
    }

    /// Save the surface's live content into the current slide.
    pub fn save_current(&mut self, surface: &dyn Surface) {
        let index = self.current;
        self.set_slide(index, surface.capture());
    }

    /// Save the current slide, then load slide `index` onto the surface.
    ///
    /// Returns false (and touches nothing) if `index` is out of range.
    pub fn goto_slide(
        &mut self,
        index: SlideIndex,
        surface: &mut dyn Surface,
    ) -> Result<bool, SurfaceError> {
        if index >= self.slides.len() {
            return Ok(false);
        }
        self.save_current(surface);
        self.current = index;
        surface.load(&self.slides[index])?;
        log::debug!("Switched to slide {}", index);
        Ok(true)
    }

    /// Append a blank slide and switch to it. Returns the new index.
    pub fn add_slide(&mut self, surface: &mut dyn Surface) -> Result<SlideIndex, SurfaceError> {
        self.save_current(surface);
        self.slides.push(SlideContent::default());
        self.current = self.slides.len() - 1;
        surface.load(&self.slides[self.current])?;
        log::info!("Added slide {} ({} total)", self.current, self.slides.len());
        Ok(self.current)
    }

    /// Remove a slide (default: the current one) and compact the indices.
    ///
    /// Removing the only remaining slide, or an out-of-range index, is a
    /// no-op returning false. The new current slide is 0 if slide 0 was
    /// removed, otherwise the slide before the removed one.
    pub fn remove_slide(
        &mut self,
        index: Option<SlideIndex>,
        surface: &mut dyn Surface,
    ) -> Result<bool, SurfaceError> {
        let index = index.unwrap_or(self.current);
        if self.slides.len() <= 1 || index >= self.slides.len() {
            log::debug!("Ignoring removal of slide {} from {} slides", index, self.slides.len());
            return Ok(false);
        }

        self.save_current(surface);
        self.slides.remove(index);
        for (i, slide) in self.slides.iter_mut().enumerate().skip(index) {
            slide.reindex(i);
        }

        self.current = if index == 0 {
            0
        } else {
            (index - 1).min(self.slides.len() - 1)
        };
        surface.load(&self.slides[self.current])?;
        log::info!(
            "Removed slide {}; now on slide {} of {}",
            index,
            self.current,
            self.slides.len()
        );
        Ok(true)
    }

    /// Slide-index → scene mapping sent by the full-snapshot strategy.
    pub fn scene_map(&self) -> BTreeMap<SlideIndex, Scene> {
        self.slides
            .iter()
            .enumerate()
            .map(|(i, slide)| (i, slide.to_scene().sanitized()))
            .collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
