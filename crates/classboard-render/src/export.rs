//! Export composer: renders every slide of a deck into a paginated document.

use crate::pdf::write_pdf;
use crate::raster::RasterCanvas;
use crate::renderer::{RenderResult, RendererError};
use crate::replay::ReplayEngine;
use classboard_core::{DrawOp, SlideContent, SlideDeck, SlideIndex, Surface};
use image::RgbaImage;
use std::path::Path;
use thiserror::Error;

/// Export errors. A failing slide aborts the whole export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to render slide {index}: {source}")]
    SlideRender {
        index: SlideIndex,
        #[source]
        source: RendererError,
    },
    #[error("IO error: {0}")]
    Io(String),
    #[error("PDF error: {0}")]
    Pdf(String),
}

/// One document page: an image and its pixel size.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub image: RgbaImage,
}

impl Page {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Default page of a fresh document (A4 portrait at 72 dpi).
const DEFAULT_PAGE_SIZE: (u32, u32) = (595, 842);

/// A multi-page document.
///
/// A new document holds one default blank page, which the first added page
/// replaces.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiPageDocument {
    pages: Vec<Page>,
    has_default_page: bool,
}

impl Default for MultiPageDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiPageDocument {
    pub fn new() -> Self {
        let (width, height) = DEFAULT_PAGE_SIZE;
        Self {
            pages: vec![Page::new(RasterCanvas::blank(width, height).into_image())],
            has_default_page: true,
        }
    }

    pub fn add_page(&mut self, page: Page) {
        if self.has_default_page {
            self.pages[0] = page;
            self.has_default_page = false;
        } else {
            self.pages.push(page);
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Always false: a document has at least its default page.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    pub fn to_pdf(&self) -> Result<Vec<u8>, ExportError> {
        let images: Vec<&RgbaImage> = self.pages.iter().map(|p| &p.image).collect();
        write_pdf(&images).map_err(|e| ExportError::Pdf(e.to_string()))
    }

    pub fn save_pdf(&self, path: &Path) -> Result<(), ExportError> {
        let bytes = self.to_pdf()?;
        std::fs::write(path, bytes)
            .map_err(|e| ExportError::Io(format!("Failed to write {}: {}", path.display(), e)))?;
        log::info!("Wrote {} page(s) to {}", self.len(), path.display());
        Ok(())
    }
}

/// Renders each slide of a deck, live or replayed, into one page.
pub struct ExportComposer<'a> {
    engine: ReplayEngine,
    persisted: &'a [DrawOp],
}

impl<'a> ExportComposer<'a> {
    pub fn new(engine: ReplayEngine) -> Self {
        Self {
            engine,
            persisted: &[],
        }
    }

    /// Persisted op list used for slides that have no stored content.
    pub fn with_persisted_ops(mut self, ops: &'a [DrawOp]) -> Self {
        self.persisted = ops;
        self
    }

    /// Render one slide.
    ///
    /// The current slide comes from `live` when given. Other slides use
    /// their stored content, falling back to replaying the persisted ops.
    pub fn render_slide(
        &self,
        deck: &SlideDeck,
        index: SlideIndex,
        live: Option<&dyn Surface>,
    ) -> RenderResult<RasterCanvas> {
        if let Some(surface) = live.filter(|_| index == deck.current_index()) {
            return RasterCanvas::from_snapshot(&surface.snapshot(), self.engine.background());
        }
        match deck.slide(index) {
            Some(SlideContent::Ops(ops)) if ops.is_empty() => {
                Ok(self.engine.replay(self.persisted, index))
            }
            Some(content) => self.engine.render_content(content),
            None => Err(RendererError::RenderFailed(format!(
                "slide {} is out of range",
                index
            ))),
        }
    }

    /// Render every slide, first to last, without touching the deck.
    pub fn compose(
        &self,
        deck: &SlideDeck,
        live: Option<&dyn Surface>,
    ) -> Result<MultiPageDocument, ExportError> {
        let mut document = MultiPageDocument::new();
        for index in 0..deck.len() {
            let canvas = self
                .render_slide(deck, index, live)
                .map_err(|source| ExportError::SlideRender { index, source })?;
            document.add_page(Page::new(canvas.into_image()));
        }
        log::info!("Exported {} slide(s)", deck.len());
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::RasterSurface;
    use classboard_core::scene::Scene;
    use classboard_core::{RasterSnapshot, RgbColor, StrokeStyle};
    use kurbo::Point;
    use tempfile::tempdir;

    fn red_stroke(slide: SlideIndex) -> Vec<DrawOp> {
        let pen = StrokeStyle::pen(RgbColor::RED, 3.0);
        vec![
            DrawOp::new(Point::new(2.0, 2.0), pen, slide, 0, true),
            DrawOp::new(Point::new(10.0, 2.0), pen, slide, 1, false),
        ]
    }

    #[test]
    fn test_default_page_replaced_by_first_page() {
        let mut document = MultiPageDocument::new();
        assert_eq!(document.len(), 1);
        assert_eq!(document.pages()[0].width(), 595);

        document.add_page(Page::new(RasterCanvas::blank(10, 20).into_image()));
        assert_eq!(document.len(), 1);
        assert_eq!((document.pages()[0].width(), document.pages()[0].height()), (10, 20));

        document.add_page(Page::new(RasterCanvas::blank(30, 5).into_image()));
        assert_eq!(document.len(), 2);
    }

    #[test]
    fn test_compose_uses_persisted_ops_for_unsaved_slides() {
        let persisted = red_stroke(1);
        let mut deck = SlideDeck::new();
        let mut surface = RasterSurface::new(12, 12);
        deck.add_slide(&mut surface).unwrap();
        deck.goto_slide(0, &mut surface).unwrap();
        // Slide 1 was captured blank on navigation; give it no content.
        deck.set_slide(1, SlideContent::Ops(Vec::new()));

        let composer = ExportComposer::new(ReplayEngine::new(12, 12)).with_persisted_ops(&persisted);
        let document = composer.compose(&deck, Some(&surface)).unwrap();
        assert_eq!(document.len(), 2);
        assert_eq!(document.pages()[1].image.get_pixel(6, 2).0, [255, 0, 0, 255]);
        assert_eq!(deck.current_index(), 0);
    }

    #[test]
    fn test_pages_keep_their_own_size() {
        let mut deck = SlideDeck::new();
        let mut surface = RasterSurface::new(8, 8);
        deck.add_slide(&mut surface).unwrap();
        deck.set_slide(0, SlideContent::Raster(RasterSnapshot::filled(4, 6, RgbColor::BLACK)));

        let document = ExportComposer::new(ReplayEngine::new(8, 8))
            .compose(&deck, Some(&surface))
            .unwrap();
        assert_eq!(document.pages()[0].image.dimensions(), (4, 6));
        assert_eq!(document.pages()[1].image.dimensions(), (8, 8));
    }

    #[test]
    fn test_failing_slide_aborts_export() {
        let mut broken = Scene::from_raster(&RasterSnapshot::filled(2, 2, RgbColor::RED));
        broken.files.clear();
        let mut deck = SlideDeck::new();
        let mut surface = RasterSurface::new(4, 4);
        deck.add_slide(&mut surface).unwrap();
        deck.set_slide(0, SlideContent::Scene(broken));

        let result = ExportComposer::new(ReplayEngine::new(4, 4)).compose(&deck, Some(&surface));
        assert!(matches!(result, Err(ExportError::SlideRender { index: 0, .. })));
    }

    #[test]
    fn test_save_pdf() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deck.pdf");
        let mut document = MultiPageDocument::new();
        document.add_page(Page::new(RasterCanvas::blank(4, 4).into_image()));
        document.save_pdf(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
