//! The whiteboard controller: session lifecycle, live drawing, slide
//! navigation, undo routing and export.

use crate::commands::{Command, UndoInterceptor, UndoTarget};
use crate::config::{AppConfig, SyncStrategy};
use classboard_core::buffer::{DrawBuffer, Flush, SnapshotPolicy};
use classboard_core::channel::{SendOutcome, SyncChannel};
use classboard_core::{
    BackingStore, DrawOp, History, HistorySnapshot, HistoryStack, OpClock, RemoteError,
    RgbColor, Session, SlideDeck, SlideIndex, Storage, StrokeStyle, Surface, SurfaceError,
    SurfaceGeometry, SyncError, SyncEvent, Tool, Transport, remove_slide_ops, to_canvas_space,
};
use classboard_render::{
    CaptureMode, ExportComposer, ExportError, MultiPageDocument, RasterSurface, ReplayEngine,
};
use kurbo::Point;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Whiteboard errors.
#[derive(Debug, Error)]
pub enum WhiteboardError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Where the whiteboard is in its session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Created, history not loaded yet.
    Idle,
    /// Full-surface teaching mode; the surface is interactive.
    Immersive,
    /// Torn down; the channel is closed.
    Closed,
}

/// Result of leaving immersive mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Buffer flushed and channel closed; control returns to the navigation shell.
    ReturnToShell { flush: SendOutcome },
    /// Teardown had already run; nothing was done.
    AlreadyClosed,
}

/// How a command was handled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dispatch {
    Handled,
    /// The drawing widget should handle the command itself.
    PassThrough(Command),
    Exited(ExitOutcome),
}

/// Split a persisted history into a deck plus the flat op list it came from.
pub fn deck_from_history(history: History) -> (SlideDeck, Vec<DrawOp>) {
    match history {
        History::Ops(ops) => (SlideDeck::from_ops(&ops), ops),
        History::Scenes(scenes) => (SlideDeck::from_scene_map(scenes), Vec::new()),
    }
}

/// Replay a persisted history into a document without a live surface.
pub fn export_history(
    history: History,
    engine: ReplayEngine,
) -> Result<MultiPageDocument, ExportError> {
    let (deck, persisted) = deck_from_history(history);
    ExportComposer::new(engine)
        .with_persisted_ops(&persisted)
        .compose(&deck, None)
}

/// One teaching session's whiteboard.
pub struct Whiteboard<T: Transport> {
    config: AppConfig,
    session: Session,
    store: Arc<dyn BackingStore>,
    storage: Option<Arc<dyn Storage>>,
    channel: SyncChannel<T>,
    surface: RasterSurface,
    geometry: SurfaceGeometry,
    deck: SlideDeck,
    persisted: Vec<DrawOp>,
    buffer: DrawBuffer,
    snapshots: SnapshotPolicy,
    history: HistoryStack,
    interceptor: UndoInterceptor,
    clock: OpClock,
    style: StrokeStyle,
    drawing: bool,
    dropped_ops: usize,
    lifecycle: Lifecycle,
}

impl<T: Transport> Whiteboard<T> {
    pub fn new(
        config: AppConfig,
        session: Session,
        store: Arc<dyn BackingStore>,
        transport: T,
        now: Instant,
    ) -> Self {
        let engine = ReplayEngine::new(config.surface_width, config.surface_height)
            .with_background(config.background);
        let mode = match config.sync_strategy {
            SyncStrategy::Incremental => CaptureMode::Raster,
            SyncStrategy::FullSnapshot => CaptureMode::Scene,
        };
        Self {
            session,
            store,
            storage: None,
            channel: SyncChannel::new(transport),
            surface: RasterSurface::with_engine(engine).with_mode(mode),
            geometry: SurfaceGeometry::identity(config.surface_width, config.surface_height),
            deck: SlideDeck::new(),
            persisted: Vec::new(),
            buffer: DrawBuffer::with_policy(config.flush_threshold, config.flush_interval(), now),
            snapshots: SnapshotPolicy::with_interval(config.flush_interval(), now),
            history: HistoryStack::new(config.history_cap),
            interceptor: UndoInterceptor::new(config.undo_intercept_window()),
            clock: OpClock::new(),
            style: StrokeStyle::default(),
            drawing: false,
            dropped_ops: 0,
            lifecycle: Lifecycle::Idle,
            config,
        }
    }

    /// Persist the deck locally after every structural change.
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Create a session on the backing store for the configured school.
    pub fn create_session(
        store: &dyn BackingStore,
        config: &AppConfig,
    ) -> Result<Session, WhiteboardError> {
        let token = store.create_session(&config.school_id, &config.auth_token)?;
        Ok(Session::new(
            token,
            config.school_id.clone(),
            config.auth_token.clone(),
        ))
    }

    // Accessors

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn deck(&self) -> &SlideDeck {
        &self.deck
    }

    pub fn surface(&self) -> &RasterSurface {
        &self.surface
    }

    pub fn history(&self) -> &HistoryStack {
        &self.history
    }

    pub fn channel(&self) -> &SyncChannel<T> {
        &self.channel
    }

    pub fn style(&self) -> StrokeStyle {
        self.style
    }

    pub fn buffered_ops(&self) -> usize {
        self.buffer.len()
    }

    /// Ops lost because the channel was unavailable when they were flushed.
    pub fn dropped_ops(&self) -> usize {
        self.dropped_ops
    }

    pub fn persisted_ops(&self) -> &[DrawOp] {
        &self.persisted
    }

    pub fn set_geometry(&mut self, geometry: SurfaceGeometry) {
        self.geometry = geometry;
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.style.tool = tool;
    }

    pub fn set_color(&mut self, color: RgbColor) {
        self.style.color = color;
    }

    pub fn set_size(&mut self, size: f64) {
        self.style.size = size.max(0.5);
    }

    // Lifecycle

    /// Load the persisted deck, show the current slide and open the channel.
    pub fn enter_immersive(&mut self, now: Instant) -> Result<(), WhiteboardError> {
        if self.lifecycle == Lifecycle::Immersive {
            return Ok(());
        }

        let history = self.store.load_history(&self.session)?;
        let (deck, persisted) = deck_from_history(history);
        let remote_blank = deck.len() == 1 && deck.current().is_blank();
        self.deck = match self.load_local_deck() {
            Some(local) if remote_blank => {
                log::info!("Restored {} slide(s) from local storage", local.len());
                local
            }
            _ => deck,
        };
        self.persisted = persisted;
        self.surface.load(self.deck.current())?;
        self.history.clear();
        self.buffer = DrawBuffer::with_policy(
            self.config.flush_threshold,
            self.config.flush_interval(),
            now,
        );
        self.snapshots = SnapshotPolicy::with_interval(self.config.flush_interval(), now);

        let url = self.session.channel_url(&self.config.ws_url)?;
        self.channel.open(&url)?;
        self.lifecycle = Lifecycle::Immersive;
        log::info!(
            "Entered whiteboard session {} with {} slide(s), {} persisted op(s)",
            self.session.session_token,
            self.deck.len(),
            self.persisted.len()
        );
        Ok(())
    }

    /// Leave immersive mode: flush, close the channel, return to the shell.
    pub fn exit_immersive(&mut self, now: Instant) -> ExitOutcome {
        self.teardown(now)
    }

    /// Flush then close. Safe to call more than once.
    pub fn teardown(&mut self, now: Instant) -> ExitOutcome {
        self.drawing = false;
        let flush = self.force_flush(now);
        self.channel.close();

        let first = self.lifecycle == Lifecycle::Immersive;
        self.lifecycle = Lifecycle::Closed;
        if !first {
            return ExitOutcome::AlreadyClosed;
        }
        self.persist_deck();
        log::info!("Left whiteboard session {}", self.session.session_token);
        ExitOutcome::ReturnToShell { flush }
    }

    /// Drive timers and drain transport events.
    pub fn tick(&mut self, now: Instant) -> Vec<SyncEvent> {
        let events = self.channel.poll_events();
        for event in &events {
            match event {
                SyncEvent::Connected => log::debug!("Sync channel connected"),
                SyncEvent::Greeting(greeting) => {
                    log::info!("Server: {} ({})", greeting.message, greeting.session_id)
                }
                SyncEvent::Disconnected => log::warn!("Sync channel disconnected"),
                SyncEvent::Error { message } => log::error!("Sync channel error: {}", message),
            }
        }

        if self.lifecycle == Lifecycle::Immersive {
            match self.config.sync_strategy {
                SyncStrategy::Incremental => {
                    if let Some(flush) = self.buffer.tick(now) {
                        self.send_flush(flush);
                    }
                }
                SyncStrategy::FullSnapshot => {
                    if self.snapshots.should_send(now) {
                        self.send_scenes(now);
                    }
                }
            }
        }
        events
    }

    // Drawing

    /// Begin a stroke at a client-space position.
    pub fn pointer_down(&mut self, client: Point, now: Instant) {
        if self.lifecycle != Lifecycle::Immersive {
            return;
        }
        self.push_history();
        self.drawing = true;
        self.emit(client, true, now);
    }

    pub fn pointer_move(&mut self, client: Point, now: Instant) {
        if self.drawing {
            self.emit(client, false, now);
        }
    }

    pub fn pointer_up(&mut self, now: Instant) {
        if !std::mem::take(&mut self.drawing) {
            return;
        }
        if self.config.sync_strategy == SyncStrategy::FullSnapshot {
            self.snapshots.note_edit(1);
            if self.snapshots.should_send(now) {
                self.send_scenes(now);
            }
        }
    }

    /// Clear the current slide.
    ///
    /// Incremental sync has no clear message, so the clear goes out as one
    /// eraser stroke wide enough to cover the whole surface.
    pub fn clear(&mut self, now: Instant) {
        self.push_history();
        self.drawing = false;
        self.surface.clear();
        match self.config.sync_strategy {
            SyncStrategy::Incremental if self.lifecycle == Lifecycle::Immersive => {
                let (width, height) = self.surface.dimensions();
                let (width, height) = (f64::from(width), f64::from(height));
                let wipe = StrokeStyle::eraser(2.0 * width.hypot(height) + 2.0);
                self.emit_canvas(Point::new(0.0, height / 2.0), wipe, true, now);
                self.emit_canvas(Point::new(width, height / 2.0), wipe, false, now);
            }
            SyncStrategy::Incremental => {}
            SyncStrategy::FullSnapshot => self.snapshots.note_edit(1),
        }
        log::info!("Cleared slide {}", self.deck.current_index());
    }

    fn emit(&mut self, client: Point, is_start: bool, now: Instant) {
        let point = to_canvas_space(&self.geometry, client);
        self.emit_canvas(point, self.style, is_start, now);
    }

    fn emit_canvas(&mut self, point: Point, style: StrokeStyle, is_start: bool, now: Instant) {
        let op = DrawOp::new(
            point,
            style,
            self.deck.current_index(),
            self.clock.stamp(now),
            is_start,
        );
        self.surface.apply_op(&op);
        if self.config.sync_strategy == SyncStrategy::Incremental {
            if let Some(flush) = self.buffer.append(op) {
                self.send_flush(flush);
            }
        }
    }

    // Slides

    pub fn add_slide(&mut self, now: Instant) -> Result<SlideIndex, WhiteboardError> {
        self.drawing = false;
        self.force_flush(now);
        let index = self.deck.add_slide(&mut self.surface)?;
        self.note_structure_change();
        self.persist_deck();
        Ok(index)
    }

    /// Switch slides. Returns false if `index` is out of range.
    pub fn goto_slide(&mut self, index: SlideIndex, now: Instant) -> Result<bool, WhiteboardError> {
        self.drawing = false;
        self.force_flush(now);
        let moved = self.deck.goto_slide(index, &mut self.surface)?;
        if moved {
            self.persist_deck();
        }
        Ok(moved)
    }

    /// Remove a slide (default: the current one). Removing the last slide
    /// is a no-op returning false.
    pub fn remove_slide(
        &mut self,
        index: Option<SlideIndex>,
        now: Instant,
    ) -> Result<bool, WhiteboardError> {
        self.drawing = false;
        self.force_flush(now);
        let target = index.unwrap_or(self.deck.current_index());
        let before = self.deck_snapshot();
        let removed = self.deck.remove_slide(index, &mut self.surface)?;
        if removed {
            remove_slide_ops(&mut self.persisted, target);
            self.history.push(before);
            self.interceptor.arm(now);
            self.note_structure_change();
            self.persist_deck();
        }
        Ok(removed)
    }

    // History

    /// Step back in history. Local only: nothing is sent.
    pub fn undo(&mut self) -> Result<bool, WhiteboardError> {
        self.drawing = false;
        let live = self.deck_snapshot();
        match self.history.undo(live) {
            Some(snapshot) => {
                self.apply_snapshot(snapshot)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Step forward in history. Local only: nothing is sent.
    pub fn redo(&mut self) -> Result<bool, WhiteboardError> {
        self.drawing = false;
        match self.history.redo() {
            Some(snapshot) => {
                self.apply_snapshot(snapshot)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn push_history(&mut self) {
        let snapshot = match self.surface.mode() {
            CaptureMode::Raster => HistorySnapshot::Raster {
                slide: self.deck.current_index(),
                image: self.surface.snapshot(),
            },
            CaptureMode::Scene => self.deck_snapshot(),
        };
        self.history.push(snapshot);
    }

    fn deck_snapshot(&self) -> HistorySnapshot {
        HistorySnapshot::Deck {
            deck: self.live_deck(),
            persisted: self.persisted.clone(),
        }
    }

    fn apply_snapshot(&mut self, snapshot: HistorySnapshot) -> Result<(), WhiteboardError> {
        match snapshot {
            HistorySnapshot::Raster { slide, image } => {
                if slide != self.deck.current_index() {
                    self.deck.goto_slide(slide, &mut self.surface)?;
                }
                self.surface.restore(&image)?;
            }
            HistorySnapshot::Deck { deck, persisted } => {
                self.deck = deck;
                self.persisted = persisted;
                self.surface.load(self.deck.current())?;
            }
        }
        self.persist_deck();
        Ok(())
    }

    // Commands

    /// Route a command. Undo goes to the drawing widget unless it was just
    /// preceded by a slide removal.
    pub fn dispatch(&mut self, command: Command, now: Instant) -> Result<Dispatch, WhiteboardError> {
        let widget_has_undo = self.config.sync_strategy == SyncStrategy::FullSnapshot;
        match command {
            Command::Undo => match self.interceptor.route(now, widget_has_undo) {
                UndoTarget::Widget => return Ok(Dispatch::PassThrough(command)),
                UndoTarget::History => {
                    self.undo()?;
                }
            },
            Command::Redo => {
                if widget_has_undo && !self.interceptor.is_active(now) {
                    return Ok(Dispatch::PassThrough(command));
                }
                self.redo()?;
            }
            Command::AddSlide => {
                self.add_slide(now)?;
            }
            Command::RemoveSlide(index) => {
                self.remove_slide(index, now)?;
            }
            Command::GotoSlide(index) => {
                self.goto_slide(index, now)?;
            }
            Command::NextSlide => {
                let next = self.deck.current_index() + 1;
                self.goto_slide(next, now)?;
            }
            Command::PreviousSlide => {
                if let Some(previous) = self.deck.current_index().checked_sub(1) {
                    self.goto_slide(previous, now)?;
                }
            }
            Command::Clear => self.clear(now),
            Command::SetTool(tool) => self.set_tool(tool),
            Command::SetColor(color) => self.set_color(color),
            Command::SetSize(size) => self.set_size(size),
            Command::ExitImmersive => return Ok(Dispatch::Exited(self.exit_immersive(now))),
        }
        Ok(Dispatch::Handled)
    }

    // Export and side-channels

    /// Render every slide into a document. The current slide index is untouched.
    pub fn export_deck(&self) -> Result<MultiPageDocument, WhiteboardError> {
        let document = ExportComposer::new(*self.surface.engine())
            .with_persisted_ops(&self.persisted)
            .compose(&self.deck, Some(&self.surface))?;
        Ok(document)
    }

    pub fn update_status(&self, day: &str, status: &str) -> Result<(), WhiteboardError> {
        self.store.update_status(&self.session, day, status)?;
        log::info!("Marked day {} as {}", day, status);
        Ok(())
    }

    // Sync

    /// Forced flush (slide switch, teardown).
    fn force_flush(&mut self, now: Instant) -> SendOutcome {
        match self.config.sync_strategy {
            SyncStrategy::Incremental => {
                let flush = self.buffer.force();
                if flush.ops.is_empty() {
                    SendOutcome::Empty
                } else {
                    self.send_flush(flush)
                }
            }
            SyncStrategy::FullSnapshot if self.snapshots.pending_elements() > 0 => {
                self.send_scenes(now)
            }
            SyncStrategy::FullSnapshot => SendOutcome::Empty,
        }
    }

    /// A slide was added or removed: the next scene map must go out, even
    /// on a forced flush with no new strokes.
    fn note_structure_change(&mut self) {
        if self.config.sync_strategy == SyncStrategy::FullSnapshot {
            self.snapshots.note_edit(1);
        }
    }

    fn send_flush(&mut self, flush: Flush) -> SendOutcome {
        log::debug!("Flushing {} op(s) ({:?})", flush.ops.len(), flush.trigger);
        let sent = flush.ops.clone();
        let outcome = self.channel.send_ops(flush.ops);
        match outcome {
            SendOutcome::Sent => self.persisted.extend(sent),
            SendOutcome::Dropped { ops } => self.dropped_ops += ops,
            SendOutcome::Empty => {}
        }
        outcome
    }

    fn send_scenes(&mut self, now: Instant) -> SendOutcome {
        let scenes = self.live_deck().scene_map();
        log::debug!("Sending {} scene(s)", scenes.len());
        let outcome = self.channel.send_scenes(scenes);
        self.snapshots.mark_sent(now);
        outcome
    }

    /// The deck with the live surface saved into the current slide.
    fn live_deck(&self) -> SlideDeck {
        let mut deck = self.deck.clone();
        deck.save_current(&self.surface);
        deck
    }

    fn persist_deck(&self) {
        let Some(storage) = &self.storage else {
            return;
        };
        let key = self.session.storage_key();
        if let Err(e) = pollster::block_on(storage.save(&key, &self.live_deck())) {
            log::warn!("Failed to save deck {}: {}", key, e);
        }
    }

    fn load_local_deck(&self) -> Option<SlideDeck> {
        let storage = self.storage.as_ref()?;
        pollster::block_on(storage.load(&self.session.storage_key())).ok()
    }
}

impl<T: Transport> Drop for Whiteboard<T> {
    fn drop(&mut self) {
        self.teardown(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classboard_core::channel::testing::RecordingTransport;
    use classboard_core::sync::ClientMessage;
    use classboard_core::{MemoryBackingStore, MemoryStorage, SlideContent};
    use classboard_render::Page;
    use std::time::Duration;

    const WHITE: [u8; 4] = [255, 255, 255, 255];
    const RED: [u8; 4] = [255, 0, 0, 255];

    fn config(strategy: SyncStrategy) -> AppConfig {
        AppConfig {
            school_id: "7".to_string(),
            auth_token: "secret".to_string(),
            surface_width: 40,
            surface_height: 40,
            sync_strategy: strategy,
            ..AppConfig::default()
        }
    }

    struct Fixture {
        board: Whiteboard<RecordingTransport>,
        transport: RecordingTransport,
        store: Arc<MemoryBackingStore>,
        start: Instant,
    }

    fn fixture_with(config: AppConfig, history: Option<History>) -> Fixture {
        let store = Arc::new(MemoryBackingStore::new());
        let session = Whiteboard::<RecordingTransport>::create_session(store.as_ref(), &config)
            .unwrap();
        if let Some(history) = history {
            store.insert_history(&session.session_token, history);
        }
        let transport = RecordingTransport::new();
        let start = Instant::now();
        let mut board = Whiteboard::new(config, session, store.clone(), transport.clone(), start);
        board.enter_immersive(start).unwrap();
        Fixture {
            board,
            transport,
            store,
            start,
        }
    }

    fn fixture(strategy: SyncStrategy) -> Fixture {
        fixture_with(config(strategy), None)
    }

    fn stroke(board: &mut Whiteboard<RecordingTransport>, points: &[(f64, f64)], now: Instant) {
        let (first, rest) = points.split_first().unwrap();
        board.pointer_down(Point::new(first.0, first.1), now);
        for p in rest {
            board.pointer_move(Point::new(p.0, p.1), now);
        }
        board.pointer_up(now);
    }

    fn is_blank(page: &Page) -> bool {
        page.image.pixels().all(|p| p.0 == WHITE)
    }

    #[test]
    fn test_two_slide_scenario_exports_two_pages() {
        let Fixture {
            mut board,
            transport,
            start,
            ..
        } = fixture(SyncStrategy::Incremental);
        assert!(transport.log().opened[0].contains("/ws/whiteboard/"));

        board.set_color(RgbColor::RED);
        board.set_size(3.0);
        stroke(&mut board, &[(5.0, 5.0), (20.0, 5.0), (20.0, 20.0)], start);

        assert_eq!(board.add_slide(start).unwrap(), 1);
        // Switching slides forced out the red stroke.
        let sent = transport.sent_ops();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|op| op.slide == 0 && op.color == RgbColor::RED));
        assert!(sent[0].is_start && !sent[1].is_start && !sent[2].is_start);

        board.set_tool(Tool::Eraser);
        stroke(&mut board, &[(10.0, 10.0), (30.0, 30.0)], start);

        let document = board.export_deck().unwrap();
        assert_eq!(document.len(), 2);
        assert_eq!(document.pages()[0].image.get_pixel(12, 5).0, RED);
        assert_eq!(document.pages()[0].image.get_pixel(20, 12).0, RED);
        assert!(is_blank(&document.pages()[1]));
        assert_eq!(document.pages()[1].width(), 40);
        assert_eq!(board.deck().current_index(), 1);

        board.exit_immersive(start);
        let sent = transport.sent_ops();
        assert_eq!(sent.len(), 5);
        assert!(sent[3..].iter().all(|op| op.slide == 1 && op.tool == Tool::Eraser));
    }

    #[test]
    fn test_threshold_flushes_once() {
        let Fixture {
            mut board,
            transport,
            start,
            ..
        } = fixture(SyncStrategy::Incremental);
        board.pointer_down(Point::new(1.0, 1.0), start);
        for i in 0..19 {
            board.pointer_move(Point::new(2.0 + i as f64, 1.0), start);
        }
        assert_eq!(transport.log().sent.len(), 1);
        assert_eq!(transport.sent_ops().len(), 20);
        assert_eq!(board.buffered_ops(), 0);
    }

    #[test]
    fn test_timer_flushes_partial_buffer() {
        let Fixture {
            mut board,
            transport,
            start,
            ..
        } = fixture(SyncStrategy::Incremental);
        stroke(&mut board, &[(1.0, 1.0), (5.0, 5.0)], start);
        board.tick(start + Duration::from_secs(1));
        assert!(transport.log().sent.is_empty());

        board.tick(start + Duration::from_secs(5));
        assert_eq!(transport.sent_ops().len(), 2);
    }

    #[test]
    fn test_history_replayed_on_entry() {
        let pen = StrokeStyle::pen(RgbColor::RED, 2.0);
        let ops = vec![
            DrawOp::new(Point::new(2.0, 20.0), pen, 1, 1, true),
            DrawOp::new(Point::new(38.0, 20.0), pen, 1, 2, false),
        ];
        let Fixture {
            mut board, start, ..
        } = fixture_with(config(SyncStrategy::Incremental), Some(History::Ops(ops)));

        assert_eq!(board.deck().len(), 2);
        assert!(board.surface().canvas().is_blank());
        assert_eq!(board.persisted_ops().len(), 2);

        board.goto_slide(1, start).unwrap();
        assert_eq!(board.surface().canvas().pixel(20, 20), Some(RED));
    }

    #[test]
    fn test_exit_is_idempotent() {
        let Fixture {
            mut board,
            transport,
            start,
            ..
        } = fixture(SyncStrategy::Incremental);
        stroke(&mut board, &[(1.0, 1.0), (5.0, 5.0)], start);

        assert_eq!(
            board.exit_immersive(start),
            ExitOutcome::ReturnToShell {
                flush: SendOutcome::Sent
            }
        );
        assert_eq!(board.exit_immersive(start), ExitOutcome::AlreadyClosed);
        drop(board);
        assert_eq!(transport.log().closes, 1);
        assert_eq!(transport.sent_ops().len(), 2);
    }

    #[test]
    fn test_unavailable_channel_counts_dropped_ops() {
        let Fixture {
            mut board,
            transport,
            start,
            ..
        } = fixture(SyncStrategy::Incremental);
        transport.drop_connection();
        stroke(&mut board, &[(1.0, 1.0), (5.0, 5.0), (9.0, 9.0)], start);
        board.add_slide(start).unwrap();

        assert_eq!(board.dropped_ops(), 3);
        assert!(transport.log().sent.is_empty());
        assert_eq!(board.buffered_ops(), 0);
    }

    #[test]
    fn test_undo_redo_are_local() {
        let Fixture {
            mut board,
            transport,
            start,
            ..
        } = fixture(SyncStrategy::Incremental);
        board.set_color(RgbColor::RED);
        stroke(&mut board, &[(2.0, 5.0), (38.0, 5.0)], start);
        stroke(&mut board, &[(2.0, 30.0), (38.0, 30.0)], start);
        board.tick(start + Duration::from_secs(5));
        let messages = transport.log().sent.len();

        assert!(board.undo().unwrap());
        assert_eq!(board.surface().canvas().pixel(20, 5), Some(RED));
        assert_eq!(board.surface().canvas().pixel(20, 30), Some(WHITE));

        assert!(board.undo().unwrap());
        assert!(board.surface().canvas().is_blank());
        assert!(!board.undo().unwrap());

        assert!(board.redo().unwrap());
        assert!(board.redo().unwrap());
        assert_eq!(board.surface().canvas().pixel(20, 30), Some(RED));
        assert!(!board.redo().unwrap());

        board.tick(start + Duration::from_secs(6));
        assert_eq!(transport.log().sent.len(), messages);
    }

    #[test]
    fn test_remove_last_slide_is_noop() {
        let Fixture {
            mut board, start, ..
        } = fixture(SyncStrategy::Incremental);
        assert!(!board.remove_slide(None, start).unwrap());
        assert_eq!(board.deck().len(), 1);
        assert!(board.history().is_empty());
    }

    #[test]
    fn test_undo_after_remove_is_intercepted() {
        let Fixture {
            mut board, start, ..
        } = fixture(SyncStrategy::FullSnapshot);
        board.add_slide(start).unwrap();
        assert!(board.remove_slide(None, start).unwrap());
        assert_eq!(board.deck().len(), 1);

        // Inside the window the history stack brings the slide back.
        let result = board
            .dispatch(Command::Undo, start + Duration::from_secs(1))
            .unwrap();
        assert_eq!(result, Dispatch::Handled);
        assert_eq!(board.deck().len(), 2);

        // Afterwards the widget owns undo again.
        let result = board
            .dispatch(Command::Undo, start + Duration::from_secs(3))
            .unwrap();
        assert_eq!(result, Dispatch::PassThrough(Command::Undo));
        assert_eq!(board.deck().len(), 2);
    }

    #[test]
    fn test_remove_slide_renumbers_persisted_ops() {
        let pen = StrokeStyle::pen(RgbColor::RED, 3.0);
        let black = StrokeStyle::pen(RgbColor::BLACK, 3.0);
        let ops = vec![
            DrawOp::new(Point::new(2.0, 5.0), black, 0, 1, true),
            DrawOp::new(Point::new(38.0, 5.0), black, 0, 2, false),
            DrawOp::new(Point::new(2.0, 20.0), pen, 1, 3, true),
            DrawOp::new(Point::new(38.0, 20.0), pen, 1, 4, false),
            DrawOp::new(Point::new(2.0, 35.0), black, 3, 5, true),
            DrawOp::new(Point::new(38.0, 35.0), black, 3, 6, false),
        ];
        let Fixture {
            mut board, start, ..
        } = fixture_with(config(SyncStrategy::Incremental), Some(History::Ops(ops.clone())));
        assert_eq!(board.deck().len(), 4);

        assert!(board.remove_slide(Some(0), start).unwrap());
        let slides: Vec<SlideIndex> = board.persisted_ops().iter().map(|op| op.slide).collect();
        assert_eq!(slides, vec![0, 0, 2, 2]);

        let document = board.export_deck().unwrap();
        assert_eq!(document.len(), 3);
        assert_eq!(document.pages()[0].image.get_pixel(20, 20).0, RED);
        // The slide that never had ops stays blank.
        assert!(is_blank(&document.pages()[1]));
        assert_eq!(document.pages()[2].image.get_pixel(20, 35).0, [0, 0, 0, 255]);

        // Undo restores the op list along with the deck.
        assert!(board.undo().unwrap());
        assert_eq!(board.deck().len(), 4);
        assert_eq!(board.persisted_ops(), &ops[..]);
    }

    #[test]
    fn test_exit_sends_deck_after_slide_changes() {
        let Fixture {
            mut board,
            transport,
            start,
            ..
        } = fixture(SyncStrategy::FullSnapshot);
        stroke(&mut board, &[(1.0, 1.0), (9.0, 9.0)], start);
        board.add_slide(start).unwrap();
        board.add_slide(start).unwrap();
        assert!(board.remove_slide(Some(0), start).unwrap());
        board.exit_immersive(start);

        assert_eq!(board.deck().len(), 2);
        match transport.log().sent.last() {
            Some(ClientMessage::Scene(scenes)) => assert_eq!(scenes.len(), 2),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_clear_survives_replay() {
        let Fixture {
            mut board,
            transport,
            start,
            ..
        } = fixture(SyncStrategy::Incremental);
        board.set_color(RgbColor::RED);
        stroke(&mut board, &[(2.0, 5.0), (38.0, 30.0)], start);
        board.clear(start);
        assert!(board.surface().canvas().is_blank());
        board.exit_immersive(start);

        let sent = transport.sent_ops();
        assert_eq!(sent.len(), 4);
        assert!(sent[2..].iter().all(|op| op.tool == Tool::Eraser));
        let document = export_history(History::Ops(sent), ReplayEngine::new(40, 40)).unwrap();
        assert!(is_blank(&document.pages()[0]));
    }

    #[test]
    fn test_full_snapshot_sends_scene_map() {
        let Fixture {
            mut board,
            transport,
            start,
            ..
        } = fixture(SyncStrategy::FullSnapshot);
        stroke(&mut board, &[(1.0, 1.0), (9.0, 9.0)], start);

        let log = transport.log();
        assert_eq!(log.sent.len(), 1);
        match &log.sent[0] {
            ClientMessage::Scene(scenes) => {
                assert_eq!(scenes.len(), 1);
                assert_eq!(scenes[&0].len(), 1);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_deck_persisted_locally() {
        let config = config(SyncStrategy::Incremental);
        let store = Arc::new(MemoryBackingStore::new());
        let storage = Arc::new(MemoryStorage::new());
        let session = Whiteboard::<RecordingTransport>::create_session(store.as_ref(), &config)
            .unwrap();
        let key = session.storage_key();
        let start = Instant::now();

        let mut board = Whiteboard::new(
            config.clone(),
            session.clone(),
            store.clone(),
            RecordingTransport::new(),
            start,
        )
        .with_storage(storage.clone());
        board.enter_immersive(start).unwrap();
        board.add_slide(start).unwrap();
        board.exit_immersive(start);

        let saved = pollster::block_on(storage.load(&key)).unwrap();
        assert_eq!(saved.len(), 2);
        assert!(matches!(saved.slide(0), Some(SlideContent::Raster(_))));

        // A blank remote history falls back to the locally saved deck.
        let mut reopened = Whiteboard::new(config, session, store, RecordingTransport::new(), start)
            .with_storage(storage);
        reopened.enter_immersive(start).unwrap();
        assert_eq!(reopened.deck().len(), 2);
        assert_eq!(reopened.deck().current_index(), 1);
    }

    #[test]
    fn test_status_side_channel() {
        let Fixture { board, store, .. } = fixture(SyncStrategy::Incremental);
        board.update_status("5", "completed").unwrap();
        assert_eq!(store.status("5").as_deref(), Some("completed"));
    }

    #[test]
    fn test_export_history_without_surface() {
        let pen = StrokeStyle::pen(RgbColor::RED, 2.0);
        let ops = vec![
            DrawOp::new(Point::new(0.0, 4.0), pen, 2, 1, true),
            DrawOp::new(Point::new(8.0, 4.0), pen, 2, 2, false),
        ];
        let document = export_history(History::Ops(ops), ReplayEngine::new(8, 8)).unwrap();
        assert_eq!(document.len(), 3);
        assert!(is_blank(&document.pages()[0]));
        assert_eq!(document.pages()[2].image.get_pixel(4, 4).0, RED);
    }

    #[test]
    fn test_pointer_ignored_before_entry() {
        let config = config(SyncStrategy::Incremental);
        let store = Arc::new(MemoryBackingStore::new());
        let session = Session::new("s", "7", "t");
        let mut board = Whiteboard::new(config, session, store, RecordingTransport::new(), Instant::now());
        board.pointer_down(Point::new(1.0, 1.0), Instant::now());
        board.pointer_move(Point::new(5.0, 5.0), Instant::now());
        assert!(board.surface().canvas().is_blank());
        assert_eq!(board.lifecycle(), Lifecycle::Idle);
    }
}
