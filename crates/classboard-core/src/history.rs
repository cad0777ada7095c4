//! Bounded undo/redo history of surface and deck snapshots.

use crate::deck::SlideDeck;
use crate::op::{DrawOp, SlideIndex};
use crate::scene::RasterSnapshot;
use std::collections::VecDeque;

/// Maximum number of history entries to keep.
pub const DEFAULT_HISTORY_CAP: usize = 50;

/// An immutable capture restored by undo/redo.
#[derive(Debug, Clone, PartialEq)]
pub enum HistorySnapshot {
    /// Raster image of one slide.
    Raster {
        slide: SlideIndex,
        image: RasterSnapshot,
    },
    /// The whole deck, including its current index, with the slide-tagged
    /// op list that was persisted alongside it.
    Deck {
        deck: SlideDeck,
        persisted: Vec<DrawOp>,
    },
}

/// Cursor-based history stack.
///
/// Entries before the cursor are undo targets, entries from the cursor on
/// are redo targets. Overflow drops the oldest entries.
#[derive(Debug)]
pub struct HistoryStack {
    entries: VecDeque<HistorySnapshot>,
    cursor: usize,
    cap: usize,
}

impl Default for HistoryStack {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAP)
    }
}

impl HistoryStack {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            entries: VecDeque::with_capacity(cap + 1),
            cursor: 0,
            cap,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistorySnapshot> {
        self.entries.iter()
    }

    /// Record the state before a change. Discards any redo entries.
    pub fn push(&mut self, snapshot: HistorySnapshot) {
        self.entries.truncate(self.cursor);
        self.entries.push_back(snapshot);
        self.trim();
        self.cursor = self.entries.len();
    }

    /// Step back one entry. `live` is the state being replaced, kept so a
    /// following redo can return to it.
    pub fn undo(&mut self, live: HistorySnapshot) -> Option<HistorySnapshot> {
        if self.cursor == 0 {
            return None;
        }
        if self.cursor == self.entries.len() {
            self.entries.push_back(live);
            if self.trim() {
                self.cursor -= 1;
            }
        }
        self.cursor -= 1;
        self.entries.get(self.cursor).cloned()
    }

    /// Step forward one entry.
    pub fn redo(&mut self) -> Option<HistorySnapshot> {
        if self.cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor += 1;
        self.entries.get(self.cursor).cloned()
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }

    /// Drop the oldest entry if over capacity. Returns true if one was dropped.
    fn trim(&mut self) -> bool {
        if self.entries.len() > self.cap {
            self.entries.pop_front();
            true
        } else {
            false
        }
    }
}
