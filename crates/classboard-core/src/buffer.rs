//! Local draw buffer and the flush policies that drain it.

use crate::op::DrawOp;
use std::time::{Duration, Instant};

/// Number of buffered ops that triggers an immediate flush.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 20;

/// Period of the flush timer.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// What caused a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// Buffer reached the size threshold.
    Size,
    /// Periodic timer fired with a non-empty buffer.
    Timer,
    /// Slide switch, teardown or channel close.
    Forced,
}

/// Ops drained from the buffer in one step.
#[derive(Debug, Clone, PartialEq)]
pub struct Flush {
    pub ops: Vec<DrawOp>,
    pub trigger: FlushTrigger,
}

/// Accumulates ops between flushes.
///
/// Draining always takes the whole buffer in one step, so a timer flush and a
/// size flush can never both observe the same op.
#[derive(Debug)]
pub struct DrawBuffer {
    ops: Vec<DrawOp>,
    threshold: usize,
    interval: Duration,
    last_tick: Instant,
}

impl DrawBuffer {
    pub fn new(now: Instant) -> Self {
        Self::with_policy(DEFAULT_FLUSH_THRESHOLD, DEFAULT_FLUSH_INTERVAL, now)
    }

    pub fn with_policy(threshold: usize, interval: Duration, now: Instant) -> Self {
        Self {
            ops: Vec::with_capacity(threshold),
            threshold: threshold.max(1),
            interval,
            last_tick: now,
        }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Buffer an op; drains the buffer if the size threshold is reached.
    pub fn append(&mut self, op: DrawOp) -> Option<Flush> {
        self.ops.push(op);
        if self.ops.len() >= self.threshold {
            Some(Flush {
                ops: self.flush(),
                trigger: FlushTrigger::Size,
            })
        } else {
            None
        }
    }

    /// Advance the periodic timer; drains a non-empty buffer once per period.
    pub fn tick(&mut self, now: Instant) -> Option<Flush> {
        if now.saturating_duration_since(self.last_tick) < self.interval {
            return None;
        }
        self.last_tick = now;
        if self.ops.is_empty() {
            return None;
        }
        Some(Flush {
            ops: self.flush(),
            trigger: FlushTrigger::Timer,
        })
    }

    /// Drain and return everything buffered, leaving the buffer empty.
    pub fn flush(&mut self) -> Vec<DrawOp> {
        std::mem::take(&mut self.ops)
    }

    /// Forced drain (slide switch, teardown).
    pub fn force(&mut self) -> Flush {
        Flush {
            ops: self.flush(),
            trigger: FlushTrigger::Forced,
        }
    }
}

/// Decides when the full-snapshot strategy resends the deck.
///
/// A send is due once at least one new element exists, or once the interval
/// has elapsed since the previous send.
#[derive(Debug)]
pub struct SnapshotPolicy {
    interval: Duration,
    last_sent: Instant,
    pending_elements: usize,
}

impl SnapshotPolicy {
    pub fn new(now: Instant) -> Self {
        Self::with_interval(DEFAULT_FLUSH_INTERVAL, now)
    }

    pub fn with_interval(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last_sent: now,
            pending_elements: 0,
        }
    }

    /// Record a local edit that produced `new_elements` elements.
    pub fn note_edit(&mut self, new_elements: usize) {
        self.pending_elements += new_elements;
    }

    pub fn pending_elements(&self) -> usize {
        self.pending_elements
    }

    pub fn should_send(&self, now: Instant) -> bool {
        self.pending_elements >= 1
            || now.saturating_duration_since(self.last_sent) >= self.interval
    }

    pub fn mark_sent(&mut self, now: Instant) {
        self.last_sent = now;
        self.pending_elements = 0;
    }
}
