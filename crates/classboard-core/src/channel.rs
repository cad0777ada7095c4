//! Sync channel: owns a transport for one session and sends flushes over it.

use crate::op::{DrawOp, SlideIndex};
use crate::scene::Scene;
use crate::sync::{ClientMessage, ConnectionState, SyncError, SyncEvent, Transport};
use std::collections::BTreeMap;

/// Result of handing a flush to the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Message queued on an open channel.
    Sent,
    /// Nothing to send.
    Empty,
    /// Channel not open or send failed; the payload is gone.
    Dropped { ops: usize },
}

/// Counters for observability of the fire-and-forget channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub messages_sent: usize,
    pub ops_sent: usize,
    pub messages_dropped: usize,
    pub ops_dropped: usize,
}

/// A transport bound to a session's channel URL.
pub struct SyncChannel<T: Transport> {
    transport: T,
    url: Option<String>,
    stats: ChannelStats,
}

impl<T: Transport> SyncChannel<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            url: None,
            stats: ChannelStats::default(),
        }
    }

    /// Open the channel. Reopening an open channel is a no-op.
    pub fn open(&mut self, url: &str) -> Result<(), SyncError> {
        if self.transport.is_open() {
            log::debug!("Sync channel already open");
            return Ok(());
        }
        self.transport.open(url)?;
        self.url = Some(url.to_string());
        log::info!("Sync channel opening");
        Ok(())
    }

    /// Close the channel. Closing a closed channel is a no-op.
    pub fn close(&mut self) {
        if self.transport.is_open() {
            log::info!("Sync channel closing");
        }
        self.transport.close();
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn poll_events(&mut self) -> Vec<SyncEvent> {
        self.transport.poll_events()
    }

    /// Send one buffer flush as an incremental `draw` message.
    pub fn send_ops(&mut self, ops: Vec<DrawOp>) -> SendOutcome {
        if ops.is_empty() {
            return SendOutcome::Empty;
        }
        let count = ops.len();
        self.dispatch(ClientMessage::Draw(ops), count)
    }

    /// Send the whole deck as a full-snapshot `scene` message.
    pub fn send_scenes(&mut self, scenes: BTreeMap<SlideIndex, Scene>) -> SendOutcome {
        self.dispatch(ClientMessage::Scene(scenes), 0)
    }

    fn dispatch(&mut self, message: ClientMessage, ops: usize) -> SendOutcome {
        if !self.transport.is_open() {
            log::warn!("Sync channel not open; dropping flush of {} ops", ops);
            return self.dropped(ops);
        }
        match self.transport.send(&message) {
            Ok(()) => {
                self.stats.messages_sent += 1;
                self.stats.ops_sent += ops;
                SendOutcome::Sent
            }
            Err(e) => {
                log::error!("Sync channel send failed, dropping {} ops: {}", ops, e);
                self.dropped(ops)
            }
        }
    }

    fn dropped(&mut self, ops: usize) -> SendOutcome {
        self.stats.messages_dropped += 1;
        self.stats.ops_dropped += ops;
        SendOutcome::Dropped { ops }
    }
}

/// In-memory transport used by tests across the workspace.
pub mod testing {
    use super::*;
    use crate::sync::CloseHandler;
    use std::sync::{Arc, Mutex};

    /// Shared log of what a [`RecordingTransport`] saw.
    #[derive(Debug, Default)]
    pub struct TransportLog {
        pub opened: Vec<String>,
        pub sent: Vec<ClientMessage>,
        pub closes: usize,
    }

    /// Transport double that records traffic instead of using the network.
    #[derive(Clone, Default)]
    pub struct RecordingTransport {
        log: Arc<Mutex<TransportLog>>,
        state: Arc<Mutex<Option<ConnectionState>>>,
        fail_sends: bool,
        on_close: Arc<Mutex<Option<CloseHandler>>>,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// A transport whose sends always fail.
        pub fn failing() -> Self {
            Self {
                fail_sends: true,
                ..Self::default()
            }
        }

        pub fn log(&self) -> std::sync::MutexGuard<'_, TransportLog> {
            self.log.lock().unwrap_or_else(|e| e.into_inner())
        }

        /// Simulate the remote side dropping the connection.
        pub fn drop_connection(&self) {
            *self.state.lock().unwrap_or_else(|e| e.into_inner()) =
                Some(ConnectionState::Disconnected);
        }

        /// All ops sent in `draw` messages, in send order.
        pub fn sent_ops(&self) -> Vec<DrawOp> {
            self.log()
                .sent
                .iter()
                .filter_map(|m| match m {
                    ClientMessage::Draw(ops) => Some(ops.clone()),
                    ClientMessage::Scene(_) => None,
                })
                .flatten()
                .collect()
        }
    }

    impl Transport for RecordingTransport {
        fn open(&mut self, url: &str) -> Result<(), SyncError> {
            self.log().opened.push(url.to_string());
            *self.state.lock().unwrap_or_else(|e| e.into_inner()) =
                Some(ConnectionState::Connected);
            Ok(())
        }

        fn send(&mut self, message: &ClientMessage) -> Result<(), SyncError> {
            if self.fail_sends {
                return Err(SyncError::Send("simulated failure".to_string()));
            }
            if !self.is_open() {
                return Err(SyncError::NotConnected);
            }
            self.log().sent.push(message.clone());
            Ok(())
        }

        fn close(&mut self) {
            if !self.is_open() {
                return;
            }
            *self.state.lock().unwrap_or_else(|e| e.into_inner()) =
                Some(ConnectionState::Disconnected);
            self.log().closes += 1;
            if let Some(handler) = self
                .on_close
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .as_mut()
            {
                handler();
            }
        }

        fn poll_events(&mut self) -> Vec<SyncEvent> {
            Vec::new()
        }

        fn on_close(&mut self, handler: CloseHandler) {
            *self.on_close.lock().unwrap_or_else(|e| e.into_inner()) = Some(handler);
        }

        fn state(&self) -> ConnectionState {
            self.state
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .unwrap_or(ConnectionState::Disconnected)
        }
    }
}
