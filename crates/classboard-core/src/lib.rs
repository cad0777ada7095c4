//! Classboard Core Library
//!
//! Platform-agnostic data model and sync logic for the classroom whiteboard:
//! draw ops, slide decks, undo history, the draw buffer and the sync channel.

pub mod buffer;
pub mod channel;
pub mod coords;
pub mod deck;
pub mod history;
pub mod op;
pub mod remote;
pub mod scene;
pub mod session;
pub mod storage;
pub mod surface;
pub mod sync;

pub use buffer::{DrawBuffer, Flush, FlushTrigger, SnapshotPolicy};
pub use channel::{ChannelStats, SendOutcome, SyncChannel};
pub use coords::{SurfaceGeometry, to_canvas_space};
pub use deck::{MAX_SLIDES, SlideContent, SlideDeck, remove_slide_ops};
pub use history::{HistorySnapshot, HistoryStack};
pub use op::{DrawOp, OpClock, RgbColor, SlideIndex, StrokeStyle, Tool};
pub use remote::{BackingStore, History, HttpBackingStore, MemoryBackingStore, RemoteError};
pub use scene::{Element, RasterSnapshot, Scene};
pub use session::Session;
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
pub use surface::{Surface, SurfaceError};
pub use sync::{ClientMessage, ConnectionState, NativeWebSocket, SyncError, SyncEvent, Transport};
