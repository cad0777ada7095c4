//! Classboard application layer
//!
//! Configuration, commands and the whiteboard controller that ties the
//! drawing surface, the slide deck and the sync channel together.

pub mod commands;
pub mod config;
pub mod whiteboard;

pub use commands::{Command, Shortcut, ShortcutRegistry, UndoInterceptor, UndoTarget};
pub use config::{AppConfig, ConfigError, SyncStrategy};
pub use whiteboard::{
    Dispatch, ExitOutcome, Lifecycle, Whiteboard, WhiteboardError, deck_from_history,
    export_history,
};
