//! Whiteboard commands, their keyboard shortcuts, and undo routing.

use classboard_core::{RgbColor, SlideIndex, Tool};
use std::time::{Duration, Instant};

/// An action requested from the keyboard or toolbar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Undo,
    Redo,
    AddSlide,
    /// Remove a slide (default: the current one).
    RemoveSlide(Option<SlideIndex>),
    GotoSlide(SlideIndex),
    NextSlide,
    PreviousSlide,
    Clear,
    SetTool(Tool),
    SetColor(RgbColor),
    SetSize(f64),
    ExitImmersive,
}

/// A keyboard shortcut definition.
#[derive(Debug, Clone)]
pub struct Shortcut {
    pub key: &'static str,
    pub ctrl: bool,
    pub shift: bool,
    pub command: Command,
    pub description: &'static str,
}

impl Shortcut {
    pub const fn new(
        key: &'static str,
        ctrl: bool,
        shift: bool,
        command: Command,
        description: &'static str,
    ) -> Self {
        Self {
            key,
            ctrl,
            shift,
            command,
            description,
        }
    }

    /// Format the shortcut for display (e.g., "Ctrl+Z").
    pub fn format(&self) -> String {
        let mut parts = Vec::new();
        if self.ctrl {
            parts.push("Ctrl");
        }
        if self.shift {
            parts.push("Shift");
        }
        parts.push(self.key);
        parts.join("+")
    }
}

/// Registry of all keyboard shortcuts.
pub struct ShortcutRegistry;

impl ShortcutRegistry {
    pub fn all() -> Vec<Shortcut> {
        vec![
            Shortcut::new("Z", true, false, Command::Undo, "Undo"),
            Shortcut::new("Z", true, true, Command::Redo, "Redo"),
            Shortcut::new("Y", true, false, Command::Redo, "Redo"),
            Shortcut::new("N", true, false, Command::AddSlide, "Add slide"),
            Shortcut::new("Delete", true, false, Command::RemoveSlide(None), "Remove slide"),
            Shortcut::new("PageDown", false, false, Command::NextSlide, "Next slide"),
            Shortcut::new("PageUp", false, false, Command::PreviousSlide, "Previous slide"),
            Shortcut::new("P", false, false, Command::SetTool(Tool::Pen), "Pen"),
            Shortcut::new("E", false, false, Command::SetTool(Tool::Eraser), "Eraser"),
            Shortcut::new("Backspace", true, true, Command::Clear, "Clear slide"),
            Shortcut::new("Escape", false, false, Command::ExitImmersive, "Exit full screen"),
        ]
    }

    /// Resolve a key press. Keys match case-insensitively.
    pub fn lookup(key: &str, ctrl: bool, shift: bool) -> Option<Command> {
        Self::all()
            .into_iter()
            .find(|s| s.key.eq_ignore_ascii_case(key) && s.ctrl == ctrl && s.shift == shift)
            .map(|s| s.command)
    }

    /// Print all shortcuts to console.
    pub fn print_all() {
        println!("\n=== Keyboard Shortcuts ===");
        for shortcut in Self::all() {
            println!("  {:20} {}", shortcut.format(), shortcut.description);
        }
        println!();
    }
}

/// Which undo domain handles an undo request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoTarget {
    /// The drawing widget's own undo.
    Widget,
    /// The whiteboard history stack.
    History,
}

/// Suppresses the drawing widget's undo for a short window after a slide
/// removal, so the widget cannot resurrect elements of a removed slide.
#[derive(Debug, Clone)]
pub struct UndoInterceptor {
    window: Duration,
    armed_at: Option<Instant>,
}

impl UndoInterceptor {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            armed_at: None,
        }
    }

    /// Start the window (called right after a slide removal).
    pub fn arm(&mut self, now: Instant) {
        self.armed_at = Some(now);
    }

    pub fn is_active(&self, now: Instant) -> bool {
        self.armed_at
            .is_some_and(|at| now.saturating_duration_since(at) < self.window)
    }

    /// Route an undo. Without a widget undo, history always handles it.
    pub fn route(&mut self, now: Instant, widget_has_undo: bool) -> UndoTarget {
        if !widget_has_undo {
            return UndoTarget::History;
        }
        if self.is_active(now) {
            log::debug!("Intercepted widget undo after slide removal");
            return UndoTarget::History;
        }
        self.armed_at = None;
        UndoTarget::Widget
    }
}
