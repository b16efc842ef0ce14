// ── Abstract event vocabulary ─────────────────────────────────────────────────
//
// Native messages are decoded by the backends into `NativeMessage`s; the
// window shells turn those into the `Event`s defined here and hand them to
// the application's `EventHandler`.

use bitflags::bitflags;

/// Milliseconds on the backend's monotonic clock.
pub type Timestamp = u64;

bitflags! {
    /// Keyboard modifiers and held mouse buttons at the time of an event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u32 {
        const SHIFT   = 1 << 0;
        const CONTROL = 1 << 1;
        const ALT     = 1 << 2;
        const LEFT    = 1 << 8;
        const MIDDLE  = 1 << 9;
        const RIGHT   = 1 << 10;
        const BUTTON4 = 1 << 11;
        const BUTTON5 = 1 << 12;

        /// Every held-button bit.  These only make sense for the window that
        /// owns the pointer capture.
        const BUTTONS = Self::LEFT.bits()
            | Self::MIDDLE.bits()
            | Self::RIGHT.bits()
            | Self::BUTTON4.bits()
            | Self::BUTTON5.bits();
    }
}

/// Mouse buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    Button4,
    Button5,
}

impl MouseButton {
    /// The held-button bit matching this button.
    pub fn modifier(self) -> Modifiers {
        match self {
            Self::Left => Modifiers::LEFT,
            Self::Middle => Modifiers::MIDDLE,
            Self::Right => Modifiers::RIGHT,
            Self::Button4 => Modifiers::BUTTON4,
            Self::Button5 => Modifiers::BUTTON5,
        }
    }
}

/// Scroll wheel direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Decoded key identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Backspace,
    Tab,
    Return,
    CapsLock,
    Escape,
    PageUp,
    PageDown,
    End,
    Home,
    Left,
    Up,
    Right,
    Down,
    Select,
    Print,
    Execute,
    Insert,
    Delete,
    Help,
    /// Keypad digit 0–9.
    Keypad(u8),
    KeypadMultiply,
    KeypadAdd,
    KeypadSeparator,
    KeypadSubtract,
    KeypadDecimal,
    KeypadDivide,
    /// Function key F1–F24.
    F(u8),
    NumLock,
    ScrollLock,
    Char(char),
    Unknown,
}

/// What an event's `code` field refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EventCode {
    #[default]
    None,
    Button(MouseButton),
    Key(KeyCode),
    Scroll(ScrollDirection),
}

/// Event kinds delivered to an `EventHandler`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EventKind {
    #[default]
    Unknown,
    Move,
    Resize,
    Show,
    Hide,
    FocusIn,
    FocusOut,
    MouseIn,
    MouseOut,
    MouseDown,
    MouseUp,
    MouseMove,
    MouseClick,
    MouseDoubleClick,
    MouseTripleClick,
    MouseScroll,
    KeyDown,
    KeyUp,
    Redraw,
    Close,
    DragRequest,
}

impl EventKind {
    /// Kinds produced by the click synthesizer.
    pub fn is_click(self) -> bool {
        matches!(
            self,
            Self::MouseClick | Self::MouseDoubleClick | Self::MouseTripleClick
        )
    }
}

/// A tagged event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Event {
    pub kind: EventKind,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    pub code: EventCode,
    pub state: Modifiers,
    pub time: Timestamp,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn at(kind: EventKind, left: i32, top: i32, time: Timestamp) -> Self {
        Self {
            kind,
            left,
            top,
            time,
            ..Self::default()
        }
    }

    pub fn with_code(mut self, code: EventCode) -> Self {
        self.code = code;
        self
    }

    pub fn with_time(mut self, time: Timestamp) -> Self {
        self.time = time;
        self
    }

    pub fn with_state(mut self, state: Modifiers) -> Self {
        self.state = state;
        self
    }
}

/// Receives events for one window.
///
/// Shells keep only a weak reference to their handler; the embedding
/// application owns it.  Handlers run on the UI thread inside message
/// dispatch and may create, hide or destroy windows, but must not block.
pub trait EventHandler {
    fn handle_event(&self, event: &Event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buttons_mask_excludes_keyboard_modifiers() {
        let state = Modifiers::SHIFT | Modifiers::LEFT | Modifiers::RIGHT;
        assert_eq!(state - Modifiers::BUTTONS, Modifiers::SHIFT);
    }

    #[test]
    fn click_kinds() {
        assert!(EventKind::MouseDoubleClick.is_click());
        assert!(!EventKind::MouseUp.is_click());
    }
}
