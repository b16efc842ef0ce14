// ── Safety policy ────────────────────────────────────────────────────────────
// Unsafe code is forbidden everywhere except `platform::win32` (Win32 FFI).
// Each unsafe block there MUST carry a `// SAFETY:` comment.
#![deny(unsafe_code)]

//! Windowing backend for Win32.
//!
//! A [`Display`] owns the connection to the window system: it creates
//! [`WindowShell`]s, routes input between them through event grabs, runs the
//! main loop with its timed tasks and keeps the font registry.  Each shell
//! renders through an offscreen [`Surface`] that is blitted to the native
//! window on paint.
//!
//! The core is platform-neutral.  [`platform::HeadlessBackend`] simulates a
//! window system in memory (tests, non-Windows hosts); the Win32 backend is
//! built on Windows only.

pub mod config;
pub mod display;
pub mod error;
pub mod event;
pub mod fonts;
pub mod geometry;
pub mod platform;
pub mod router;
pub mod surface;
pub mod tasks;
pub mod window;

pub use config::DisplayConfig;
pub use display::{Display, PreparedDispatch};
pub use error::{Result, WsError};
pub use event::{
    Event, EventCode, EventHandler, EventKind, KeyCode, Modifiers, MouseButton, ScrollDirection,
    Timestamp,
};
pub use geometry::{Rect, Size, SizeLimit};
pub use platform::{MousePointer, NativeHandle};
pub use router::{GrabGroup, WindowId};
pub use surface::{Color, Fill, Gradient, LineCap, Surface};
pub use tasks::TaskId;
pub use window::{BorderStyle, DragAction, ShellKind, WindowActions, WindowShell};
