// ── Platform abstraction layer ────────────────────────────────────────────────
//
// The seam between the window-system-neutral core and the OS.  No `unsafe`
// lives here; all Win32 FFI is confined to the `win32` sub-module and never
// leaks outward.
//
// Direction of flow:
//   core → OS    through the `NativeBackend` trait (create, show, blit, …)
//   OS → core    through a `MessageSink` that receives decoded
//                `NativeMessage`s keyed by native handle.

use std::{path::PathBuf, rc::Weak};

use crate::{
    error::Result,
    event::{KeyCode, Modifiers, MouseButton, ScrollDirection, Timestamp},
    geometry::{Insets, PosChange, Rect, Size},
};

pub mod headless;
#[cfg(windows)]
pub mod win32;

pub use headless::HeadlessBackend;

// ── Identity ──────────────────────────────────────────────────────────────────

/// An OS window handle, stored as its integer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle(pub isize);

/// Process-wide context handed to the backend at startup.
///
/// Holds the module handle the window class is registered against.  Created
/// once by the application and dropped with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessContext {
    module: isize,
}

impl ProcessContext {
    /// Context for the module containing this code (the .exe, or the DLL
    /// that links winws when embedded in a host).
    #[cfg(windows)]
    pub fn current() -> Result<Self> {
        Ok(Self {
            module: win32::current_module()?,
        })
    }

    /// Context with no module, for backends that do not need one.
    pub fn detached() -> Self {
        Self { module: 0 }
    }

    pub fn module(&self) -> isize {
        self.module
    }
}

// ── Decoded messages ──────────────────────────────────────────────────────────

/// A native window-system notification, decoded.  Pointer coordinates are
/// client-relative.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeMessage {
    MouseMove {
        left: i32,
        top: i32,
        state: Modifiers,
    },
    MouseLeave,
    ButtonDown {
        button: MouseButton,
        left: i32,
        top: i32,
        state: Modifiers,
    },
    ButtonUp {
        button: MouseButton,
        left: i32,
        top: i32,
        state: Modifiers,
    },
    Scroll {
        direction: ScrollDirection,
        left: i32,
        top: i32,
        state: Modifiers,
    },
    KeyDown {
        key: KeyCode,
        state: Modifiers,
    },
    KeyUp {
        key: KeyCode,
        state: Modifiers,
    },
    /// New client rectangle, relative to the parent's client area (screen
    /// coordinates for top-level windows).
    Resized(Rect),
    Paint,
    FocusIn,
    FocusOut,
    Shown,
    Hidden,
    /// The user asked to close the window.
    Close,
    /// The OS destroyed the handle.
    Destroyed,
    DropFiles {
        left: i32,
        top: i32,
        files: Vec<PathBuf>,
    },
}

/// Receives decoded messages from the backend.
pub trait MessageSink {
    /// Deliver `message` for `handle`.  Returns `false` if no window claims
    /// the handle, in which case the backend applies its default processing.
    fn deliver(&self, handle: NativeHandle, message: NativeMessage, time: Timestamp) -> bool;
}

// ── Creation and presentation ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStyle {
    /// Resizable top-level window with a frame.
    TopLevel,
    /// Borderless child of `CreateParams::parent`.
    Child,
}

#[derive(Debug, Clone)]
pub struct CreateParams<'a> {
    pub class: &'a str,
    pub caption: &'a str,
    pub style: WindowStyle,
    pub parent: Option<NativeHandle>,
    /// Client rectangle; the backend adds the frame.
    pub rect: Rect,
}

/// A monitor's rectangle in virtual-screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Monitor {
    pub rect: Rect,
    pub primary: bool,
}

/// Cursor shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MousePointer {
    #[default]
    Arrow,
    None,
    Hand,
    Cross,
    IBeam,
    Wait,
    AppStarting,
    Help,
    NoDrop,
    SizeAll,
    SizeNS,
    SizeWE,
    SizeNESW,
    SizeNWSE,
    UpArrow,
}

/// Native drawing context for one paint cycle, valid between
/// `begin_paint` and `end_paint`.
#[derive(Debug, PartialEq, Eq)]
pub struct PaintContext {
    pub handle: NativeHandle,
    pub(crate) dc: isize,
}

/// Channel masks of the frame bitmap: 32 bits per pixel, A-R-G-B from the
/// most significant byte down.
pub const ALPHA_MASK: u32 = 0xff00_0000;
pub const RED_MASK: u32 = 0x00ff_0000;
pub const GREEN_MASK: u32 = 0x0000_ff00;
pub const BLUE_MASK: u32 = 0x0000_00ff;

/// A rendered frame ready for presentation, rows top-down.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub width: i32,
    pub height: i32,
    pub pixels: &'a [u32],
}

impl Frame<'_> {
    /// Bitmap header dimensions.  A negative height marks the rows as
    /// top-down; a zero dimension is written as 1 (width) or -1 (height).
    pub fn header_size(&self) -> (i32, i32) {
        let width = if self.width == 0 { 1 } else { self.width };
        let height = if self.height == 0 { -1 } else { -self.height };
        (width, height)
    }
}

// ── Backend trait ─────────────────────────────────────────────────────────────

/// Everything the core asks of the window system.
///
/// Methods take `&self` and may re-enter the core: a real window system
/// sends some notifications synchronously (showing a window sends `Shown`
/// before `show_window` returns), so callers must not hold borrows of their
/// own state across these calls.
pub trait NativeBackend {
    /// Milliseconds on a monotonic clock.
    fn now(&self) -> Timestamp;

    /// Install the receiver of decoded messages.
    fn attach(&self, sink: Weak<dyn MessageSink>);

    fn create_window(&self, params: &CreateParams<'_>) -> Result<NativeHandle>;
    fn destroy_window(&self, handle: NativeHandle) -> Result<()>;

    fn show_window(&self, handle: NativeHandle) -> Result<()>;
    fn hide_window(&self, handle: NativeHandle) -> Result<()>;
    fn raise_and_focus(&self, handle: NativeHandle) -> Result<()>;

    /// Apply a new outer rectangle.  `change` says which parts differ from
    /// the current one so the backend can skip the rest.
    fn set_window_pos(&self, handle: NativeHandle, outer: Rect, change: PosChange) -> Result<()>;

    /// Difference between the outer and the client rectangle.
    fn frame_insets(&self, handle: NativeHandle) -> Insets;

    /// Screen position of the client area's top-left corner.
    fn screen_origin(&self, handle: NativeHandle) -> (i32, i32);

    /// Current client rectangle as `Resized` would report it.
    fn client_rect(&self, handle: NativeHandle) -> Option<Rect>;

    fn set_capture(&self, handle: NativeHandle);
    fn release_capture(&self);
    fn capture(&self) -> Option<NativeHandle>;

    /// Ask for a `MouseLeave` when the pointer leaves `handle`.
    fn track_mouse_leave(&self, handle: NativeHandle);

    fn set_cursor(&self, pointer: MousePointer);

    /// Schedule a `Paint` for the whole client area.
    fn invalidate(&self, handle: NativeHandle);

    fn begin_paint(&self, handle: NativeHandle) -> Option<PaintContext>;
    /// Clip child windows out of the paint region.
    fn exclude_children(&self, ctx: &PaintContext);
    /// Copy `frame` into the paint context, scaled to `dest`.
    fn blit(&self, ctx: &PaintContext, frame: &Frame<'_>, dest: Size) -> Result<()>;
    fn end_paint(&self, ctx: PaintContext);

    fn set_caption(&self, handle: NativeHandle, caption: &str) -> Result<()>;
    fn set_focus(&self, handle: NativeHandle) -> Result<()>;
    fn accept_files(&self, handle: NativeHandle, accept: bool);

    fn monitors(&self) -> Vec<Monitor>;
    fn cursor_position(&self) -> (i32, i32);

    /// Block for at most `timeout_ms` waiting for native messages, then
    /// deliver everything that is pending.
    fn wait_events(&self, timeout_ms: u64) -> Result<()>;

    /// Release process-wide backend resources.
    fn shutdown(&self);
}

// ── Backend selection ─────────────────────────────────────────────────────────

/// The concrete backends.  Only one is live per display.
pub enum Backend {
    Headless(HeadlessBackend),
    #[cfg(windows)]
    Win32(win32::Win32Backend),
}

impl Backend {
    /// The window system of the build target.
    #[cfg(windows)]
    pub fn native(ctx: &ProcessContext, class: &str) -> Result<Self> {
        Ok(Self::Win32(win32::Win32Backend::new(ctx, class)?))
    }

    /// The window system of the build target.  Targets without a native
    /// backend run headless.
    #[cfg(not(windows))]
    pub fn native(_ctx: &ProcessContext, _class: &str) -> Result<Self> {
        log::warn!("no native window system backend on this target; running headless");
        Ok(Self::Headless(HeadlessBackend::new()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Headless(_) => "headless",
            #[cfg(windows)]
            Self::Win32(_) => "win32",
        }
    }
}

macro_rules! delegate {
    ($self:ident, $b:ident => $call:expr) => {
        match $self {
            Backend::Headless($b) => $call,
            #[cfg(windows)]
            Backend::Win32($b) => $call,
        }
    };
}

impl NativeBackend for Backend {
    fn now(&self) -> Timestamp {
        delegate!(self, b => b.now())
    }

    fn attach(&self, sink: Weak<dyn MessageSink>) {
        delegate!(self, b => b.attach(sink))
    }

    fn create_window(&self, params: &CreateParams<'_>) -> Result<NativeHandle> {
        delegate!(self, b => b.create_window(params))
    }

    fn destroy_window(&self, handle: NativeHandle) -> Result<()> {
        delegate!(self, b => b.destroy_window(handle))
    }

    fn show_window(&self, handle: NativeHandle) -> Result<()> {
        delegate!(self, b => b.show_window(handle))
    }

    fn hide_window(&self, handle: NativeHandle) -> Result<()> {
        delegate!(self, b => b.hide_window(handle))
    }

    fn raise_and_focus(&self, handle: NativeHandle) -> Result<()> {
        delegate!(self, b => b.raise_and_focus(handle))
    }

    fn set_window_pos(&self, handle: NativeHandle, outer: Rect, change: PosChange) -> Result<()> {
        delegate!(self, b => b.set_window_pos(handle, outer, change))
    }

    fn frame_insets(&self, handle: NativeHandle) -> Insets {
        delegate!(self, b => b.frame_insets(handle))
    }

    fn screen_origin(&self, handle: NativeHandle) -> (i32, i32) {
        delegate!(self, b => b.screen_origin(handle))
    }

    fn client_rect(&self, handle: NativeHandle) -> Option<Rect> {
        delegate!(self, b => b.client_rect(handle))
    }

    fn set_capture(&self, handle: NativeHandle) {
        delegate!(self, b => b.set_capture(handle))
    }

    fn release_capture(&self) {
        delegate!(self, b => b.release_capture())
    }

    fn capture(&self) -> Option<NativeHandle> {
        delegate!(self, b => b.capture())
    }

    fn track_mouse_leave(&self, handle: NativeHandle) {
        delegate!(self, b => b.track_mouse_leave(handle))
    }

    fn set_cursor(&self, pointer: MousePointer) {
        delegate!(self, b => b.set_cursor(pointer))
    }

    fn invalidate(&self, handle: NativeHandle) {
        delegate!(self, b => b.invalidate(handle))
    }

    fn begin_paint(&self, handle: NativeHandle) -> Option<PaintContext> {
        delegate!(self, b => b.begin_paint(handle))
    }

    fn exclude_children(&self, ctx: &PaintContext) {
        delegate!(self, b => b.exclude_children(ctx))
    }

    fn blit(&self, ctx: &PaintContext, frame: &Frame<'_>, dest: Size) -> Result<()> {
        delegate!(self, b => b.blit(ctx, frame, dest))
    }

    fn end_paint(&self, ctx: PaintContext) {
        delegate!(self, b => b.end_paint(ctx))
    }

    fn set_caption(&self, handle: NativeHandle, caption: &str) -> Result<()> {
        delegate!(self, b => b.set_caption(handle, caption))
    }

    fn set_focus(&self, handle: NativeHandle) -> Result<()> {
        delegate!(self, b => b.set_focus(handle))
    }

    fn accept_files(&self, handle: NativeHandle, accept: bool) {
        delegate!(self, b => b.accept_files(handle, accept))
    }

    fn monitors(&self) -> Vec<Monitor> {
        delegate!(self, b => b.monitors())
    }

    fn cursor_position(&self) -> (i32, i32) {
        delegate!(self, b => b.cursor_position())
    }

    fn wait_events(&self, timeout_ms: u64) -> Result<()> {
        delegate!(self, b => b.wait_events(timeout_ms))
    }

    fn shutdown(&self) {
        delegate!(self, b => b.shutdown())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_header_is_top_down() {
        let px = [0u32; 6];
        let f = Frame {
            width: 3,
            height: 2,
            pixels: &px,
        };
        assert_eq!(f.header_size(), (3, -2));
    }

    #[test]
    fn empty_frame_header_is_one_pixel() {
        let f = Frame {
            width: 0,
            height: 0,
            pixels: &[],
        };
        assert_eq!(f.header_size(), (1, -1));
    }

    #[test]
    fn masks_cover_every_bit_once() {
        assert_eq!(ALPHA_MASK | RED_MASK | GREEN_MASK | BLUE_MASK, u32::MAX);
        assert_eq!(ALPHA_MASK & RED_MASK, 0);
    }
}
