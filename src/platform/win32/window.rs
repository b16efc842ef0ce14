// ── Window class and window procedure ─────────────────────────────────────────
//
// Responsibilities in this file (unsafe confined here):
//   • Register / unregister the window class shared by every shell.
//   • Create native windows for `CreateParams`.
//   • Decode messages in `wnd_proc` and hand them to the installed sink.
//   • Geometry queries used by both the backend and the decoder.
//   • A safe error-dialog helper for use by main().

use std::{
    cell::{Cell, RefCell},
    ffi::c_void,
    path::PathBuf,
    rc::Weak,
};

use windows::{
    core::PCWSTR,
    Win32::{
        Foundation::{GetLastError, BOOL, HINSTANCE, HWND, LPARAM, LRESULT, POINT, RECT, WPARAM},
        Graphics::Gdi::{ClientToScreen, MapWindowPoints, ScreenToClient, HBRUSH},
        System::SystemInformation::GetTickCount64,
        UI::{
            Input::KeyboardAndMouse::{GetKeyState, VK_CONTROL, VK_MENU, VK_SHIFT},
            Shell::{DragFinish, DragQueryFileW, DragQueryPoint, HDROP},
            WindowsAndMessaging::{
                AdjustWindowRectEx, CreateWindowExW, DefWindowProcW, GetAncestor,
                GetClientRect, LoadCursorW, MessageBoxW, RegisterClassExW, SetCursor,
                UnregisterClassW, CS_HREDRAW, CS_VREDRAW, GA_PARENT, HCURSOR, HMENU,
                MB_ICONERROR, MB_OK, WINDOW_EX_STYLE, WINDOW_STYLE, WM_CLOSE, WM_DESTROY,
                WM_DROPFILES, WM_ERASEBKGND, WM_KEYDOWN, WM_KEYUP, WM_KILLFOCUS,
                WM_LBUTTONDOWN, WM_LBUTTONUP, WM_MBUTTONDOWN, WM_MBUTTONUP, WM_MOUSEHWHEEL,
                WM_MOUSELEAVE, WM_MOUSEMOVE, WM_MOUSEWHEEL, WM_MOVE, WM_PAINT,
                WM_RBUTTONDOWN, WM_RBUTTONUP, WM_SETCURSOR, WM_SETFOCUS, WM_SHOWWINDOW,
                WM_SIZE, WM_SYSKEYDOWN, WM_SYSKEYUP, WM_XBUTTONDOWN, WM_XBUTTONUP,
                WNDCLASSEXW, WS_CHILD, WS_CLIPCHILDREN, WS_CLIPSIBLINGS, WS_OVERLAPPEDWINDOW,
                IDC_ARROW,
            },
        },
    },
};

use super::decode;
use crate::{
    error::{Result, WsError},
    event::{Modifiers, MouseButton},
    geometry::Rect,
    platform::{CreateParams, MessageSink, NativeHandle, NativeMessage, WindowStyle},
};

/// Hit-test code of the client area in WM_SETCURSOR.
const HT_CLIENT: usize = 1;

const ERROR_CLASS_ALREADY_EXISTS: u32 = 1410;

thread_local! {
    /// Receiver of decoded messages for windows on this thread.
    static SINK: RefCell<Option<Weak<dyn MessageSink>>> = const { RefCell::new(None) };

    /// Cursor applied over the client area of our windows (HCURSOR value).
    static CURSOR: Cell<isize> = const { Cell::new(0) };
}

// ── Handle conversion ─────────────────────────────────────────────────────────

pub(crate) fn hwnd(handle: NativeHandle) -> HWND {
    HWND(handle.0 as *mut c_void)
}

pub(crate) fn native(hwnd: HWND) -> NativeHandle {
    NativeHandle(hwnd.0 as isize)
}

pub(crate) fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

// ── Sink and cursor ───────────────────────────────────────────────────────────

pub(crate) fn install_sink(sink: Option<Weak<dyn MessageSink>>) {
    SINK.with(|s| *s.borrow_mut() = sink);
}

pub(crate) fn apply_cursor(cursor: HCURSOR) {
    CURSOR.with(|c| c.set(cursor.0 as isize));
    // SAFETY: cursor is a shared system cursor or null (hides the pointer).
    unsafe {
        let _ = SetCursor(cursor);
    }
}

/// Shared system cursor for the arrow shape.
pub(crate) fn arrow_cursor() -> HCURSOR {
    // SAFETY: IDC_ARROW is a built-in resource present on all Windows versions.
    unsafe { LoadCursorW(None, IDC_ARROW) }.unwrap_or_default()
}

// ── Window class registration ─────────────────────────────────────────────────

pub(crate) fn register_class(module: HINSTANCE, class: &[u16]) -> Result<()> {
    let wndclass = WNDCLASSEXW {
        cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
        // Repaint the whole client on resize; the surface is rescaled anyway.
        style: CS_HREDRAW | CS_VREDRAW,
        lpfnWndProc: Some(wnd_proc),
        cbClsExtra: 0,
        cbWndExtra: 0,
        hInstance: module,
        hCursor: arrow_cursor(),
        // No background brush: every pixel comes from the surface.
        hbrBackground: HBRUSH::default(),
        lpszMenuName: PCWSTR::null(),
        lpszClassName: PCWSTR(class.as_ptr()),
        ..Default::default()
    };

    // SAFETY: wndclass is fully initialised; `class` is a null-terminated
    // UTF-16 buffer that outlives the call.
    let atom = unsafe { RegisterClassExW(&wndclass) };
    if atom == 0 {
        let err = last_error("RegisterClassExW");
        // A second display in the same process shares the class.
        if matches!(err, WsError::Win32 { code: ERROR_CLASS_ALREADY_EXISTS, .. }) {
            log::debug!("win32: window class already registered");
            return Ok(());
        }
        return Err(err);
    }
    Ok(())
}

pub(crate) fn unregister_class(module: HINSTANCE, class: &[u16]) -> Result<()> {
    // SAFETY: `class` is null-terminated; fails if windows of the class remain.
    unsafe { UnregisterClassW(PCWSTR(class.as_ptr()), module) }
        .map_err(api_error("UnregisterClassW"))
}

// ── Window creation ───────────────────────────────────────────────────────────

fn styles(style: WindowStyle) -> WINDOW_STYLE {
    match style {
        WindowStyle::TopLevel => WS_OVERLAPPEDWINDOW | WS_CLIPCHILDREN,
        WindowStyle::Child => WS_CHILD | WS_CLIPSIBLINGS | WS_CLIPCHILDREN,
    }
}

pub(crate) fn create(module: HINSTANCE, params: &CreateParams<'_>) -> Result<NativeHandle> {
    let style = styles(params.style);
    let ex_style = WINDOW_EX_STYLE::default();
    let r = params.rect;
    let mut outer = RECT {
        left: r.left,
        top: r.top,
        right: r.left + r.width,
        bottom: r.top + r.height,
    };
    // SAFETY: outer is a valid RECT for the duration of the call.
    unsafe { AdjustWindowRectEx(&mut outer, style, BOOL::from(false), ex_style) }
        .map_err(api_error("AdjustWindowRectEx"))?;

    let class = to_wide(params.class);
    let caption = to_wide(params.caption);
    let parent = params.parent.map(hwnd).unwrap_or_default();

    // SAFETY: class was registered against `module` by the backend; class and
    // caption are null-terminated buffers alive for the call.  A null parent
    // creates a top-level window.  WM_CREATE and friends arrive before the
    // handle is bound to a shell and fall through to DefWindowProcW.
    let handle = unsafe {
        CreateWindowExW(
            ex_style,
            PCWSTR(class.as_ptr()),
            PCWSTR(caption.as_ptr()),
            style,
            outer.left,
            outer.top,
            outer.right - outer.left,
            outer.bottom - outer.top,
            parent,
            HMENU::default(),
            module,
            None,
        )
    }
    .map_err(api_error("CreateWindowExW"))?;

    log::debug!("win32: created {:?} window {:?}", params.style, native(handle));
    Ok(native(handle))
}

// ── Geometry queries ──────────────────────────────────────────────────────────

/// Screen position of the client area's top-left corner.
pub(crate) fn screen_origin(hwnd: HWND) -> (i32, i32) {
    let mut pt = POINT::default();
    // SAFETY: pt is a valid POINT; an invalid hwnd leaves it untouched.
    unsafe {
        let _ = ClientToScreen(hwnd, &mut pt);
    }
    (pt.x, pt.y)
}

/// Client rectangle relative to the parent's client area.  Top-level windows
/// map against the desktop, which yields screen coordinates.
pub(crate) fn client_rect(hwnd: HWND) -> Option<Rect> {
    let mut rc = RECT::default();
    // SAFETY: rc is a valid RECT; failure means hwnd is gone.
    unsafe { GetClientRect(hwnd, &mut rc) }.ok()?;

    let mut origin = [POINT::default()];
    // SAFETY: hwnd is valid (GetClientRect succeeded); GA_PARENT yields the
    // desktop window for top-level windows.
    unsafe {
        let parent = GetAncestor(hwnd, GA_PARENT);
        MapWindowPoints(hwnd, parent, &mut origin);
    }
    Some(Rect::new(
        origin[0].x,
        origin[0].y,
        rc.right - rc.left,
        rc.bottom - rc.top,
    ))
}

// ── Message decoding ──────────────────────────────────────────────────────────

fn key_down(vk: i32) -> bool {
    // SAFETY: GetKeyState reads the thread's keyboard state; no preconditions.
    unsafe { GetKeyState(vk) < 0 }
}

fn alt_state() -> Modifiers {
    if key_down(i32::from(VK_MENU.0)) {
        Modifiers::ALT
    } else {
        Modifiers::empty()
    }
}

fn keyboard_state() -> Modifiers {
    let mut state = alt_state();
    if key_down(i32::from(VK_SHIFT.0)) {
        state |= Modifiers::SHIFT;
    }
    if key_down(i32::from(VK_CONTROL.0)) {
        state |= Modifiers::CONTROL;
    }
    state
}

fn mouse_state(wparam: WPARAM) -> Modifiers {
    decode::mouse_state(wparam.0) | alt_state()
}

fn button_of(msg: u32, wparam: WPARAM) -> Option<(MouseButton, bool)> {
    match msg {
        WM_LBUTTONDOWN => Some((MouseButton::Left, true)),
        WM_LBUTTONUP => Some((MouseButton::Left, false)),
        WM_MBUTTONDOWN => Some((MouseButton::Middle, true)),
        WM_MBUTTONUP => Some((MouseButton::Middle, false)),
        WM_RBUTTONDOWN => Some((MouseButton::Right, true)),
        WM_RBUTTONUP => Some((MouseButton::Right, false)),
        WM_XBUTTONDOWN => decode::xbutton(wparam.0).map(|b| (b, true)),
        WM_XBUTTONUP => decode::xbutton(wparam.0).map(|b| (b, false)),
        _ => None,
    }
}

fn dropped_files(hwnd: HWND, wparam: WPARAM) -> NativeMessage {
    let hdrop = HDROP(wparam.0 as *mut c_void);
    let mut pt = POINT::default();
    let mut files = Vec::new();

    // SAFETY: hdrop comes from WM_DROPFILES and stays valid until DragFinish.
    // Each buffer is sized from the length query plus the terminator.
    unsafe {
        let _ = DragQueryPoint(hdrop, &mut pt);
        let count = DragQueryFileW(hdrop, u32::MAX, None);
        for i in 0..count {
            let len = DragQueryFileW(hdrop, i, None) as usize;
            let mut buf = vec![0u16; len + 1];
            let copied = DragQueryFileW(hdrop, i, Some(&mut buf)) as usize;
            files.push(PathBuf::from(String::from_utf16_lossy(&buf[..copied])));
        }
        DragFinish(hdrop);
    }
    log::trace!("win32: {} file(s) dropped on {:?}", files.len(), native(hwnd));

    NativeMessage::DropFiles {
        left: pt.x,
        top: pt.y,
        files,
    }
}

/// Translate a raw message.  `None` means the message is not ours.
fn decode_message(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> Option<NativeMessage> {
    if let Some((button, down)) = button_of(msg, wparam) {
        let (left, top) = decode::point(lparam.0);
        let state = mouse_state(wparam);
        return Some(if down {
            NativeMessage::ButtonDown {
                button,
                left,
                top,
                state,
            }
        } else {
            NativeMessage::ButtonUp {
                button,
                left,
                top,
                state,
            }
        });
    }

    let message = match msg {
        WM_MOUSEMOVE => {
            let (left, top) = decode::point(lparam.0);
            NativeMessage::MouseMove {
                left,
                top,
                state: mouse_state(wparam),
            }
        }
        WM_MOUSELEAVE => NativeMessage::MouseLeave,
        WM_MOUSEWHEEL | WM_MOUSEHWHEEL => {
            // Wheel positions arrive in screen coordinates.
            let (x, y) = decode::point(lparam.0);
            let mut pt = POINT { x, y };
            // SAFETY: hwnd is the window receiving the message; pt is valid.
            unsafe {
                let _ = ScreenToClient(hwnd, &mut pt);
            }
            NativeMessage::Scroll {
                direction: decode::wheel(wparam.0, msg == WM_MOUSEHWHEEL),
                left: pt.x,
                top: pt.y,
                state: decode::mouse_state(usize::from(decode::loword(wparam.0))) | alt_state(),
            }
        }
        WM_KEYDOWN | WM_SYSKEYDOWN | WM_KEYUP | WM_SYSKEYUP => {
            let state = keyboard_state();
            let key = decode::key_code(
                decode::loword(wparam.0),
                state.contains(Modifiers::CONTROL),
            );
            if msg == WM_KEYDOWN || msg == WM_SYSKEYDOWN {
                NativeMessage::KeyDown { key, state }
            } else {
                NativeMessage::KeyUp { key, state }
            }
        }
        WM_SIZE | WM_MOVE => NativeMessage::Resized(client_rect(hwnd)?),
        WM_PAINT => NativeMessage::Paint,
        WM_SETFOCUS => NativeMessage::FocusIn,
        WM_KILLFOCUS => NativeMessage::FocusOut,
        WM_SHOWWINDOW if wparam.0 != 0 => NativeMessage::Shown,
        WM_SHOWWINDOW => NativeMessage::Hidden,
        WM_CLOSE => NativeMessage::Close,
        WM_DESTROY => NativeMessage::Destroyed,
        WM_DROPFILES => dropped_files(hwnd, wparam),
        _ => return None,
    };
    Some(message)
}

/// Messages that still need default processing after delivery.
fn passes_through(msg: u32) -> bool {
    matches!(
        msg,
        WM_SYSKEYDOWN | WM_SYSKEYUP | WM_SHOWWINDOW | WM_SETFOCUS | WM_KILLFOCUS | WM_DESTROY
    )
}

fn deliver(handle: NativeHandle, message: NativeMessage) -> bool {
    // The sink is upgraded and the borrow released before delivery: handlers
    // create and destroy windows, which re-enters this procedure.
    let Some(sink) = SINK.with(|s| s.borrow().as_ref().and_then(Weak::upgrade)) else {
        return false;
    };
    // SAFETY: GetTickCount64 has no preconditions.
    let time = unsafe { GetTickCount64() };
    sink.deliver(handle, message, time)
}

// ── Window procedure ──────────────────────────────────────────────────────────

// SAFETY: wnd_proc is registered as lpfnWndProc in WNDCLASSEXW.
// Windows guarantees that hwnd, msg, wparam, and lparam are valid for the
// lifetime of this call; hwnd is stored only as an integer key.
unsafe extern "system" fn wnd_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        // Every client pixel comes from the surface.
        WM_ERASEBKGND => return LRESULT(1),

        WM_SETCURSOR if decode::loword(lparam.0 as usize) as usize == HT_CLIENT => {
            let cursor = CURSOR.with(Cell::get);
            let _ = SetCursor(HCURSOR(cursor as *mut c_void));
            return LRESULT(1);
        }

        _ => {}
    }

    let Some(message) = decode_message(hwnd, msg, wparam, lparam) else {
        return DefWindowProcW(hwnd, msg, wparam, lparam);
    };

    let claimed = deliver(native(hwnd), message);
    if !claimed || passes_through(msg) {
        // Unclaimed WM_PAINT is validated here, unclaimed WM_CLOSE destroys.
        return DefWindowProcW(hwnd, msg, wparam, lparam);
    }

    match msg {
        // Extra-button messages report handling with TRUE.
        WM_XBUTTONDOWN | WM_XBUTTONUP => LRESULT(1),
        _ => LRESULT(0),
    }
}

// ── Error helpers ─────────────────────────────────────────────────────────────

/// Show a modal error dialog with the given message.
///
/// Safe to call from any context; performs the UTF-16 conversion internally.
/// Used by the demo's `main()` when the display cannot be opened.
pub fn show_error_dialog(message: &str) {
    let msg_wide = to_wide(message);
    let title_wide = to_wide("winws: fatal error");

    // SAFETY: msg_wide and title_wide are valid null-terminated UTF-16 strings
    // that remain allocated for the duration of the MessageBoxW call.
    // HWND::default() (null) means the dialog has no owner window.
    unsafe {
        let _ = MessageBoxW(
            HWND::default(),
            PCWSTR(msg_wide.as_ptr()),
            PCWSTR(title_wide.as_ptr()),
            MB_OK | MB_ICONERROR,
        );
    }
}

/// Capture the current Win32 last-error code and wrap it in a `WsError`.
///
/// Call immediately after a Win32 function that signals failure; `GetLastError`
/// reads thread-local state that any subsequent API call can overwrite.
pub(crate) fn last_error(function: &'static str) -> WsError {
    // SAFETY: GetLastError reads thread-local state set by the last Win32 call.
    let code = unsafe { GetLastError() };
    WsError::Win32 {
        function,
        code: code.0,
    }
}

/// Map a windows-crate error to `WsError`, keeping the failing function's name.
pub(crate) fn api_error(function: &'static str) -> impl FnOnce(windows::core::Error) -> WsError {
    move |e| WsError::Win32 {
        function,
        code: e.code().0 as u32,
    }
}
