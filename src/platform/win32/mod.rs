// ── Win32 platform implementation ─────────────────────────────────────────────
//
// This is the only module in the codebase where `unsafe` code is permitted.
// Every `unsafe` block MUST carry a `// SAFETY:` comment that states:
//   • which invariant makes the operation sound, and
//   • what the caller is responsible for maintaining.
//
// Nothing in this module is `pub` beyond what callers genuinely need; keep the
// unsafe surface as small as possible.

#![allow(unsafe_code)]

// ── Sub-modules ───────────────────────────────────────────────────────────────

mod decode; // WPARAM / LPARAM unpacking, key and button tables
mod paint; // BeginPaint / blit / EndPaint
pub mod window; // window class, WndProc, error helpers

use std::{cell::Cell, ffi::c_void, rc::Weak};

use windows::{
    core::PCWSTR,
    Win32::{
        Foundation::{BOOL, HINSTANCE, HMODULE, HWND, LPARAM, POINT, RECT, WAIT_FAILED},
        Graphics::Gdi::{
            EnumDisplayMonitors, GetMonitorInfoW, InvalidateRect, HDC, HMONITOR, MONITORINFO,
        },
        System::{
            LibraryLoader::{
                GetModuleHandleExW, GetModuleHandleW, GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS,
                GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
            },
            SystemInformation::GetTickCount64,
        },
        UI::{
            HiDpi::{SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2},
            Input::KeyboardAndMouse::{
                GetCapture, ReleaseCapture, SetCapture, SetFocus, TrackMouseEvent, TME_LEAVE,
                TRACKMOUSEEVENT,
            },
            Shell::DragAcceptFiles,
            WindowsAndMessaging::{
                DestroyWindow, DispatchMessageW, GetCursorPos, GetWindowRect, LoadCursorW,
                MsgWaitForMultipleObjects, PeekMessageW, SetWindowPos, SetWindowTextW,
                ShowWindow, TranslateMessage, HCURSOR, HWND_TOP, IDC_APPSTARTING, IDC_ARROW,
                IDC_CROSS, IDC_HAND, IDC_HELP, IDC_IBEAM, IDC_NO, IDC_SIZEALL, IDC_SIZENESW,
                IDC_SIZENS, IDC_SIZENWSE, IDC_SIZEWE, IDC_UPARROW, IDC_WAIT, MSG, PM_REMOVE,
                QS_ALLINPUT, SET_WINDOW_POS_FLAGS, SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE,
                SWP_NOZORDER, SW_HIDE, SW_SHOW,
            },
        },
    },
};

use self::{
    paint::Painter,
    window::{api_error, hwnd, to_wide},
};
use super::{
    CreateParams, Frame, MessageSink, Monitor, MousePointer, NativeBackend, NativeHandle,
    PaintContext, ProcessContext,
};
use crate::{
    error::{Result, WsError},
    event::Timestamp,
    geometry::{Insets, PosChange, Rect, Size},
};

/// Handle of the module containing this code.  Resolved from a code address
/// so that a DLL embedding winws registers its class against itself rather
/// than the host executable.
pub(crate) fn current_module() -> Result<isize> {
    let mut module = HMODULE::default();
    // SAFETY: the address passed is a function in this module; with
    // UNCHANGED_REFCOUNT no reference is taken that would need releasing.
    unsafe {
        GetModuleHandleExW(
            GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS | GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
            PCWSTR(current_module as usize as *const u16),
            &mut module,
        )
    }
    .map_err(api_error("GetModuleHandleExW"))?;
    Ok(module.0 as isize)
}

fn cursor_for(pointer: MousePointer) -> HCURSOR {
    let id = match pointer {
        MousePointer::None => return HCURSOR::default(),
        MousePointer::Arrow => IDC_ARROW,
        MousePointer::Hand => IDC_HAND,
        MousePointer::Cross => IDC_CROSS,
        MousePointer::IBeam => IDC_IBEAM,
        MousePointer::Wait => IDC_WAIT,
        MousePointer::AppStarting => IDC_APPSTARTING,
        MousePointer::Help => IDC_HELP,
        MousePointer::NoDrop => IDC_NO,
        MousePointer::SizeAll => IDC_SIZEALL,
        MousePointer::SizeNS => IDC_SIZENS,
        MousePointer::SizeWE => IDC_SIZEWE,
        MousePointer::SizeNESW => IDC_SIZENESW,
        MousePointer::SizeNWSE => IDC_SIZENWSE,
        MousePointer::UpArrow => IDC_UPARROW,
    };
    // SAFETY: the IDC_* identifiers name shared system cursors.
    unsafe { LoadCursorW(None, id) }.unwrap_or_else(|e| {
        log::warn!("win32: cursor {pointer:?} unavailable ({e})");
        window::arrow_cursor()
    })
}

// SAFETY: called synchronously by EnumDisplayMonitors with the LPARAM built
// in `monitors`, which points at a live Vec<Monitor>.
unsafe extern "system" fn collect_monitor(
    monitor: HMONITOR,
    _dc: HDC,
    _clip: *mut RECT,
    lparam: LPARAM,
) -> BOOL {
    let out = &mut *(lparam.0 as *mut Vec<Monitor>);
    let mut info = MONITORINFO {
        cbSize: std::mem::size_of::<MONITORINFO>() as u32,
        ..Default::default()
    };
    if GetMonitorInfoW(monitor, &mut info).as_bool() {
        let r = info.rcMonitor;
        out.push(Monitor {
            rect: Rect::new(r.left, r.top, r.right - r.left, r.bottom - r.top),
            // MONITORINFOF_PRIMARY
            primary: info.dwFlags & 1 != 0,
        });
    }
    BOOL::from(true)
}

// ── Backend ───────────────────────────────────────────────────────────────────

/// Per-monitor v2 awareness, so surfaces map 1:1 to device pixels.  Must run
/// before the first window is created.
fn enable_dpi_awareness() {
    // SAFETY: no preconditions; fails harmlessly when a manifest or the host
    // already chose an awareness.
    unsafe {
        let _ = SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2);
    }
}

/// The native backend: one window class, every window on the calling thread.
pub struct Win32Backend {
    module: HINSTANCE,
    class: Vec<u16>,
    painter: Painter,
    shut_down: Cell<bool>,
}

impl Win32Backend {
    pub fn new(ctx: &ProcessContext, class: &str) -> Result<Self> {
        enable_dpi_awareness();

        let module = if ctx.module() != 0 {
            HINSTANCE(ctx.module() as *mut c_void)
        } else {
            // SAFETY: GetModuleHandleW(None) returns the .exe's own HMODULE,
            // valid for the process lifetime.
            let exe = unsafe { GetModuleHandleW(None) }.map_err(api_error("GetModuleHandleW"))?;
            HINSTANCE(exe.0)
        };

        let class = to_wide(class);
        window::register_class(module, &class)?;
        window::apply_cursor(window::arrow_cursor());
        log::info!("win32: backend ready");

        Ok(Self {
            module,
            class,
            painter: Painter::default(),
            shut_down: Cell::new(false),
        })
    }
}

impl NativeBackend for Win32Backend {
    fn now(&self) -> Timestamp {
        // SAFETY: GetTickCount64 has no preconditions.
        unsafe { GetTickCount64() }
    }

    fn attach(&self, sink: Weak<dyn MessageSink>) {
        window::install_sink(Some(sink));
    }

    fn create_window(&self, params: &CreateParams<'_>) -> Result<NativeHandle> {
        if self.shut_down.get() {
            return Err(WsError::BadState);
        }
        window::create(self.module, params)
    }

    fn destroy_window(&self, handle: NativeHandle) -> Result<()> {
        // SAFETY: DestroyWindow validates the handle; WM_DESTROY is sent
        // before it returns.
        unsafe { DestroyWindow(hwnd(handle)) }.map_err(api_error("DestroyWindow"))
    }

    fn show_window(&self, handle: NativeHandle) -> Result<()> {
        // SAFETY: ShowWindow validates the handle; the return value is the
        // previous visibility, not an error.
        unsafe {
            let _ = ShowWindow(hwnd(handle), SW_SHOW);
        }
        Ok(())
    }

    fn hide_window(&self, handle: NativeHandle) -> Result<()> {
        // SAFETY: as in show_window.
        unsafe {
            let _ = ShowWindow(hwnd(handle), SW_HIDE);
        }
        Ok(())
    }

    fn raise_and_focus(&self, handle: NativeHandle) -> Result<()> {
        let h = hwnd(handle);
        // SAFETY: SetWindowPos validates the handle; only the z-order changes.
        unsafe { SetWindowPos(h, HWND_TOP, 0, 0, 0, 0, SWP_NOMOVE | SWP_NOSIZE) }
            .map_err(api_error("SetWindowPos"))?;
        self.set_focus(handle)
    }

    fn set_window_pos(&self, handle: NativeHandle, outer: Rect, change: PosChange) -> Result<()> {
        let mut flags = SWP_NOZORDER | SWP_NOACTIVATE;
        if !change.moved {
            flags |= SWP_NOMOVE;
        }
        if !change.resized {
            flags |= SWP_NOSIZE;
        }
        apply_pos(hwnd(handle), outer, flags)
    }

    fn frame_insets(&self, handle: NativeHandle) -> Insets {
        let h = hwnd(handle);
        let mut outer = RECT::default();
        // SAFETY: outer is a valid RECT; failure leaves zero insets.
        if unsafe { GetWindowRect(h, &mut outer) }.is_err() {
            return Insets::default();
        }
        let Some(client) = window::client_rect(h) else {
            return Insets::default();
        };
        let (cx, cy) = window::screen_origin(h);
        Insets {
            left: cx - outer.left,
            top: cy - outer.top,
            right: outer.right - (cx + client.width),
            bottom: outer.bottom - (cy + client.height),
        }
    }

    fn screen_origin(&self, handle: NativeHandle) -> (i32, i32) {
        window::screen_origin(hwnd(handle))
    }

    fn client_rect(&self, handle: NativeHandle) -> Option<Rect> {
        window::client_rect(hwnd(handle))
    }

    fn set_capture(&self, handle: NativeHandle) {
        // SAFETY: SetCapture returns the previous capture window; no preconditions.
        unsafe {
            let _ = SetCapture(hwnd(handle));
        }
    }

    fn release_capture(&self) {
        // SAFETY: no preconditions; fails only when nothing is captured.
        if let Err(e) = unsafe { ReleaseCapture() } {
            log::debug!("win32: ReleaseCapture failed ({e})");
        }
    }

    fn capture(&self) -> Option<NativeHandle> {
        // SAFETY: GetCapture has no preconditions.
        let h = unsafe { GetCapture() };
        if h.is_invalid() {
            None
        } else {
            Some(window::native(h))
        }
    }

    fn track_mouse_leave(&self, handle: NativeHandle) {
        let mut tme = TRACKMOUSEEVENT {
            cbSize: std::mem::size_of::<TRACKMOUSEEVENT>() as u32,
            dwFlags: TME_LEAVE,
            hwndTrack: hwnd(handle),
            dwHoverTime: 0,
        };
        // SAFETY: tme is fully initialised for the call.
        if let Err(e) = unsafe { TrackMouseEvent(&mut tme) } {
            log::warn!("win32: TrackMouseEvent failed for {handle:?} ({e})");
        }
    }

    fn set_cursor(&self, pointer: MousePointer) {
        window::apply_cursor(cursor_for(pointer));
    }

    fn invalidate(&self, handle: NativeHandle) {
        // SAFETY: a None rectangle invalidates the whole client area.
        unsafe {
            let _ = InvalidateRect(hwnd(handle), None, BOOL::from(false));
        }
    }

    fn begin_paint(&self, handle: NativeHandle) -> Option<PaintContext> {
        self.painter.begin(handle)
    }

    fn exclude_children(&self, ctx: &PaintContext) {
        self.painter.exclude_children(ctx);
    }

    fn blit(&self, ctx: &PaintContext, frame: &Frame<'_>, dest: Size) -> Result<()> {
        self.painter.blit(ctx, frame, dest)
    }

    fn end_paint(&self, ctx: PaintContext) {
        self.painter.end(ctx);
    }

    fn set_caption(&self, handle: NativeHandle, caption: &str) -> Result<()> {
        let wide = to_wide(caption);
        // SAFETY: wide is null-terminated and alive for the call.
        unsafe { SetWindowTextW(hwnd(handle), PCWSTR(wide.as_ptr())) }
            .map_err(api_error("SetWindowTextW"))
    }

    fn set_focus(&self, handle: NativeHandle) -> Result<()> {
        // SAFETY: SetFocus validates the handle; WM_SETFOCUS / WM_KILLFOCUS
        // are sent before it returns.
        unsafe {
            let _ = SetFocus(hwnd(handle));
        }
        Ok(())
    }

    fn accept_files(&self, handle: NativeHandle, accept: bool) {
        // SAFETY: DragAcceptFiles only toggles WS_EX_ACCEPTFILES.
        unsafe { DragAcceptFiles(hwnd(handle), BOOL::from(accept)) }
    }

    fn monitors(&self) -> Vec<Monitor> {
        let mut out: Vec<Monitor> = Vec::new();
        // SAFETY: `out` outlives the synchronous enumeration.
        unsafe {
            let _ = EnumDisplayMonitors(
                None,
                None,
                Some(collect_monitor),
                LPARAM(&mut out as *mut Vec<Monitor> as isize),
            );
        }
        out
    }

    fn cursor_position(&self) -> (i32, i32) {
        let mut pt = POINT::default();
        // SAFETY: pt is a valid POINT for the call.
        match unsafe { GetCursorPos(&mut pt) } {
            Ok(()) => (pt.x, pt.y),
            Err(e) => {
                log::debug!("win32: GetCursorPos failed ({e})");
                (0, 0)
            }
        }
    }

    fn wait_events(&self, timeout_ms: u64) -> Result<()> {
        let timeout = u32::try_from(timeout_ms).unwrap_or(u32::MAX - 1);
        // SAFETY: no handles are passed; the call returns on any queued input.
        let woke = unsafe { MsgWaitForMultipleObjects(None, BOOL::from(false), timeout, QS_ALLINPUT) };
        if woke == WAIT_FAILED {
            return Err(window::last_error("MsgWaitForMultipleObjects"));
        }

        let mut msg = MSG::default();
        // SAFETY: &mut msg is a valid MSG pointer; HWND::default() retrieves
        // messages for all windows on this thread; 0,0 filter accepts all.
        unsafe {
            while PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_REMOVE).as_bool() {
                let _ = TranslateMessage(&msg);
                let _ = DispatchMessageW(&msg);
            }
        }
        Ok(())
    }

    fn shutdown(&self) {
        if self.shut_down.replace(true) {
            return;
        }
        window::install_sink(None);
        if let Err(e) = window::unregister_class(self.module, &self.class) {
            log::warn!("win32: {e}");
        }
    }
}

fn apply_pos(h: HWND, outer: Rect, flags: SET_WINDOW_POS_FLAGS) -> Result<()> {
    // SAFETY: SetWindowPos validates the handle; WM_WINDOWPOSCHANGED (and the
    // resulting WM_MOVE / WM_SIZE) are sent before it returns.
    unsafe {
        SetWindowPos(
            h,
            HWND::default(),
            outer.left,
            outer.top,
            outer.width,
            outer.height,
            flags,
        )
    }
    .map_err(api_error("SetWindowPos"))
}
