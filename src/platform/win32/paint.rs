// ── Paint cycle ───────────────────────────────────────────────────────────────
//
// BeginPaint / EndPaint bracketing and the frame blit.  The PAINTSTRUCT of
// every open cycle is kept here, keyed by window, so `PaintContext` itself
// stays a plain value.

use std::{cell::RefCell, collections::HashMap, ffi::c_void};

use windows::Win32::{
    Foundation::{BOOL, HWND, LPARAM, POINT, RECT},
    Graphics::Gdi::{
        BeginPaint, EndPaint, ExcludeClipRect, MapWindowPoints, StretchDIBits, BITMAPINFO,
        BITMAPINFOHEADER, BI_BITFIELDS, DIB_RGB_COLORS, HDC, PAINTSTRUCT, SRCCOPY,
    },
    UI::WindowsAndMessaging::{EnumChildWindows, GetParent, GetWindowRect, IsWindowVisible},
};

use super::window::{hwnd, last_error, native};
use crate::{
    error::Result,
    geometry::Size,
    platform::{Frame, NativeHandle, PaintContext, BLUE_MASK, GREEN_MASK, RED_MASK},
};

/// BITMAPINFO for a BI_BITFIELDS bitmap: the header followed by the red,
/// green and blue masks.
#[repr(C)]
struct BitfieldInfo {
    header: BITMAPINFOHEADER,
    masks: [u32; 3],
}

impl BitfieldInfo {
    fn for_frame(frame: &Frame<'_>) -> Self {
        let (width, height) = frame.header_size();
        Self {
            header: BITMAPINFOHEADER {
                biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: width,
                biHeight: height,
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_BITFIELDS.0,
                ..Default::default()
            },
            masks: [RED_MASK, GREEN_MASK, BLUE_MASK],
        }
    }
}

#[derive(Default)]
pub(crate) struct Painter {
    open: RefCell<HashMap<NativeHandle, PAINTSTRUCT>>,
}

impl Painter {
    pub(crate) fn begin(&self, handle: NativeHandle) -> Option<PaintContext> {
        let mut ps = PAINTSTRUCT::default();
        // SAFETY: ps is a valid PAINTSTRUCT; a null HDC means no paint cycle.
        let hdc = unsafe { BeginPaint(hwnd(handle), &mut ps) };
        if hdc.is_invalid() {
            return None;
        }
        self.open.borrow_mut().insert(handle, ps);
        Some(PaintContext {
            handle,
            dc: hdc.0 as isize,
        })
    }

    pub(crate) fn end(&self, ctx: PaintContext) {
        let Some(ps) = self.open.borrow_mut().remove(&ctx.handle) else {
            log::warn!("win32: end_paint without begin_paint for {:?}", ctx.handle);
            return;
        };
        // SAFETY: ps was filled by the matching BeginPaint on the same window.
        unsafe {
            let _ = EndPaint(hwnd(ctx.handle), &ps);
        }
    }

    pub(crate) fn exclude_children(&self, ctx: &PaintContext) {
        let mut clip = ChildClip {
            parent: hwnd(ctx.handle),
            dc: HDC(ctx.dc as *mut c_void),
        };
        // SAFETY: `clip` outlives the synchronous enumeration; the callback
        // only reads it through the LPARAM.
        unsafe {
            let _ = EnumChildWindows(
                clip.parent,
                Some(exclude_child),
                LPARAM(&mut clip as *mut ChildClip as isize),
            );
        }
    }

    pub(crate) fn blit(&self, ctx: &PaintContext, frame: &Frame<'_>, dest: Size) -> Result<()> {
        if frame.pixels.is_empty() {
            return Ok(());
        }
        let info = BitfieldInfo::for_frame(frame);
        // SAFETY: `info` is a BITMAPINFOHEADER followed by three masks as
        // BI_BITFIELDS requires; `pixels` holds width × height values and
        // stays borrowed for the call; ctx.dc is the DC of an open cycle.
        let lines = unsafe {
            StretchDIBits(
                HDC(ctx.dc as *mut c_void),
                0,
                0,
                dest.width,
                dest.height,
                0,
                0,
                frame.width,
                frame.height,
                Some(frame.pixels.as_ptr() as *const c_void),
                &info as *const BitfieldInfo as *const BITMAPINFO,
                DIB_RGB_COLORS,
                SRCCOPY,
            )
        };
        if lines == 0 {
            return Err(last_error("StretchDIBits"));
        }
        Ok(())
    }
}

struct ChildClip {
    parent: HWND,
    dc: HDC,
}

// SAFETY: called synchronously by EnumChildWindows with the LPARAM built in
// `exclude_children`, which points at a live ChildClip.
unsafe extern "system" fn exclude_child(child: HWND, lparam: LPARAM) -> BOOL {
    let clip = &*(lparam.0 as *const ChildClip);

    // Grandchildren lie inside their own parent's rectangle.
    let direct = GetParent(child).map(|p| p == clip.parent).unwrap_or(false);
    if !direct || !IsWindowVisible(child).as_bool() {
        return BOOL::from(true);
    }

    let mut rc = RECT::default();
    if GetWindowRect(child, &mut rc).is_ok() {
        let mut pts = [
            POINT {
                x: rc.left,
                y: rc.top,
            },
            POINT {
                x: rc.right,
                y: rc.bottom,
            },
        ];
        MapWindowPoints(HWND::default(), clip.parent, &mut pts);
        let _ = ExcludeClipRect(clip.dc, pts[0].x, pts[0].y, pts[1].x, pts[1].y);
        log::trace!("win32: child {:?} clipped out", native(child));
    }
    BOOL::from(true)
}
