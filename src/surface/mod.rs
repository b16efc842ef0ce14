// ── Offscreen raster surface ──────────────────────────────────────────────────
//
// A pixel buffer plus the drawing state of the frame being rendered into it.
//
// Window surfaces track two sizes: the size the window wants (updated on
// every resize notification) and the size actually allocated.  The two are
// reconciled only at the start of a frame, so an interactive drag-resize
// costs at most one reallocation per frame that is actually drawn.

use std::{cell::Cell, fmt, rc::Rc};

use crate::{
    error::{Result, WsError},
    geometry::{Rect, Size},
    platform::{Backend, Frame, NativeBackend, NativeHandle, PaintContext},
};

pub mod canvas;
pub mod gradient;

use canvas::{pixel_box, Canvas};
pub use canvas::{Color, Fill, LineCap};
pub use gradient::{ColorStop, Gradient};

enum Target {
    Window {
        handle: NativeHandle,
        backend: Rc<Backend>,
    },
    Image,
}

/// Drawing state of an open frame.
#[derive(Debug, Clone)]
struct DrawState {
    clips: Vec<Rect>,
    antialias: bool,
    line_cap: LineCap,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            clips: Vec::new(),
            antialias: true,
            line_cap: LineCap::Butt,
        }
    }
}

fn alloc(width: i32, height: i32) -> Option<Vec<u32>> {
    let n = (width.max(0) as usize).checked_mul(height.max(0) as usize)?;
    let mut v = Vec::new();
    v.try_reserve_exact(n).ok()?;
    v.resize(n, 0);
    Some(v)
}

pub struct Surface {
    target: Target,
    pixels: Vec<u32>,
    width: i32,
    height: i32,
    req_width: i32,
    req_height: i32,
    context: Option<DrawState>,
    /// The open frame started with a reallocation.
    resized: bool,
    /// The window changed size and the OS has not painted it since.
    repaint_pending: Cell<bool>,
    presenting: Cell<bool>,
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("image", &self.is_image())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("requested", &(self.req_width, self.req_height))
            .field("drawing", &self.context.is_some())
            .finish()
    }
}

impl Surface {
    fn with_target(target: Target, width: i32, height: i32) -> Result<Self> {
        let width = width.max(0);
        let height = height.max(0);
        let pixels = alloc(width, height).ok_or(WsError::NoMem)?;
        Ok(Self {
            target,
            pixels,
            width,
            height,
            req_width: width,
            req_height: height,
            context: None,
            resized: false,
            repaint_pending: Cell::new(false),
            presenting: Cell::new(false),
        })
    }

    /// An in-memory surface.
    pub fn image(width: i32, height: i32) -> Result<Self> {
        Self::with_target(Target::Image, width, height)
    }

    /// A surface presented into the window `handle`.
    pub(crate) fn for_window(handle: NativeHandle, backend: Rc<Backend>, width: i32, height: i32) -> Result<Self> {
        Self::with_target(Target::Window { handle, backend }, width, height)
    }

    // ── Geometry ─────────────────────────────────────────────────────────────

    /// Allocated width.
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Allocated height.
    pub fn height(&self) -> i32 {
        self.height
    }

    /// The size the next frame will be allocated at.
    pub fn requested_size(&self) -> Size {
        Size::new(self.req_width, self.req_height)
    }

    pub fn is_image(&self) -> bool {
        matches!(self.target, Target::Image)
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Premultiplied ARGB32 value at (x, y).
    pub fn pixel(&self, x: i32, y: i32) -> Option<u32> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get((y * self.width + x) as usize).copied()
    }

    /// Note the window's new size; the buffer follows at the next frame.
    pub(crate) fn request_size(&mut self, width: i32, height: i32) {
        let (width, height) = (width.max(0), height.max(0));
        if (width, height) != (self.req_width, self.req_height) {
            self.req_width = width;
            self.req_height = height;
            self.repaint_pending.set(true);
        }
    }

    /// Allocated and requested sizes differ.
    pub fn needs_sync(&self) -> bool {
        (self.width, self.height) != (self.req_width, self.req_height)
    }

    /// Reallocate the buffer at the requested size if it differs.  Returns
    /// whether a reallocation happened.  On allocation failure the old
    /// buffer stays and `false` is returned.
    pub fn sync_size(&mut self) -> bool {
        if !self.needs_sync() {
            return false;
        }
        let Some(pixels) = alloc(self.req_width, self.req_height) else {
            log::error!(
                "surface: cannot allocate {}x{} buffer, keeping {}x{}",
                self.req_width,
                self.req_height,
                self.width,
                self.height
            );
            return false;
        };
        log::debug!(
            "surface: {}x{} -> {}x{}",
            self.width,
            self.height,
            self.req_width,
            self.req_height
        );
        self.context = None;
        self.pixels = pixels;
        self.width = self.req_width;
        self.height = self.req_height;
        true
    }

    /// Change the size.  Image surfaces reallocate immediately and keep the
    /// overlapping content; window surfaces defer to the next frame.
    pub fn resize(&mut self, width: i32, height: i32) -> Result<()> {
        if !self.is_image() {
            self.request_size(width, height);
            return Ok(());
        }
        let (width, height) = (width.max(0), height.max(0));
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }
        let mut pixels = alloc(width, height).ok_or(WsError::NoMem)?;
        let cols = self.width.min(width) as usize;
        for y in 0..self.height.min(height) as usize {
            let src = y * self.width as usize;
            let dst = y * width as usize;
            pixels[dst..dst + cols].copy_from_slice(&self.pixels[src..src + cols]);
        }
        self.pixels = pixels;
        self.width = width;
        self.height = height;
        self.req_width = width;
        self.req_height = height;
        Ok(())
    }

    /// An image surface with the same size and content.
    pub fn create_copy(&self) -> Result<Surface> {
        let mut copy = Surface::image(self.width, self.height)?;
        copy.pixels.copy_from_slice(&self.pixels);
        Ok(copy)
    }

    // ── Frames ───────────────────────────────────────────────────────────────

    /// Open a frame: reconcile the size, drop any frame left open, start a
    /// fresh drawing state.
    pub fn begin_frame(&mut self) {
        self.resized = self.sync_size();
        if self.context.take().is_some() {
            log::debug!("surface: previous frame was never ended");
        }
        self.context = Some(DrawState::default());
    }

    /// Close the frame and, for window surfaces, ask for it to be shown.
    pub fn end_frame(&mut self) {
        if self.context.take().is_none() {
            return;
        }
        if let Target::Window { handle, backend } = &self.target {
            // A window that just changed size gets a paint from the OS anyway.
            if !(self.resized && self.repaint_pending.get()) {
                backend.invalidate(*handle);
            }
        }
        self.resized = false;
    }

    pub fn is_drawing(&self) -> bool {
        self.context.is_some()
    }

    /// Blit the buffer into a window's paint context, scaled to `dest`.
    pub fn present_to(&self, ctx: &PaintContext, dest: Size) -> Result<()> {
        let Target::Window { backend, .. } = &self.target else {
            return Err(WsError::BadState);
        };
        if self.presenting.replace(true) {
            log::warn!("surface: nested presentation rejected");
            return Err(WsError::BadState);
        }
        let frame = Frame {
            width: self.width,
            height: self.height,
            pixels: &self.pixels,
        };
        let res = backend.blit(ctx, &frame, dest);
        self.repaint_pending.set(false);
        self.presenting.set(false);
        res
    }

    // ── Drawing ──────────────────────────────────────────────────────────────

    fn canvas(&mut self) -> Option<Canvas<'_>> {
        let ctx = self.context.as_ref()?;
        let full = Rect::new(0, 0, self.width, self.height);
        let clip = ctx.clips.last().copied().unwrap_or(full);
        let (antialias, line_cap) = (ctx.antialias, ctx.line_cap);
        Some(Canvas {
            pixels: &mut self.pixels,
            width: self.width,
            height: self.height,
            clip,
            antialias,
            line_cap,
        })
    }

    /// Fill with the opaque color `0xRRGGBB`.
    pub fn clear_rgb(&mut self, rgb: u32) {
        self.clear(Color::from_rgb24(rgb));
    }

    /// Fill with `0xAARRGGBB` (straight alpha), replacing what is there.
    pub fn clear_rgba(&mut self, argb: u32) {
        self.clear(Color::from_argb32(argb));
    }

    pub fn clear(&mut self, color: Color) {
        if let Some(mut c) = self.canvas() {
            c.paint_source(color.to_pixel());
        }
    }

    pub fn fill_rect<'g>(&mut self, fill: impl Into<Fill<'g>>, left: f32, top: f32, width: f32, height: f32) {
        if let Some(mut c) = self.canvas() {
            c.fill_rect(fill.into(), left, top, width, height);
        }
    }

    pub fn wire_rect<'g>(
        &mut self,
        fill: impl Into<Fill<'g>>,
        left: f32,
        top: f32,
        width: f32,
        height: f32,
        line_width: f32,
    ) {
        if let Some(mut c) = self.canvas() {
            c.wire_rect(fill.into(), left, top, width, height, line_width);
        }
    }

    pub fn fill_circle<'g>(&mut self, fill: impl Into<Fill<'g>>, x: f32, y: f32, radius: f32) {
        if let Some(mut c) = self.canvas() {
            c.fill_circle(fill.into(), x, y, radius);
        }
    }

    pub fn line<'g>(&mut self, fill: impl Into<Fill<'g>>, x0: f32, y0: f32, x1: f32, y1: f32, width: f32) {
        if let Some(mut c) = self.canvas() {
            c.line(fill.into(), x0, y0, x1, y1, width);
        }
    }

    /// Composite `src` with its top-left corner at (x, y).
    pub fn draw(&mut self, src: &Surface, x: f32, y: f32) {
        self.draw_alpha(src, x, y, 1.0, 1.0, 1.0);
    }

    /// Composite `src` scaled by (sx, sy) with opacity `alpha`.
    pub fn draw_alpha(&mut self, src: &Surface, x: f32, y: f32, sx: f32, sy: f32, alpha: f32) {
        if let Some(mut c) = self.canvas() {
            c.composite(&src.pixels, src.width, src.height, x, y, sx, sy, alpha);
        }
    }

    /// Restrict drawing to the given rectangle (within any current clip)
    /// until the matching `clip_end`.
    pub fn clip_begin(&mut self, x: f32, y: f32, width: f32, height: f32) {
        let full = Rect::new(0, 0, self.width, self.height);
        let Some(ctx) = self.context.as_mut() else {
            return;
        };
        let current = ctx.clips.last().copied().unwrap_or(full);
        ctx.clips
            .push(current.intersect(&pixel_box(x, y, x + width, y + height, full)));
    }

    pub fn clip_end(&mut self) {
        if let Some(ctx) = self.context.as_mut() {
            ctx.clips.pop();
        }
    }

    /// Returns the previous setting.
    pub fn set_antialiasing(&mut self, on: bool) -> bool {
        match self.context.as_mut() {
            Some(ctx) => std::mem::replace(&mut ctx.antialias, on),
            None => false,
        }
    }

    /// Returns the previous cap.
    pub fn set_line_cap(&mut self, cap: LineCap) -> LineCap {
        match self.context.as_mut() {
            Some(ctx) => std::mem::replace(&mut ctx.line_cap, cap),
            None => LineCap::default(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
