// ── Software drawing context ──────────────────────────────────────────────────
//
// A small rasterizer over a premultiplied ARGB32 pixel buffer.  A `Canvas`
// borrows the buffer of an open frame for the duration of one primitive;
// the surface only hands one out between `begin_frame` and `end_frame`.

use super::gradient::Gradient;
use crate::geometry::Rect;

/// RGBA color, components in 0..=1, alpha is opacity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub alpha: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgb(red: f32, green: f32, blue: f32) -> Self {
        Self::rgba(red, green, blue, 1.0)
    }

    pub const fn rgba(red: f32, green: f32, blue: f32, alpha: f32) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// From `0xRRGGBB`, opaque.
    pub fn from_rgb24(rgb: u32) -> Self {
        Self::from_argb32(0xff00_0000 | (rgb & 0x00ff_ffff))
    }

    /// From `0xAARRGGBB` with straight (not premultiplied) alpha.
    pub fn from_argb32(argb: u32) -> Self {
        let ch = |shift: u32| ((argb >> shift) & 0xff) as f32 / 255.0;
        Self::rgba(ch(16), ch(8), ch(0), ch(24))
    }

    pub fn lerp(a: Color, b: Color, t: f32) -> Color {
        let mix = |x: f32, y: f32| x + (y - x) * t;
        Color::rgba(
            mix(a.red, b.red),
            mix(a.green, b.green),
            mix(a.blue, b.blue),
            mix(a.alpha, b.alpha),
        )
    }

    /// Premultiplied ARGB32 pixel value.
    pub fn to_pixel(self) -> u32 {
        let a = self.alpha.clamp(0.0, 1.0);
        let q = |v: f32| (v * 255.0 + 0.5) as u32;
        (q(a) << 24)
            | (q(self.red.clamp(0.0, 1.0) * a) << 16)
            | (q(self.green.clamp(0.0, 1.0) * a) << 8)
            | q(self.blue.clamp(0.0, 1.0) * a)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineCap {
    #[default]
    Butt,
    Round,
    Square,
}

/// What a primitive is filled with.
#[derive(Debug, Clone, Copy)]
pub enum Fill<'a> {
    Color(Color),
    Gradient(&'a Gradient),
}

impl From<Color> for Fill<'_> {
    fn from(c: Color) -> Self {
        Fill::Color(c)
    }
}

impl<'a> From<&'a Gradient> for Fill<'a> {
    fn from(g: &'a Gradient) -> Self {
        Fill::Gradient(g)
    }
}

impl Fill<'_> {
    fn pixel_at(&self, x: f32, y: f32) -> u32 {
        match self {
            Fill::Color(c) => c.to_pixel(),
            Fill::Gradient(g) => g.color_at(x, y).to_pixel(),
        }
    }
}

// ── Pixel arithmetic ──────────────────────────────────────────────────────────

fn scale(px: u32, k: f32) -> u32 {
    if k >= 1.0 {
        return px;
    }
    let ch = |shift: u32| ((((px >> shift) & 0xff) as f32 * k) + 0.5) as u32;
    (ch(24) << 24) | (ch(16) << 16) | (ch(8) << 8) | ch(0)
}

/// Source-over for premultiplied pixels, with `coverage` applied to `src`.
pub(crate) fn blend_over(dst: u32, src: u32, coverage: f32) -> u32 {
    if coverage <= 0.0 {
        return dst;
    }
    let src = scale(src, coverage);
    let sa = src >> 24;
    if sa == 0xff {
        return src;
    }
    let inv = 255 - sa;
    let ch = |shift: u32| {
        let s = (src >> shift) & 0xff;
        let d = (dst >> shift) & 0xff;
        (s + (d * inv + 127) / 255).min(255)
    };
    (ch(24) << 24) | (ch(16) << 16) | (ch(8) << 8) | ch(0)
}

/// Pixels touched by the float box, limited to `bounds`.  A NaN bound
/// touches nothing; huge bounds are pulled in before the integer cast.
pub(crate) fn pixel_box(x0: f32, y0: f32, x1: f32, y1: f32, bounds: Rect) -> Rect {
    if [x0, y0, x1, y1].iter().any(|v| v.is_nan()) {
        return Rect::new(bounds.left, bounds.top, 0, 0);
    }
    let hx = |v: f32| v.clamp(bounds.left as f32 - 1.0, bounds.right() as f32 + 1.0);
    let hy = |v: f32| v.clamp(bounds.top as f32 - 1.0, bounds.bottom() as f32 + 1.0);
    let (l, t) = (hx(x0).floor() as i32, hy(y0).floor() as i32);
    let (r, b) = (hx(x1).ceil() as i32, hy(y1).ceil() as i32);
    Rect::new(l, t, r - l, b - t).intersect(&bounds)
}

fn overlap(cell: i32, lo: f32, hi: f32) -> f32 {
    let c = cell as f32;
    ((c + 1.0).min(hi) - c.max(lo)).clamp(0.0, 1.0)
}

// ── Canvas ────────────────────────────────────────────────────────────────────

pub(crate) struct Canvas<'a> {
    pub pixels: &'a mut [u32],
    pub width: i32,
    pub height: i32,
    pub clip: Rect,
    pub antialias: bool,
    pub line_cap: LineCap,
}

impl Canvas<'_> {
    /// Pixel rows/columns touched by the float box, clipped.
    fn span(&self, x0: f32, y0: f32, x1: f32, y1: f32) -> Rect {
        pixel_box(x0, y0, x1, y1, Rect::new(0, 0, self.width, self.height)).intersect(&self.clip)
    }

    fn put(&mut self, x: i32, y: i32, src: u32, coverage: f32) {
        let idx = (y * self.width + x) as usize;
        if let Some(px) = self.pixels.get_mut(idx) {
            *px = blend_over(*px, src, coverage);
        }
    }

    fn coverage(&self, c: f32) -> f32 {
        if self.antialias {
            c
        } else if c >= 0.5 {
            1.0
        } else {
            0.0
        }
    }

    /// Replace every pixel inside the clip, ignoring what was there.
    pub fn paint_source(&mut self, px: u32) {
        let area = self.span(0.0, 0.0, self.width as f32, self.height as f32);
        for y in area.top..area.bottom() {
            let row = (y * self.width) as usize;
            let from = row + area.left as usize;
            let to = row + area.right() as usize;
            if let Some(slice) = self.pixels.get_mut(from..to) {
                slice.fill(px);
            }
        }
    }

    pub fn fill_rect(&mut self, fill: Fill<'_>, left: f32, top: f32, width: f32, height: f32) {
        if width <= 0.0 || height <= 0.0 {
            return;
        }
        let (r, b) = (left + width, top + height);
        let area = self.span(left, top, r, b);
        for y in area.top..area.bottom() {
            let cy = overlap(y, top, b);
            for x in area.left..area.right() {
                let cov = self.coverage(overlap(x, left, r) * cy);
                if cov > 0.0 {
                    let src = fill.pixel_at(x as f32 + 0.5, y as f32 + 0.5);
                    self.put(x, y, src, cov);
                }
            }
        }
    }

    /// Rectangle outline drawn inside the given bounds.
    pub fn wire_rect(&mut self, fill: Fill<'_>, left: f32, top: f32, width: f32, height: f32, line: f32) {
        let lw = line.min(width / 2.0).min(height / 2.0);
        if lw <= 0.0 {
            return;
        }
        self.fill_rect(fill, left, top, width, lw);
        self.fill_rect(fill, left, top + height - lw, width, lw);
        self.fill_rect(fill, left, top + lw, lw, height - 2.0 * lw);
        self.fill_rect(fill, left + width - lw, top + lw, lw, height - 2.0 * lw);
    }

    pub fn fill_circle(&mut self, fill: Fill<'_>, cx: f32, cy: f32, radius: f32) {
        if radius <= 0.0 {
            return;
        }
        let area = self.span(cx - radius, cy - radius, cx + radius, cy + radius);
        for y in area.top..area.bottom() {
            for x in area.left..area.right() {
                let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
                let d = ((px - cx).powi(2) + (py - cy).powi(2)).sqrt();
                let cov = self.coverage((radius + 0.5 - d).clamp(0.0, 1.0));
                if cov > 0.0 {
                    self.put(x, y, fill.pixel_at(px, py), cov);
                }
            }
        }
    }

    pub fn line(&mut self, fill: Fill<'_>, x0: f32, y0: f32, x1: f32, y1: f32, width: f32) {
        let hw = width.max(1.0) / 2.0;
        let (dx, dy) = (x1 - x0, y1 - y0);
        let len = (dx * dx + dy * dy).sqrt();
        let ext = match self.line_cap {
            LineCap::Butt => 0.0,
            LineCap::Round | LineCap::Square => hw,
        };
        let area = self.span(
            x0.min(x1) - hw - 1.0,
            y0.min(y1) - hw - 1.0,
            x0.max(x1) + hw + 1.0,
            y0.max(y1) + hw + 1.0,
        );

        for y in area.top..area.bottom() {
            for x in area.left..area.right() {
                let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
                // Position along the segment (s) and distance from it (d).
                let (s, d) = if len == 0.0 {
                    (0.0, ((px - x0).powi(2) + (py - y0).powi(2)).sqrt())
                } else {
                    let s = ((px - x0) * dx + (py - y0) * dy) / len;
                    let d = ((px - x0) * dy - (py - y0) * dx).abs() / len;
                    (s, d)
                };
                let inside = match self.line_cap {
                    LineCap::Round if s < 0.0 || s > len => {
                        let (ex, ey) = if s < 0.0 { (x0, y0) } else { (x1, y1) };
                        hw + 0.5 - ((px - ex).powi(2) + (py - ey).powi(2)).sqrt()
                    }
                    _ => {
                        let along = (s + ext + 0.5).min(len + ext + 0.5 - s);
                        (hw + 0.5 - d).min(along)
                    }
                };
                let cov = self.coverage(inside.clamp(0.0, 1.0));
                if cov > 0.0 {
                    self.put(x, y, fill.pixel_at(px, py), cov);
                }
            }
        }
    }

    /// Draw `src` (w × h) with its top-left at (x, y), scaled by (sx, sy)
    /// with nearest-neighbour sampling, faded by `alpha` (opacity).
    #[allow(clippy::too_many_arguments)]
    pub fn composite(&mut self, src: &[u32], w: i32, h: i32, x: f32, y: f32, sx: f32, sy: f32, alpha: f32) {
        if w <= 0 || h <= 0 || sx <= 0.0 || sy <= 0.0 || alpha <= 0.0 {
            return;
        }
        let area = self.span(x, y, x + w as f32 * sx, y + h as f32 * sy);
        for dy in area.top..area.bottom() {
            let v = ((dy as f32 + 0.5 - y) / sy).floor() as i32;
            if v < 0 || v >= h {
                continue;
            }
            for dx in area.left..area.right() {
                let u = ((dx as f32 + 0.5 - x) / sx).floor() as i32;
                if u < 0 || u >= w {
                    continue;
                }
                if let Some(&px) = src.get((v * w + u) as usize) {
                    self.put(dx, dy, px, alpha.min(1.0));
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas(buf: &mut [u32], w: i32, h: i32) -> Canvas<'_> {
        Canvas {
            pixels: buf,
            width: w,
            height: h,
            clip: Rect::new(0, 0, w, h),
            antialias: false,
            line_cap: LineCap::Butt,
        }
    }

    #[test]
    fn opaque_over_replaces() {
        assert_eq!(blend_over(0xff00_00ff, 0xffff_0000, 1.0), 0xffff_0000);
        assert_eq!(blend_over(0xff00_00ff, 0xffff_0000, 0.0), 0xff00_00ff);
    }

    #[test]
    fn half_transparent_over_black() {
        let half_white = Color::rgba(1.0, 1.0, 1.0, 0.5).to_pixel();
        let out = blend_over(0xff00_0000, half_white, 1.0);
        assert_eq!(out >> 24, 0xff);
        assert!(((out >> 16) & 0xff).abs_diff(128) <= 1);
    }

    #[test]
    fn fill_rect_respects_clip() {
        let mut buf = vec![0u32; 16];
        let mut c = canvas(&mut buf, 4, 4);
        c.clip = Rect::new(1, 1, 2, 2);
        c.fill_rect(Color::WHITE.into(), 0.0, 0.0, 4.0, 4.0);
        let white = buf.iter().filter(|&&p| p == 0xffff_ffff).count();
        assert_eq!(white, 4);
        assert_eq!(buf[0], 0);
        assert_eq!(buf[5], 0xffff_ffff);
    }

    #[test]
    fn wire_rect_leaves_center() {
        let mut buf = vec![0u32; 25];
        canvas(&mut buf, 5, 5).wire_rect(Color::WHITE.into(), 0.0, 0.0, 5.0, 5.0, 1.0);
        assert_eq!(buf[12], 0);
        assert_eq!(buf.iter().filter(|&&p| p != 0).count(), 16);
    }

    #[test]
    fn circle_center_and_corner() {
        let mut buf = vec![0u32; 100];
        canvas(&mut buf, 10, 10).fill_circle(Color::WHITE.into(), 5.0, 5.0, 3.0);
        assert_eq!(buf[5 * 10 + 5], 0xffff_ffff);
        assert_eq!(buf[0], 0);
    }

    #[test]
    fn horizontal_line() {
        let mut buf = vec![0u32; 100];
        canvas(&mut buf, 10, 10).line(Color::WHITE.into(), 1.0, 5.0, 9.0, 5.0, 2.0);
        assert_eq!(buf[5 * 10 + 4], 0xffff_ffff);
        assert_eq!(buf[5 * 10], 0);
        assert_eq!(buf[10 + 4], 0);
    }

    #[test]
    fn huge_fill_covers_the_canvas() {
        let mut buf = vec![0u32; 16];
        canvas(&mut buf, 4, 4).fill_rect(Color::WHITE.into(), -10.0, -10.0, f32::MAX, f32::MAX);
        assert!(buf.iter().all(|&p| p == 0xffff_ffff));
    }

    #[test]
    fn nan_and_infinite_bounds_do_not_panic() {
        let mut buf = vec![0u32; 16];
        let mut c = canvas(&mut buf, 4, 4);
        c.fill_rect(Color::WHITE.into(), f32::NAN, 0.0, 2.0, 2.0);
        c.fill_circle(Color::WHITE.into(), 1.0, f32::NAN, 2.0);
        c.line(Color::WHITE.into(), 0.0, 0.0, f32::INFINITY, 1.0, 1.0);
        c.composite(&[0xffff_0000], 1, 1, f32::NEG_INFINITY, 0.0, 1.0, 1.0, 1.0);
        assert_eq!(buf[15], 0);
    }

    #[test]
    fn pixel_box_clamps_to_bounds() {
        let b = Rect::new(0, 0, 8, 6);
        assert_eq!(pixel_box(-1e30, -1e30, 1e30, 1e30, b), b);
        assert_eq!(pixel_box(1.5, 1.5, 2.5, 2.5, b), Rect::new(1, 1, 2, 2));
        assert!(pixel_box(f32::NAN, 0.0, 1.0, 1.0, b).is_empty());
    }

    #[test]
    fn composite_scales_nearest() {
        let src = [0xffff_0000u32, 0xff00_ff00];
        let mut buf = vec![0u32; 8];
        canvas(&mut buf, 4, 2).composite(&src, 2, 1, 0.0, 0.0, 2.0, 2.0, 1.0);
        assert_eq!(&buf[..4], &[0xffff_0000, 0xffff_0000, 0xff00_ff00, 0xff00_ff00]);
        assert_eq!(buf[4..], buf[..4]);
    }
}
