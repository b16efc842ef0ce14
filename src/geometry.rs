// ── Geometry ──────────────────────────────────────────────────────────────────
//
// Plain value types shared by the shells, the router and the backends.
// Coordinates are device pixels; sizes are signed so that arithmetic on
// client/frame deltas never has to cast.

use serde::{Deserialize, Serialize};

/// A rectangle given by its top-left corner and its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right() && y >= self.top && y < self.bottom()
    }

    /// Grow the rectangle outward by `insets` (client area → window area).
    pub fn outset(&self, insets: Insets) -> Rect {
        Rect {
            left: self.left - insets.left,
            top: self.top - insets.top,
            width: self.width + insets.left + insets.right,
            height: self.height + insets.top + insets.bottom,
        }
    }

    /// Intersection of two rectangles; empty rectangles have zero size.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        Rect::new(left, top, (right - left).max(0), (bottom - top).max(0))
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// Width and height pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

/// Difference between the window area and the client area on each side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Insets {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Which parts of a window position update actually changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PosChange {
    pub moved: bool,
    pub resized: bool,
}

impl PosChange {
    pub fn between(old: &Rect, new: &Rect) -> Self {
        Self {
            moved: old.left != new.left || old.top != new.top,
            resized: old.width != new.width || old.height != new.height,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.moved && !self.resized
    }
}

/// Size constraints of a window.  A negative value means "unconstrained".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeLimit {
    pub min_width: i32,
    pub min_height: i32,
    pub max_width: i32,
    pub max_height: i32,
    pub pre_width: i32,
    pub pre_height: i32,
}

impl Default for SizeLimit {
    fn default() -> Self {
        Self::UNLIMITED
    }
}

impl SizeLimit {
    pub const UNLIMITED: SizeLimit = SizeLimit {
        min_width: -1,
        min_height: -1,
        max_width: -1,
        max_height: -1,
        pre_width: -1,
        pre_height: -1,
    };

    /// Zero-sized windows are degenerate: a requested minimum of zero
    /// becomes one.
    pub fn normalized(mut self) -> Self {
        if self.min_width == 0 {
            self.min_width = 1;
        }
        if self.min_height == 0 {
            self.min_height = 1;
        }
        self
    }

    /// Clamp the size of `req` into the limits.  Maximum is applied first so
    /// that a conflicting minimum wins.
    pub fn apply(&self, req: &Rect) -> Rect {
        let mut dst = *req;
        if self.max_width >= 0 && dst.width > self.max_width {
            dst.width = self.max_width;
        }
        if self.max_height >= 0 && dst.height > self.max_height {
            dst.height = self.max_height;
        }
        if self.min_width >= 0 && dst.width < self.min_width {
            dst.width = self.min_width;
        }
        if self.min_height >= 0 && dst.height < self.min_height {
            dst.height = self.min_height;
        }
        dst
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_leaves_rect_alone() {
        let r = Rect::new(5, 6, 800, 600);
        assert_eq!(SizeLimit::UNLIMITED.apply(&r), r);
    }

    #[test]
    fn min_wins_over_conflicting_max() {
        let lim = SizeLimit {
            min_width: 300,
            max_width: 200,
            ..SizeLimit::UNLIMITED
        };
        assert_eq!(lim.apply(&Rect::new(0, 0, 250, 10)).width, 300);
    }

    #[test]
    fn zero_minimum_is_normalized_to_one() {
        let lim = SizeLimit {
            min_width: 0,
            min_height: 0,
            ..SizeLimit::UNLIMITED
        }
        .normalized();
        assert_eq!((lim.min_width, lim.min_height), (1, 1));
        assert_eq!(lim.apply(&Rect::new(0, 0, 0, 0)).size(), Size::new(1, 1));
    }

    #[test]
    fn outset_by_frame() {
        let r = Rect::new(100, 100, 640, 480).outset(Insets {
            left: 8,
            top: 31,
            right: 8,
            bottom: 8,
        });
        assert_eq!(r, Rect::new(92, 69, 656, 519));
    }

    #[test]
    fn pos_change_flags() {
        let a = Rect::new(0, 0, 10, 10);
        assert!(PosChange::between(&a, &a).is_empty());
        let c = PosChange::between(&a, &Rect::new(1, 0, 10, 12));
        assert!(c.moved && c.resized);
    }
}
