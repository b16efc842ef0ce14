// ── Click synthesis ───────────────────────────────────────────────────────────
//
// Three slots of press/release pairs, oldest first.  A press shifts the
// slots left and opens a new pair in the last slot; the matching release
// closes it and classifies the gesture.

use crate::event::{Event, EventKind};

#[derive(Debug, Clone, Copy, Default)]
struct ButtonPair {
    down: Event,
    up: Event,
}

#[derive(Debug, Clone)]
pub struct ClickHistory {
    slots: [ButtonPair; 3],
    threshold: u64,
}

impl ClickHistory {
    /// `threshold` bounds both press-to-release and release-to-release time.
    pub fn new(threshold: u64) -> Self {
        Self {
            slots: [ButtonPair::default(); 3],
            threshold,
        }
    }

    /// Record a button press; the oldest pair is discarded.
    pub fn press(&mut self, down: Event) {
        self.slots.rotate_left(1);
        self.slots[2] = ButtonPair {
            down,
            up: Event::default(),
        };
    }

    /// Record the release closing the newest pair and return the click kind
    /// it completes, if any.
    pub fn release(&mut self, up: Event) -> Option<EventKind> {
        self.slots[2].up = up;
        let [a, b, c] = &self.slots;
        if !self.is_click(c) {
            return None;
        }
        if !self.is_double(b, c) {
            return Some(EventKind::MouseClick);
        }
        if !self.is_double(a, b) {
            return Some(EventKind::MouseDoubleClick);
        }
        Some(EventKind::MouseTripleClick)
    }

    pub fn reset(&mut self) {
        self.slots = [ButtonPair::default(); 3];
    }

    fn is_click(&self, p: &ButtonPair) -> bool {
        p.down.kind == EventKind::MouseDown
            && p.up.kind == EventKind::MouseUp
            && p.down.code == p.up.code
            && p.up.time >= p.down.time
            && p.up.time - p.down.time <= self.threshold
            && p.down.left == p.up.left
            && p.down.top == p.up.top
    }

    /// `cur` follows `prev` closely enough for the pair to count as a
    /// double click.  `cur` is already known to be a click.
    fn is_double(&self, prev: &ButtonPair, cur: &ButtonPair) -> bool {
        self.is_click(prev)
            && prev.down.code == cur.down.code
            && cur.up.time >= prev.up.time
            && cur.up.time - prev.up.time <= self.threshold
            && prev.up.left == cur.up.left
            && prev.up.top == cur.up.top
    }
}

impl Default for ClickHistory {
    fn default() -> Self {
        Self::new(400)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
