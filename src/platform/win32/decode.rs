// ── Message parameter decoding ────────────────────────────────────────────────
//
// Pure helpers that pick WPARAM / LPARAM apart.  No FFI here, so everything
// is unit-tested directly.

use crate::event::{KeyCode, Modifiers, MouseButton, ScrollDirection};

// MK_* bits of the mouse-message WPARAM.
const MK_LBUTTON: usize = 0x0001;
const MK_RBUTTON: usize = 0x0002;
const MK_SHIFT: usize = 0x0004;
const MK_CONTROL: usize = 0x0008;
const MK_MBUTTON: usize = 0x0010;
const MK_XBUTTON1: usize = 0x0020;
const MK_XBUTTON2: usize = 0x0040;

const XBUTTON1: u16 = 0x0001;
const XBUTTON2: u16 = 0x0002;

pub(crate) fn loword(v: usize) -> u16 {
    (v & 0xffff) as u16
}

pub(crate) fn hiword(v: usize) -> u16 {
    ((v >> 16) & 0xffff) as u16
}

/// Signed client coordinates packed into a mouse-message LPARAM.
/// Coordinates left of or above the client area are negative.
pub(crate) fn point(lparam: isize) -> (i32, i32) {
    let x = loword(lparam as usize) as i16;
    let y = hiword(lparam as usize) as i16;
    (i32::from(x), i32::from(y))
}

/// Buttons and keyboard modifiers reported in a mouse-message WPARAM.  Alt
/// is not part of the mask and must be queried separately.
pub(crate) fn mouse_state(wparam: usize) -> Modifiers {
    const MAP: [(usize, Modifiers); 7] = [
        (MK_SHIFT, Modifiers::SHIFT),
        (MK_CONTROL, Modifiers::CONTROL),
        (MK_LBUTTON, Modifiers::LEFT),
        (MK_MBUTTON, Modifiers::MIDDLE),
        (MK_RBUTTON, Modifiers::RIGHT),
        (MK_XBUTTON1, Modifiers::BUTTON4),
        (MK_XBUTTON2, Modifiers::BUTTON5),
    ];
    MAP.iter()
        .filter(|(mask, _)| wparam & mask != 0)
        .fold(Modifiers::empty(), |acc, (_, flag)| acc | *flag)
}

/// Which extra button a WM_XBUTTON* message is about.
pub(crate) fn xbutton(wparam: usize) -> Option<MouseButton> {
    match hiword(wparam) {
        XBUTTON1 => Some(MouseButton::Button4),
        XBUTTON2 => Some(MouseButton::Button5),
        _ => None,
    }
}

/// Wheel rotation sign to direction.  Positive deltas roll away from the
/// user (vertical) or to the right (horizontal).
pub(crate) fn wheel(wparam: usize, horizontal: bool) -> ScrollDirection {
    let delta = hiword(wparam) as i16;
    match (horizontal, delta > 0) {
        (false, true) => ScrollDirection::Up,
        (false, false) => ScrollDirection::Down,
        (true, true) => ScrollDirection::Right,
        (true, false) => ScrollDirection::Left,
    }
}

/// Virtual-key code to key identifier.  Letter and digit keys only map while
/// Control is held; otherwise they produce text and are reported unknown.
pub(crate) fn key_code(vk: u16, control: bool) -> KeyCode {
    match vk {
        0x08 => KeyCode::Backspace,
        0x09 => KeyCode::Tab,
        0x0d => KeyCode::Return,
        0x14 => KeyCode::CapsLock,
        0x1b => KeyCode::Escape,
        0x21 => KeyCode::PageUp,
        0x22 => KeyCode::PageDown,
        0x23 => KeyCode::End,
        0x24 => KeyCode::Home,
        0x25 => KeyCode::Left,
        0x26 => KeyCode::Up,
        0x27 => KeyCode::Right,
        0x28 => KeyCode::Down,
        0x29 => KeyCode::Select,
        0x2a => KeyCode::Print,
        0x2b => KeyCode::Execute,
        0x2d => KeyCode::Insert,
        0x2e => KeyCode::Delete,
        0x2f => KeyCode::Help,
        0x60..=0x69 => KeyCode::Keypad((vk - 0x60) as u8),
        0x6a => KeyCode::KeypadMultiply,
        0x6b => KeyCode::KeypadAdd,
        0x6c => KeyCode::KeypadSeparator,
        0x6d => KeyCode::KeypadSubtract,
        0x6e => KeyCode::KeypadDecimal,
        0x6f => KeyCode::KeypadDivide,
        0x70..=0x87 => KeyCode::F((vk - 0x70 + 1) as u8),
        0x90 => KeyCode::NumLock,
        0x91 => KeyCode::ScrollLock,
        0x30..=0x39 | 0x41..=0x5a if control => KeyCode::Char(char::from(vk as u8)),
        _ => KeyCode::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_coordinates_survive() {
        let lparam = ((-5i16 as u16 as isize) << 16) | (-12i16 as u16 as isize);
        assert_eq!(point(lparam), (-12, -5));
        assert_eq!(point((40 << 16) | 30), (30, 40));
    }

    #[test]
    fn mouse_state_bits() {
        let s = mouse_state(MK_LBUTTON | MK_SHIFT | MK_XBUTTON2);
        assert_eq!(s, Modifiers::LEFT | Modifiers::SHIFT | Modifiers::BUTTON5);
        assert!(mouse_state(0).is_empty());
    }

    #[test]
    fn wheel_directions() {
        let up = 120usize << 16;
        let down = (-120i16 as u16 as usize) << 16;
        assert_eq!(wheel(up, false), ScrollDirection::Up);
        assert_eq!(wheel(down, false), ScrollDirection::Down);
        assert_eq!(wheel(up, true), ScrollDirection::Right);
        assert_eq!(wheel(down, true), ScrollDirection::Left);
    }

    #[test]
    fn keys() {
        assert_eq!(key_code(0x70, false), KeyCode::F(1));
        assert_eq!(key_code(0x87, false), KeyCode::F(24));
        assert_eq!(key_code(0x63, false), KeyCode::Keypad(3));
        assert_eq!(key_code(0x41, false), KeyCode::Unknown);
        assert_eq!(key_code(0x41, true), KeyCode::Char('A'));
        assert_eq!(key_code(0x37, true), KeyCode::Char('7'));
    }

    #[test]
    fn extra_buttons() {
        assert_eq!(xbutton(1 << 16), Some(MouseButton::Button4));
        assert_eq!(xbutton(2 << 16), Some(MouseButton::Button5));
        assert_eq!(xbutton(0), None);
    }
}
