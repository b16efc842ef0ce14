// ── Headless backend ──────────────────────────────────────────────────────────
//
// An in-memory window system with a simulated clock.  Used by the test suite
// and on targets without a native backend.
//
// It mirrors the delivery rules of a real window system:
//   • show/hide/reposition/destroy *send* their notifications, i.e. deliver
//     them through the sink before the call returns;
//   • input and paint requests are *posted* to a queue that `wait_events`
//     drains.
// Cloning the backend yields another handle to the same state, so a test can
// keep one clone while the display owns the other.

use std::{
    cell::RefCell,
    collections::{BTreeMap, HashSet, VecDeque},
    path::PathBuf,
    rc::{Rc, Weak},
};

use super::{
    CreateParams, Frame, MessageSink, Monitor, MousePointer, NativeBackend, NativeHandle,
    NativeMessage, PaintContext, WindowStyle,
};
use crate::{
    error::{Result, WsError},
    event::Timestamp,
    geometry::{Insets, PosChange, Rect, Size},
};

/// A frame handed to `blit`, kept for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct PresentedFrame {
    pub handle: NativeHandle,
    pub width: i32,
    pub height: i32,
    pub dest: Size,
    pub pixels: Vec<u32>,
}

#[derive(Debug, Clone)]
struct HeadlessWindow {
    style: WindowStyle,
    parent: Option<NativeHandle>,
    /// Client rectangle relative to the parent (screen for top-level).
    rect: Rect,
    visible: bool,
    caption: String,
    accept_files: bool,
}

struct HeadlessState {
    next_handle: isize,
    windows: BTreeMap<NativeHandle, HeadlessWindow>,
    clock: Timestamp,
    insets: Insets,
    monitors: Vec<Monitor>,
    capture: Option<NativeHandle>,
    focus: Option<NativeHandle>,
    tracking: HashSet<NativeHandle>,
    cursor: MousePointer,
    cursor_pos: (i32, i32),
    fail_create: bool,
    outbox: VecDeque<(NativeHandle, NativeMessage)>,
    frames: Vec<PresentedFrame>,
    invalidations: Vec<NativeHandle>,
    excluded: Vec<NativeHandle>,
    sink: Option<Weak<dyn MessageSink>>,
    shut_down: bool,
}

impl Default for HeadlessState {
    fn default() -> Self {
        Self {
            next_handle: 0x100,
            windows: BTreeMap::new(),
            clock: 1_000,
            insets: Insets::default(),
            monitors: vec![Monitor {
                rect: Rect::new(0, 0, 1920, 1080),
                primary: true,
            }],
            capture: None,
            focus: None,
            tracking: HashSet::new(),
            cursor: MousePointer::default(),
            cursor_pos: (0, 0),
            fail_create: false,
            outbox: VecDeque::new(),
            frames: Vec::new(),
            invalidations: Vec::new(),
            excluded: Vec::new(),
            sink: None,
            shut_down: false,
        }
    }
}

impl HeadlessState {
    fn window(&self, handle: NativeHandle) -> Result<&HeadlessWindow> {
        self.windows.get(&handle).ok_or(WsError::NotFound)
    }

    fn window_mut(&mut self, handle: NativeHandle) -> Result<&mut HeadlessWindow> {
        self.windows.get_mut(&handle).ok_or(WsError::NotFound)
    }

    fn insets_of(&self, handle: NativeHandle) -> Insets {
        match self.windows.get(&handle) {
            Some(w) if w.style == WindowStyle::TopLevel => self.insets,
            _ => Insets::default(),
        }
    }

    fn origin_of(&self, handle: NativeHandle) -> (i32, i32) {
        let mut x = 0;
        let mut y = 0;
        let mut cur = Some(handle);
        while let Some(h) = cur {
            let Some(w) = self.windows.get(&h) else {
                break;
            };
            x += w.rect.left;
            y += w.rect.top;
            cur = w.parent;
        }
        (x, y)
    }

    /// `handle` followed by all of its descendants, parents first.
    fn subtree(&self, handle: NativeHandle) -> Vec<NativeHandle> {
        let mut out = vec![handle];
        let mut i = 0;
        while i < out.len() {
            let parent = out[i];
            out.extend(
                self.windows
                    .iter()
                    .filter(|(_, w)| w.parent == Some(parent))
                    .map(|(h, _)| *h),
            );
            i += 1;
        }
        out
    }

    fn post(&mut self, handle: NativeHandle, message: NativeMessage) {
        self.outbox.push_back((handle, message));
    }
}

/// Deterministic in-memory window system.
#[derive(Clone, Default)]
pub struct HeadlessBackend {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Simulation controls ──────────────────────────────────────────────────

    /// Move the simulated clock forward.
    pub fn advance(&self, ms: u64) {
        self.state.borrow_mut().clock += ms;
    }

    pub fn set_frame_insets(&self, insets: Insets) {
        self.state.borrow_mut().insets = insets;
    }

    pub fn set_monitors(&self, monitors: Vec<Monitor>) {
        self.state.borrow_mut().monitors = monitors;
    }

    pub fn set_cursor_position(&self, left: i32, top: i32) {
        self.state.borrow_mut().cursor_pos = (left, top);
    }

    /// Make every following `create_window` fail until switched off.
    pub fn fail_create(&self, fail: bool) {
        self.state.borrow_mut().fail_create = fail;
    }

    /// Create a visible top-level window that no shell owns, standing in
    /// for a host application's window.
    pub fn create_foreign(&self, rect: Rect) -> NativeHandle {
        let mut st = self.state.borrow_mut();
        let handle = NativeHandle(st.next_handle);
        st.next_handle += 2;
        st.windows.insert(
            handle,
            HeadlessWindow {
                style: WindowStyle::TopLevel,
                parent: None,
                rect,
                visible: true,
                caption: String::new(),
                accept_files: false,
            },
        );
        handle
    }

    /// Queue a message for the next `wait_events`.
    pub fn post(&self, handle: NativeHandle, message: NativeMessage) {
        self.state.borrow_mut().post(handle, message);
    }

    /// Deliver a message now.  Returns whether a window claimed it.
    pub fn send(&self, handle: NativeHandle, message: NativeMessage) -> bool {
        let (sink, time) = {
            let st = self.state.borrow();
            (st.sink.clone(), st.clock)
        };
        match sink.and_then(|s| s.upgrade()) {
            Some(sink) => sink.deliver(handle, message, time),
            None => false,
        }
    }

    /// Pointer left `handle`: posts `MouseLeave` if leave tracking was armed.
    pub fn leave(&self, handle: NativeHandle) {
        let mut st = self.state.borrow_mut();
        if st.tracking.remove(&handle) {
            st.post(handle, NativeMessage::MouseLeave);
        }
    }

    /// Drop files on `handle` if it accepts them.
    pub fn drop_files(&self, handle: NativeHandle, left: i32, top: i32, files: Vec<PathBuf>) -> bool {
        let mut st = self.state.borrow_mut();
        if !st.windows.get(&handle).is_some_and(|w| w.accept_files) {
            return false;
        }
        st.post(handle, NativeMessage::DropFiles { left, top, files });
        true
    }

    // ── Inspection ───────────────────────────────────────────────────────────

    pub fn exists(&self, handle: NativeHandle) -> bool {
        self.state.borrow().windows.contains_key(&handle)
    }

    pub fn window_count(&self) -> usize {
        self.state.borrow().windows.len()
    }

    pub fn is_visible(&self, handle: NativeHandle) -> bool {
        self.state
            .borrow()
            .windows
            .get(&handle)
            .is_some_and(|w| w.visible)
    }

    pub fn window_rect(&self, handle: NativeHandle) -> Option<Rect> {
        self.state.borrow().windows.get(&handle).map(|w| w.rect)
    }

    pub fn parent(&self, handle: NativeHandle) -> Option<NativeHandle> {
        self.state.borrow().windows.get(&handle).and_then(|w| w.parent)
    }

    pub fn style(&self, handle: NativeHandle) -> Option<WindowStyle> {
        self.state.borrow().windows.get(&handle).map(|w| w.style)
    }

    pub fn caption(&self, handle: NativeHandle) -> Option<String> {
        self.state
            .borrow()
            .windows
            .get(&handle)
            .map(|w| w.caption.clone())
    }

    pub fn focused(&self) -> Option<NativeHandle> {
        self.state.borrow().focus
    }

    pub fn cursor(&self) -> MousePointer {
        self.state.borrow().cursor
    }

    pub fn is_tracking(&self, handle: NativeHandle) -> bool {
        self.state.borrow().tracking.contains(&handle)
    }

    pub fn pending(&self) -> usize {
        self.state.borrow().outbox.len()
    }

    pub fn take_frames(&self) -> Vec<PresentedFrame> {
        std::mem::take(&mut self.state.borrow_mut().frames)
    }

    pub fn take_invalidations(&self) -> Vec<NativeHandle> {
        std::mem::take(&mut self.state.borrow_mut().invalidations)
    }

    /// Children clipped out by `exclude_children`, across all paints.
    pub fn take_excluded(&self) -> Vec<NativeHandle> {
        std::mem::take(&mut self.state.borrow_mut().excluded)
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.borrow().shut_down
    }

    /// Queue a `Paint` unless one is already queued.
    fn repaint(&self, handle: NativeHandle) {
        let mut st = self.state.borrow_mut();
        let queued = st
            .outbox
            .iter()
            .any(|(h, m)| *h == handle && *m == NativeMessage::Paint);
        if !queued && st.windows.contains_key(&handle) {
            st.post(handle, NativeMessage::Paint);
        }
    }

    fn change_focus(&self, handle: NativeHandle) {
        let old = {
            let mut st = self.state.borrow_mut();
            if st.focus == Some(handle) {
                return;
            }
            st.focus.replace(handle)
        };
        if let Some(old) = old {
            self.send(old, NativeMessage::FocusOut);
        }
        self.send(handle, NativeMessage::FocusIn);
    }
}

impl NativeBackend for HeadlessBackend {
    fn now(&self) -> Timestamp {
        self.state.borrow().clock
    }

    fn attach(&self, sink: Weak<dyn MessageSink>) {
        self.state.borrow_mut().sink = Some(sink);
    }

    fn create_window(&self, params: &CreateParams<'_>) -> Result<NativeHandle> {
        let mut st = self.state.borrow_mut();
        if st.fail_create {
            return Err(WsError::NoMem);
        }
        if let Some(parent) = params.parent {
            st.window(parent)?;
        }
        if params.style == WindowStyle::Child && params.parent.is_none() {
            return Err(WsError::BadArguments);
        }

        let handle = NativeHandle(st.next_handle);
        st.next_handle += 2;
        st.windows.insert(
            handle,
            HeadlessWindow {
                style: params.style,
                parent: params.parent,
                rect: params.rect,
                visible: false,
                caption: params.caption.to_owned(),
                accept_files: false,
            },
        );
        Ok(handle)
    }

    fn destroy_window(&self, handle: NativeHandle) -> Result<()> {
        let doomed = {
            let mut st = self.state.borrow_mut();
            st.window(handle)?;
            let doomed = st.subtree(handle);
            for h in &doomed {
                st.windows.remove(h);
                st.tracking.remove(h);
                if st.capture == Some(*h) {
                    st.capture = None;
                }
                if st.focus == Some(*h) {
                    st.focus = None;
                }
            }
            st.outbox.retain(|(h, _)| !doomed.contains(h));
            doomed
        };
        for h in doomed {
            self.send(h, NativeMessage::Destroyed);
        }
        Ok(())
    }

    fn show_window(&self, handle: NativeHandle) -> Result<()> {
        {
            let mut st = self.state.borrow_mut();
            let w = st.window_mut(handle)?;
            if w.visible {
                return Ok(());
            }
            w.visible = true;
        }
        self.send(handle, NativeMessage::Shown);
        self.repaint(handle);
        Ok(())
    }

    fn hide_window(&self, handle: NativeHandle) -> Result<()> {
        {
            let mut st = self.state.borrow_mut();
            let w = st.window_mut(handle)?;
            if !w.visible {
                return Ok(());
            }
            w.visible = false;
        }
        self.send(handle, NativeMessage::Hidden);
        Ok(())
    }

    fn raise_and_focus(&self, handle: NativeHandle) -> Result<()> {
        self.state.borrow().window(handle)?;
        self.change_focus(handle);
        Ok(())
    }

    fn set_window_pos(&self, handle: NativeHandle, outer: Rect, change: PosChange) -> Result<()> {
        let (client, repaint) = {
            let mut st = self.state.borrow_mut();
            let insets = st.insets_of(handle);
            let w = st.window_mut(handle)?;
            let mut client = Rect::new(
                outer.left + insets.left,
                outer.top + insets.top,
                (outer.width - insets.left - insets.right).max(0),
                (outer.height - insets.top - insets.bottom).max(0),
            );
            if !change.moved {
                client.left = w.rect.left;
                client.top = w.rect.top;
            }
            if !change.resized {
                client.width = w.rect.width;
                client.height = w.rect.height;
            }
            if client == w.rect {
                return Ok(());
            }
            // A size change repaints the whole client area.
            let repaint = w.visible && client.size() != w.rect.size();
            w.rect = client;
            (client, repaint)
        };
        self.send(handle, NativeMessage::Resized(client));
        if repaint {
            self.repaint(handle);
        }
        Ok(())
    }

    fn frame_insets(&self, handle: NativeHandle) -> Insets {
        self.state.borrow().insets_of(handle)
    }

    fn screen_origin(&self, handle: NativeHandle) -> (i32, i32) {
        self.state.borrow().origin_of(handle)
    }

    fn client_rect(&self, handle: NativeHandle) -> Option<Rect> {
        self.window_rect(handle)
    }

    fn set_capture(&self, handle: NativeHandle) {
        self.state.borrow_mut().capture = Some(handle);
    }

    fn release_capture(&self) {
        self.state.borrow_mut().capture = None;
    }

    fn capture(&self) -> Option<NativeHandle> {
        self.state.borrow().capture
    }

    fn track_mouse_leave(&self, handle: NativeHandle) {
        self.state.borrow_mut().tracking.insert(handle);
    }

    fn set_cursor(&self, pointer: MousePointer) {
        self.state.borrow_mut().cursor = pointer;
    }

    fn invalidate(&self, handle: NativeHandle) {
        let mut st = self.state.borrow_mut();
        if !st.windows.contains_key(&handle) {
            return;
        }
        st.invalidations.push(handle);
        drop(st);
        self.repaint(handle);
    }

    fn begin_paint(&self, handle: NativeHandle) -> Option<PaintContext> {
        let st = self.state.borrow();
        st.windows.get(&handle).map(|_| PaintContext {
            handle,
            dc: handle.0,
        })
    }

    fn exclude_children(&self, ctx: &PaintContext) {
        let mut st = self.state.borrow_mut();
        let children: Vec<NativeHandle> = st
            .windows
            .iter()
            .filter(|(_, w)| w.parent == Some(ctx.handle) && w.visible)
            .map(|(h, _)| *h)
            .collect();
        st.excluded.extend(children);
    }

    fn blit(&self, ctx: &PaintContext, frame: &Frame<'_>, dest: Size) -> Result<()> {
        self.state.borrow_mut().frames.push(PresentedFrame {
            handle: ctx.handle,
            width: frame.width,
            height: frame.height,
            dest,
            pixels: frame.pixels.to_vec(),
        });
        Ok(())
    }

    fn end_paint(&self, ctx: PaintContext) {
        // The paint validated the window.
        let mut st = self.state.borrow_mut();
        st.outbox
            .retain(|(h, m)| !(*h == ctx.handle && *m == NativeMessage::Paint));
    }

    fn set_caption(&self, handle: NativeHandle, caption: &str) -> Result<()> {
        self.state.borrow_mut().window_mut(handle)?.caption = caption.to_owned();
        Ok(())
    }

    fn set_focus(&self, handle: NativeHandle) -> Result<()> {
        self.raise_and_focus(handle)
    }

    fn accept_files(&self, handle: NativeHandle, accept: bool) {
        if let Some(w) = self.state.borrow_mut().windows.get_mut(&handle) {
            w.accept_files = accept;
        }
    }

    fn monitors(&self) -> Vec<Monitor> {
        self.state.borrow().monitors.clone()
    }

    fn cursor_position(&self) -> (i32, i32) {
        self.state.borrow().cursor_pos
    }

    fn wait_events(&self, timeout_ms: u64) -> Result<()> {
        let queued = self.state.borrow().outbox.len();
        if queued == 0 {
            self.advance(timeout_ms);
            return Ok(());
        }
        // Only what was queued on entry; anything posted while delivering
        // waits for the next call.
        for _ in 0..queued {
            let next = self.state.borrow_mut().outbox.pop_front();
            let Some((handle, message)) = next else {
                break;
            };
            self.send(handle, message);
        }
        Ok(())
    }

    fn shutdown(&self) {
        let mut st = self.state.borrow_mut();
        st.windows.clear();
        st.outbox.clear();
        st.capture = None;
        st.focus = None;
        st.sink = None;
        st.shut_down = true;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log(RefCell<Vec<(NativeHandle, NativeMessage)>>);

    impl MessageSink for Log {
        fn deliver(&self, handle: NativeHandle, message: NativeMessage, _: Timestamp) -> bool {
            self.0.borrow_mut().push((handle, message));
            true
        }
    }

    fn attached() -> (HeadlessBackend, Rc<Log>) {
        let b = HeadlessBackend::new();
        let log = Rc::new(Log::default());
        let sink: Rc<dyn MessageSink> = log.clone();
        b.attach(Rc::downgrade(&sink));
        // Keep the sink alive through `log`.
        drop(sink);
        (b, log)
    }

    fn top(b: &HeadlessBackend, rect: Rect) -> NativeHandle {
        b.create_window(&CreateParams {
            class: "test",
            caption: "t",
            style: WindowStyle::TopLevel,
            parent: None,
            rect,
        })
        .unwrap()
    }

    #[test]
    fn show_sends_once() {
        let (b, log) = attached();
        let h = top(&b, Rect::new(0, 0, 10, 10));
        b.show_window(h).unwrap();
        b.show_window(h).unwrap();
        assert_eq!(*log.0.borrow(), vec![(h, NativeMessage::Shown)]);
        assert!(b.is_visible(h));
    }

    #[test]
    fn reposition_reports_client_rect() {
        let (b, log) = attached();
        b.set_frame_insets(Insets {
            left: 1,
            top: 20,
            right: 1,
            bottom: 1,
        });
        let h = top(&b, Rect::new(0, 0, 10, 10));
        let outer = Rect::new(0, 0, 800, 600).outset(b.frame_insets(h));
        b.set_window_pos(h, outer, PosChange { moved: true, resized: true })
            .unwrap();
        assert_eq!(
            log.0.borrow().last(),
            Some(&(h, NativeMessage::Resized(Rect::new(0, 0, 800, 600))))
        );
    }

    #[test]
    fn destroy_takes_children_and_queued_messages() {
        let (b, log) = attached();
        let p = top(&b, Rect::new(0, 0, 100, 100));
        let c = b
            .create_window(&CreateParams {
                class: "test",
                caption: "",
                style: WindowStyle::Child,
                parent: Some(p),
                rect: Rect::new(5, 5, 10, 10),
            })
            .unwrap();
        b.post(c, NativeMessage::FocusIn);
        b.destroy_window(p).unwrap();
        assert!(!b.exists(c));
        assert_eq!(b.pending(), 0);
        assert_eq!(
            *log.0.borrow(),
            vec![(p, NativeMessage::Destroyed), (c, NativeMessage::Destroyed)]
        );
    }

    #[test]
    fn child_origin_accumulates() {
        let (b, _log) = attached();
        let p = top(&b, Rect::new(100, 50, 400, 300));
        let c = b
            .create_window(&CreateParams {
                class: "test",
                caption: "",
                style: WindowStyle::Child,
                parent: Some(p),
                rect: Rect::new(10, 20, 30, 30),
            })
            .unwrap();
        assert_eq!(b.screen_origin(c), (110, 70));
    }

    #[test]
    fn idle_wait_advances_clock() {
        let (b, _log) = attached();
        let t0 = b.now();
        b.wait_events(50).unwrap();
        assert_eq!(b.now(), t0 + 50);
    }

    #[test]
    fn invalidate_coalesces_and_paint_validates() {
        let (b, log) = attached();
        let h = top(&b, Rect::new(0, 0, 10, 10));
        b.invalidate(h);
        b.invalidate(h);
        assert_eq!(b.pending(), 1);
        assert_eq!(b.take_invalidations(), vec![h, h]);
        b.wait_events(10).unwrap();
        assert_eq!(*log.0.borrow(), vec![(h, NativeMessage::Paint)]);
    }

    #[test]
    fn visible_resize_queues_paint() {
        let (b, _log) = attached();
        let h = top(&b, Rect::new(0, 0, 10, 10));
        let grow = PosChange { moved: false, resized: true };
        b.set_window_pos(h, Rect::new(0, 0, 20, 20), grow).unwrap();
        assert_eq!(b.pending(), 0);
        b.show_window(h).unwrap();
        b.set_window_pos(h, Rect::new(0, 0, 30, 30), grow).unwrap();
        b.set_window_pos(h, Rect::new(0, 0, 40, 40), grow).unwrap();
        assert_eq!(b.pending(), 1);
    }

    #[test]
    fn creation_failure_switch() {
        let (b, _log) = attached();
        b.fail_create(true);
        assert!(b
            .create_window(&CreateParams {
                class: "test",
                caption: "",
                style: WindowStyle::TopLevel,
                parent: None,
                rect: Rect::new(0, 0, 1, 1),
            })
            .is_err());
        assert_eq!(b.window_count(), 0);
    }
}
