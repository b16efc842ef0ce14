// ── Display ───────────────────────────────────────────────────────────────────
//
// Process-scoped owner of everything window-system related: the backend, the
// router (window registry, root windows, grab stacks), the task queue and the
// font table.  Runs the message loop.
//
// The display is the backend's `MessageSink`: a decoded message is looked up
// by native handle and handed to the owning shell.  Shells are referenced
// weakly everywhere in here; they own themselves and unregister on destroy.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    rc::{Rc, Weak},
};

use crate::{
    config::DisplayConfig,
    error::{Result, WsError},
    event::{Event, EventHandler, Modifiers, Timestamp},
    fonts::{FaceCache, FontFace, FontTable},
    geometry::{Rect, Size},
    platform::{
        Backend, HeadlessBackend, MessageSink, Monitor, NativeBackend, NativeHandle, NativeMessage,
        ProcessContext,
    },
    router::{DispatchTargets, GrabGroup, Router, WindowId},
    surface::{Gradient, Surface},
    tasks::{TaskId, TaskQueue},
    window::{DragAction, ShellKind, ShellParams, WindowShell},
};

/// MIME type offered for dropped files.
pub const URI_LIST: &str = "text/uri-list";

/// Targets computed for one event (or one button gesture) at its origin.
/// Coordinates are remapped against the origin's position at delivery time;
/// `last_origin` only stands in once the origin is gone.
#[derive(Debug, Clone)]
pub struct PreparedDispatch {
    targets: DispatchTargets<WindowShell>,
    origin: Weak<WindowShell>,
    last_origin: (i32, i32),
}

impl PreparedDispatch {
    pub fn grab_active(&self) -> bool {
        self.targets.grab_active()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn targets(&self) -> Vec<WindowId> {
        self.targets.ids().collect()
    }
}

struct DisplayState {
    router: Router<WindowShell>,
    handles: HashMap<NativeHandle, Weak<WindowShell>>,
    tasks: TaskQueue,
    fonts: FontTable,
    faces: FaceCache,
    drag_target: Option<WindowId>,
    exit: bool,
}

type MainCallback = Box<dyn FnMut(Timestamp) -> Result<()>>;

pub(crate) struct DisplayShared {
    config: DisplayConfig,
    backend: Rc<Backend>,
    state: RefCell<DisplayState>,
    main_callback: RefCell<Option<MainCallback>>,
    estimation: RefCell<Option<Rc<RefCell<Surface>>>>,
    next_id: Cell<u64>,
    destroyed: Cell<bool>,
}

impl DisplayShared {
    // ── Called by shells ─────────────────────────────────────────────────────

    pub(crate) fn register(&self, id: WindowId, shell: Weak<WindowShell>) {
        if self.state.borrow_mut().router.register(id, shell) {
            log::debug!("display: window {} registered", id.0);
        }
    }

    pub(crate) fn bind(&self, handle: NativeHandle, shell: Weak<WindowShell>) {
        self.state.borrow_mut().handles.insert(handle, shell);
    }

    /// Forget a window.  Signals the loop to stop once no window is left.
    pub(crate) fn remove_window(&self, id: WindowId, handle: Option<NativeHandle>) {
        let mut st = self.state.borrow_mut();
        if let Some(h) = handle {
            st.handles.remove(&h);
        }
        if st.drag_target == Some(id) {
            st.drag_target = None;
        }
        if st.router.unregister(id) {
            log::debug!("display: window {} unregistered", id.0);
            if st.router.is_empty() {
                log::debug!("display: no windows left");
                st.exit = true;
            }
        }
    }

    pub(crate) fn grab(&self, id: WindowId, group: GrabGroup) -> Result<()> {
        self.state.borrow_mut().router.grab(id, group)
    }

    pub(crate) fn ungrab(&self, id: WindowId) -> Result<GrabGroup> {
        self.state.borrow_mut().router.ungrab(id)
    }

    pub(crate) fn grab_group(&self, id: WindowId) -> Option<GrabGroup> {
        self.state.borrow().router.grab_group(id)
    }

    pub(crate) fn set_drag_target(&self, id: WindowId) {
        self.state.borrow_mut().drag_target = Some(id);
    }

    pub(crate) fn prepare_dispatch(&self, origin: &WindowShell) -> PreparedDispatch {
        let targets = self.state.borrow_mut().router.prepare_dispatch(origin.id());
        log::trace!(
            "dispatch from window {}: {} target(s), grab active: {}",
            origin.id().0,
            targets.len(),
            targets.grab_active()
        );
        let origin_rc = self.state.borrow().router.get(origin.id());
        PreparedDispatch {
            targets,
            origin: origin_rc.as_ref().map(Rc::downgrade).unwrap_or_default(),
            last_origin: origin.screen_origin(),
        }
    }

    /// Deliver a copy of `event` to every prepared target that is still
    /// alive, in the target's coordinates.  Returns whether any target got it.
    pub(crate) fn dispatch_event(&self, prepared: &PreparedDispatch, event: &Event) -> bool {
        let candidates = self.state.borrow().router.live_targets(&prepared.targets);
        let (ox, oy) = match prepared.origin.upgrade() {
            Some(origin) if !origin.is_destroyed() => origin.screen_origin(),
            _ => prepared.last_origin,
        };
        let mut delivered = false;
        for (id, target) in candidates {
            // An earlier target's handler may have destroyed this one.
            let alive = self
                .state
                .borrow()
                .router
                .get(id)
                .is_some_and(|t| Rc::ptr_eq(&t, &target));
            if !alive || target.is_destroyed() {
                continue;
            }
            let (tx, ty) = target.screen_origin();
            let mut copy = *event;
            copy.left = event.left + ox - tx;
            copy.top = event.top + oy - ty;
            copy.state -= Modifiers::BUTTONS;
            log::trace!("dispatch {:?} to window {}", copy.kind, id.0);
            target.deliver(&copy);
            delivered = true;
        }
        delivered
    }

    // ── Teardown ─────────────────────────────────────────────────────────────

    fn teardown(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        log::debug!("display: shutting down");
        let windows = self.state.borrow().router.windows();
        for w in windows {
            w.destroy();
        }
        self.estimation.borrow_mut().take();
        self.main_callback.borrow_mut().take();
        let (tasks, faces, fonts) = {
            let mut st = self.state.borrow_mut();
            st.router.clear_grabs();
            st.handles.clear();
            st.drag_target = None;
            let tasks = std::mem::replace(&mut st.tasks, TaskQueue::new(self.config.task_id_limit));
            (
                tasks,
                std::mem::take(&mut st.faces),
                std::mem::take(&mut st.fonts),
            )
        };
        // Task closures may own shells; drop them without holding the state.
        drop(tasks);
        drop(faces);
        drop(fonts);
        self.backend.shutdown();
    }
}

impl MessageSink for DisplayShared {
    fn deliver(&self, handle: NativeHandle, message: NativeMessage, time: Timestamp) -> bool {
        let shell = self.state.borrow().handles.get(&handle).and_then(Weak::upgrade);
        match shell {
            Some(shell) => shell.handle_native(message, time),
            None => false,
        }
    }
}

impl Drop for DisplayShared {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Handle to the display.  Clones share the same display; it is torn down
/// when the last clone is dropped or `destroy` is called.
///
/// Tasks and the main callback may hold a clone; they are released when they
/// run, when cancelled, or by `destroy`.
#[derive(Clone)]
pub struct Display {
    shared: Rc<DisplayShared>,
}

impl Display {
    pub fn new(config: DisplayConfig, backend: Backend) -> Result<Self> {
        let backend = Rc::new(backend);
        let shared = Rc::new(DisplayShared {
            state: RefCell::new(DisplayState {
                router: Router::new(),
                handles: HashMap::new(),
                tasks: TaskQueue::new(config.task_id_limit),
                fonts: FontTable::new(),
                faces: FaceCache::new(),
                drag_target: None,
                exit: false,
            }),
            config,
            backend: Rc::clone(&backend),
            main_callback: RefCell::new(None),
            estimation: RefCell::new(None),
            next_id: Cell::new(1),
            destroyed: Cell::new(false),
        });
        let weak: Weak<DisplayShared> = Rc::downgrade(&shared);
        let sink: Weak<dyn MessageSink> = weak;
        backend.attach(sink);

        let display = Self { shared };
        display.load_configured_fonts();
        log::debug!("display: {} backend ready", backend.name());
        Ok(display)
    }

    /// Open the native window system of this target.
    pub fn open(config: DisplayConfig) -> Result<Self> {
        #[cfg(windows)]
        let ctx = ProcessContext::current()?;
        #[cfg(not(windows))]
        let ctx = ProcessContext::detached();
        let backend = Backend::native(&ctx, &config.window_class)?;
        Self::new(config, backend)
    }

    /// A display over a fresh headless backend, plus a handle to drive it.
    pub fn headless(config: DisplayConfig) -> Result<(Self, HeadlessBackend)> {
        let hb = HeadlessBackend::new();
        let display = Self::new(config, Backend::Headless(hb.clone()))?;
        Ok((display, hb))
    }

    fn load_configured_fonts(&self) {
        let (fonts, aliases) = (
            self.shared.config.fonts.clone(),
            self.shared.config.aliases.clone(),
        );
        for spec in fonts {
            if let Err(e) = self.add_font(&spec.name, &spec.path) {
                log::warn!("font '{}' from {}: {e}", spec.name, spec.path.display());
            }
        }
        for spec in aliases {
            if let Err(e) = self.add_font_alias(&spec.name, &spec.alias) {
                log::warn!("font alias '{}' -> '{}': {e}", spec.name, spec.alias);
            }
        }
    }

    pub fn config(&self) -> &DisplayConfig {
        &self.shared.config
    }

    pub fn backend(&self) -> &Backend {
        &self.shared.backend
    }

    /// Milliseconds on the backend clock.
    pub fn now(&self) -> Timestamp {
        self.shared.backend.now()
    }

    /// Release every window, grab, task and font, then the backend.
    pub fn destroy(&self) {
        self.shared.teardown();
    }

    // ── Window factories ─────────────────────────────────────────────────────

    fn shell(&self, kind: ShellKind, screen: u32, handler: Weak<dyn EventHandler>) -> Rc<WindowShell> {
        let id = WindowId(self.shared.next_id.get());
        self.shared.next_id.set(id.0 + 1);
        let params = ShellParams {
            id,
            kind,
            screen,
            class: self.shared.config.window_class.clone(),
            caption: self.shared.config.default_caption.clone(),
            click_threshold: self.shared.config.click_threshold_ms,
            handler,
        };
        WindowShell::new(&self.shared, Rc::clone(&self.shared.backend), params)
    }

    /// Take the lowest free screen number for a new root.
    fn reserve_root(&self, kind: ShellKind, handler: Weak<dyn EventHandler>) -> Rc<WindowShell> {
        let screen = self.find_free_screen_number();
        let shell = self.shell(kind, screen, handler);
        self.shared.state.borrow_mut().router.add_root(shell.id());
        shell
    }

    /// A top-level root window on the lowest free screen number.
    pub fn create_window(&self, handler: Weak<dyn EventHandler>) -> Rc<WindowShell> {
        self.reserve_root(ShellKind::Root, handler)
    }

    /// A popup inside the root window of `screen`.
    pub fn create_window_on(&self, screen: u32, handler: Weak<dyn EventHandler>) -> Result<Rc<WindowShell>> {
        let root = self.find_root_window(screen).ok_or(WsError::NotFound)?;
        let owner = root.handle().ok_or(WsError::BadState)?;
        Ok(self.shell(ShellKind::Popup { owner }, screen, handler))
    }

    /// A root window living inside a host application's window.
    pub fn create_embedded_window(&self, parent: NativeHandle, handler: Weak<dyn EventHandler>) -> Rc<WindowShell> {
        self.reserve_root(ShellKind::Embedded { parent }, handler)
    }

    /// A shell around an existing window.
    pub fn wrap_window(&self, handle: NativeHandle, handler: Weak<dyn EventHandler>) -> Rc<WindowShell> {
        self.shell(ShellKind::Wrapper { handle }, 0, handler)
    }

    pub fn find_root_window(&self, screen: u32) -> Option<Rc<WindowShell>> {
        self.shared.state.borrow().router.root(screen)
    }

    /// Screen number of the root window owning `handle`.
    pub fn find_screen_owner(&self, handle: NativeHandle) -> Option<u32> {
        let st = self.shared.state.borrow();
        let shell = st.handles.get(&handle).and_then(Weak::upgrade)?;
        st.router.screen_of(shell.id())
    }

    pub fn find_free_screen_number(&self) -> u32 {
        self.shared.state.borrow().router.free_screen()
    }

    pub fn window_for_handle(&self, handle: NativeHandle) -> Option<Rc<WindowShell>> {
        self.shared.state.borrow().handles.get(&handle).and_then(Weak::upgrade)
    }

    /// Live registered windows.
    pub fn windows(&self) -> Vec<Rc<WindowShell>> {
        self.shared.state.borrow().router.windows()
    }

    // ── Grabs and dispatch ───────────────────────────────────────────────────

    /// Fails with `Duplicated` if `window` already grabs in any group.
    pub fn grab(&self, window: &WindowShell, group: GrabGroup) -> Result<()> {
        self.shared.grab(window.id(), group)
    }

    pub fn ungrab(&self, window: &WindowShell) -> Result<GrabGroup> {
        self.shared.ungrab(window.id())
    }

    pub fn prepare_dispatch(&self, origin: &WindowShell) -> PreparedDispatch {
        self.shared.prepare_dispatch(origin)
    }

    pub fn dispatch_event(&self, prepared: &PreparedDispatch, event: &Event) -> bool {
        self.shared.dispatch_event(prepared, event)
    }

    // ── Surfaces and gradients ───────────────────────────────────────────────

    pub fn create_surface(&self, width: i32, height: i32) -> Result<Surface> {
        Surface::image(width, height)
    }

    /// A shared 1×1 surface for measuring.
    pub fn estimation_surface(&self) -> Result<Rc<RefCell<Surface>>> {
        let mut slot = self.shared.estimation.borrow_mut();
        if let Some(s) = slot.as_ref() {
            return Ok(Rc::clone(s));
        }
        let s = Rc::new(RefCell::new(Surface::image(1, 1)?));
        *slot = Some(Rc::clone(&s));
        Ok(s)
    }

    pub fn create_linear_gradient(&self, x0: f32, y0: f32, x1: f32, y1: f32) -> Gradient {
        Gradient::linear(x0, y0, x1, y1)
    }

    pub fn create_radial_gradient(&self, cx0: f32, cy0: f32, r0: f32, cx1: f32, cy1: f32, r1: f32) -> Gradient {
        Gradient::radial(cx0, cy0, r0, cx1, cy1, r1)
    }

    // ── Screens and pointer ──────────────────────────────────────────────────

    fn monitors(&self) -> Vec<Monitor> {
        self.shared.backend.monitors()
    }

    /// Number of monitors.
    pub fn screens(&self) -> usize {
        self.monitors().len()
    }

    /// Index of the primary monitor.
    pub fn default_screen(&self) -> usize {
        self.monitors().iter().position(|m| m.primary).unwrap_or(0)
    }

    pub fn screen_size(&self, screen: usize) -> Result<Size> {
        self.monitors()
            .get(screen)
            .map(|m| m.rect.size())
            .ok_or(WsError::NotFound)
    }

    /// Monitor index under the pointer and the pointer's screen position.
    pub fn pointer_location(&self) -> (usize, i32, i32) {
        let (left, top) = self.shared.backend.cursor_position();
        let screen = self
            .monitors()
            .iter()
            .position(|m| m.rect.contains(left, top))
            .unwrap_or_else(|| self.default_screen());
        (screen, left, top)
    }

    // ── Drag and drop ────────────────────────────────────────────────────────

    fn drag_target(&self) -> Option<Rc<WindowShell>> {
        let st = self.shared.state.borrow();
        st.drag_target.and_then(|id| st.router.get(id))
    }

    /// Content types of the pending drop.
    pub fn drag_content_types(&self) -> Vec<&'static str> {
        match self.drag_target() {
            Some(w) if w.drop_target().has_pending() => vec![URI_LIST],
            _ => Vec::new(),
        }
    }

    pub fn accept_drag(&self, action: DragAction, area: Option<Rect>) -> Result<()> {
        let target = self.drag_target().ok_or(WsError::BadState)?;
        target.drop_target().accept(action, area)
    }

    pub fn reject_drag(&self) -> Result<()> {
        let target = self.drag_target().ok_or(WsError::BadState)?;
        target.drop_target().reject()
    }

    /// Files of the accepted drop.
    pub fn take_dropped_files(&self) -> Result<(DragAction, Vec<PathBuf>)> {
        let target = self.drag_target().ok_or(WsError::BadState)?;
        target.drop_target().take_files()
    }

    // ── Tasks ────────────────────────────────────────────────────────────────

    /// Run `handler` on the first loop iteration at or after `time`.
    pub fn submit_task<F>(&self, time: Timestamp, handler: F) -> Result<TaskId>
    where
        F: FnOnce(Timestamp, Timestamp) -> Result<()> + 'static,
    {
        self.shared.state.borrow_mut().tasks.submit(time, handler)
    }

    pub fn cancel_task(&self, id: TaskId) -> Result<()> {
        self.shared.state.borrow_mut().tasks.cancel(id)
    }

    pub fn pending_tasks(&self) -> usize {
        self.shared.state.borrow().tasks.len()
    }

    // ── Fonts ────────────────────────────────────────────────────────────────

    pub fn add_font(&self, name: &str, path: impl AsRef<Path>) -> Result<()> {
        let file = File::open(path.as_ref())?;
        log::debug!("loading font '{name}' from {}", path.as_ref().display());
        self.add_font_from_reader(name, file)
    }

    pub fn add_font_from_reader(&self, name: &str, reader: impl Read) -> Result<()> {
        self.shared.state.borrow_mut().fonts.add(name, reader)
    }

    pub fn add_font_alias(&self, name: &str, alias: &str) -> Result<()> {
        self.shared.state.borrow_mut().fonts.add_alias(name, alias)
    }

    pub fn remove_font(&self, name: &str) -> Result<()> {
        self.shared.state.borrow_mut().fonts.remove(name)
    }

    /// Forget every custom font.  Faces already selected stay alive with
    /// their holders.
    pub fn remove_all_fonts(&self) {
        let mut st = self.shared.state.borrow_mut();
        st.faces.clear();
        st.fonts.clear();
    }

    /// The face registered as `name`, following aliases.
    pub fn font(&self, name: &str) -> Option<Rc<FontFace>> {
        let st = &mut *self.shared.state.borrow_mut();
        st.faces.face(&st.fonts, name)
    }

    // ── Message loop ─────────────────────────────────────────────────────────

    /// Called once per `main_iteration`, after due tasks.
    pub fn set_main_callback<F>(&self, callback: F)
    where
        F: FnMut(Timestamp) -> Result<()> + 'static,
    {
        *self.shared.main_callback.borrow_mut() = Some(Box::new(callback));
    }

    pub fn clear_main_callback(&self) {
        self.shared.main_callback.borrow_mut().take();
    }

    /// Wait at most `timeout_ms` for native messages and deliver them.
    pub fn wait_events(&self, timeout_ms: u64) -> Result<()> {
        self.shared.backend.wait_events(timeout_ms)
    }

    /// Run due tasks, then the main callback.  Returns the first failure.
    pub fn main_iteration(&self) -> Result<()> {
        let now = self.now();
        let due = self.shared.state.borrow_mut().tasks.take_due(now);
        let tasks = TaskQueue::run_batch(due, now);

        let callback = self.shared.main_callback.borrow_mut().take();
        let main = match callback {
            Some(mut cb) => {
                let res = cb(now);
                let mut slot = self.shared.main_callback.borrow_mut();
                if slot.is_none() {
                    *slot = Some(cb);
                }
                res
            }
            None => Ok(()),
        };
        tasks.and(main)
    }

    /// Service messages and tasks until `quit_main` is called or the last
    /// window goes away.
    pub fn main(&self) -> Result<()> {
        self.shared.state.borrow_mut().exit = false;
        let poll = self.shared.config.poll_interval_ms;
        while !self.exit_requested() {
            let now = self.now();
            let next = self.shared.state.borrow().tasks.next_fire_time();
            let wait = next.map_or(poll, |t| t.saturating_sub(now).min(poll));
            self.wait_events(wait)?;
            if self.exit_requested() {
                break;
            }
            if let Err(e) = self.main_iteration() {
                log::warn!("main loop: {e}");
            }
        }
        log::debug!("main loop finished");
        Ok(())
    }

    pub fn quit_main(&self) {
        self.shared.state.borrow_mut().exit = true;
    }

    pub fn exit_requested(&self) -> bool {
        self.shared.state.borrow().exit
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        event::{EventCode, EventKind, MouseButton},
        geometry::SizeLimit,
        platform::MousePointer,
        surface::Color,
        window::BorderStyle,
    };

    #[derive(Default)]
    struct Recorder(RefCell<Vec<Event>>);

    impl EventHandler for Recorder {
        fn handle_event(&self, event: &Event) {
            self.0.borrow_mut().push(*event);
        }
    }

    impl Recorder {
        fn kinds(&self) -> Vec<EventKind> {
            self.0.borrow().iter().map(|e| e.kind).collect()
        }

        fn find(&self, kind: EventKind) -> Option<Event> {
            self.0.borrow().iter().find(|e| e.kind == kind).copied()
        }

        fn clear(&self) {
            self.0.borrow_mut().clear();
        }
    }

    fn weak(rec: &Rc<Recorder>) -> Weak<dyn EventHandler> {
        let w: Weak<Recorder> = Rc::downgrade(rec);
        w
    }

    fn setup() -> (Display, HeadlessBackend) {
        Display::headless(DisplayConfig::default()).unwrap()
    }

    fn root(d: &Display, rec: &Rc<Recorder>) -> Rc<WindowShell> {
        let w = d.create_window(weak(rec));
        w.init().unwrap();
        w.show().unwrap();
        w
    }

    /// Deliver everything queued, including what delivery queues.
    fn pump(d: &Display, hb: &HeadlessBackend) {
        for _ in 0..8 {
            if hb.pending() == 0 {
                return;
            }
            d.wait_events(0).unwrap();
        }
    }

    fn down(x: i32, y: i32) -> NativeMessage {
        NativeMessage::ButtonDown {
            button: MouseButton::Left,
            left: x,
            top: y,
            state: Modifiers::LEFT | Modifiers::SHIFT,
        }
    }

    fn up(x: i32, y: i32) -> NativeMessage {
        NativeMessage::ButtonUp {
            button: MouseButton::Left,
            left: x,
            top: y,
            state: Modifiers::SHIFT,
        }
    }

    #[test]
    fn resize_root_window() {
        let (d, _hb) = setup();
        let rec = Rc::new(Recorder::default());
        let w = root(&d, &rec);
        w.resize(800, 600).unwrap();
        assert_eq!(w.geometry(), Rect::new(0, 0, 800, 600));
        let ev = rec.find(EventKind::Resize).unwrap();
        assert_eq!((ev.width, ev.height), (800, 600));

        w.set_size_constraints(SizeLimit {
            max_width: 640,
            ..SizeLimit::UNLIMITED
        })
        .unwrap();
        assert_eq!(w.geometry(), Rect::new(0, 0, 640, 600));
    }

    #[test]
    fn unchanged_geometry_is_not_reapplied() {
        let (d, _hb) = setup();
        let rec = Rc::new(Recorder::default());
        let w = root(&d, &rec);
        w.set_geometry(Rect::new(10, 10, 100, 100)).unwrap();
        rec.clear();
        w.set_geometry(Rect::new(10, 10, 100, 100)).unwrap();
        w.move_to(10, 10).unwrap();
        assert!(rec.kinds().is_empty());
    }

    #[test]
    fn frame_insets_are_added_for_the_native_call() {
        let (d, hb) = setup();
        hb.set_frame_insets(crate::geometry::Insets {
            left: 4,
            top: 24,
            right: 4,
            bottom: 4,
        });
        let rec = Rc::new(Recorder::default());
        let w = root(&d, &rec);
        w.set_geometry(Rect::new(100, 100, 300, 200)).unwrap();
        assert_eq!(w.geometry(), Rect::new(100, 100, 300, 200));
        assert_eq!(hb.window_rect(w.handle().unwrap()), Some(Rect::new(100, 100, 300, 200)));
    }

    #[test]
    fn task_fires_once() {
        let (d, hb) = setup();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        d.submit_task(d.now() + 50, move |_, _| {
            c.set(c.get() + 1);
            Ok(())
        })
        .unwrap();
        hb.advance(60);
        d.main_iteration().unwrap();
        d.main_iteration().unwrap();
        assert_eq!(count.get(), 1);
        assert_eq!(d.pending_tasks(), 0);
    }

    #[test]
    fn cancel_unknown_task() {
        let (d, _hb) = setup();
        let id = d.submit_task(0, |_, _| Ok(())).unwrap();
        d.cancel_task(id).unwrap();
        assert!(matches!(d.cancel_task(id), Err(WsError::NotFound)));
    }

    #[test]
    fn duplicate_grab_and_ungrab() {
        let (d, _hb) = setup();
        let rec = Rc::new(Recorder::default());
        let w = root(&d, &rec);
        d.grab(&w, GrabGroup::Menu).unwrap();
        assert!(matches!(d.grab(&w, GrabGroup::Dropdown), Err(WsError::Duplicated)));
        assert_eq!(d.ungrab(&w).unwrap(), GrabGroup::Menu);
        assert!(matches!(d.ungrab(&w), Err(WsError::NoGrab)));
    }

    #[test]
    fn shell_grab_is_idempotent() {
        let (d, _hb) = setup();
        let rec = Rc::new(Recorder::default());
        let w = root(&d, &rec);
        w.grab_events(GrabGroup::Menu).unwrap();
        w.grab_events(GrabGroup::Dropdown).unwrap();
        assert_eq!(w.grab_group(), Some(GrabGroup::Menu));
        w.ungrab_events().unwrap();
        assert!(matches!(w.ungrab_events(), Err(WsError::NoGrab)));
    }

    /// A root window with a grabbing popup at (10, 20) inside it; the root
    /// sits at (100, 100).
    fn root_and_menu(
        d: &Display,
        hb: &HeadlessBackend,
    ) -> (Rc<WindowShell>, Rc<Recorder>, Rc<WindowShell>, Rc<Recorder>) {
        let root_rec = Rc::new(Recorder::default());
        let b = root(d, &root_rec);
        b.set_geometry(Rect::new(100, 100, 400, 300)).unwrap();
        let menu_rec = Rc::new(Recorder::default());
        let a = d.create_window_on(b.screen(), weak(&menu_rec)).unwrap();
        a.init().unwrap();
        a.set_geometry(Rect::new(10, 20, 50, 80)).unwrap();
        a.show().unwrap();
        a.grab_events(GrabGroup::Menu).unwrap();
        pump(d, hb);
        root_rec.clear();
        menu_rec.clear();
        (b, root_rec, a, menu_rec)
    }

    #[test]
    fn click_on_root_reaches_grabbing_menu_remapped() {
        let (d, hb) = setup();
        let (b, root_rec, _a, menu_rec) = root_and_menu(&d, &hb);
        hb.post(b.handle().unwrap(), down(150, 130));
        pump(&d, &hb);

        let local = root_rec.find(EventKind::MouseDown).unwrap();
        assert_eq!((local.left, local.top), (150, 130));
        let routed = menu_rec.find(EventKind::MouseDown).unwrap();
        assert_eq!((routed.left, routed.top), (140, 110));
        assert_eq!(routed.state, Modifiers::SHIFT);
        assert_eq!(routed.code, EventCode::Button(MouseButton::Left));
    }

    #[test]
    fn click_is_synthesized_and_routed_after_primary() {
        let (d, hb) = setup();
        let (b, root_rec, _a, menu_rec) = root_and_menu(&d, &hb);
        let h = b.handle().unwrap();
        hb.post(h, down(5, 5));
        hb.post(h, up(5, 5));
        pump(&d, &hb);
        assert_eq!(
            root_rec.kinds(),
            vec![EventKind::MouseDown, EventKind::MouseUp, EventKind::MouseClick]
        );
        assert_eq!(
            menu_rec.kinds(),
            vec![EventKind::MouseDown, EventKind::MouseUp, EventKind::MouseClick]
        );
        assert_eq!(hb.capture(), None);
    }

    #[test]
    fn double_click_through_shell() {
        let (d, hb) = setup();
        let rec = Rc::new(Recorder::default());
        let w = root(&d, &rec);
        let h = w.handle().unwrap();
        for _ in 0..2 {
            hb.post(h, down(7, 7));
            hb.post(h, up(7, 7));
            pump(&d, &hb);
            hb.advance(100);
        }
        assert!(rec.find(EventKind::MouseDoubleClick).is_some());
    }

    struct Closer {
        victim: RefCell<Option<Rc<WindowShell>>>,
    }

    impl EventHandler for Closer {
        fn handle_event(&self, event: &Event) {
            if event.kind == EventKind::MouseDown {
                if let Some(w) = self.victim.borrow_mut().take() {
                    w.destroy();
                }
            }
        }
    }

    #[test]
    fn target_destroyed_by_origin_handler_is_skipped() {
        let (d, hb) = setup();
        let (b, _root_rec, a, menu_rec) = root_and_menu(&d, &hb);
        let closer = Rc::new(Closer {
            victim: RefCell::new(Some(Rc::clone(&a))),
        });
        b.set_handler(Rc::downgrade(&closer) as Weak<Closer>);

        let prepared = d.prepare_dispatch(&b);
        assert_eq!(prepared.targets(), vec![a.id()]);

        hb.post(b.handle().unwrap(), down(1, 1));
        pump(&d, &hb);
        assert!(a.is_destroyed());
        assert!(menu_rec.find(EventKind::MouseDown).is_none());
        // The stale snapshot finds nobody either.
        assert!(!d.dispatch_event(&prepared, &Event::new(EventKind::MouseUp)));
    }

    #[test]
    fn gesture_keeps_its_targets() {
        let (d, hb) = setup();
        let (b, _root_rec, a, menu_rec) = root_and_menu(&d, &hb);
        let h = b.handle().unwrap();
        hb.post(h, down(1, 1));
        pump(&d, &hb);
        // Ungrabbing mid-gesture does not change where the gesture goes.
        a.ungrab_events().unwrap();
        hb.post(
            h,
            NativeMessage::MouseMove {
                left: 2,
                top: 2,
                state: Modifiers::LEFT,
            },
        );
        hb.post(h, up(3, 3));
        pump(&d, &hb);
        assert!(menu_rec.find(EventKind::MouseUp).is_some());

        // The next gesture sees no grab.
        menu_rec.clear();
        hb.post(h, down(1, 1));
        pump(&d, &hb);
        assert!(menu_rec.kinds().is_empty());
    }

    #[test]
    fn gesture_remaps_against_the_moved_origin() {
        let (d, hb) = setup();
        let root_rec = Rc::new(Recorder::default());
        let b = root(&d, &root_rec);
        b.set_geometry(Rect::new(100, 100, 400, 300)).unwrap();
        let other_rec = Rc::new(Recorder::default());
        let a = root(&d, &other_rec);
        a.set_geometry(Rect::new(500, 500, 100, 100)).unwrap();
        a.grab_events(GrabGroup::Normal).unwrap();
        pump(&d, &hb);
        other_rec.clear();

        let h = b.handle().unwrap();
        hb.post(h, down(10, 10));
        pump(&d, &hb);
        b.move_to(200, 200).unwrap();
        pump(&d, &hb);
        hb.post(
            h,
            NativeMessage::MouseMove {
                left: 10,
                top: 10,
                state: Modifiers::LEFT,
            },
        );
        pump(&d, &hb);
        let moved = other_rec.find(EventKind::MouseMove).unwrap();
        assert_eq!((moved.left, moved.top), (-290, -290));
    }

    #[test]
    fn chorded_press_keeps_the_first_snapshot() {
        let (d, hb) = setup();
        let (b, _root_rec, a, menu_rec) = root_and_menu(&d, &hb);
        let h = b.handle().unwrap();
        hb.post(h, down(1, 1));
        pump(&d, &hb);
        a.ungrab_events().unwrap();

        let right = |pressed: bool, state| {
            if pressed {
                NativeMessage::ButtonDown {
                    button: MouseButton::Right,
                    left: 2,
                    top: 2,
                    state,
                }
            } else {
                NativeMessage::ButtonUp {
                    button: MouseButton::Right,
                    left: 2,
                    top: 2,
                    state,
                }
            }
        };
        hb.post(h, right(true, Modifiers::LEFT | Modifiers::RIGHT));
        hb.post(h, right(false, Modifiers::LEFT));
        hb.post(h, up(3, 3));
        pump(&d, &hb);
        let downs = menu_rec
            .0
            .borrow()
            .iter()
            .filter(|e| e.kind == EventKind::MouseDown)
            .count();
        assert_eq!(downs, 2);
        assert_eq!(
            menu_rec.0.borrow().iter().filter(|e| e.kind == EventKind::MouseUp).count(),
            2
        );

        // The gesture is over; the next press sees no grab.
        menu_rec.clear();
        hb.post(h, down(1, 1));
        pump(&d, &hb);
        assert!(menu_rec.kinds().is_empty());
    }

    #[test]
    fn destroy_releases_the_grab() {
        let (d, hb) = setup();
        let (b, _root_rec, a, _menu_rec) = root_and_menu(&d, &hb);
        assert_eq!(d.prepare_dispatch(&b).targets(), vec![a.id()]);
        a.destroy();
        assert!(matches!(d.ungrab(&a), Err(WsError::NoGrab)));
        assert!(d.prepare_dispatch(&b).is_empty());
    }

    #[test]
    fn popup_input_is_not_routed() {
        let (d, hb) = setup();
        let (b, root_rec, a, _menu_rec) = root_and_menu(&d, &hb);
        b.grab_events(GrabGroup::Normal).unwrap();
        hb.post(a.handle().unwrap(), down(1, 1));
        pump(&d, &hb);
        assert!(root_rec.kinds().is_empty());
    }

    #[test]
    fn hover_enter_and_leave() {
        let (d, hb) = setup();
        let rec = Rc::new(Recorder::default());
        let w = root(&d, &rec);
        w.set_mouse_pointer(MousePointer::Hand);
        let h = w.handle().unwrap();
        rec.clear();
        for x in [1, 2] {
            hb.post(
                h,
                NativeMessage::MouseMove {
                    left: x,
                    top: 1,
                    state: Modifiers::empty(),
                },
            );
        }
        pump(&d, &hb);
        assert_eq!(
            rec.kinds(),
            vec![EventKind::MouseIn, EventKind::MouseMove, EventKind::MouseMove]
        );
        assert_eq!(hb.cursor(), MousePointer::Hand);
        assert!(hb.is_tracking(h));

        hb.leave(h);
        pump(&d, &hb);
        assert_eq!(rec.kinds().last(), Some(&EventKind::MouseOut));
    }

    #[test]
    fn show_paints_and_frames_present() {
        let (d, hb) = setup();
        let rec = Rc::new(Recorder::default());
        let w = root(&d, &rec);
        w.resize(4, 2).unwrap();
        pump(&d, &hb);
        hb.take_frames();

        w.with_surface(|s| {
            s.begin_frame();
            s.clear(Color::WHITE);
            s.end_frame();
        })
        .unwrap();
        pump(&d, &hb);
        let frames = hb.take_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!((frames[0].width, frames[0].height), (4, 2));
        assert!(frames[0].pixels.iter().all(|&p| p == 0xffff_ffff));
    }

    #[test]
    fn stale_buffer_is_presented_then_redraw_requested() {
        let (d, hb) = setup();
        let rec = Rc::new(Recorder::default());
        let w = root(&d, &rec);
        pump(&d, &hb);
        hb.take_frames();
        rec.clear();

        w.resize(64, 48).unwrap();
        pump(&d, &hb);
        let frames = hb.take_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].width, 32);
        assert_eq!(frames[0].dest, Size::new(64, 48));
        assert_eq!(rec.kinds().last(), Some(&EventKind::Redraw));

        // Rendering in response reallocates and asks for another paint.
        w.with_surface(|s| {
            s.begin_frame();
            s.end_frame();
        });
        pump(&d, &hb);
        let frames = hb.take_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!((frames[0].width, frames[0].height), (64, 48));
    }

    #[test]
    fn surface_unavailable_when_hidden_or_wrapped() {
        let (d, hb) = setup();
        let rec = Rc::new(Recorder::default());
        let w = root(&d, &rec);
        assert!(w.with_surface(|_| ()).is_some());
        w.hide().unwrap();
        assert!(w.with_surface(|_| ()).is_none());
        assert_eq!(rec.kinds().last(), Some(&EventKind::Hide));

        let host = hb.create_foreign(Rect::new(0, 0, 200, 100));
        let wrapped = d.wrap_window(host, weak(&rec));
        wrapped.init().unwrap();
        assert!(wrapped.is_visible());
        assert_eq!(wrapped.geometry(), Rect::new(0, 0, 200, 100));
        assert!(wrapped.with_surface(|_| ()).is_none());
        wrapped.destroy();
        assert!(hb.exists(host));
    }

    #[test]
    fn hide_releases_grab() {
        let (d, _hb) = setup();
        let rec = Rc::new(Recorder::default());
        let w = root(&d, &rec);
        w.grab_events(GrabGroup::Dropdown).unwrap();
        w.hide().unwrap();
        assert_eq!(w.grab_group(), None);
    }

    #[test]
    fn creation_failure_leaves_shell_usable_later() {
        let (d, hb) = setup();
        let rec = Rc::new(Recorder::default());
        let w = d.create_window(weak(&rec));
        hb.fail_create(true);
        assert!(w.init().is_err());
        assert!(w.handle().is_none());
        assert!(w.with_surface(|_| ()).is_none());
        assert!(matches!(w.show(), Err(WsError::BadState)));
        hb.fail_create(false);
        w.init().unwrap();
        w.show().unwrap();
        assert!(w.with_surface(|_| ()).is_some());
    }

    #[test]
    fn screen_numbers_are_reused() {
        let (d, _hb) = setup();
        let rec = Rc::new(Recorder::default());
        let a = root(&d, &rec);
        let b = root(&d, &rec);
        assert_eq!((a.screen(), b.screen()), (1, 2));
        assert_eq!(d.find_screen_owner(b.handle().unwrap()), Some(2));
        a.destroy();
        assert_eq!(d.find_free_screen_number(), 1);
        assert!(d.find_root_window(1).is_none());
        assert!(matches!(d.create_window_on(1, weak(&rec)), Err(WsError::NotFound)));
    }

    #[test]
    fn os_destroy_takes_popups_and_stops_loop() {
        let (d, hb) = setup();
        let (b, _root_rec, a, _menu_rec) = root_and_menu(&d, &hb);
        hb.destroy_window(b.handle().unwrap()).unwrap();
        assert!(a.is_destroyed() && b.is_destroyed());
        assert!(d.windows().is_empty());
        assert!(d.exit_requested());
    }

    #[test]
    fn dropping_last_reference_destroys_window() {
        let (d, hb) = setup();
        let rec = Rc::new(Recorder::default());
        let w = root(&d, &rec);
        let h = w.handle().unwrap();
        drop(w);
        assert!(!hb.exists(h));
        assert!(d.window_for_handle(h).is_none());
    }

    #[test]
    fn main_returns_when_last_window_closes() {
        let (d, _hb) = setup();
        let rec = Rc::new(Recorder::default());
        let w = root(&d, &rec);
        let start = d.now();
        d.submit_task(start + 120, move |_, _| {
            w.destroy();
            Ok(())
        })
        .unwrap();
        d.main().unwrap();
        assert!(d.now() >= start + 120);
        assert!(d.windows().is_empty());
    }

    #[test]
    fn main_callback_runs_each_iteration() {
        let (d, _hb) = setup();
        let seen = Rc::new(Cell::new(0));
        let s = Rc::clone(&seen);
        let quit = d.clone();
        d.set_main_callback(move |_| {
            s.set(s.get() + 1);
            if s.get() == 3 {
                quit.quit_main();
            }
            Ok(())
        });
        d.main().unwrap();
        assert_eq!(seen.get(), 3);
        d.destroy();
    }

    #[test]
    fn dropped_files_flow() {
        let (d, hb) = setup();
        let rec = Rc::new(Recorder::default());
        let w = root(&d, &rec);
        assert!(d.drag_content_types().is_empty());
        let file = PathBuf::from("C:\\audio\\kick.wav");
        assert!(hb.drop_files(w.handle().unwrap(), 12, 34, vec![file.clone()]));
        pump(&d, &hb);

        let ev = rec.find(EventKind::DragRequest).unwrap();
        assert_eq!((ev.left, ev.top), (12, 34));
        assert_eq!(d.drag_content_types(), vec![URI_LIST]);
        assert!(d.take_dropped_files().is_err());
        d.accept_drag(DragAction::Copy, None).unwrap();
        assert_eq!(d.take_dropped_files().unwrap(), (DragAction::Copy, vec![file]));
        assert!(d.reject_drag().is_err());
    }

    #[test]
    fn fonts_resolve_through_aliases() {
        let (d, _hb) = setup();
        let data = [0x00u8, 0x01, 0x00, 0x00, 0, 0, 0, 0];
        d.add_font_from_reader("Sans", &data[..]).unwrap();
        d.add_font_alias("ui", "Sans").unwrap();
        let a = d.font("ui").unwrap();
        let b = d.font("Sans").unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert!(matches!(
            d.add_font_from_reader("Sans", &data[..]),
            Err(WsError::AlreadyExists)
        ));
        d.remove_all_fonts();
        assert!(d.font("ui").is_none());
        // Holders keep their face.
        assert_eq!(a.name(), "Sans");
    }

    #[test]
    fn monitors_and_pointer() {
        let (d, hb) = setup();
        hb.set_monitors(vec![
            Monitor {
                rect: Rect::new(-1280, 0, 1280, 1024),
                primary: false,
            },
            Monitor {
                rect: Rect::new(0, 0, 2560, 1440),
                primary: true,
            },
        ]);
        assert_eq!(d.screens(), 2);
        assert_eq!(d.default_screen(), 1);
        assert_eq!(d.screen_size(0).unwrap(), Size::new(1280, 1024));
        assert!(matches!(d.screen_size(2), Err(WsError::NotFound)));
        hb.set_cursor_position(-10, 5);
        assert_eq!(d.pointer_location(), (0, -10, 5));
    }

    #[test]
    fn attributes_round_trip() {
        let (d, hb) = setup();
        let rec = Rc::new(Recorder::default());
        let w = root(&d, &rec);
        w.set_caption("Mixer").unwrap();
        assert_eq!(hb.caption(w.handle().unwrap()).as_deref(), Some("Mixer"));
        w.set_border_style(BorderStyle::Dialog);
        assert_eq!(w.border_style(), BorderStyle::Dialog);
        w.set_focus(true).unwrap();
        assert_eq!(hb.focused(), w.handle());
        assert_eq!(rec.kinds().last(), Some(&EventKind::FocusIn));
    }

    #[test]
    fn destroy_tears_everything_down() {
        let (d, hb) = setup();
        let rec = Rc::new(Recorder::default());
        let w = root(&d, &rec);
        d.submit_task(d.now() + 1_000, |_, _| Ok(())).unwrap();
        d.destroy();
        assert!(w.is_destroyed());
        assert_eq!(d.pending_tasks(), 0);
        assert!(hb.is_shut_down());
        // Idempotent.
        w.destroy();
        d.destroy();
    }
}
