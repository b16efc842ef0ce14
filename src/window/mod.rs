// ── Native window shell ───────────────────────────────────────────────────────
//
// One `WindowShell` per native handle.  The shell turns decoded native
// messages into `Event`s for its handler, keeps the per-window interaction
// state (hover, capture, click history) and owns the render surface.
//
// Shells are shared as `Rc<WindowShell>`; the display only keeps weak
// references.  Dropping the last strong reference destroys the window.
//
// Re-entrancy: handlers and the backend may call back into the shell (a
// click handler hides the window, `show_window` sends `Shown` before it
// returns).  No `RefCell` borrow is ever held across a handler or backend
// call.

use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use bitflags::bitflags;

use crate::{
    display::{DisplayShared, PreparedDispatch},
    error::{Result, WsError},
    event::{Event, EventCode, EventHandler, EventKind, Modifiers, Timestamp},
    geometry::{PosChange, Rect, SizeLimit},
    platform::{
        Backend, CreateParams, MousePointer, NativeBackend, NativeHandle, NativeMessage, WindowStyle,
    },
    router::{GrabGroup, WindowId},
    surface::Surface,
};

pub mod clicks;
pub mod drop_target;

use clicks::ClickHistory;
pub use drop_target::{DragAction, DropTarget};

/// Where a shell sits in the window hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    /// Top-level window owning a screen number.
    Root,
    /// Child of a root window: menus, dropdowns, tooltips.
    Popup { owner: NativeHandle },
    /// Child of a host application's window.  Owns a screen number.
    Embedded { parent: NativeHandle },
    /// Adopts a window created by someone else.
    Wrapper { handle: NativeHandle },
}

impl ShellKind {
    /// Input arriving at a routing root is also offered to grabbing windows.
    pub fn is_routing_root(self) -> bool {
        !matches!(self, Self::Popup { .. })
    }

    fn native_parent(self) -> Option<NativeHandle> {
        match self {
            Self::Popup { owner } => Some(owner),
            Self::Embedded { parent } => Some(parent),
            _ => None,
        }
    }
}

/// Frame decoration requested for the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BorderStyle {
    None,
    Single,
    #[default]
    Sizeable,
    Dialog,
    Popup,
    Combo,
}

bitflags! {
    /// Window-manager actions the user may perform on the window.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WindowActions: u32 {
        const MOVE        = 1 << 0;
        const RESIZE      = 1 << 1;
        const MINIMIZE    = 1 << 2;
        const MAXIMIZE    = 1 << 3;
        const CLOSE       = 1 << 4;
        const STICK       = 1 << 5;
        const SHADE       = 1 << 6;
        const FULLSCREEN  = 1 << 7;
        const CHANGE_DESK = 1 << 8;
    }
}

impl Default for WindowActions {
    fn default() -> Self {
        Self::all()
    }
}

/// A handler that never exists, for shells created without one.
struct NullHandler;

impl EventHandler for NullHandler {
    fn handle_event(&self, _: &Event) {}
}

pub(crate) fn no_handler() -> Weak<dyn EventHandler> {
    Weak::<NullHandler>::new()
}

#[derive(Debug)]
struct ShellState {
    handle: Option<NativeHandle>,
    geometry: Rect,
    limits: SizeLimit,
    visible: bool,
    hovering: bool,
    clicks: ClickHistory,
    caption: String,
    pointer: MousePointer,
    border: BorderStyle,
    actions: WindowActions,
}

pub struct WindowShell {
    id: WindowId,
    kind: ShellKind,
    screen: u32,
    class: String,
    display: Weak<DisplayShared>,
    backend: Rc<Backend>,
    handler: RefCell<Weak<dyn EventHandler>>,
    state: RefCell<ShellState>,
    surface: RefCell<Option<Surface>>,
    painting: Cell<bool>,
    destroyed: Cell<bool>,
    /// Dispatch targets of the button gesture in progress.
    gesture: RefCell<Option<PreparedDispatch>>,
    drop_target: DropTarget,
}

impl std::fmt::Debug for WindowShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowShell")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("screen", &self.screen)
            .field("state", &self.state)
            .finish()
    }
}

/// Everything a shell is built from.
pub(crate) struct ShellParams {
    pub id: WindowId,
    pub kind: ShellKind,
    pub screen: u32,
    pub class: String,
    pub caption: String,
    pub click_threshold: u64,
    pub handler: Weak<dyn EventHandler>,
}

impl WindowShell {
    /// Record identity only; no native resource exists until `init`.
    pub(crate) fn new(display: &Rc<DisplayShared>, backend: Rc<Backend>, params: ShellParams) -> Rc<Self> {
        Rc::new(Self {
            id: params.id,
            kind: params.kind,
            screen: params.screen,
            class: params.class,
            display: Rc::downgrade(display),
            backend,
            handler: RefCell::new(params.handler),
            state: RefCell::new(ShellState {
                handle: None,
                geometry: Rect::new(0, 0, 32, 32),
                limits: SizeLimit::UNLIMITED,
                visible: false,
                hovering: false,
                clicks: ClickHistory::new(params.click_threshold),
                caption: params.caption,
                pointer: MousePointer::default(),
                border: BorderStyle::default(),
                actions: WindowActions::default(),
            }),
            surface: RefCell::new(None),
            painting: Cell::new(false),
            destroyed: Cell::new(false),
            gesture: RefCell::new(None),
            drop_target: DropTarget::default(),
        })
    }

    fn display(&self) -> Option<Rc<DisplayShared>> {
        self.display.upgrade()
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Register with the display and create the native window.
    ///
    /// A failed native creation leaves the shell registered but without a
    /// handle or surface; `init` may be called again later.
    pub fn init(self: &Rc<Self>) -> Result<()> {
        if self.destroyed.get() {
            return Err(WsError::BadState);
        }
        if self.handle().is_some() {
            return Ok(());
        }
        let display = self.display().ok_or(WsError::BadState)?;
        display.register(self.id, Rc::downgrade(self));

        if let ShellKind::Wrapper { handle } = self.kind {
            let rect = self.backend.client_rect(handle).ok_or(WsError::NotFound)?;
            {
                let mut st = self.state.borrow_mut();
                st.handle = Some(handle);
                st.geometry = rect;
                st.visible = true;
            }
            display.bind(handle, Rc::downgrade(self));
            log::debug!("window {}: wrapping {:#x}", self.id.0, handle.0);
            return Ok(());
        }

        let (rect, caption) = {
            let mut st = self.state.borrow_mut();
            st.geometry = st.limits.apply(&st.geometry);
            (st.geometry, st.caption.clone())
        };
        let parent = self.kind.native_parent();
        let params = CreateParams {
            class: &self.class,
            caption: &caption,
            style: if parent.is_some() {
                WindowStyle::Child
            } else {
                WindowStyle::TopLevel
            },
            parent,
            rect,
        };
        let handle = match self.backend.create_window(&params) {
            Ok(h) => h,
            Err(e) => {
                log::error!("window {}: native creation failed: {e}", self.id.0);
                return Err(e);
            }
        };
        self.state.borrow_mut().handle = Some(handle);
        display.bind(handle, Rc::downgrade(self));
        self.backend.accept_files(handle, true);
        log::debug!(
            "window {}: created {:#x} ({:?}, screen {})",
            self.id.0,
            handle.0,
            self.kind,
            self.screen
        );
        self.ensure_surface();
        Ok(())
    }

    /// Release grab, hide, unregister and destroy the native window.
    /// Later calls do nothing.
    pub fn destroy(&self) {
        self.teardown(true);
    }

    fn teardown(&self, native_alive: bool) {
        if self.destroyed.replace(true) {
            return;
        }
        log::debug!("window {}: destroy", self.id.0);
        let display = self.display();
        if native_alive {
            if let Err(e) = self.hide() {
                log::warn!("window {}: hide during destroy failed: {e}", self.id.0);
            }
        }
        if self.mark_hidden() {
            self.deliver(&Event::new(EventKind::Hide));
        }
        self.release_grab();
        self.surface.borrow_mut().take();
        self.gesture.borrow_mut().take();
        self.drop_target.clear();

        let handle = self.state.borrow_mut().handle.take();
        if let Some(d) = &display {
            d.remove_window(self.id, handle);
        }
        let own_handle = !matches!(self.kind, ShellKind::Wrapper { .. });
        if let (Some(h), true, true) = (handle, native_alive, own_handle) {
            if let Err(e) = self.backend.destroy_window(h) {
                log::warn!("window {}: native destroy failed: {e}", self.id.0);
            }
        }
        *self.handler.borrow_mut() = no_handler();
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    // ── Visibility ───────────────────────────────────────────────────────────

    pub fn show(&self) -> Result<()> {
        let handle = self.require_handle()?;
        if self.is_visible() {
            return Ok(());
        }
        if matches!(self.kind, ShellKind::Wrapper { .. }) {
            self.state.borrow_mut().visible = true;
            return Ok(());
        }
        self.ensure_surface();
        self.backend.show_window(handle)?;
        if self.mark_shown() {
            self.deliver(&Event::new(EventKind::Show));
        }
        if self.kind.native_parent().is_some() {
            if let Err(e) = self.backend.raise_and_focus(handle) {
                log::warn!("window {}: raise failed: {e}", self.id.0);
            }
        }
        Ok(())
    }

    /// Show the window above `over`.
    pub fn show_over(&self, over: &WindowShell) -> Result<()> {
        self.show()?;
        if over.handle().is_some() {
            self.backend.raise_and_focus(self.require_handle()?)?;
        }
        Ok(())
    }

    pub fn hide(&self) -> Result<()> {
        if !self.is_visible() {
            return Ok(());
        }
        if let Some(handle) = self.handle() {
            if !matches!(self.kind, ShellKind::Wrapper { .. }) {
                self.backend.hide_window(handle)?;
            }
        }
        if self.mark_hidden() {
            self.deliver(&Event::new(EventKind::Hide));
        }
        Ok(())
    }

    pub fn set_visibility(&self, visible: bool) -> Result<()> {
        if visible {
            self.show()
        } else {
            self.hide()
        }
    }

    /// Returns whether the shell just became visible.
    fn mark_shown(&self) -> bool {
        self.ensure_surface();
        let mut st = self.state.borrow_mut();
        !std::mem::replace(&mut st.visible, true)
    }

    /// Returns whether the shell was visible.  Drops the surface and the grab.
    fn mark_hidden(&self) -> bool {
        let was = std::mem::replace(&mut self.state.borrow_mut().visible, false);
        if was {
            self.surface.borrow_mut().take();
            self.release_grab();
        }
        was
    }

    fn release_grab(&self) {
        let Some(d) = self.display() else {
            return;
        };
        if d.grab_group(self.id).is_none() {
            return;
        }
        match d.ungrab(self.id) {
            Ok(group) => log::trace!("window {}: released {group:?} grab", self.id.0),
            Err(WsError::NoGrab) => {}
            Err(e) => log::warn!("window {}: ungrab failed: {e}", self.id.0),
        }
    }

    fn ensure_surface(&self) {
        if matches!(self.kind, ShellKind::Wrapper { .. }) || self.surface.borrow().is_some() {
            return;
        }
        let Some(handle) = self.handle() else {
            return;
        };
        let size = self.geometry().size();
        match Surface::for_window(handle, Rc::clone(&self.backend), size.width, size.height) {
            Ok(s) => *self.surface.borrow_mut() = Some(s),
            Err(e) => log::error!("window {}: no surface: {e}", self.id.0),
        }
    }

    // ── Geometry ─────────────────────────────────────────────────────────────

    /// Clamp `rect` and apply it with a single native reposition.
    pub fn set_geometry(&self, rect: Rect) -> Result<()> {
        let (handle, old, new) = {
            let st = self.state.borrow();
            (st.handle, st.geometry, st.limits.apply(&rect))
        };
        let change = PosChange::between(&old, &new);
        if change.is_empty() {
            return Ok(());
        }
        // Before creation, and for a host's window, only the record changes.
        let Some(handle) = handle.filter(|_| !self.is_wrapper()) else {
            self.state.borrow_mut().geometry = new;
            return Ok(());
        };
        let outer = new.outset(self.backend.frame_insets(handle));
        self.backend.set_window_pos(handle, outer, change)
    }

    pub fn move_to(&self, left: i32, top: i32) -> Result<()> {
        let g = self.geometry();
        self.set_geometry(Rect::new(left, top, g.width, g.height))
    }

    pub fn resize(&self, width: i32, height: i32) -> Result<()> {
        let g = self.geometry();
        self.set_geometry(Rect::new(g.left, g.top, width, height))
    }

    pub fn set_left(&self, left: i32) -> Result<()> {
        self.move_to(left, self.top())
    }

    pub fn set_top(&self, top: i32) -> Result<()> {
        self.move_to(self.left(), top)
    }

    pub fn set_width(&self, width: i32) -> Result<()> {
        self.resize(width, self.height())
    }

    pub fn set_height(&self, height: i32) -> Result<()> {
        self.resize(self.width(), height)
    }

    /// Re-apply the size constraints to the current geometry.
    pub fn check_constraints(&self) -> Result<()> {
        self.set_geometry(self.geometry())
    }

    pub fn set_size_constraints(&self, limits: SizeLimit) -> Result<()> {
        self.state.borrow_mut().limits = limits.normalized();
        self.check_constraints()
    }

    pub fn size_constraints(&self) -> SizeLimit {
        self.state.borrow().limits
    }

    /// Client rectangle relative to the parent (the screen for top-level
    /// windows).
    pub fn geometry(&self) -> Rect {
        self.state.borrow().geometry
    }

    /// Client rectangle in screen coordinates.
    pub fn absolute_geometry(&self) -> Rect {
        let g = self.geometry();
        let (left, top) = self.screen_origin();
        Rect::new(left, top, g.width, g.height)
    }

    pub(crate) fn screen_origin(&self) -> (i32, i32) {
        match self.handle() {
            Some(h) => self.backend.screen_origin(h),
            None => {
                let g = self.geometry();
                (g.left, g.top)
            }
        }
    }

    pub fn left(&self) -> i32 {
        self.geometry().left
    }

    pub fn top(&self) -> i32 {
        self.geometry().top
    }

    pub fn width(&self) -> i32 {
        self.geometry().width
    }

    pub fn height(&self) -> i32 {
        self.geometry().height
    }

    // ── Grabs ────────────────────────────────────────────────────────────────

    /// Also receive input addressed to routing roots.  Asking again while
    /// already grabbing is a no-op.
    pub fn grab_events(&self, group: GrabGroup) -> Result<()> {
        if self.destroyed.get() {
            return Err(WsError::BadState);
        }
        let display = self.display().ok_or(WsError::BadState)?;
        if display.grab_group(self.id).is_some() {
            return Ok(());
        }
        display.grab(self.id, group)
    }

    pub fn ungrab_events(&self) -> Result<()> {
        let display = self.display().ok_or(WsError::NoGrab)?;
        display.ungrab(self.id).map(|_| ())
    }

    pub fn grab_group(&self) -> Option<GrabGroup> {
        self.display().and_then(|d| d.grab_group(self.id))
    }

    // ── Attributes ───────────────────────────────────────────────────────────

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn kind(&self) -> ShellKind {
        self.kind
    }

    pub fn handle(&self) -> Option<NativeHandle> {
        self.state.borrow().handle
    }

    fn require_handle(&self) -> Result<NativeHandle> {
        self.handle().ok_or(WsError::BadState)
    }

    pub fn screen(&self) -> u32 {
        self.screen
    }

    pub fn is_visible(&self) -> bool {
        self.state.borrow().visible
    }

    pub fn is_wrapper(&self) -> bool {
        matches!(self.kind, ShellKind::Wrapper { .. })
    }

    pub fn set_handler(&self, handler: Weak<dyn EventHandler>) {
        *self.handler.borrow_mut() = handler;
    }

    pub fn caption(&self) -> String {
        self.state.borrow().caption.clone()
    }

    pub fn set_caption(&self, caption: &str) -> Result<()> {
        self.state.borrow_mut().caption = caption.to_owned();
        match self.handle() {
            Some(h) => self.backend.set_caption(h, caption),
            None => Ok(()),
        }
    }

    pub fn border_style(&self) -> BorderStyle {
        self.state.borrow().border
    }

    pub fn set_border_style(&self, style: BorderStyle) {
        self.state.borrow_mut().border = style;
    }

    pub fn window_actions(&self) -> WindowActions {
        self.state.borrow().actions
    }

    pub fn set_window_actions(&self, actions: WindowActions) {
        self.state.borrow_mut().actions = actions;
    }

    pub fn mouse_pointer(&self) -> MousePointer {
        self.state.borrow().pointer
    }

    /// Pointer shape shown while hovering.  Applied at once if the pointer
    /// is already inside.
    pub fn set_mouse_pointer(&self, pointer: MousePointer) {
        let hovering = {
            let mut st = self.state.borrow_mut();
            st.pointer = pointer;
            st.hovering
        };
        if hovering {
            self.backend.set_cursor(pointer);
        }
    }

    pub fn set_focus(&self, focus: bool) -> Result<()> {
        if !focus {
            return Ok(());
        }
        self.backend.set_focus(self.require_handle()?)
    }

    pub fn toggle_focus(&self) -> Result<()> {
        self.set_focus(true)
    }

    pub fn drop_target(&self) -> &DropTarget {
        &self.drop_target
    }

    /// Run `f` on the render surface.  There is none for wrappers, while
    /// hidden, and while a paint is presenting.
    pub fn with_surface<R>(&self, f: impl FnOnce(&mut Surface) -> R) -> Option<R> {
        if self.is_wrapper() || self.painting.get() || !self.is_visible() {
            return None;
        }
        let mut surface = self.surface.borrow_mut().take()?;
        let out = f(&mut surface);
        if self.is_visible() && !self.destroyed.get() {
            let mut slot = self.surface.borrow_mut();
            if slot.is_none() {
                *slot = Some(surface);
            }
        }
        Some(out)
    }

    // ── Native messages ──────────────────────────────────────────────────────

    /// Hand `event` to the handler.
    pub(crate) fn deliver(&self, event: &Event) {
        let handler = self.handler.borrow().upgrade();
        if let Some(h) = handler {
            h.handle_event(event);
        }
    }

    /// React to one decoded native message.  Returns `false` if the message
    /// should get the backend's default processing instead.
    pub(crate) fn handle_native(&self, message: NativeMessage, time: Timestamp) -> bool {
        if self.destroyed.get() {
            return false;
        }
        log::trace!("window {}: {message:?}", self.id.0);
        match message {
            NativeMessage::MouseMove { left, top, state } => {
                self.enter_hover(left, top, time);
                let ev = Event::at(EventKind::MouseMove, left, top, time).with_state(state);
                self.route(&ev);
            }
            NativeMessage::MouseLeave => {
                let was = std::mem::replace(&mut self.state.borrow_mut().hovering, false);
                if was {
                    self.deliver(&Event::new(EventKind::MouseOut).with_time(time));
                }
            }
            NativeMessage::ButtonDown {
                button,
                left,
                top,
                state,
            } => {
                if let Some(h) = self.handle() {
                    self.backend.set_capture(h);
                }
                let ev = Event::at(EventKind::MouseDown, left, top, time)
                    .with_code(EventCode::Button(button))
                    .with_state(state);
                self.state.borrow_mut().clicks.press(ev);
                // A chorded press joins the gesture already under way.
                let held = self.gesture.borrow().clone();
                let prepared = match held {
                    Some(p) => Some(p),
                    None => {
                        let p = self.prepare();
                        *self.gesture.borrow_mut() = p.clone();
                        p
                    }
                };
                self.deliver(&ev);
                self.forward(prepared.as_ref(), &ev);
            }
            NativeMessage::ButtonUp {
                button,
                left,
                top,
                state,
            } => {
                if let Some(h) = self.handle() {
                    if self.backend.capture() == Some(h) {
                        self.backend.release_capture();
                    }
                }
                let ev = Event::at(EventKind::MouseUp, left, top, time)
                    .with_code(EventCode::Button(button))
                    .with_state(state);
                let click = self.state.borrow_mut().clicks.release(ev);
                let click = click.map(|kind| Event { kind, ..ev });
                let gesture = if state.intersects(Modifiers::BUTTONS) {
                    self.gesture.borrow().clone()
                } else {
                    self.gesture.borrow_mut().take()
                };
                let prepared = gesture.or_else(|| self.prepare());

                self.deliver(&ev);
                if let Some(c) = &click {
                    self.deliver(c);
                }
                self.forward(prepared.as_ref(), &ev);
                if let Some(c) = &click {
                    self.forward(prepared.as_ref(), c);
                }
            }
            NativeMessage::Scroll {
                direction,
                left,
                top,
                state,
            } => {
                let ev = Event::at(EventKind::MouseScroll, left, top, time)
                    .with_code(EventCode::Scroll(direction))
                    .with_state(state);
                self.route(&ev);
            }
            NativeMessage::KeyDown { key, state } | NativeMessage::KeyUp { key, state } => {
                let kind = if matches!(message, NativeMessage::KeyDown { .. }) {
                    EventKind::KeyDown
                } else {
                    EventKind::KeyUp
                };
                let ev = Event::new(kind)
                    .with_time(time)
                    .with_code(EventCode::Key(key))
                    .with_state(state);
                self.route(&ev);
            }
            NativeMessage::Resized(rect) => self.on_resized(rect, time),
            NativeMessage::Paint => return self.on_paint(time),
            NativeMessage::FocusIn => self.deliver(&Event::new(EventKind::FocusIn).with_time(time)),
            NativeMessage::FocusOut => {
                self.deliver(&Event::new(EventKind::FocusOut).with_time(time))
            }
            NativeMessage::Shown => {
                if self.mark_shown() {
                    self.deliver(&Event::new(EventKind::Show).with_time(time));
                }
            }
            NativeMessage::Hidden => {
                if self.mark_hidden() {
                    self.deliver(&Event::new(EventKind::Hide).with_time(time));
                }
            }
            NativeMessage::Close => self.deliver(&Event::new(EventKind::Close).with_time(time)),
            NativeMessage::Destroyed => self.teardown(false),
            NativeMessage::DropFiles { left, top, files } => {
                self.drop_target.store(left, top, files);
                if let Some(d) = self.display() {
                    d.set_drag_target(self.id);
                }
                self.deliver(&Event::at(EventKind::DragRequest, left, top, time));
            }
        }
        true
    }

    fn enter_hover(&self, left: i32, top: i32, time: Timestamp) {
        let (handle, pointer) = {
            let mut st = self.state.borrow_mut();
            if std::mem::replace(&mut st.hovering, true) {
                return;
            }
            (st.handle, st.pointer)
        };
        self.backend.set_cursor(pointer);
        if let Some(h) = handle {
            self.backend.track_mouse_leave(h);
        }
        self.deliver(&Event::at(EventKind::MouseIn, left, top, time));
    }

    /// Targets for input arriving here, if this shell routes input.
    fn prepare(&self) -> Option<PreparedDispatch> {
        if !self.kind.is_routing_root() {
            return None;
        }
        self.display().map(|d| d.prepare_dispatch(self))
    }

    fn forward(&self, prepared: Option<&PreparedDispatch>, event: &Event) {
        if let (Some(p), Some(d)) = (prepared, self.display()) {
            d.dispatch_event(p, event);
        }
    }

    /// Deliver locally, then to grabbing windows.  A captured gesture keeps
    /// the targets it started with.
    fn route(&self, event: &Event) {
        let gesture = self.gesture.borrow().clone();
        let prepared = gesture.or_else(|| self.prepare());
        self.deliver(event);
        self.forward(prepared.as_ref(), event);
    }

    fn on_resized(&self, rect: Rect, time: Timestamp) {
        let change = {
            let mut st = self.state.borrow_mut();
            let change = PosChange::between(&st.geometry, &rect);
            st.geometry = rect;
            change
        };
        if !self.is_wrapper() {
            if let Some(s) = self.surface.borrow_mut().as_mut() {
                s.request_size(rect.width, rect.height);
            }
        }
        let event = |kind| Event {
            kind,
            left: rect.left,
            top: rect.top,
            width: rect.width,
            height: rect.height,
            time,
            ..Event::default()
        };
        if change.moved {
            self.deliver(&event(EventKind::Move));
        }
        if change.resized {
            self.deliver(&event(EventKind::Resize));
        }
    }

    fn on_paint(&self, time: Timestamp) -> bool {
        if self.is_wrapper() {
            return false;
        }
        if self.painting.get() {
            log::trace!("window {}: nested paint ignored", self.id.0);
            return true;
        }
        let Some(handle) = self.handle() else {
            return false;
        };
        let Some(ctx) = self.backend.begin_paint(handle) else {
            return false;
        };
        self.painting.set(true);
        let surface = self.surface.borrow_mut().take();
        let mut stale = false;
        if let (Some(s), true) = (&surface, self.is_visible()) {
            self.backend.exclude_children(&ctx);
            stale = s.needs_sync();
            if let Err(e) = s.present_to(&ctx, self.geometry().size()) {
                log::warn!("window {}: present failed: {e}", self.id.0);
            }
        }
        self.backend.end_paint(ctx);
        if self.is_visible() {
            let mut slot = self.surface.borrow_mut();
            if slot.is_none() {
                *slot = surface;
            }
        }
        self.painting.set(false);

        if stale {
            let g = self.geometry();
            self.deliver(&Event {
                kind: EventKind::Redraw,
                width: g.width,
                height: g.height,
                time,
                ..Event::default()
            });
        }
        true
    }
}

impl Drop for WindowShell {
    fn drop(&mut self) {
        self.teardown(true);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::DisplayConfig,
        display::Display,
        platform::HeadlessBackend,
        surface::Color,
    };

    struct Quiet;

    impl EventHandler for Quiet {
        fn handle_event(&self, _event: &Event) {}
    }

    fn shown(d: &Display, handler: &Rc<Quiet>) -> Rc<WindowShell> {
        let w = d.create_window(Rc::downgrade(handler) as Weak<Quiet>);
        w.init().unwrap();
        w.set_geometry(Rect::new(0, 0, 40, 30)).unwrap();
        w.show().unwrap();
        w
    }

    fn settle(d: &Display, hb: &HeadlessBackend) {
        for _ in 0..8 {
            if hb.pending() == 0 {
                break;
            }
            d.wait_events(0).unwrap();
        }
        hb.take_frames();
        hb.take_excluded();
    }

    #[test]
    fn no_surface_while_painting() {
        let (d, hb) = Display::headless(DisplayConfig::default()).unwrap();
        let q = Rc::new(Quiet);
        let w = shown(&d, &q);
        settle(&d, &hb);

        w.painting.set(true);
        assert!(w.with_surface(|_| ()).is_none());
        w.painting.set(false);
        assert!(w.with_surface(|s| s.clear(Color::WHITE)).is_some());
    }

    #[test]
    fn nested_paint_is_ignored() {
        let (d, hb) = Display::headless(DisplayConfig::default()).unwrap();
        let q = Rc::new(Quiet);
        let w = shown(&d, &q);
        settle(&d, &hb);

        w.painting.set(true);
        assert!(w.handle_native(NativeMessage::Paint, 0));
        assert!(hb.take_frames().is_empty());
        // The surface is still there for the outer cycle.
        w.painting.set(false);
        assert!(w.handle_native(NativeMessage::Paint, 0));
        assert_eq!(hb.take_frames().len(), 1);
    }

    #[test]
    fn paint_clips_out_visible_children() {
        let (d, hb) = Display::headless(DisplayConfig::default()).unwrap();
        let q = Rc::new(Quiet);
        let w = shown(&d, &q);
        let popup = d
            .create_window_on(w.screen(), Rc::downgrade(&q) as Weak<Quiet>)
            .unwrap();
        popup.init().unwrap();
        popup.set_geometry(Rect::new(5, 5, 10, 10)).unwrap();
        popup.show().unwrap();
        settle(&d, &hb);

        let h = w.handle().unwrap();
        assert!(hb.send(h, NativeMessage::Paint));
        assert_eq!(hb.take_excluded(), vec![popup.handle().unwrap()]);

        popup.hide().unwrap();
        assert!(hb.send(h, NativeMessage::Paint));
        assert!(hb.take_excluded().is_empty());
    }

    #[test]
    fn destroyed_shell_ignores_messages() {
        let (d, hb) = Display::headless(DisplayConfig::default()).unwrap();
        let q = Rc::new(Quiet);
        let w = shown(&d, &q);
        settle(&d, &hb);
        w.destroy();
        assert!(!w.handle_native(NativeMessage::Paint, 0));
        assert!(w.with_surface(|_| ()).is_none());
    }
}
