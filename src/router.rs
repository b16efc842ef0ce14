// ── Event router ──────────────────────────────────────────────────────────────
//
// Registry of live windows, the root windows indexed by screen number, and
// the grab stacks.  Windows are held weakly: a window owns itself and removes
// itself from here when destroyed, and every lookup re-checks liveness
// against the registry, so a stale entry can never be handed out.
//
// Generic over the window type so the bookkeeping can be exercised without a
// window system.

use std::{
    collections::BTreeMap,
    rc::{Rc, Weak},
};

use crate::error::{Result, WsError};

/// Stable identity of a registered window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u64);

/// Grab categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrabGroup {
    Normal,
    Menu,
    ExtraMenu,
    Dropdown,
    ExtraDropdown,
}

impl GrabGroup {
    /// Scan order of `prepare_dispatch`, highest priority first.
    pub const PRIORITY: [GrabGroup; 5] = [
        GrabGroup::ExtraDropdown,
        GrabGroup::Dropdown,
        GrabGroup::ExtraMenu,
        GrabGroup::Menu,
        GrabGroup::Normal,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Windows that should also see the event being dispatched, computed by
/// `prepare_dispatch`.
#[derive(Debug)]
pub struct DispatchTargets<W> {
    targets: Vec<(WindowId, Weak<W>)>,
    grabbed: bool,
}

impl<W> DispatchTargets<W> {
    pub fn none() -> Self {
        Self {
            targets: Vec::new(),
            grabbed: false,
        }
    }

    /// Whether any grab was active when the targets were computed.
    pub fn grab_active(&self) -> bool {
        self.grabbed
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = WindowId> + '_ {
        self.targets.iter().map(|(id, _)| *id)
    }
}

impl<W> Clone for DispatchTargets<W> {
    fn clone(&self) -> Self {
        Self {
            targets: self.targets.clone(),
            grabbed: self.grabbed,
        }
    }
}

pub struct Router<W> {
    windows: Vec<(WindowId, Weak<W>)>,
    roots: BTreeMap<u32, WindowId>,
    grabs: [Vec<WindowId>; 5],
}

impl<W> Default for Router<W> {
    fn default() -> Self {
        Self {
            windows: Vec::new(),
            roots: BTreeMap::new(),
            grabs: Default::default(),
        }
    }
}

impl<W> Router<W> {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Registry ─────────────────────────────────────────────────────────────

    /// Add a window.  Returns `false` if it was already registered.
    pub fn register(&mut self, id: WindowId, window: Weak<W>) -> bool {
        if self.windows.iter().any(|(w, _)| *w == id) {
            return false;
        }
        self.windows.push((id, window));
        true
    }

    /// Remove a window from the registry, from every grab stack and from the
    /// root index.  Returns `false` if it was not registered.
    pub fn unregister(&mut self, id: WindowId) -> bool {
        for stack in &mut self.grabs {
            stack.retain(|w| *w != id);
        }
        self.roots.retain(|_, w| *w != id);

        let Some(idx) = self.windows.iter().position(|(w, _)| *w == id) else {
            return false;
        };
        self.windows.remove(idx);
        true
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn contains(&self, id: WindowId) -> bool {
        self.get(id).is_some()
    }

    /// The window, if it is registered and still alive.
    pub fn get(&self, id: WindowId) -> Option<Rc<W>> {
        self.windows
            .iter()
            .find(|(w, _)| *w == id)
            .and_then(|(_, w)| w.upgrade())
    }

    /// Every live window, in registration order.
    pub fn windows(&self) -> Vec<Rc<W>> {
        self.windows.iter().filter_map(|(_, w)| w.upgrade()).collect()
    }

    // ── Root windows ─────────────────────────────────────────────────────────

    /// Lowest positive screen number not held by a live root window.
    pub fn free_screen(&self) -> u32 {
        let mut n = 1;
        for &taken in self.roots.keys() {
            if taken != n {
                break;
            }
            n += 1;
        }
        n
    }

    /// Index `id` as a root window on the lowest free screen number.
    pub fn add_root(&mut self, id: WindowId) -> u32 {
        if let Some(screen) = self.screen_of(id) {
            return screen;
        }
        let screen = self.free_screen();
        self.roots.insert(screen, id);
        screen
    }

    pub fn root(&self, screen: u32) -> Option<Rc<W>> {
        self.roots.get(&screen).and_then(|id| self.get(*id))
    }

    pub fn screen_of(&self, id: WindowId) -> Option<u32> {
        self.roots
            .iter()
            .find(|(_, w)| **w == id)
            .map(|(screen, _)| *screen)
    }

    // ── Grabs ────────────────────────────────────────────────────────────────

    /// The group `id` is grabbing in, if any.
    pub fn grab_group(&self, id: WindowId) -> Option<GrabGroup> {
        GrabGroup::PRIORITY
            .into_iter()
            .find(|g| self.grabs[g.index()].contains(&id))
    }

    /// Push `id` onto the `group` stack.  A window grabs in at most one group.
    pub fn grab(&mut self, id: WindowId, group: GrabGroup) -> Result<()> {
        if !self.contains(id) {
            return Err(WsError::NotFound);
        }
        if self.grab_group(id).is_some() {
            return Err(WsError::Duplicated);
        }
        self.grabs[group.index()].push(id);
        log::trace!("window {} grabs {group:?}", id.0);
        Ok(())
    }

    /// Remove `id` from whichever stack holds it.
    pub fn ungrab(&mut self, id: WindowId) -> Result<GrabGroup> {
        let group = self.grab_group(id).ok_or(WsError::NoGrab)?;
        self.grabs[group.index()].retain(|w| *w != id);
        log::trace!("window {} ungrabs {group:?}", id.0);
        Ok(group)
    }

    // ── Dispatch ─────────────────────────────────────────────────────────────

    /// Compute the windows that should also see an event originating at
    /// `origin`.
    ///
    /// Groups are scanned by priority; stale entries are pruned on the way.
    /// The first group with a target other than the origin wins.
    pub fn prepare_dispatch(&mut self, origin: WindowId) -> DispatchTargets<W> {
        let mut out = DispatchTargets::none();

        for group in GrabGroup::PRIORITY {
            let windows = &self.windows;
            let live = |id: &WindowId| {
                windows
                    .iter()
                    .any(|(w, weak)| w == id && weak.strong_count() > 0)
            };
            let stack = &mut self.grabs[group.index()];
            stack.retain(|id| live(id));
            if stack.is_empty() {
                continue;
            }
            out.grabbed = true;

            for &id in stack.iter().filter(|&&id| id != origin) {
                if let Some((_, weak)) = windows.iter().find(|(w, _)| *w == id) {
                    out.targets.push((id, weak.clone()));
                }
            }
            if !out.targets.is_empty() {
                break;
            }
        }

        out
    }

    /// Re-validate a prepared target.  Targets destroyed since
    /// `prepare_dispatch` come back as `None`.
    pub fn resolve(&self, id: WindowId, prepared: &Weak<W>) -> Option<Rc<W>> {
        let target = prepared.upgrade()?;
        let registered = self.get(id)?;
        Rc::ptr_eq(&target, &registered).then_some(target)
    }

    /// Prepared targets, re-validated now.
    pub fn live_targets(&self, targets: &DispatchTargets<W>) -> Vec<(WindowId, Rc<W>)> {
        targets
            .targets
            .iter()
            .filter_map(|(id, w)| self.resolve(*id, w).map(|t| (*id, t)))
            .collect()
    }

    pub fn clear_grabs(&mut self) {
        for stack in &mut self.grabs {
            stack.clear();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
