// Drag-target capability of a window shell: the files most recently dropped
// on it and the application's verdict on them.

use std::{cell::RefCell, path::PathBuf};

use crate::{
    error::{Result, WsError},
    geometry::Rect,
};

/// What the application intends to do with dropped content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragAction {
    Copy,
    Move,
    Link,
}

#[derive(Debug, Clone, PartialEq)]
struct PendingDrop {
    left: i32,
    top: i32,
    files: Vec<PathBuf>,
    accepted: Option<(DragAction, Option<Rect>)>,
}

#[derive(Debug, Default)]
pub struct DropTarget {
    pending: RefCell<Option<PendingDrop>>,
}

impl DropTarget {
    /// Record a drop, replacing any drop the application never answered.
    pub fn store(&self, left: i32, top: i32, files: Vec<PathBuf>) {
        let old = self.pending.replace(Some(PendingDrop {
            left,
            top,
            files,
            accepted: None,
        }));
        if old.is_some() {
            log::debug!("drop target: unanswered drop discarded");
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.borrow().is_some()
    }

    /// Client position of the pending drop.
    pub fn position(&self) -> Option<(i32, i32)> {
        self.pending.borrow().as_ref().map(|p| (p.left, p.top))
    }

    pub fn accept(&self, action: DragAction, area: Option<Rect>) -> Result<()> {
        let mut pending = self.pending.borrow_mut();
        let drop = pending.as_mut().ok_or(WsError::BadState)?;
        drop.accepted = Some((action, area));
        Ok(())
    }

    pub fn reject(&self) -> Result<()> {
        self.pending.borrow_mut().take().map(|_| ()).ok_or(WsError::BadState)
    }

    /// Hand over the files of an accepted drop.
    pub fn take_files(&self) -> Result<(DragAction, Vec<PathBuf>)> {
        let mut pending = self.pending.borrow_mut();
        let action = match pending.as_ref() {
            Some(PendingDrop {
                accepted: Some((action, _)),
                ..
            }) => *action,
            _ => return Err(WsError::BadState),
        };
        let files = pending.take().map(|p| p.files).unwrap_or_default();
        Ok((action, files))
    }

    pub fn clear(&self) {
        self.pending.borrow_mut().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_only_after_accept() {
        let t = DropTarget::default();
        t.store(3, 4, vec![PathBuf::from("a.wav")]);
        assert!(matches!(t.take_files(), Err(WsError::BadState)));
        t.accept(DragAction::Copy, None).unwrap();
        let (action, files) = t.take_files().unwrap();
        assert_eq!(action, DragAction::Copy);
        assert_eq!(files, vec![PathBuf::from("a.wav")]);
        assert!(!t.has_pending());
    }

    #[test]
    fn reject_discards() {
        let t = DropTarget::default();
        assert!(t.reject().is_err());
        t.store(0, 0, vec![]);
        t.reject().unwrap();
        assert!(t.accept(DragAction::Move, None).is_err());
    }
}
