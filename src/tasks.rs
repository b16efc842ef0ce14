// ── Task scheduler ────────────────────────────────────────────────────────────
//
// A time-ordered queue of deferred callbacks, processed once per message-loop
// iteration.  Ordering is by fire time; entries with equal fire times keep
// their submission order.

use crate::{
    error::{Result, WsError},
    event::Timestamp,
};

/// Identifier handed out by `TaskQueue::submit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u32);

/// A deferred callback.  Receives the scheduled time and the time of the
/// iteration that runs it.
pub type TaskHandler = Box<dyn FnOnce(Timestamp, Timestamp) -> Result<()>>;

/// One queued entry.
pub struct Task {
    pub id: TaskId,
    pub time: Timestamp,
    handler: TaskHandler,
}

impl Task {
    /// Invoke the handler.
    pub fn run(self, now: Timestamp) -> Result<()> {
        (self.handler)(self.time, now)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("time", &self.time)
            .finish_non_exhaustive()
    }
}

/// Time-ordered task queue with round-robin identifiers.
pub struct TaskQueue {
    tasks: Vec<Task>,
    last_id: u32,
    /// Identifiers cycle in `1..limit`.
    limit: u32,
}

impl TaskQueue {
    pub fn new(id_limit: u32) -> Self {
        Self {
            tasks: Vec::new(),
            last_id: 0,
            limit: id_limit.max(2),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Fire time of the earliest entry.
    pub fn next_fire_time(&self) -> Option<Timestamp> {
        self.tasks.first().map(|t| t.time)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.iter().any(|t| t.id == id)
    }

    /// Queue `handler` to run at `time`.
    ///
    /// Binary search places the entry after every entry with the same or an
    /// earlier fire time.
    pub fn submit<F>(&mut self, time: Timestamp, handler: F) -> Result<TaskId>
    where
        F: FnOnce(Timestamp, Timestamp) -> Result<()> + 'static,
    {
        let id = self.next_id()?;
        let at = self.tasks.partition_point(|t| t.time <= time);
        self.tasks.insert(
            at,
            Task {
                id,
                time,
                handler: Box::new(handler),
            },
        );
        Ok(id)
    }

    /// Remove a queued entry.
    pub fn cancel(&mut self, id: TaskId) -> Result<()> {
        let idx = self
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(WsError::NotFound)?;
        self.tasks.remove(idx);
        Ok(())
    }

    /// Move every entry due at `now` out of the queue, in order.
    pub fn take_due(&mut self, now: Timestamp) -> Vec<Task> {
        let due = self.tasks.partition_point(|t| t.time <= now);
        self.tasks.drain(..due).collect()
    }

    /// Run a batch taken by `take_due`.  Stops at the first failure; the rest
    /// of the batch is dropped, not re-queued.
    pub fn run_batch(batch: Vec<Task>, now: Timestamp) -> Result<()> {
        for task in batch {
            let id = task.id;
            if let Err(e) = task.run(now) {
                log::debug!("task {} failed: {e}", id.0);
                return Err(e);
            }
        }
        Ok(())
    }

    /// `take_due` followed by `run_batch`.  Handlers run while `self` is
    /// borrowed, so they cannot touch this queue; the display uses the two
    /// halves separately.
    pub fn run_due(&mut self, now: Timestamp) -> Result<()> {
        let batch = self.take_due(now);
        Self::run_batch(batch, now)
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    fn next_id(&mut self) -> Result<TaskId> {
        if self.tasks.len() >= (self.limit - 1) as usize {
            return Err(WsError::NoMem);
        }
        loop {
            self.last_id = if self.last_id + 1 >= self.limit {
                1
            } else {
                self.last_id + 1
            };
            let id = TaskId(self.last_id);
            if !self.contains(id) {
                return Ok(id);
            }
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(0x7f_ffff)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::{cell::RefCell, rc::Rc};

    fn recorder() -> Rc<RefCell<Vec<u32>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn push(log: &Rc<RefCell<Vec<u32>>>, tag: u32) -> impl FnOnce(Timestamp, Timestamp) -> Result<()> {
        let log = Rc::clone(log);
        move |_, _| {
            log.borrow_mut().push(tag);
            Ok(())
        }
    }

    #[test]
    fn equal_times_keep_submission_order() {
        let log = recorder();
        let mut q = TaskQueue::default();
        q.submit(10, push(&log, 1)).unwrap();
        q.submit(5, push(&log, 2)).unwrap();
        q.submit(10, push(&log, 3)).unwrap();
        q.submit(5, push(&log, 4)).unwrap();
        q.run_due(10).unwrap();
        assert_eq!(*log.borrow(), vec![2, 4, 1, 3]);
        assert!(q.is_empty());
    }

    #[test]
    fn fires_once() {
        let log = recorder();
        let mut q = TaskQueue::default();
        let now = 1_000;
        q.submit(now + 50, push(&log, 7)).unwrap();
        q.run_due(now + 10).unwrap();
        assert!(log.borrow().is_empty());
        q.run_due(now + 60).unwrap();
        q.run_due(now + 60).unwrap();
        assert_eq!(*log.borrow(), vec![7]);
    }

    #[test]
    fn cancel_removes_and_reports_missing() {
        let log = recorder();
        let mut q = TaskQueue::default();
        let id = q.submit(1, push(&log, 1)).unwrap();
        q.cancel(id).unwrap();
        assert!(matches!(q.cancel(id), Err(WsError::NotFound)));
        q.run_due(100).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn failure_stops_batch_without_requeue() {
        let log = recorder();
        let mut q = TaskQueue::default();
        q.submit(1, push(&log, 1)).unwrap();
        q.submit(2, |_, _| Err(WsError::Task("boom".into()))).unwrap();
        q.submit(3, push(&log, 3)).unwrap();
        q.submit(50, push(&log, 50)).unwrap();

        assert!(matches!(q.run_due(10), Err(WsError::Task(_))));
        assert_eq!(*log.borrow(), vec![1]);
        // Entry 3 was moved out with the batch and is gone; 50 is untouched.
        assert_eq!(q.len(), 1);
        assert_eq!(q.next_fire_time(), Some(50));
    }

    #[test]
    fn handler_sees_scheduled_and_current_time() {
        let seen = Rc::new(RefCell::new(None));
        let mut q = TaskQueue::default();
        let s = Rc::clone(&seen);
        q.submit(40, move |sched, now| {
            *s.borrow_mut() = Some((sched, now));
            Ok(())
        })
        .unwrap();
        q.run_due(45).unwrap();
        assert_eq!(*seen.borrow(), Some((40, 45)));
    }

    #[test]
    fn ids_cycle_and_skip_live_ones() {
        let mut q = TaskQueue::new(4); // ids 1..=3
        let a = q.submit(100, |_, _| Ok(())).unwrap();
        let b = q.submit(100, |_, _| Ok(())).unwrap();
        assert_eq!((a, b), (TaskId(1), TaskId(2)));
        q.cancel(a).unwrap();
        let c = q.submit(100, |_, _| Ok(())).unwrap();
        assert_eq!(c, TaskId(3));
        // Wraps past 3 to 1, which is free again; 2 is still live.
        let d = q.submit(100, |_, _| Ok(())).unwrap();
        assert_eq!(d, TaskId(1));
        assert!(matches!(q.submit(100, |_, _| Ok(())), Err(WsError::NoMem)));
    }

    proptest! {
        #[test]
        fn runs_in_nondecreasing_time_then_submission_order(
            times in proptest::collection::vec(0u64..20, 1..40)
        ) {
            let log = Rc::new(RefCell::new(Vec::new()));
            let mut q = TaskQueue::default();
            for (seq, &t) in times.iter().enumerate() {
                let log = Rc::clone(&log);
                q.submit(t, move |sched, _| {
                    log.borrow_mut().push((sched, seq));
                    Ok(())
                }).unwrap();
            }
            q.run_due(u64::MAX).unwrap();
            let ran = log.borrow();
            prop_assert_eq!(ran.len(), times.len());
            for w in ran.windows(2) {
                prop_assert!(w[0] < w[1]);
            }
        }
    }
}
