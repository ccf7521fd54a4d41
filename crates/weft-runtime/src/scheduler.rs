//! Deferred task scheduling.
//!
//! The dispatcher never runs a flush inline; it hands a [`Task`] to a
//! [`Scheduler`] and the host runs it on a later turn of its event loop.
//! [`Scheduler::schedule`] must not run the task synchronously.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce()>;

/// Handle for cancelling a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u64);

impl TaskHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Single-threaded deferred executor.
pub trait Scheduler {
    /// Queue `task` for a later tick.
    fn schedule(&self, task: Task) -> TaskHandle;

    /// Cancel a queued task; returns `false` if it already ran or is unknown.
    fn cancel(&self, handle: TaskHandle) -> bool;
}

/// Frames run before giving up in [`FrameScheduler::run_until_idle`].
pub const MAX_IDLE_FRAMES: usize = 1024;

/// Host-driven frame queue.
///
/// Tasks run only when the host calls [`FrameScheduler::run_frame`], the
/// analogue of one animation frame.
#[derive(Default)]
pub struct FrameScheduler {
    next: Cell<u64>,
    queue: RefCell<VecDeque<(TaskHandle, Task)>>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Run every task queued before this call. Tasks queued while the frame
    /// runs wait for the next frame. Returns the number of tasks run.
    pub fn run_frame(&self) -> usize {
        let boundary = self.next.get();
        let mut ran = 0;
        loop {
            let task = {
                let mut queue = self.queue.borrow_mut();
                let due = queue.front().is_some_and(|(handle, _)| handle.0 < boundary);
                if due {
                    queue.pop_front()
                } else {
                    None
                }
            };
            let Some((_, task)) = task else { break };
            task();
            ran += 1;
        }
        ran
    }

    /// Run frames until the queue is empty; returns the total tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        for _ in 0..MAX_IDLE_FRAMES {
            if self.pending() == 0 {
                return total;
            }
            total += self.run_frame();
        }
        tracing::warn!(
            frames = MAX_IDLE_FRAMES,
            pending = self.pending(),
            "scheduler did not go idle, a render may be feeding its own flushes"
        );
        total
    }
}

impl Scheduler for FrameScheduler {
    fn schedule(&self, task: Task) -> TaskHandle {
        let handle = TaskHandle(self.next.get());
        self.next.set(handle.0 + 1);
        self.queue.borrow_mut().push_back((handle, task));
        handle
    }

    fn cancel(&self, handle: TaskHandle) -> bool {
        let mut queue = self.queue.borrow_mut();
        match queue.iter().position(|(h, _)| *h == handle) {
            Some(index) => queue.remove(index).is_some(),
            None => false,
        }
    }
}

impl std::fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(feature = "tokio")]
pub use local::LocalTaskScheduler;

#[cfg(feature = "tokio")]
mod local {
    use super::{Scheduler, Task, TaskHandle};
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use tokio::task::JoinHandle;

    /// Scheduler backed by `tokio::task::spawn_local`.
    ///
    /// Must be used from within a `tokio::task::LocalSet`.
    #[derive(Default)]
    pub struct LocalTaskScheduler {
        next: Cell<u64>,
        tasks: RefCell<HashMap<TaskHandle, JoinHandle<()>>>,
    }

    impl LocalTaskScheduler {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Scheduler for LocalTaskScheduler {
        fn schedule(&self, task: Task) -> TaskHandle {
            let handle = TaskHandle(self.next.get());
            self.next.set(handle.0 + 1);
            let join = tokio::task::spawn_local(async move { task() });
            let mut tasks = self.tasks.borrow_mut();
            tasks.retain(|_, join| !join.is_finished());
            tasks.insert(handle, join);
            handle
        }

        fn cancel(&self, handle: TaskHandle) -> bool {
            match self.tasks.borrow_mut().remove(&handle) {
                Some(join) if !join.is_finished() => {
                    join.abort();
                    true
                }
                _ => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_tasks_wait_for_a_frame() {
        let scheduler = FrameScheduler::new();
        let ran = Rc::new(Cell::new(0));
        let counter = ran.clone();
        scheduler.schedule(Box::new(move || counter.set(counter.get() + 1)));
        assert_eq!(ran.get(), 0);
        assert_eq!(scheduler.run_frame(), 1);
        assert_eq!(ran.get(), 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_tasks_queued_during_a_frame_run_next_frame() {
        let scheduler = Rc::new(FrameScheduler::new());
        let inner = scheduler.clone();
        let ran = Rc::new(Cell::new(0));
        let counter = ran.clone();
        scheduler.schedule(Box::new(move || {
            let counter = counter.clone();
            inner.schedule(Box::new(move || counter.set(counter.get() + 1)));
        }));

        assert_eq!(scheduler.run_frame(), 1);
        assert_eq!(ran.get(), 0);
        assert_eq!(scheduler.run_until_idle(), 1);
        assert_eq!(ran.get(), 1);
    }

    #[test]
    fn test_cancel() {
        let scheduler = FrameScheduler::new();
        let handle = scheduler.schedule(Box::new(|| panic!("cancelled task ran")));
        assert!(scheduler.cancel(handle));
        assert!(!scheduler.cancel(handle));
        assert_eq!(scheduler.run_frame(), 0);
    }
}
