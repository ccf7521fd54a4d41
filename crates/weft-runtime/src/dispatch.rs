//! Batched change dispatch.
//!
//! Change paths reported by the tree are matched against the subscription
//! registry and accumulated in a [`PendingBatch`]. The first change after a
//! flush schedules the next one; later changes just join the batch. The flush
//! takes the batch before invoking anything, so changes made by subscribers
//! land in a fresh batch and a distinct flush.

use crate::registry::{SubscriberId, SubscriptionRegistry};
use crate::scheduler::{Scheduler, TaskHandle};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;
use weft_state::{Path, PathKey};

/// Changes waiting for the next flush.
#[derive(Debug, Default)]
pub struct PendingBatch {
    /// Changed keys in mutation order, each with the subscribers it implicates.
    pub changed: Vec<(PathKey, Vec<SubscriberId>)>,
    /// The scheduled flush, if any.
    pub handle: Option<TaskHandle>,
}

impl PendingBatch {
    fn add(&mut self, key: PathKey, subscribers: &[SubscriberId]) {
        match self.changed.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => {
                for id in subscribers {
                    if !existing.contains(id) {
                        existing.push(*id);
                    }
                }
            }
            None => self.changed.push((key, subscribers.to_vec())),
        }
    }
}

/// Outcome of one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// Changed keys, in mutation order.
    pub changed: Vec<PathKey>,
    /// Subscribers invoked, in invocation order.
    pub invoked: Vec<SubscriberId>,
}

/// Dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Change notifications received inside the namespace.
    pub notifications: u64,
    /// Flushes run.
    pub flushes: u64,
    /// Subscriber invocations across all flushes.
    pub invocations: u64,
    /// Pending batches dropped by [`Dispatcher::discard_pending`].
    pub discarded: u64,
}

/// Clears the flushing flag on every exit, unwinding included.
struct FlushingGuard<'a>(&'a Cell<bool>);

impl<'a> FlushingGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for FlushingGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Subscription registry plus the pending batch and its scheduled flush.
pub struct Dispatcher {
    namespace: Path,
    registry: RefCell<SubscriptionRegistry>,
    pending: RefCell<PendingBatch>,
    scheduler: Rc<dyn Scheduler>,
    flush_task: Rc<dyn Fn()>,
    flushing: Cell<bool>,
    stats: Cell<DispatchStats>,
    last_flush: RefCell<Option<FlushReport>>,
}

impl Dispatcher {
    /// `flush_task` is what the scheduled task runs; it is expected to call
    /// [`Dispatcher::flush`].
    pub fn new(namespace: Path, scheduler: Rc<dyn Scheduler>, flush_task: Rc<dyn Fn()>) -> Self {
        Self {
            namespace,
            registry: RefCell::new(SubscriptionRegistry::new()),
            pending: RefCell::new(PendingBatch::default()),
            scheduler,
            flush_task,
            flushing: Cell::new(false),
            stats: Cell::new(DispatchStats::default()),
            last_flush: RefCell::new(None),
        }
    }

    /// Register `subscriber` for a relative key.
    pub fn register(&self, key: PathKey, subscriber: SubscriberId) -> bool {
        let added = self.registry.borrow_mut().register(key.clone(), subscriber);
        if added {
            tracing::debug!(path = %key, subscriber = %subscriber, "subscription registered");
        }
        added
    }

    /// Record a change at a fully-qualified path and make sure a flush is
    /// scheduled. Paths outside the namespace are ignored.
    pub fn notify(&self, path: &Path) {
        let Some(relative) = path.strip_prefix(&self.namespace) else {
            tracing::trace!(path = %path, "change outside namespace ignored");
            return;
        };
        let key = relative.to_key();
        let subscribers = self.registry.borrow().subscribers(key.as_str()).to_vec();
        tracing::trace!(path = %key, subscribers = subscribers.len(), "change notified");

        let mut stats = self.stats.get();
        stats.notifications += 1;
        self.stats.set(stats);

        let needs_flush = {
            let mut pending = self.pending.borrow_mut();
            pending.add(key, &subscribers);
            pending.handle.is_none()
        };
        if needs_flush {
            let task = self.flush_task.clone();
            let handle = self.scheduler.schedule(Box::new(move || task()));
            self.pending.borrow_mut().handle = Some(handle);
            tracing::trace!(task = handle.id(), "flush scheduled");
        }
    }

    /// Run the pending batch, calling `invoke` once per implicated
    /// subscriber.
    ///
    /// A flush requested while one is running returns an empty report and
    /// leaves the pending batch for its own scheduled task.
    pub fn flush(&self, invoke: &mut dyn FnMut(SubscriberId)) -> FlushReport {
        if self.flushing.get() {
            tracing::trace!("flush requested during a flush, deferred");
            return FlushReport::default();
        }
        let batch = std::mem::take(&mut *self.pending.borrow_mut());
        if let Some(handle) = batch.handle {
            // Explicit flushes may run before the scheduled task.
            self.scheduler.cancel(handle);
        }

        let flushing = FlushingGuard::enter(&self.flushing);
        let mut report = FlushReport::default();
        let mut notified: HashSet<SubscriberId> = HashSet::new();
        for (key, subscribers) in batch.changed {
            for id in subscribers {
                if notified.insert(id) {
                    invoke(id);
                    report.invoked.push(id);
                }
            }
            report.changed.push(key);
        }
        drop(flushing);

        let mut stats = self.stats.get();
        stats.flushes += 1;
        stats.invocations += report.invoked.len() as u64;
        self.stats.set(stats);
        tracing::trace!(
            changed = report.changed.len(),
            invoked = report.invoked.len(),
            "flush finished"
        );
        *self.last_flush.borrow_mut() = Some(report.clone());
        report
    }

    /// Drop the pending batch and cancel its flush. State is untouched.
    pub fn discard_pending(&self) -> usize {
        let batch = std::mem::take(&mut *self.pending.borrow_mut());
        if let Some(handle) = batch.handle {
            self.scheduler.cancel(handle);
        }
        let dropped = batch.changed.len();
        if dropped > 0 {
            let mut stats = self.stats.get();
            stats.discarded += 1;
            self.stats.set(stats);
            tracing::debug!(changed = dropped, "pending notifications discarded");
        }
        dropped
    }

    /// Whether a flush is scheduled.
    pub fn has_pending(&self) -> bool {
        self.pending.borrow().handle.is_some()
    }

    /// Keys waiting for the next flush.
    pub fn pending_paths(&self) -> Vec<PathKey> {
        self.pending
            .borrow()
            .changed
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats.get()
    }

    pub fn last_flush(&self) -> Option<FlushReport> {
        self.last_flush.borrow().clone()
    }

    /// Keys `subscriber` is registered for.
    pub fn paths_of(&self, subscriber: SubscriberId) -> Vec<PathKey> {
        self.registry.borrow().paths_of(subscriber)
    }

    /// Sorted copy of the registry.
    pub fn subscriptions(&self) -> BTreeMap<PathKey, Vec<SubscriberId>> {
        self.registry.borrow().snapshot()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("namespace", &self.namespace.to_string())
            .field("subscriptions", &self.registry.borrow().len())
            .field("pending", &self.pending_paths())
            .field("stats", &self.stats.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FrameScheduler, InstanceId};
    use weft_state::path;

    fn dispatcher() -> (Dispatcher, Rc<FrameScheduler>, Rc<Cell<usize>>) {
        let scheduler = Rc::new(FrameScheduler::new());
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let dispatcher = Dispatcher::new(
            path!("app"),
            scheduler.clone(),
            Rc::new(move || counter.set(counter.get() + 1)),
        );
        (dispatcher, scheduler, runs)
    }

    #[test]
    fn test_one_flush_scheduled_per_batch() {
        let (dispatcher, scheduler, runs) = dispatcher();
        dispatcher.notify(&path!("app", "a"));
        dispatcher.notify(&path!("app", "b"));
        assert_eq!(scheduler.pending(), 1);
        assert!(dispatcher.has_pending());

        scheduler.run_frame();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_outside_namespace_is_ignored() {
        let (dispatcher, scheduler, _) = dispatcher();
        dispatcher.notify(&path!("other", "a"));
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(dispatcher.stats().notifications, 0);
    }

    #[test]
    fn test_flush_invokes_each_subscriber_once() {
        let (dispatcher, _, _) = dispatcher();
        dispatcher.register("a".into(), InstanceId(1));
        dispatcher.register("b".into(), InstanceId(1));
        dispatcher.register("b".into(), InstanceId(2));
        dispatcher.notify(&path!("app", "a"));
        dispatcher.notify(&path!("app", "b"));
        dispatcher.notify(&path!("app", "a"));

        let mut invoked = Vec::new();
        let report = dispatcher.flush(&mut |id| invoked.push(id));
        assert_eq!(invoked, vec![InstanceId(1), InstanceId(2)]);
        assert_eq!(report.changed, vec![PathKey::new("a"), PathKey::new("b")]);
        assert!(!dispatcher.has_pending());
    }

    #[test]
    fn test_subscribers_are_captured_at_notify_time() {
        let (dispatcher, _, _) = dispatcher();
        dispatcher.notify(&path!("app", "a"));
        dispatcher.register("a".into(), InstanceId(1));
        let report = dispatcher.flush(&mut |_| {});
        assert!(report.invoked.is_empty());
    }

    #[test]
    fn test_explicit_flush_cancels_scheduled_task() {
        let (dispatcher, scheduler, runs) = dispatcher();
        dispatcher.notify(&path!("app", "a"));
        dispatcher.flush(&mut |_| {});
        assert_eq!(scheduler.run_until_idle(), 0);
        assert_eq!(runs.get(), 0);
    }

    #[test]
    fn test_panicking_subscriber_does_not_wedge_dispatch() {
        let (dispatcher, scheduler, runs) = dispatcher();
        dispatcher.register("a".into(), InstanceId(1));
        dispatcher.notify(&path!("app", "a"));
        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            dispatcher.flush(&mut |_| panic!("subscriber blew up"));
        }));
        assert!(unwound.is_err());

        dispatcher.notify(&path!("app", "a"));
        assert!(dispatcher.has_pending());
        assert_eq!(scheduler.run_until_idle(), 1);
        assert_eq!(runs.get(), 1);

        let mut invoked = Vec::new();
        let report = dispatcher.flush(&mut |id| invoked.push(id));
        assert_eq!(invoked, vec![InstanceId(1)]);
        assert_eq!(report.changed, vec![PathKey::new("a")]);
    }

    #[test]
    fn test_discard_pending() {
        let (dispatcher, scheduler, runs) = dispatcher();
        dispatcher.notify(&path!("app", "a"));
        assert_eq!(dispatcher.discard_pending(), 1);
        assert!(dispatcher.pending_paths().is_empty());
        scheduler.run_until_idle();
        assert_eq!(runs.get(), 0);
        assert_eq!(dispatcher.stats().discarded, 1);
    }
}
