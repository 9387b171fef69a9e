use crate::prelude::*;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

/// One restoration run. The shape is fixed at creation; progress only moves forward.
#[derive(Debug)]
pub struct RestorationSession {
    id: Uuid,
    initiator: Option<PlayerId>,
    scope: Option<WorldId>,
    total: usize,
    scheduled_regions: usize,
    completed: AtomicUsize,
    restored: AtomicUsize,
    subscribers: Mutex<HashSet<PlayerId>>,
    started: time::Instant,
    done: AtomicBool,
}
impl RestorationSession {
    pub fn new(initiator: Option<PlayerId>, scope: Option<WorldId>, total: usize, scheduled_regions: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            initiator,
            scope,
            total,
            scheduled_regions,
            completed: AtomicUsize::new(0),
            restored: AtomicUsize::new(0),
            subscribers: Mutex::new(initiator.into_iter().collect()),
            started: time::Instant::now(),
            done: AtomicBool::new(false),
        }
    }
    pub fn id(&self) -> Uuid {
        self.id
    }
    /// `None` when the console started it.
    pub fn initiator(&self) -> Option<PlayerId> {
        self.initiator
    }
    pub fn scope(&self) -> Option<WorldId> {
        self.scope
    }
    pub fn total(&self) -> usize {
        self.total
    }
    pub fn scheduled_regions(&self) -> usize {
        self.scheduled_regions
    }
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }
    pub fn restored(&self) -> usize {
        self.restored.load(Ordering::Acquire)
    }
    /// Counts one unit as processed, never past `total`.
    pub fn record(&self, reverted: bool) {
        let total = self.total;
        let counted = self
            .completed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < total).then_some(n + 1))
            .is_ok();
        if counted && reverted {
            self.restored.fetch_add(1, Ordering::AcqRel);
        }
    }
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.completed() as f64 * 100.0 / self.total as f64
    }
    /// Whole percent, rounded down.
    pub fn percent_floor(&self) -> u32 {
        if self.total == 0 {
            return 100;
        }
        (self.completed() * 100 / self.total) as u32
    }
    pub fn started(&self) -> time::Instant {
        self.started
    }
    pub fn elapsed(&self) -> time::Duration {
        self.started.elapsed()
    }

    pub fn subscribe(&self, player: PlayerId) -> bool {
        self.subscribers.lock().insert(player)
    }
    pub fn unsubscribe(&self, player: PlayerId) -> bool {
        self.subscribers.lock().remove(&player)
    }
    pub fn subscribers(&self) -> Vec<PlayerId> {
        self.subscribers.lock().iter().copied().collect()
    }

    /// True only for the call that actually completed the session.
    pub fn mark_completed(&self) -> bool {
        !self.done.swap(true, Ordering::AcqRel)
    }
    pub fn is_completed(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_saturates_at_total() {
        let session = RestorationSession::new(None, None, 3, 1);
        for _ in 0..5 {
            session.record(true);
        }
        assert_eq!(session.completed(), 3);
        assert_eq!(session.restored(), 3);
        assert_eq!(session.percent_floor(), 100);
    }

    #[test]
    fn initiator_is_subscribed() {
        let player = PlayerId::random();
        let session = RestorationSession::new(Some(player), None, 10, 2);
        assert_eq!(session.subscribers(), vec![player]);
        assert!(!session.subscribe(player));
        assert!(session.unsubscribe(player));
        assert!(RestorationSession::new(None, None, 1, 1).subscribers().is_empty());
    }

    #[test]
    fn completes_once() {
        let session = RestorationSession::new(None, None, 1, 1);
        assert!(session.mark_completed());
        assert!(!session.mark_completed());
        assert!(session.is_completed());
    }
}
