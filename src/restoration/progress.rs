use super::RestorationSession;
use crate::prelude::*;
use crate::host::{Messenger, Recipient};
use crate::scheduler::{Scheduler, TaskHandle};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

pub const CHECK_PERIOD_TICKS: u32 = 20;
pub const TIME_INTERVAL: time::Duration = time::Duration::from_secs(60);
/// Sessions at least this large report every percent instead of every ten.
pub const FINE_GRAINED_TOTAL: usize = 1000;

struct Tracked {
    session: Arc<RestorationSession>,
    last_time: time::Instant,
    last_milestone: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Progress {
        session: Uuid,
        completed: usize,
        total: usize,
        elapsed: time::Duration,
        /// Set when a percentage milestone caused this update.
        milestone: Option<u32>,
    },
    Complete {
        session: Uuid,
        restored: usize,
        elapsed: time::Duration,
    },
}

/// Watches running sessions and tells their subscribers how far along they are.
pub struct ProgressReporter {
    sessions: Mutex<HashMap<Uuid, Tracked>>,
    opted_out: Mutex<HashSet<PlayerId>>,
    messenger: Arc<dyn Messenger>,
    task: Mutex<Option<TaskHandle>>,
}
impl ProgressReporter {
    pub fn new(messenger: Arc<dyn Messenger>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            opted_out: Mutex::new(HashSet::new()),
            messenger,
            task: Mutex::new(None),
        }
    }

    pub fn start(self: &Arc<Self>, scheduler: &dyn Scheduler) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        let reporter = Arc::downgrade(self);
        *task = Some(scheduler.run_repeating(
            CHECK_PERIOD_TICKS,
            CHECK_PERIOD_TICKS,
            Box::new(move |handle| match reporter.upgrade() {
                Some(reporter) => {
                    reporter.check(time::Instant::now());
                }
                None => handle.cancel(),
            }),
        ));
    }
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.cancel();
        }
    }
    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    pub fn register(&self, session: Arc<RestorationSession>) {
        let tracked = Tracked { last_time: session.started(), last_milestone: 0, session };
        self.sessions.lock().insert(tracked.session.id(), tracked);
    }
    pub fn active(&self) -> usize {
        self.sessions.lock().len()
    }
    pub fn session(&self, id: Uuid) -> Option<Arc<RestorationSession>> {
        self.sessions.lock().get(&id).map(|t| t.session.clone())
    }

    pub fn set_opt_out(&self, player: PlayerId, opt_out: bool) {
        let mut opted_out = self.opted_out.lock();
        if opt_out {
            opted_out.insert(player);
        } else {
            opted_out.remove(&player);
        }
    }
    pub fn is_opted_out(&self, player: PlayerId) -> bool {
        self.opted_out.lock().contains(&player)
    }

    /// Sends the final message and forgets the session. Only the first call for a
    /// session does anything.
    pub fn complete(&self, id: Uuid, restored: usize) -> Option<Update> {
        let tracked = self.sessions.lock().remove(&id)?;
        let session = tracked.session;
        if !session.mark_completed() {
            return None;
        }
        let elapsed = session.elapsed();
        let message = Message::new("Restoration complete! Restored ", Color::Green)
            .then(restored.to_string(), Color::Gold)
            .then(" Ancient Debris blocks in ", Color::Green)
            .then(format_duration(elapsed), Color::Gold)
            .then(".", Color::Green);
        self.send(&session, &message);
        log::info!("restoration {id} finished: {restored} of {} blocks restored", session.total());
        Some(Update::Complete { session: id, restored, elapsed })
    }

    /// Evaluates every active session as of `now`, messaging subscribers for each
    /// one that is due an update.
    pub fn check(&self, now: time::Instant) -> Vec<Update> {
        let due: Vec<(Arc<RestorationSession>, Option<u32>)> = {
            let mut sessions = self.sessions.lock();
            sessions
                .values_mut()
                .filter(|t| !t.session.is_completed())
                .filter_map(|t| {
                    let timed = now.saturating_duration_since(t.last_time) >= TIME_INTERVAL;
                    if timed {
                        t.last_time = now;
                    }
                    let step = if t.session.total() >= FINE_GRAINED_TOTAL { 1 } else { 10 };
                    let reached = t.session.percent_floor() / step * step;
                    let milestone = (reached > t.last_milestone && reached <= 100).then_some(reached);
                    if let Some(reached) = milestone {
                        t.last_milestone = reached;
                    }
                    (timed || milestone.is_some()).then(|| (t.session.clone(), milestone))
                })
                .collect()
        };
        due.into_iter()
            .map(|(session, milestone)| {
                let (completed, total, elapsed) = (session.completed(), session.total(), session.elapsed());
                let message = Message::new("Restoration progress: ", Color::Yellow)
                    .then(completed.to_string(), Color::Gold)
                    .then("/", Color::Yellow)
                    .then(total.to_string(), Color::Gold)
                    .then(format!(" ({:.1}%) - ", session.percent()), Color::Yellow)
                    .then(format_duration(elapsed), Color::Gold)
                    .then(" elapsed", Color::Yellow);
                self.send(&session, &message);
                Update::Progress { session: session.id(), completed, total, elapsed, milestone }
            })
            .collect()
    }

    fn send(&self, session: &RestorationSession, message: &Message) {
        let opted_out = self.opted_out.lock().clone();
        for player in session.subscribers() {
            if !opted_out.contains(&player) {
                self.messenger.notify(Recipient::Player(player), message);
            }
        }
        if session.initiator().is_none() {
            self.messenger.notify(Recipient::Console, message);
        }
    }
}
impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("active", &self.active())
            .field("running", &self.is_running())
            .finish()
    }
}

pub fn format_duration(duration: time::Duration) -> String {
    let seconds = duration.as_secs();
    let (hours, minutes) = (seconds / 3600, seconds / 60 % 60);
    match (hours, minutes) {
        (0, 0) => format!("{}s", seconds),
        (0, _) => format!("{}m {}s", minutes, seconds % 60),
        _ => format!("{}h {}m {}s", hours, minutes, seconds % 60),
    }
}
