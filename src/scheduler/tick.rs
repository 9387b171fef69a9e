use super::*;
use parking_lot::Mutex;

enum Job {
    Once(Task),
    Repeating { period: u32, task: RepeatingTask },
}
struct Timer {
    due: u64,
    handle: TaskHandle,
    job: Job,
}

/// A single simulation thread: tasks only run when the owner calls [`TickScheduler::tick`].
#[derive(Default)]
pub struct TickScheduler {
    tick: Mutex<u64>,
    timers: Mutex<Vec<Timer>>,
}
impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn current_tick(&self) -> u64 {
        *self.tick.lock()
    }
    pub fn pending(&self) -> usize {
        self.timers.lock().iter().filter(|t| !t.handle.is_cancelled()).count()
    }
    fn push(&self, delay_ticks: u32, handle: TaskHandle, job: Job) {
        // a task scheduled for "now" lands on the next tick, never the one being run
        let due = self.current_tick() + delay_ticks.max(1) as u64;
        self.timers.lock().push(Timer { due, handle, job });
    }
    /// Advances one tick and runs everything that fell due, returning how many ran.
    pub fn tick(&self) -> usize {
        let now = {
            let mut tick = self.tick.lock();
            *tick += 1;
            *tick
        };
        let due: Vec<Timer> = {
            let mut timers = self.timers.lock();
            let (due, waiting): (Vec<Timer>, Vec<Timer>) = core::mem::take(&mut *timers).into_iter().partition(|t| t.due <= now);
            *timers = waiting;
            due
        };
        let mut ran = 0;
        for Timer { handle, job, .. } in due {
            if handle.is_cancelled() {
                continue;
            }
            ran += 1;
            match job {
                Job::Once(task) => task(),
                Job::Repeating { period, mut task } => {
                    task(&handle);
                    if !handle.is_cancelled() {
                        let due = now + period.max(1) as u64;
                        self.timers.lock().push(Timer { due, handle, job: Job::Repeating { period, task } });
                    }
                }
            }
        }
        ran
    }
    pub fn tick_until(&self, mut done: impl FnMut() -> bool, max_ticks: u64) -> bool {
        for _ in 0..max_ticks {
            if done() {
                return true;
            }
            self.tick();
        }
        done()
    }
}
impl Scheduler for TickScheduler {
    fn run_later(&self, delay_ticks: u32, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        self.push(delay_ticks, handle.clone(), Job::Once(task));
        handle
    }
    fn run_repeating(&self, delay_ticks: u32, period_ticks: u32, task: RepeatingTask) -> TaskHandle {
        let handle = TaskHandle::new();
        self.push(delay_ticks, handle.clone(), Job::Repeating { period: period_ticks, task });
        handle
    }
    fn run_async(&self, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        spawn_async("netherguard-async", handle.clone(), task);
        handle
    }
    fn run_on_region(&self, _world: WorldId, _chunk: ChunkPos, task: Task) -> TaskHandle {
        self.run_later(0, task)
    }
}
impl std::fmt::Debug for TickScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickScheduler")
            .field("tick", &self.current_tick())
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn repeating_task_cancels_itself() {
        let scheduler = TickScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        scheduler.run_repeating(
            1,
            2,
            Box::new(move |handle| {
                if counter.fetch_add(1, Ordering::SeqCst) == 2 {
                    handle.cancel();
                }
            }),
        );
        for _ in 0..20 {
            scheduler.tick();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn tasks_scheduled_during_a_tick_wait_for_the_next() {
        let scheduler = Arc::new(TickScheduler::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let (inner, counter) = (scheduler.clone(), runs.clone());
        scheduler.run_later(
            0,
            Box::new(move || {
                let counter = counter.clone();
                inner.run_later(0, Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }));
            }),
        );
        assert_eq!(scheduler.tick(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.tick(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_tasks_never_run() {
        let scheduler = TickScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let handle = scheduler.run_later(3, Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        handle.cancel();
        for _ in 0..5 {
            scheduler.tick();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
