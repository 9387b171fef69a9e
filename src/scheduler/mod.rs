use crate::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

mod latch;
mod region;
mod tick;

pub use latch::CountDownLatch;
pub use region::RegionScheduler;
pub use tick::TickScheduler;

pub type Task = Box<dyn FnOnce() + Send>;
/// Repeating tasks get their own handle so they can stop themselves.
pub type RepeatingTask = Box<dyn FnMut(&TaskHandle) + Send>;

#[derive(Debug, Clone, Default)]
pub struct TaskHandle(Arc<AtomicBool>);
impl TaskHandle {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub trait Scheduler: Send + Sync {
    /// Runs on the coordinating thread (the simulation thread, or the global region).
    fn run_later(&self, delay_ticks: u32, task: Task) -> TaskHandle;
    fn run_repeating(&self, delay_ticks: u32, period_ticks: u32, task: RepeatingTask) -> TaskHandle;
    /// Runs off every simulation thread.
    fn run_async(&self, task: Task) -> TaskHandle;
    /// Runs on whichever thread owns `chunk`. Single-threaded hosts treat this as `run_later(0, ..)`.
    fn run_on_region(&self, world: WorldId, chunk: ChunkPos, task: Task) -> TaskHandle;
    fn supports_regions(&self) -> bool {
        false
    }
}

/// How world mutation is scheduled. Picked once at startup and never mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionRegime {
    SingleThreaded,
    RegionParallel,
}
impl ExecutionRegime {
    pub fn detect(scheduler: &dyn Scheduler) -> Self {
        let regime = if scheduler.supports_regions() {
            ExecutionRegime::RegionParallel
        } else {
            ExecutionRegime::SingleThreaded
        };
        log::info!("running in {regime:?} mode");
        regime
    }
}

pub(crate) fn spawn_async(name: &str, handle: TaskHandle, task: Task) {
    let spawned = std::thread::Builder::new().name(name.to_owned()).spawn(move || {
        if !handle.is_cancelled() {
            task()
        }
    });
    if let Err(e) = spawned {
        log::error!("unable to start async task: {e}");
    }
}
