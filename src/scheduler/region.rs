use super::*;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::mpsc;

type RegionKey = (WorldId, i32, i32);

/// Region-parallel host: every 32x32 chunk region owns a worker thread, and a global
/// lane (ticked by the owner) coordinates everything that isn't tied to a region.
pub struct RegionScheduler {
    global: TickScheduler,
    regions: Mutex<HashMap<RegionKey, mpsc::Sender<Task>>>,
}
impl RegionScheduler {
    pub fn new() -> Self {
        Self { global: TickScheduler::new(), regions: Mutex::new(HashMap::new()) }
    }
    /// Ticks the global region.
    pub fn tick(&self) -> usize {
        self.global.tick()
    }
    /// Like [`TickScheduler::tick_until`], but paced at one tick per millisecond so
    /// region and async threads get to make progress in between.
    pub fn tick_until(&self, mut done: impl FnMut() -> bool, max_ticks: u64) -> bool {
        for _ in 0..max_ticks {
            if done() {
                return true;
            }
            self.global.tick();
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        done()
    }
    pub fn region_threads(&self) -> usize {
        self.regions.lock().len()
    }
    fn spawn_region(key: RegionKey) -> Option<mpsc::Sender<Task>> {
        let (tx, rx) = mpsc::channel::<Task>();
        let spawned = std::thread::Builder::new()
            .name(format!("region {} {},{}", key.0, key.1, key.2))
            .spawn(move || {
                for task in rx {
                    task();
                }
            });
        match spawned {
            Ok(_) => Some(tx),
            Err(e) => {
                log::error!("unable to start thread for region {key:?}: {e}");
                None
            }
        }
    }
}
impl Default for RegionScheduler {
    fn default() -> Self {
        Self::new()
    }
}
impl Scheduler for RegionScheduler {
    fn run_later(&self, delay_ticks: u32, task: Task) -> TaskHandle {
        self.global.run_later(delay_ticks, task)
    }
    fn run_repeating(&self, delay_ticks: u32, period_ticks: u32, task: RepeatingTask) -> TaskHandle {
        self.global.run_repeating(delay_ticks, period_ticks, task)
    }
    fn run_async(&self, task: Task) -> TaskHandle {
        self.global.run_async(task)
    }
    fn run_on_region(&self, world: WorldId, chunk: ChunkPos, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        let (rx, rz) = chunk.region();
        let key = (world, rx, rz);
        let guarded = {
            let handle = handle.clone();
            Box::new(move || {
                if !handle.is_cancelled() {
                    task()
                }
            }) as Task
        };
        let sender = {
            let mut regions = self.regions.lock();
            if !regions.contains_key(&key) {
                if let Some(tx) = Self::spawn_region(key) {
                    regions.insert(key, tx);
                }
            }
            regions.get(&key).cloned()
        };
        match sender {
            Some(sender) => {
                if let Err(mpsc::SendError(task)) = sender.send(guarded) {
                    log::warn!("region {key:?} stopped accepting work, running on the global lane");
                    self.global.run_later(0, task);
                }
            }
            None => {
                self.global.run_later(0, guarded);
            }
        }
        handle
    }
    fn supports_regions(&self) -> bool {
        true
    }
}
impl std::fmt::Debug for RegionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionScheduler")
            .field("global", &self.global)
            .field("regions", &self.region_threads())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::CountDownLatch;
    use std::time::Duration;

    #[test]
    fn same_region_shares_a_thread() {
        let scheduler = RegionScheduler::new();
        let world = WorldId::random();
        let latch = Arc::new(CountDownLatch::new(3));
        let names = Arc::new(Mutex::new(vec![]));
        for chunk in [ChunkPos { x: 0, z: 0 }, ChunkPos { x: 31, z: 31 }, ChunkPos { x: 32, z: 0 }] {
            let (latch, names) = (latch.clone(), names.clone());
            scheduler.run_on_region(world, chunk, Box::new(move || {
                names.lock().push(std::thread::current().name().map(str::to_owned));
                latch.count_down();
            }));
        }
        assert!(latch.wait_timeout(Duration::from_secs(5)));
        assert_eq!(scheduler.region_threads(), 2);
        let names = names.lock();
        assert!(names.iter().all(|n| n.as_deref().map_or(false, |n| n.starts_with("region"))));
        assert!(scheduler.supports_regions());
        assert_eq!(ExecutionRegime::detect(&scheduler), ExecutionRegime::RegionParallel);
    }
}
