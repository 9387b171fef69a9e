use super::{ProgressReporter, RestorationSession};
use crate::prelude::*;
use crate::config::ConfigStore;
use crate::guard::{PROTECTED, SUBSTITUTE};
use crate::host::Host;
use crate::ledger::LocationLedger;
use crate::scheduler::{CountDownLatch, ExecutionRegime};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

/// Units reverted per tick on a single simulation thread.
pub const BATCH_SIZE: usize = 50;
/// How long the region path waits for every region to report back.
pub const REGION_TIMEOUT: time::Duration = time::Duration::from_secs(5 * 60);

type Unit = (WorldId, BlockPos);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Reverted,
    /// Something else replaced the substitute since; left alone.
    Changed,
    /// The chunk couldn't be loaded or read. Dropped from the ledger all the same.
    Unreachable,
    /// The world isn't loaded at all. Stays in the ledger for a later run.
    WorldMissing,
}
impl Outcome {
    fn settled(self) -> bool {
        self != Outcome::WorldMissing
    }
}

/// Work shared between the units of one run and its finish step.
#[derive(Default)]
struct Tally {
    settled: Vec<Unit>,
}

/// Puts converted blocks back, a bounded amount at a time, without ever
/// clobbering a block that changed in the meantime.
#[derive(Debug)]
pub struct RestorationEngine {
    host: Host,
    ledger: Arc<LocationLedger>,
    config: Arc<ConfigStore>,
    reporter: Arc<ProgressReporter>,
    regime: ExecutionRegime,
    /// Set once the owner starts tearing down; runs still finishing then skip their save.
    shutting_down: Arc<AtomicBool>,
}
impl RestorationEngine {
    pub fn new(
        host: Host,
        ledger: Arc<LocationLedger>,
        config: Arc<ConfigStore>,
        reporter: Arc<ProgressReporter>,
        regime: ExecutionRegime,
        shutting_down: Arc<AtomicBool>,
    ) -> Self {
        Self { host, ledger, config, reporter, regime, shutting_down }
    }
    pub fn regime(&self) -> ExecutionRegime {
        self.regime
    }

    /// Starts restoring every ledgered location in `scope`. Returns `None` when there
    /// is nothing to do.
    pub fn schedule_restore(
        self: &Arc<Self>,
        initiator: Option<PlayerId>,
        scope: Option<WorldId>,
    ) -> Option<Arc<RestorationSession>> {
        let units = self.ledger.enumerate(scope);
        if units.is_empty() {
            return None;
        }
        let chunks: HashSet<(WorldId, ChunkPos)> = units.iter().map(|(w, p)| (*w, p.chunk())).collect();
        let session = Arc::new(RestorationSession::new(initiator, scope, units.len(), chunks.len()));
        self.reporter.register(session.clone());
        log::info!(
            "restoring {} debris locations across {} chunks ({:?})",
            units.len(),
            chunks.len(),
            self.regime
        );
        match self.regime {
            ExecutionRegime::SingleThreaded => self.run_batched(session.clone(), units),
            ExecutionRegime::RegionParallel => self.run_regions(session.clone(), units),
        }
        Some(session)
    }

    fn run_batched(self: &Arc<Self>, session: Arc<RestorationSession>, units: Vec<Unit>) {
        let engine = self.clone();
        let mut pending = units.into_iter();
        let mut tally = Tally::default();
        let ensure_loaded = self.config.get().ensure_chunks_loaded;
        self.host.scheduler.run_repeating(
            1,
            1,
            Box::new(move |handle| {
                for (world, pos) in pending.by_ref().take(BATCH_SIZE) {
                    let outcome = engine.restore_unit(world, pos, ensure_loaded);
                    session.record(outcome == Outcome::Reverted);
                    if outcome.settled() {
                        tally.settled.push((world, pos));
                    }
                }
                if pending.len() == 0 {
                    handle.cancel();
                    engine.finish(&session, core::mem::take(&mut tally));
                }
            }),
        );
    }

    fn run_regions(self: &Arc<Self>, session: Arc<RestorationSession>, units: Vec<Unit>) {
        let latch = Arc::new(CountDownLatch::new(units.len()));
        let tally = Arc::new(Mutex::new(Tally::default()));
        let ensure_loaded = self.config.get().ensure_chunks_loaded;
        for (world, pos) in units {
            let (engine, session, latch, tally) = (self.clone(), session.clone(), latch.clone(), tally.clone());
            self.host.scheduler.run_on_region(
                world,
                pos.chunk(),
                Box::new(move || {
                    let outcome = engine.restore_unit(world, pos, ensure_loaded);
                    session.record(outcome == Outcome::Reverted);
                    if outcome.settled() {
                        tally.lock().settled.push((world, pos));
                    }
                    latch.count_down();
                }),
            );
        }
        let engine = self.clone();
        self.host.scheduler.run_async(Box::new(move || {
            if !latch.wait_timeout(REGION_TIMEOUT) {
                log::warn!(
                    "restoration {} timed out with {} of {} locations outstanding",
                    session.id(),
                    latch.remaining(),
                    session.total()
                );
            }
            let coordinator = engine.clone();
            engine.host.scheduler.run_later(
                0,
                Box::new(move || {
                    let tally = core::mem::take(&mut *tally.lock());
                    coordinator.finish(&session, tally);
                }),
            );
        }));
    }

    fn finish(&self, session: &RestorationSession, tally: Tally) {
        let removed = self.ledger.remove_all(&tally.settled);
        log::debug!("restoration {} cleared {removed} ledger entries", session.id());
        if removed > 0 && !self.shutting_down.load(Ordering::Acquire) {
            self.ledger.persist_async(&*self.host.scheduler);
        }
        self.reporter.complete(session.id(), session.restored());
    }

    /// Restores everything in `scope` on the calling thread, for when the scheduler is
    /// no longer running. Returns how many blocks were reverted.
    pub fn restore_now(&self, scope: Option<WorldId>) -> usize {
        let ensure_loaded = self.config.get().ensure_chunks_loaded;
        let mut settled = vec![];
        let mut reverted = 0;
        for (world, pos) in self.ledger.enumerate(scope) {
            let outcome = self.restore_unit(world, pos, ensure_loaded);
            reverted += (outcome == Outcome::Reverted) as usize;
            if outcome.settled() {
                settled.push((world, pos));
            }
        }
        self.ledger.remove_all(&settled);
        log::info!("restored {reverted} debris blocks");
        reverted
    }

    fn restore_unit(&self, world: WorldId, pos: BlockPos, ensure_loaded: bool) -> Outcome {
        let access = &self.host.world;
        if access.dimension(world).is_none() {
            log::warn!("skipping {pos}: world {world} is not loaded");
            return Outcome::WorldMissing;
        }
        let chunk = pos.chunk();
        if !access.is_chunk_loaded(world, chunk) {
            let loaded = ensure_loaded && access.is_chunk_generated(world, chunk) && access.load_chunk(world, chunk);
            if !loaded {
                log::debug!("skipping {pos}: chunk {},{} is not loaded", chunk.x, chunk.z);
                return Outcome::Unreachable;
            }
        }
        let result = match access.block(world, pos) {
            Ok(SUBSTITUTE) => access.set_block(world, pos, PROTECTED).map(|()| Outcome::Reverted),
            Ok(_) => Ok(Outcome::Changed),
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            log::warn!("could not restore debris at {pos}: {e}");
            Outcome::Unreachable
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::host::{Recipient, WorldAccess};
    use crate::scheduler::{RegionScheduler, Scheduler, TickScheduler};
    use crate::world::Level;

    struct Fixture {
        level: Arc<Level>,
        ledger: Arc<LocationLedger>,
        engine: Arc<RestorationEngine>,
        reporter: Arc<ProgressReporter>,
        shutting_down: Arc<AtomicBool>,
        nether: WorldId,
        _dir: tempfile::TempDir,
    }
    fn fixture(scheduler: Arc<dyn Scheduler>, settings: Settings) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let level = Arc::new(Level::new());
        let nether = level.create_world("world_nether", Dimension::Nether);
        let host = Host::from_level(level.clone(), scheduler);
        let regime = ExecutionRegime::detect(&*host.scheduler);
        let ledger = Arc::new(LocationLedger::new(dir.path().join("debris.yml"), -1));
        let reporter = Arc::new(ProgressReporter::new(host.messenger.clone()));
        let shutting_down = Arc::new(AtomicBool::new(false));
        let engine = Arc::new(RestorationEngine::new(
            host,
            ledger.clone(),
            Arc::new(ConfigStore::new(settings)),
            reporter.clone(),
            regime,
            shutting_down.clone(),
        ));
        Fixture { level, ledger, engine, reporter, shutting_down, nether, _dir: dir }
    }
    /// Converted debris at `count` spots spread over a few chunks.
    fn plant(f: &Fixture, count: i32) -> Vec<BlockPos> {
        for cx in 0..4 {
            f.level.generate_chunk(f.nether, ChunkPos { x: cx, z: 0 }, Material::NETHERRACK, 100).unwrap();
        }
        let spots: Vec<BlockPos> = (0..count).map(|i| V3(i % 64, 20 + i / 64, 5)).collect();
        for pos in &spots {
            assert!(f.ledger.add(f.nether, *pos));
        }
        spots
    }

    #[test]
    fn batches_fifty_units_per_tick() {
        let scheduler = Arc::new(TickScheduler::new());
        let f = fixture(scheduler.clone(), Settings::default());
        let spots = plant(&f, 120);
        let session = f.engine.schedule_restore(None, None).unwrap();
        assert_eq!(session.total(), 120);
        assert_eq!(session.scheduled_regions(), 4);

        scheduler.tick();
        assert_eq!(session.completed(), 50);
        scheduler.tick();
        assert_eq!(session.completed(), 100);
        scheduler.tick();
        assert_eq!(session.completed(), 120);
        assert!(session.is_completed());

        for pos in spots {
            assert_eq!(f.level.block(f.nether, pos).unwrap(), PROTECTED);
        }
        assert_eq!(f.ledger.count_all(), 0);
        assert_eq!(f.reporter.active(), 0);
        let console = f.level.messages_for(Recipient::Console);
        assert_eq!(console.last().unwrap().to_string(), "Restoration complete! Restored 120 Ancient Debris blocks in 0s.");
    }

    #[test]
    fn changed_blocks_are_left_alone() {
        let scheduler = Arc::new(TickScheduler::new());
        let f = fixture(scheduler.clone(), Settings::default());
        let spots = plant(&f, 3);
        f.level.set_block(f.nether, spots[1], Material::OBSIDIAN).unwrap();

        let session = f.engine.schedule_restore(None, Some(f.nether)).unwrap();
        assert!(scheduler.tick_until(|| session.is_completed(), 10));
        assert_eq!(f.level.block(f.nether, spots[1]).unwrap(), Material::OBSIDIAN);
        assert_eq!(f.level.block(f.nether, spots[0]).unwrap(), PROTECTED);
        assert_eq!(session.completed(), session.total());
        assert_eq!(session.restored(), 2);
        assert!(!f.ledger.contains(f.nether, spots[1]));
    }

    #[test]
    fn unreachable_chunks_are_counted_and_dropped() {
        let scheduler = Arc::new(TickScheduler::new());
        let f = fixture(scheduler.clone(), Settings { ensure_chunks_loaded: false, ..Settings::default() });
        let spots = plant(&f, 2);
        f.level.unload_chunk(f.nether, spots[0].chunk());
        // never generated, so never loadable
        let ghost = V3(5_000, 20, 5_000);
        f.ledger.add(f.nether, ghost);

        let session = f.engine.schedule_restore(None, None).unwrap();
        assert!(scheduler.tick_until(|| session.is_completed(), 10));
        assert_eq!(session.completed(), 3);
        assert_eq!(session.restored(), 0);
        assert_eq!(f.ledger.count_all(), 0);
        assert!(f.engine.schedule_restore(None, None).is_none());
    }

    #[test]
    fn missing_worlds_stay_ledgered() {
        let scheduler = Arc::new(TickScheduler::new());
        let f = fixture(scheduler.clone(), Settings::default());
        let spots = plant(&f, 1);
        let elsewhere = WorldId::random();
        f.ledger.add(elsewhere, V3(1, 20, 1));

        let session = f.engine.schedule_restore(None, None).unwrap();
        assert!(scheduler.tick_until(|| session.is_completed(), 10));
        assert_eq!(session.completed(), 2);
        assert_eq!(session.restored(), 1);
        assert!(!f.ledger.contains(f.nether, spots[0]));
        assert!(f.ledger.contains(elsewhere, V3(1, 20, 1)));
        assert_eq!(f.engine.restore_now(None), 0);
        assert!(f.ledger.contains(elsewhere, V3(1, 20, 1)));
    }

    #[test]
    fn runs_finishing_after_shutdown_do_not_save() {
        let scheduler = Arc::new(TickScheduler::new());
        let f = fixture(scheduler.clone(), Settings::default());
        plant(&f, 3);
        let session = f.engine.schedule_restore(None, None).unwrap();
        f.shutting_down.store(true, Ordering::Release);
        assert!(scheduler.tick_until(|| session.is_completed(), 10));
        assert_eq!(f.ledger.count_all(), 0);
        assert!(!f.ledger.is_saving());
        assert!(!f.ledger.path().exists());
    }

    #[test]
    fn force_loads_generated_chunks() {
        let scheduler = Arc::new(TickScheduler::new());
        let f = fixture(scheduler.clone(), Settings::default());
        let spots = plant(&f, 1);
        f.level.unload_chunk(f.nether, spots[0].chunk());
        let session = f.engine.schedule_restore(None, None).unwrap();
        assert!(scheduler.tick_until(|| session.is_completed(), 10));
        assert_eq!(session.restored(), 1);
        assert_eq!(f.ledger.count_all(), 0);
    }

    #[test]
    fn nothing_to_restore() {
        let f = fixture(Arc::new(TickScheduler::new()), Settings::default());
        assert!(f.engine.schedule_restore(None, None).is_none());
        plant(&f, 1);
        assert!(f.engine.schedule_restore(None, Some(WorldId::random())).is_none());
    }

    #[test]
    fn restore_now_runs_inline() {
        let f = fixture(Arc::new(TickScheduler::new()), Settings::default());
        let spots = plant(&f, 70);
        assert_eq!(f.engine.restore_now(None), 70);
        assert_eq!(f.level.block(f.nether, spots[69]).unwrap(), PROTECTED);
        assert_eq!(f.ledger.count_all(), 0);
    }

    #[test]
    fn region_threads_restore_in_parallel() {
        let scheduler = Arc::new(RegionScheduler::new());
        let f = fixture(scheduler.clone(), Settings::default());
        assert_eq!(f.engine.regime(), ExecutionRegime::RegionParallel);
        let mut spots = plant(&f, 40);
        // a second region
        f.level.generate_chunk(f.nether, ChunkPos { x: 40, z: 0 }, Material::NETHERRACK, 100).unwrap();
        spots.push(V3(40 * 16, 30, 3));
        f.ledger.add(f.nether, spots[40]);

        let session = f.engine.schedule_restore(None, None).unwrap();
        assert!(scheduler.tick_until(|| session.is_completed(), 2_000));
        assert_eq!(session.restored(), 41);
        assert!(scheduler.region_threads() >= 2);
        for pos in spots {
            assert_eq!(f.level.block(f.nether, pos).unwrap(), PROTECTED);
        }
        assert_eq!(f.ledger.count_all(), 0);
    }
}
