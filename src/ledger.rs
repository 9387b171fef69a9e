//! Where debris was converted, so it can be put back.
//!
//! Entries are grouped per world in insertion order with a set beside each list for
//! membership. The whole ledger is flushed to a YAML map of world id to `"x,y,z"`
//! strings; loading skips anything it can't read rather than failing.
use crate::prelude::*;
use crate::scheduler::Scheduler;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

pub const STORAGE_FILE: &str = "debris_storage.yml";

#[derive(Debug, Default)]
struct WorldEntries {
    order: Vec<BlockPos>,
    index: HashSet<BlockPos>,
    warned_full: bool,
}

#[derive(Debug)]
pub struct LocationLedger {
    worlds: DashMap<WorldId, WorldEntries>,
    capacity: AtomicI64,
    path: PathBuf,
    persist_enabled: AtomicBool,
    saving: AtomicBool,
    dirty: AtomicBool,
    /// Held while the file is written so overlapping saves never share the temp file.
    writing: Mutex<()>,
}
impl LocationLedger {
    /// `capacity` is per world; `-1` is unlimited.
    pub fn new(path: impl AsRef<Path>, capacity: i64) -> Self {
        Self {
            worlds: DashMap::new(),
            capacity: AtomicI64::new(capacity),
            path: path.as_ref().to_owned(),
            persist_enabled: AtomicBool::new(true),
            saving: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
            writing: Mutex::new(()),
        }
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    pub fn set_capacity(&self, capacity: i64) {
        self.capacity.store(capacity, Ordering::Relaxed);
    }
    pub fn set_persistence(&self, enabled: bool) {
        self.persist_enabled.store(enabled, Ordering::Relaxed);
    }

    /// False if the location is already recorded or the world is full.
    pub fn add(&self, world: WorldId, pos: BlockPos) -> bool {
        let capacity = self.capacity.load(Ordering::Relaxed);
        let mut entries = self.worlds.entry(world).or_default();
        if entries.index.contains(&pos) {
            return false;
        }
        if capacity >= 0 && entries.order.len() as i64 >= capacity {
            if !entries.warned_full {
                entries.warned_full = true;
                log::warn!("debris ledger for world {world} is full ({capacity} locations), not recording more");
            }
            return false;
        }
        entries.index.insert(pos);
        entries.order.push(pos);
        true
    }
    pub fn contains(&self, world: WorldId, pos: BlockPos) -> bool {
        self.worlds.get(&world).map_or(false, |e| e.index.contains(&pos))
    }
    pub fn remove(&self, world: WorldId, pos: BlockPos) -> bool {
        let Some(mut entries) = self.worlds.get_mut(&world) else { return false };
        if !entries.index.remove(&pos) {
            return false;
        }
        entries.order.retain(|p| *p != pos);
        entries.warned_full = false;
        true
    }
    pub fn remove_all(&self, locations: &[(WorldId, BlockPos)]) -> usize {
        let mut by_world: HashMap<WorldId, HashSet<BlockPos>> = HashMap::new();
        for (world, pos) in locations {
            by_world.entry(*world).or_default().insert(*pos);
        }
        let mut removed = 0;
        for (world, positions) in by_world {
            let Some(mut entries) = self.worlds.get_mut(&world) else { continue };
            let before = entries.order.len();
            entries.order.retain(|p| !positions.contains(p));
            let WorldEntries { order, index, warned_full } = &mut *entries;
            index.retain(|p| !positions.contains(p));
            *warned_full = false;
            removed += before - order.len();
        }
        removed
    }
    pub fn count_all(&self) -> usize {
        self.worlds.iter().map(|e| e.order.len()).sum()
    }
    pub fn count_in_scope(&self, world: WorldId) -> usize {
        self.worlds.get(&world).map_or(0, |e| e.order.len())
    }
    pub fn worlds(&self) -> Vec<WorldId> {
        self.worlds.iter().filter(|e| !e.order.is_empty()).map(|e| *e.key()).collect()
    }
    /// Entries in insertion order per world, every world when `scope` is `None`.
    pub fn enumerate(&self, scope: Option<WorldId>) -> Vec<(WorldId, BlockPos)> {
        match scope {
            Some(world) => self
                .worlds
                .get(&world)
                .map(|e| e.order.iter().map(|p| (world, *p)).collect())
                .unwrap_or_default(),
            None => self
                .worlds
                .iter()
                .flat_map(|e| {
                    let world = *e.key();
                    e.order.iter().map(|p| (world, *p)).collect::<Vec<_>>()
                })
                .collect(),
        }
    }

    fn snapshot(&self) -> BTreeMap<String, Vec<String>> {
        self.worlds
            .iter()
            .filter(|e| !e.order.is_empty())
            .map(|e| (e.key().to_string(), e.order.iter().map(|p| p.to_string()).collect()))
            .collect()
    }
    /// Writes the ledger out now. The snapshot is taken per world, so concurrent adds
    /// either make it into this file or the next one.
    pub fn persist(&self) -> Result<()> {
        if !self.persist_enabled.load(Ordering::Relaxed) {
            return Ok(());
        }
        let _writing = self.writing.lock();
        let yaml = serde_yaml::to_string(&self.snapshot())?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("yml.tmp");
        std::fs::write(&tmp, yaml)?;
        std::fs::rename(&tmp, &self.path)?;
        log::trace!("saved {} debris locations to {}", self.count_all(), self.path.display());
        Ok(())
    }
    /// Queues a save on the async lane. Requests arriving while one is running
    /// collapse into a single follow-up save.
    pub fn persist_async(self: &Arc<Self>, scheduler: &dyn Scheduler) {
        self.dirty.store(true, Ordering::Release);
        if self.saving.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return;
        }
        let ledger = self.clone();
        scheduler.run_async(Box::new(move || loop {
            while ledger.dirty.swap(false, Ordering::AcqRel) {
                if let Err(e) = ledger.persist() {
                    log::error!("could not save {}: {e}", ledger.path.display());
                }
            }
            ledger.saving.store(false, Ordering::Release);
            // someone may have asked between the last check and clearing the flag
            if !ledger.dirty.load(Ordering::Acquire)
                || ledger.saving.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err()
            {
                break;
            }
        }));
    }
    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::Acquire)
    }

    /// Replaces the in-memory ledger with the file's contents, creating an empty file
    /// if there is none. Returns how many locations were read.
    pub fn load(&self) -> Result<usize> {
        if !self.path.exists() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&self.path, "")?;
            self.worlds.clear();
            return Ok(0);
        }
        let text = std::fs::read_to_string(&self.path)?;
        let root: Value = serde_yaml::from_str(&text)?;
        self.worlds.clear();
        let map = match root {
            Value::Null => return Ok(0),
            Value::Mapping(map) => map,
            other => {
                log::warn!("{} should map world ids to locations, found {other:?}", self.path.display());
                return Ok(0);
            }
        };
        let mut loaded = 0;
        for (key, locations) in map {
            let world = match key.as_str().map(str::parse::<WorldId>) {
                Some(Ok(world)) => world,
                _ => {
                    log::warn!("skipping debris entries under invalid world id {key:?}");
                    continue;
                }
            };
            let Value::Sequence(locations) = locations else {
                log::warn!("skipping world {world}: locations should be a list");
                continue;
            };
            let mut entries = self.worlds.entry(world).or_default();
            for location in locations {
                let parsed = match &location {
                    Value::String(s) => s.parse::<BlockPos>(),
                    other => Err(Error::InvalidLocation(format!("{other:?}"))),
                };
                match parsed {
                    Ok(pos) => {
                        if entries.index.insert(pos) {
                            entries.order.push(pos);
                            loaded += 1;
                        }
                    }
                    Err(e) => log::warn!("skipping debris entry in world {world}: {e}"),
                }
            }
        }
        log::info!("loaded {loaded} debris locations from {}", self.path.display());
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TickScheduler;

    fn ledger(capacity: i64) -> (tempfile::TempDir, LocationLedger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LocationLedger::new(dir.path().join(STORAGE_FILE), capacity);
        (dir, ledger)
    }

    #[test]
    fn add_is_idempotent() {
        let (_dir, ledger) = ledger(-1);
        let world = WorldId::random();
        assert!(ledger.add(world, V3(1, 2, 3)));
        assert!(!ledger.add(world, V3(1, 2, 3)));
        assert_eq!(ledger.count_in_scope(world), 1);
        assert!(ledger.contains(world, V3(1, 2, 3)));
        assert!(!ledger.contains(WorldId::random(), V3(1, 2, 3)));
    }

    #[test]
    fn capacity_rejects_new_locations() {
        let (_dir, ledger) = ledger(2);
        let (world, other) = (WorldId::random(), WorldId::random());
        assert!(ledger.add(world, V3(0, 0, 0)));
        assert!(ledger.add(world, V3(0, 0, 1)));
        assert!(!ledger.add(world, V3(0, 0, 2)));
        assert_eq!(ledger.count_in_scope(world), 2);
        // the oldest entries stay
        assert!(ledger.contains(world, V3(0, 0, 0)));
        // the limit is per world
        assert!(ledger.add(other, V3(0, 0, 2)));
        assert!(ledger.remove(world, V3(0, 0, 0)));
        assert!(ledger.add(world, V3(0, 0, 2)));
    }

    #[test]
    fn enumerate_respects_scope_and_order() {
        let (_dir, ledger) = ledger(-1);
        let (a, b) = (WorldId::random(), WorldId::random());
        for z in 0..3 {
            ledger.add(a, V3(0, 0, z));
        }
        ledger.add(b, V3(9, 9, 9));
        assert_eq!(ledger.enumerate(Some(a)), vec![(a, V3(0, 0, 0)), (a, V3(0, 0, 1)), (a, V3(0, 0, 2))]);
        assert_eq!(ledger.enumerate(None).len(), 4);
        assert_eq!(ledger.count_all(), 4);
        assert_eq!(ledger.remove_all(&[(a, V3(0, 0, 1)), (b, V3(9, 9, 9)), (b, V3(1, 1, 1))]), 2);
        assert_eq!(ledger.enumerate(None), vec![(a, V3(0, 0, 0)), (a, V3(0, 0, 2))]);
        assert!(!ledger.contains(a, V3(0, 0, 1)));
        assert_eq!(ledger.worlds(), vec![a]);
    }

    #[test]
    fn persist_then_load() {
        let (_dir, ledger) = ledger(-1);
        let world = WorldId::random();
        ledger.add(world, V3(-5, 12, 40));
        ledger.add(world, V3(7, 8, 9));
        ledger.persist().unwrap();

        let reloaded = LocationLedger::new(ledger.path(), -1);
        assert_eq!(reloaded.load().unwrap(), 2);
        assert_eq!(reloaded.enumerate(Some(world)), ledger.enumerate(Some(world)));
    }

    #[test]
    fn load_skips_malformed_entries() {
        let (_dir, ledger) = ledger(-1);
        let world = WorldId::random();
        std::fs::write(
            ledger.path(),
            format!("not-a-uuid:\n  - 1,2,3\n{world}:\n  - 1,2,3\n  - 1,2\n  - x,y,z\n  - 4,5,6\n  - 1,2,3\n  - 17\n"),
        )
        .unwrap();
        assert_eq!(ledger.load().unwrap(), 2);
        assert_eq!(ledger.enumerate(None), vec![(world, V3(1, 2, 3)), (world, V3(4, 5, 6))]);
    }

    #[test]
    fn load_creates_missing_file() {
        let (_dir, ledger) = ledger(-1);
        assert_eq!(ledger.load().unwrap(), 0);
        assert!(ledger.path().exists());
        assert_eq!(ledger.load().unwrap(), 0);
    }

    #[test]
    fn disabled_persistence_writes_nothing() {
        let (_dir, ledger) = ledger(-1);
        ledger.set_persistence(false);
        ledger.add(WorldId::random(), V3(1, 1, 1));
        ledger.persist().unwrap();
        assert!(!ledger.path().exists());
    }

    #[test]
    fn async_saves_collapse() {
        let (_dir, ledger) = ledger(-1);
        let ledger = Arc::new(ledger);
        let scheduler = TickScheduler::new();
        let world = WorldId::random();
        for x in 0..20 {
            ledger.add(world, V3(x, 0, 0));
            ledger.persist_async(&scheduler);
        }
        let deadline = time::Instant::now() + time::Duration::from_secs(5);
        while ledger.is_saving() && time::Instant::now() < deadline {
            std::thread::sleep(time::Duration::from_millis(5));
        }
        let reloaded = LocationLedger::new(ledger.path(), -1);
        assert_eq!(reloaded.load().unwrap(), 20);
    }
}
