//! Everything one enabled instance owns, built once at startup and handed around
//! instead of living in globals.
use crate::prelude::*;
use crate::classifier::ItemClassifier;
use crate::config::{ConfigProvider, ConfigStore, Settings, YamlConfig};
use crate::guard::ConversionGuard;
use crate::host::Host;
use crate::ledger::{LocationLedger, STORAGE_FILE};
use crate::listeners::Listeners;
use crate::restoration::{ProgressReporter, RestorationEngine, RestorationSession};
use crate::scheduler::ExecutionRegime;
use crate::sweep::InventorySweep;
use parking_lot::Mutex;
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

pub const CONFIG_FILE: &str = "config.yml";

pub struct RuntimeContext {
    host: Host,
    data_dir: PathBuf,
    regime: ExecutionRegime,
    provider: Mutex<Box<dyn ConfigProvider>>,
    settings: Arc<ConfigStore>,
    classifier: Arc<ItemClassifier>,
    ledger: Arc<LocationLedger>,
    guard: Arc<ConversionGuard>,
    engine: Arc<RestorationEngine>,
    reporter: Arc<ProgressReporter>,
    sweep: Arc<InventorySweep>,
    listeners: Mutex<Option<Listeners>>,
    shutting_down: Arc<AtomicBool>,
    last_restore: Mutex<Option<time::Instant>>,
}

impl RuntimeContext {
    /// Starts up against `data_dir`, creating it and its files as needed.
    pub fn enable(host: Host, data_dir: impl AsRef<Path>) -> Result<Arc<Self>> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let provider = YamlConfig::open(data_dir.join(CONFIG_FILE));
        Ok(Self::with_provider(host, data_dir, Box::new(provider)))
    }

    pub fn with_provider(host: Host, data_dir: &Path, mut provider: Box<dyn ConfigProvider>) -> Arc<Self> {
        let regime = ExecutionRegime::detect(&*host.scheduler);
        let settings = Settings::from_provider(&mut *provider);
        let classifier = Arc::new(ItemClassifier::new(&settings));

        let ledger = Arc::new(LocationLedger::new(data_dir.join(STORAGE_FILE), settings.max_locations_per_world));
        ledger.set_persistence(settings.save_replaced_locations);
        if let Err(e) = ledger.load() {
            log::error!("could not load {}: {e}; starting with an empty ledger", ledger.path().display());
        }

        let store = Arc::new(ConfigStore::new(settings));
        let guard = Arc::new(ConversionGuard::new(host.clone(), ledger.clone(), store.clone()));
        let reporter = Arc::new(ProgressReporter::new(host.messenger.clone()));
        let shutting_down = Arc::new(AtomicBool::new(false));
        let engine = Arc::new(RestorationEngine::new(
            host.clone(),
            ledger.clone(),
            store.clone(),
            reporter.clone(),
            regime,
            shutting_down.clone(),
        ));
        let sweep = Arc::new(InventorySweep::new(host.clone(), classifier.clone(), regime));

        let context = Arc::new(Self {
            host,
            data_dir: data_dir.to_owned(),
            regime,
            provider: Mutex::new(provider),
            settings: store,
            classifier,
            ledger,
            guard,
            engine,
            reporter,
            sweep,
            listeners: Mutex::new(None),
            shutting_down,
            last_restore: Mutex::new(None),
        });
        context.reporter.start(&*context.host.scheduler);
        context.install(&context.settings.get());
        log::info!(
            "enabled with {} ledgered debris locations in {}",
            context.ledger.count_all(),
            context.data_dir.display()
        );
        context
    }

    /// Points every settings-driven piece at `settings`.
    fn install(&self, settings: &Arc<Settings>) {
        self.classifier.reload(settings);
        self.ledger.set_capacity(settings.max_locations_per_world);
        self.ledger.set_persistence(settings.save_replaced_locations);

        let mut listeners = self.listeners.lock();
        if let Some(old) = listeners.take() {
            old.unregister();
        }
        *listeners = Some(Listeners::register(
            self.host.events.clone(),
            self.guard.clone(),
            self.classifier.clone(),
            settings.clone(),
            self.host.messenger.clone(),
        ));
        self.sweep.start(settings.clone());
    }

    fn check_running(&self) -> Result<()> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(Error::ShuttingDown);
        }
        Ok(())
    }

    /// Re-reads the configuration file and applies it.
    pub fn reload(&self) -> Result<()> {
        self.check_running()?;
        let settings = {
            let mut provider = self.provider.lock();
            if let Err(e) = provider.reload_from_disk() {
                log::error!("could not re-read configuration, keeping what is loaded: {e}");
            }
            Settings::from_provider(&mut **provider)
        };
        self.apply(settings);
        log::info!("configuration reloaded");
        Ok(())
    }

    fn apply(&self, settings: Settings) {
        let previous = self.settings.replace(settings);
        let current = self.settings.get();
        self.install(&current);
        if current.restore_on_config_change && previous.replaces_debris() && !current.replaces_debris() {
            log::info!("debris replacement switched off, restoring converted blocks");
            self.engine.schedule_restore(None, None);
        }
    }

    /// Writes one configuration value, saves the file and applies the result.
    pub fn update_config(&self, path: &str, value: Value) -> Result<()> {
        self.check_running()?;
        let settings = {
            let mut provider = self.provider.lock();
            provider.set(path, value);
            provider.save()?;
            Settings::from_provider(&mut **provider)
        };
        self.apply(settings);
        Ok(())
    }
    pub fn config_value(&self, path: &str) -> Option<Value> {
        self.provider.lock().get(path)
    }

    pub fn restore(&self, initiator: Option<PlayerId>, scope: Option<WorldId>) -> Result<Option<Arc<RestorationSession>>> {
        self.check_running()?;
        Ok(self.engine.schedule_restore(initiator, scope))
    }

    /// Starts the restore cooldown, or says how much of it is left.
    pub fn begin_cooldown(&self) -> Result<(), time::Duration> {
        let cooldown = time::Duration::from_secs(self.settings.get().command_cooldown_seconds as u64);
        let mut last = self.last_restore.lock();
        let now = time::Instant::now();
        if let Some(at) = *last {
            let since = now.saturating_duration_since(at);
            if since < cooldown {
                return Err(cooldown - since);
            }
        }
        *last = Some(now);
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        self.check_running()?;
        self.ledger.persist()
    }

    /// Tears everything down. Only the first call does anything.
    pub fn disable(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.sweep.stop();
        self.reporter.stop();
        if let Some(listeners) = self.listeners.lock().take() {
            listeners.unregister();
        }
        if self.settings.get().restore_on_disable {
            self.engine.restore_now(None);
        }
        if let Err(e) = self.ledger.persist() {
            log::error!("could not save debris ledger on shutdown: {e}");
        }
        log::info!("disabled");
    }
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    pub fn host(&self) -> &Host {
        &self.host
    }
    pub fn regime(&self) -> ExecutionRegime {
        self.regime
    }
    pub fn settings(&self) -> Arc<Settings> {
        self.settings.get()
    }
    pub fn classifier(&self) -> &Arc<ItemClassifier> {
        &self.classifier
    }
    pub fn ledger(&self) -> &Arc<LocationLedger> {
        &self.ledger
    }
    pub fn guard(&self) -> &Arc<ConversionGuard> {
        &self.guard
    }
    pub fn engine(&self) -> &Arc<RestorationEngine> {
        &self.engine
    }
    pub fn reporter(&self) -> &Arc<ProgressReporter> {
        &self.reporter
    }
    pub fn sweep(&self) -> &Arc<InventorySweep> {
        &self.sweep
    }
}
impl std::fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("data_dir", &self.data_dir)
            .field("regime", &self.regime)
            .field("ledgered", &self.ledger.count_all())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::host::WorldAccess;
    use crate::scheduler::TickScheduler;
    use crate::world::Level;

    fn enable(dir: &Path) -> (Arc<Level>, Arc<TickScheduler>, Arc<RuntimeContext>) {
        let level = Arc::new(Level::new());
        let scheduler = Arc::new(TickScheduler::new());
        let host = Host::from_level(level.clone(), scheduler.clone());
        let context = RuntimeContext::enable(host, dir).unwrap();
        (level, scheduler, context)
    }

    #[test]
    fn enable_writes_default_files() {
        let dir = tempfile::tempdir().unwrap();
        let (_level, _scheduler, context) = enable(dir.path());
        assert!(dir.path().join(CONFIG_FILE).exists());
        assert!(dir.path().join(STORAGE_FILE).exists());
        assert_eq!(*context.settings(), Settings::default());
        assert_eq!(context.regime(), ExecutionRegime::SingleThreaded);
        assert_eq!(context.host().events.handler_count(EventKind::BlockDamage), 1);
        assert!(context.reporter().is_running());
        assert!(!context.sweep().is_running());
    }

    #[test]
    fn update_config_reregisters_listeners() {
        let dir = tempfile::tempdir().unwrap();
        let (_level, _scheduler, context) = enable(dir.path());
        context.update_config("interaction.cancel-craft", Value::Bool(false)).unwrap();
        assert!(!context.settings().cancel_craft);
        assert_eq!(context.host().events.handler_count(EventKind::Craft), 0);
        // no duplicates after several rounds
        context.reload().unwrap();
        context.reload().unwrap();
        assert_eq!(context.host().events.handler_count(EventKind::BlockDamage), 1);
        // and the file on disk agrees
        let text = std::fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap();
        assert!(text.contains("cancel-craft: false"));
    }

    #[test]
    fn switching_replacement_off_can_restore() {
        let dir = tempfile::tempdir().unwrap();
        let (level, scheduler, context) = enable(dir.path());
        context.update_config("performance.restore-debris-on-config-change", Value::Bool(true)).unwrap();
        let nether = level.create_world("world_nether", Dimension::Nether);
        level.generate_chunk(nether, ChunkPos { x: 0, z: 0 }, Material::NETHERRACK, 64).unwrap();
        context.ledger().add(nether, V3(1, 10, 1));

        context.update_config("ancient-debris.replace-when-mined", Value::Bool(false)).unwrap();
        assert_eq!(context.reporter().active(), 0);
        context.update_config("ancient-debris.replace-on-chunk-load", Value::Bool(false)).unwrap();
        assert_eq!(context.reporter().active(), 1);
        assert!(scheduler.tick_until(|| context.reporter().active() == 0, 10));
        assert_eq!(level.block(nether, V3(1, 10, 1)).unwrap(), Material::ANCIENT_DEBRIS);
    }

    #[test]
    fn disable_persists_and_refuses_further_work() {
        let dir = tempfile::tempdir().unwrap();
        let (_level, _scheduler, context) = enable(dir.path());
        let world = WorldId::random();
        context.ledger().add(world, V3(4, 5, 6));
        context.disable();
        context.disable();
        assert!(matches!(context.reload(), Err(Error::ShuttingDown)));
        assert!(matches!(context.save(), Err(Error::ShuttingDown)));
        assert!(matches!(context.restore(None, None), Err(Error::ShuttingDown)));
        assert_eq!(context.host().events.handler_count(EventKind::BlockDamage), 0);

        let ledger = LocationLedger::new(dir.path().join(STORAGE_FILE), -1);
        assert_eq!(ledger.load().unwrap(), 1);
    }

    #[test]
    fn restore_on_disable_runs_inline() {
        let dir = tempfile::tempdir().unwrap();
        let (level, _scheduler, context) = enable(dir.path());
        context.update_config("performance.restore-debris-on-disable", Value::Bool(true)).unwrap();
        let nether = level.create_world("world_nether", Dimension::Nether);
        level.generate_chunk(nether, ChunkPos { x: 0, z: 0 }, Material::NETHERRACK, 64).unwrap();
        context.ledger().add(nether, V3(2, 12, 2));
        context.disable();
        assert_eq!(level.block(nether, V3(2, 12, 2)).unwrap(), Material::ANCIENT_DEBRIS);
        assert_eq!(context.ledger().count_all(), 0);
    }

    #[test]
    fn restore_finishing_after_disable_leaves_the_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let (level, scheduler, context) = enable(dir.path());
        let nether = level.create_world("world_nether", Dimension::Nether);
        level.generate_chunk(nether, ChunkPos { x: 0, z: 0 }, Material::NETHERRACK, 64).unwrap();
        context.ledger().add(nether, V3(3, 12, 3));
        let session = context.restore(None, None).unwrap().unwrap();
        context.disable();

        // the host keeps ticking after teardown
        assert!(scheduler.tick_until(|| session.is_completed(), 10));
        assert_eq!(level.block(nether, V3(3, 12, 3)).unwrap(), Material::ANCIENT_DEBRIS);
        assert_eq!(context.ledger().count_all(), 0);
        assert!(!context.ledger().is_saving());
        let on_disk = LocationLedger::new(dir.path().join(STORAGE_FILE), -1);
        assert_eq!(on_disk.load().unwrap(), 1);
    }

    #[test]
    fn cooldown_blocks_rapid_restores() {
        let dir = tempfile::tempdir().unwrap();
        let (_level, _scheduler, context) = enable(dir.path());
        assert!(context.begin_cooldown().is_ok());
        assert!(context.begin_cooldown().is_err());
        context.update_config("advanced.command-cooldown-seconds", Value::from(0i64)).unwrap();
        assert!(context.begin_cooldown().is_ok());
    }
}
