use crate::prelude::*;
use crate::classifier::ItemClassifier;
use crate::config::Settings;
use crate::host::Host;
use crate::scheduler::{ExecutionRegime, TaskHandle};
use parking_lot::Mutex;

/// Periodically strips restricted items out of every online player's inventory.
#[derive(Debug)]
pub struct InventorySweep {
    host: Host,
    classifier: Arc<ItemClassifier>,
    regime: ExecutionRegime,
    task: Mutex<Option<TaskHandle>>,
}
impl InventorySweep {
    pub fn new(host: Host, classifier: Arc<ItemClassifier>, regime: ExecutionRegime) -> Self {
        Self { host, classifier, regime, task: Mutex::new(None) }
    }

    /// (Re)starts the sweep for `settings`. Does nothing past stopping the old one
    /// unless clearing and destructive actions are both on.
    pub fn start(self: &Arc<Self>, settings: Arc<Settings>) {
        self.stop();
        if !(settings.clear_inventories && settings.enable_destructive_actions) {
            return;
        }
        let period = settings.sweep_period_ticks();
        let sweep = Arc::downgrade(self);
        let handle = self.host.scheduler.run_repeating(
            0,
            period,
            Box::new(move |handle| match sweep.upgrade() {
                Some(sweep) => sweep.sweep_all(&settings),
                None => handle.cancel(),
            }),
        );
        log::debug!("inventory sweep every {period} ticks");
        *self.task.lock() = Some(handle);
    }
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.cancel();
        }
    }
    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    fn sweep_all(self: &Arc<Self>, settings: &Arc<Settings>) {
        for player in self.host.inventories.online_players() {
            match self.regime {
                ExecutionRegime::SingleThreaded => {
                    self.sweep_player(player, settings);
                }
                ExecutionRegime::RegionParallel => {
                    let Some((world, pos)) = self.host.inventories.player_location(player) else { continue };
                    let (sweep, settings) = (self.clone(), settings.clone());
                    self.host.scheduler.run_on_region(
                        world,
                        pos.chunk(),
                        Box::new(move || {
                            sweep.sweep_player(player, &settings);
                        }),
                    );
                }
            }
        }
    }

    /// One pass over every online player on the calling thread. Returns how many
    /// items were removed.
    pub fn sweep_once(&self, settings: &Settings) -> usize {
        self.host.inventories.online_players().into_iter().map(|p| self.sweep_player(p, settings)).sum()
    }

    fn sweep_player(&self, player: PlayerId, settings: &Settings) -> usize {
        if let Some(mode) = self.host.inventories.game_mode(player) {
            if settings.is_exempt(&Actor { id: player, mode }) {
                return 0;
            }
        }
        let removed = self.host.inventories.retain_items(player, &mut |item| !self.classifier.is_restricted(item));
        if !removed.is_empty() && settings.log_inventory_removals {
            let names: Vec<&str> = removed.iter().map(|i| i.material.name()).collect();
            log::info!("removed {} restricted items from {player}: {}", removed.len(), names.join(", "));
        }
        removed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TickScheduler;
    use crate::world::Level;

    fn setup(settings: &Settings) -> (Arc<Level>, Arc<TickScheduler>, Arc<InventorySweep>) {
        let level = Arc::new(Level::new());
        let scheduler = Arc::new(TickScheduler::new());
        let host = Host::from_level(level.clone(), scheduler.clone());
        let classifier = Arc::new(ItemClassifier::new(settings));
        let sweep = Arc::new(InventorySweep::new(host, classifier, ExecutionRegime::SingleThreaded));
        (level, scheduler, sweep)
    }

    #[test]
    fn removes_only_restricted_items() {
        let settings = Settings::default();
        let (level, _scheduler, sweep) = setup(&settings);
        let player = level.join(WorldId::random(), V3(0, 64, 0));
        level.give(player, Item::new(Material::NETHERITE_PICKAXE));
        level.give(player, Item::new(Material::DIAMOND_PICKAXE));
        level.give(player, Item::new(Material::STONE).named("netherite_scrap, honest"));
        assert_eq!(sweep.sweep_once(&settings), 2);
        assert_eq!(level.inventory(player), vec![Item::new(Material::DIAMOND_PICKAXE)]);
    }

    #[test]
    fn runs_on_the_configured_period() {
        let settings = Settings { clear_inventories: true, delay: 2, multiplier: 5, ..Settings::default() };
        let (level, scheduler, sweep) = setup(&settings);
        let player = level.join(WorldId::random(), V3(0, 64, 0));
        sweep.start(Arc::new(settings));
        assert!(sweep.is_running());

        scheduler.tick();
        level.give(player, Item::new(Material::NETHERITE_INGOT));
        for _ in 0..9 {
            scheduler.tick();
        }
        assert_eq!(level.inventory(player).len(), 1);
        scheduler.tick();
        assert!(level.inventory(player).is_empty());

        sweep.stop();
        level.give(player, Item::new(Material::NETHERITE_INGOT));
        for _ in 0..20 {
            scheduler.tick();
        }
        assert_eq!(level.inventory(player).len(), 1);
    }

    #[test]
    fn needs_destructive_actions() {
        let settings = Settings { clear_inventories: true, enable_destructive_actions: false, ..Settings::default() };
        let (_level, _scheduler, sweep) = setup(&settings);
        sweep.start(Arc::new(settings));
        assert!(!sweep.is_running());
    }

    #[test]
    fn exempt_players_keep_their_items() {
        let settings = Settings { ignore_creative_spectator: true, ..Settings::default() };
        let (level, _scheduler, sweep) = setup(&settings);
        let player = level.join(WorldId::random(), V3(0, 64, 0));
        level.set_game_mode(player, GameMode::Creative);
        level.give(player, Item::new(Material::NETHERITE_SWORD));
        assert_eq!(sweep.sweep_once(&settings), 0);
    }
}
