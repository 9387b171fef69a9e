//! Configuration: a YAML file addressed by dotted paths, and the immutable
//! [`Settings`] snapshot every component reads.
use crate::prelude::*;
use parking_lot::RwLock;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG: &str = include_str!("../config.yml");

pub const DEFAULT_ITEMS: &[&str] = &[
    "NETHERITE_SWORD",
    "NETHERITE_PICKAXE",
    "NETHERITE_AXE",
    "NETHERITE_SHOVEL",
    "NETHERITE_HOE",
    "NETHERITE_HELMET",
    "NETHERITE_CHESTPLATE",
    "NETHERITE_LEGGINGS",
    "NETHERITE_BOOTS",
    "NETHERITE_BLOCK",
    "NETHERITE_INGOT",
    "NETHERITE_SCRAP",
];

pub trait ConfigProvider: Send {
    fn get(&self, path: &str) -> Option<Value>;
    fn set(&mut self, path: &str, value: Value);
    fn save(&self) -> Result<()>;
    fn reload_from_disk(&mut self) -> Result<()>;

    fn get_bool(&self, path: &str, default: bool) -> bool {
        match self.get(path) {
            None => default,
            Some(Value::Bool(b)) => b,
            Some(other) => {
                log::warn!("{path} should be true or false, found {other:?}; using {default}");
                default
            }
        }
    }
    fn get_int(&self, path: &str, default: i64) -> i64 {
        match self.get(path) {
            None => default,
            Some(Value::Number(n)) if n.is_i64() => n.as_i64().unwrap_or(default),
            Some(other) => {
                log::warn!("{path} should be a whole number, found {other:?}; using {default}");
                default
            }
        }
    }
    fn get_string_list(&self, path: &str, default: &[&str]) -> Vec<String> {
        match self.get(path) {
            None => default.iter().map(|s| s.to_string()).collect(),
            Some(Value::Sequence(items)) => items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    other => {
                        log::warn!("ignoring non-text entry {other:?} in {path}");
                        None
                    }
                })
                .collect(),
            Some(other) => {
                log::warn!("{path} should be a list, found {other:?}");
                default.iter().map(|s| s.to_string()).collect()
            }
        }
    }
}

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |node, key| node.as_mapping()?.get(key))
}
fn insert(root: &mut Value, path: &str, value: Value) {
    let mut keys = path.split('.').peekable();
    let mut node = root;
    while let Some(key) = keys.next() {
        if !node.is_mapping() {
            *node = Value::Mapping(Mapping::new());
        }
        let Value::Mapping(map) = node else { unreachable!() };
        let key = Value::String(key.to_owned());
        if keys.peek().is_none() {
            map.insert(key, value);
            return;
        }
        node = map.entry(key).or_insert(Value::Mapping(Mapping::new()));
    }
}

/// `config.yml` in the data directory. A missing file is written from the bundled defaults.
#[derive(Debug)]
pub struct YamlConfig {
    path: Option<PathBuf>,
    root: Value,
}
impl YamlConfig {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_owned();
        let mut config = Self { path: Some(path.clone()), root: Value::Null };
        if !path.exists() {
            if let Err(e) = std::fs::write(&path, DEFAULT_CONFIG) {
                log::error!("could not write default config to {}: {e}", path.display());
            }
        }
        if let Err(e) = config.reload_from_disk() {
            log::error!("could not read {}: {e}; using defaults", path.display());
            config.root = serde_yaml::from_str(DEFAULT_CONFIG).unwrap_or(Value::Null);
        }
        config
    }
    /// A config that lives only in memory.
    pub fn in_memory(yaml: &str) -> Result<Self> {
        Ok(Self { path: None, root: serde_yaml::from_str(yaml)? })
    }
}
impl ConfigProvider for YamlConfig {
    fn get(&self, path: &str) -> Option<Value> {
        lookup(&self.root, path).cloned()
    }
    fn set(&mut self, path: &str, value: Value) {
        insert(&mut self.root, path, value)
    }
    fn save(&self) -> Result<()> {
        if let Some(path) = &self.path {
            std::fs::write(path, serde_yaml::to_string(&self.root)?)?;
        }
        Ok(())
    }
    fn reload_from_disk(&mut self) -> Result<()> {
        if let Some(path) = &self.path {
            let text = std::fs::read_to_string(path)?;
            self.root = match serde_yaml::from_str(&text)? {
                Value::Null => Value::Mapping(Mapping::new()),
                root => root,
            };
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub enable_destructive_actions: bool,
    pub delay: i64,
    pub multiplier: i64,

    pub clear_inventories: bool,
    pub cancel_inventory_move: bool,
    pub cancel_craft: bool,
    pub cancel_equip: bool,
    pub cancel_attack: bool,
    pub cancel_pickup: bool,
    pub remove_dropped: bool,

    pub use_name_matching: bool,
    pub items: Vec<String>,

    pub replace_when_mined: bool,
    pub replace_on_chunk_load: bool,
    pub only_replace_generated_chunks: bool,
    pub ensure_chunks_loaded: bool,
    pub save_replaced_locations: bool,
    pub notify_player: bool,

    pub restore_on_disable: bool,
    pub restore_on_config_change: bool,
    /// `-1` is unlimited.
    pub max_replacements_per_chunk: i64,

    /// `-1` is unlimited.
    pub max_locations_per_world: i64,
    pub command_cooldown_seconds: i64,
    pub log_debris_replacements: bool,
    pub log_inventory_removals: bool,
    pub ignore_creative_spectator: bool,
}
impl Default for Settings {
    fn default() -> Self {
        Self {
            enable_destructive_actions: true,
            delay: 1,
            multiplier: 20,
            clear_inventories: false,
            cancel_inventory_move: true,
            cancel_craft: true,
            cancel_equip: true,
            cancel_attack: true,
            cancel_pickup: true,
            remove_dropped: true,
            use_name_matching: true,
            items: DEFAULT_ITEMS.iter().map(|s| s.to_string()).collect(),
            replace_when_mined: true,
            replace_on_chunk_load: true,
            only_replace_generated_chunks: true,
            ensure_chunks_loaded: true,
            save_replaced_locations: true,
            notify_player: true,
            restore_on_disable: false,
            restore_on_config_change: false,
            max_replacements_per_chunk: 50,
            max_locations_per_world: 10000,
            command_cooldown_seconds: 10,
            log_debris_replacements: true,
            log_inventory_removals: true,
            ignore_creative_spectator: false,
        }
    }
}
impl Settings {
    /// Reads every key with a fallback. An empty item list is replaced by the
    /// defaults and written back.
    pub fn from_provider(config: &mut dyn ConfigProvider) -> Self {
        let d = Settings::default();
        let mut items = config.get_string_list("detection.items", &[]);
        if items.is_empty() {
            items = d.items.clone();
            config.set("detection.items", Value::Sequence(items.iter().cloned().map(Value::String).collect()));
            if let Err(e) = config.save() {
                log::error!("could not save default item list: {e}");
            }
        }
        let positive = |path: &str, value: i64, default: i64| {
            if value < 1 {
                log::warn!("{path} must be at least 1, using {default}");
                default
            } else {
                value
            }
        };
        let limit = |path: &str, value: i64, default: i64| {
            if value < -1 {
                log::warn!("{path} must be -1 (unlimited) or more, using {default}");
                default
            } else {
                value
            }
        };
        Self {
            enable_destructive_actions: config.get_bool("global.enable-destructive-actions", d.enable_destructive_actions),
            delay: positive("timing.delay", config.get_int("timing.delay", d.delay), d.delay),
            multiplier: positive("timing.multiplier", config.get_int("timing.multiplier", d.multiplier), d.multiplier),
            clear_inventories: config.get_bool("inventory.clear", d.clear_inventories),
            cancel_inventory_move: config.get_bool("inventory.cancel-move", d.cancel_inventory_move),
            cancel_craft: config.get_bool("interaction.cancel-craft", d.cancel_craft),
            cancel_equip: config.get_bool("interaction.cancel-equip", d.cancel_equip),
            cancel_attack: config.get_bool("interaction.cancel-attack", d.cancel_attack),
            cancel_pickup: config.get_bool("item-handling.cancel-pickup", d.cancel_pickup),
            remove_dropped: config.get_bool("item-handling.remove-dropped", d.remove_dropped),
            use_name_matching: config.get_bool("detection.use-name-matching", d.use_name_matching),
            items,
            replace_when_mined: config.get_bool("ancient-debris.replace-when-mined", d.replace_when_mined),
            replace_on_chunk_load: config.get_bool("ancient-debris.replace-on-chunk-load", d.replace_on_chunk_load),
            only_replace_generated_chunks: config
                .get_bool("ancient-debris.only-replace-generated-chunks", d.only_replace_generated_chunks),
            ensure_chunks_loaded: config.get_bool("ancient-debris.ensure-chunks-loaded", d.ensure_chunks_loaded),
            save_replaced_locations: config.get_bool("ancient-debris.save-replaced-locations", d.save_replaced_locations),
            notify_player: config.get_bool("ancient-debris.notify-player", d.notify_player),
            restore_on_disable: config.get_bool("performance.restore-debris-on-disable", d.restore_on_disable),
            restore_on_config_change: config
                .get_bool("performance.restore-debris-on-config-change", d.restore_on_config_change),
            max_replacements_per_chunk: limit(
                "performance.max-replacements-per-chunk",
                config.get_int("performance.max-replacements-per-chunk", d.max_replacements_per_chunk),
                d.max_replacements_per_chunk,
            ),
            max_locations_per_world: limit(
                "advanced.max-locations-per-world",
                config.get_int("advanced.max-locations-per-world", d.max_locations_per_world),
                d.max_locations_per_world,
            ),
            command_cooldown_seconds: config
                .get_int("advanced.command-cooldown-seconds", d.command_cooldown_seconds)
                .max(0),
            log_debris_replacements: config.get_bool("advanced.log-debris-replacements", d.log_debris_replacements),
            log_inventory_removals: config.get_bool("advanced.log-inventory-removals", d.log_inventory_removals),
            ignore_creative_spectator: config
                .get_bool("advanced.ignore-creative-spectator", d.ignore_creative_spectator),
        }
    }
    pub fn sweep_period_ticks(&self) -> u32 {
        self.delay.saturating_mul(self.multiplier).clamp(1, u32::MAX as i64) as u32
    }
    pub fn replaces_debris(&self) -> bool {
        self.replace_when_mined || self.replace_on_chunk_load
    }
    pub fn is_exempt(&self, actor: &Actor) -> bool {
        self.ignore_creative_spectator && matches!(actor.mode, GameMode::Creative | GameMode::Spectator)
    }
}

/// The current [`Settings`], replaced wholesale on reload. Readers keep whichever
/// snapshot they grabbed.
#[derive(Debug, Default)]
pub struct ConfigStore {
    current: RwLock<Arc<Settings>>,
}
impl ConfigStore {
    pub fn new(settings: Settings) -> Self {
        Self { current: RwLock::new(Arc::new(settings)) }
    }
    pub fn get(&self) -> Arc<Settings> {
        self.current.read().clone()
    }
    /// Installs `settings`, handing back the snapshot it replaced.
    pub fn replace(&self, settings: Settings) -> Arc<Settings> {
        core::mem::replace(&mut *self.current.write(), Arc::new(settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_defaults_match_fallbacks() {
        let mut config = YamlConfig::in_memory(DEFAULT_CONFIG).unwrap();
        assert_eq!(Settings::from_provider(&mut config), Settings::default());
    }

    #[test]
    fn bad_values_fall_back() {
        let mut config = YamlConfig::in_memory(
            "timing:\n  delay: 0\n  multiplier: lots\nperformance:\n  max-replacements-per-chunk: -7\ndetection:\n  items: []\n",
        )
        .unwrap();
        let settings = Settings::from_provider(&mut config);
        assert_eq!(settings.delay, 1);
        assert_eq!(settings.multiplier, 20);
        assert_eq!(settings.max_replacements_per_chunk, 50);
        assert_eq!(settings.items.len(), DEFAULT_ITEMS.len());
        // the empty list was replaced in the provider as well
        assert_eq!(config.get_string_list("detection.items", &[]).len(), DEFAULT_ITEMS.len());
    }

    #[test]
    fn set_creates_intermediate_sections() {
        let mut config = YamlConfig::in_memory("{}").unwrap();
        config.set("advanced.max-locations-per-world", Value::from(2i64));
        assert_eq!(config.get_int("advanced.max-locations-per-world", 0), 2);
        assert!(!config.get_bool("advanced.missing", false));
    }

    #[test]
    fn open_writes_defaults_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        let mut config = YamlConfig::open(&path);
        assert!(path.exists());
        config.set("inventory.clear", Value::Bool(true));
        config.save().unwrap();

        let reopened = YamlConfig::open(&path);
        assert!(reopened.get_bool("inventory.clear", false));
    }

    #[test]
    fn sweep_period_saturates() {
        let huge = Settings { delay: i64::MAX / 2, multiplier: 20, ..Settings::default() };
        assert_eq!(huge.sweep_period_ticks(), u32::MAX);
        let max = Settings { delay: i64::MAX, multiplier: i64::MAX, ..Settings::default() };
        assert_eq!(max.sweep_period_ticks(), u32::MAX);
        assert_eq!(Settings { delay: 2, multiplier: 5, ..Settings::default() }.sweep_period_ticks(), 10);
    }

    #[test]
    fn store_swaps_whole_snapshots() {
        let store = ConfigStore::new(Settings::default());
        let before = store.get();
        let old = store.replace(Settings { max_locations_per_world: 2, ..Settings::default() });
        assert!(Arc::ptr_eq(&before, &old));
        assert_eq!(before.max_locations_per_world, 10000);
        assert_eq!(store.get().max_locations_per_world, 2);
    }
}
