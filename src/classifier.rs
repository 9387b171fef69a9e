use crate::prelude::*;
use crate::config::Settings;
use parking_lot::RwLock;
use std::collections::HashSet;

/// Every material whose identifier contains this counts when name matching is on.
pub const MARKER: &str = "NETHERITE";

#[derive(Debug, Default)]
struct Rules {
    names: HashSet<String>,
    materials: HashSet<Material>,
    use_name_matching: bool,
}
impl Rules {
    fn build(settings: &Settings) -> Self {
        let mut names: HashSet<String> = settings
            .items
            .iter()
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        let mut materials: HashSet<Material> = names.iter().filter_map(|n| Material::from_name(n)).collect();
        if settings.use_name_matching {
            for m in Material::ALL.iter().filter(|m| m.name().contains(MARKER)) {
                materials.insert(*m);
                names.insert(m.name().to_owned());
            }
        }
        Self { names, materials, use_name_matching: settings.use_name_matching }
    }
}

/// Decides what counts as a restricted item. Rules are rebuilt off to the side on
/// reload and swapped in whole.
#[derive(Debug)]
pub struct ItemClassifier {
    rules: RwLock<Arc<Rules>>,
}
impl ItemClassifier {
    pub fn new(settings: &Settings) -> Self {
        Self { rules: RwLock::new(Arc::new(Rules::build(settings))) }
    }
    pub fn reload(&self, settings: &Settings) {
        let rules = Arc::new(Rules::build(settings));
        log::debug!("{} restricted materials, {} restricted names", rules.materials.len(), rules.names.len());
        *self.rules.write() = rules;
    }
    fn rules(&self) -> Arc<Rules> {
        self.rules.read().clone()
    }
    pub fn is_restricted(&self, item: &Item) -> bool {
        let rules = self.rules();
        if rules.materials.contains(&item.material) {
            return true;
        }
        if !rules.use_name_matching {
            return false;
        }
        let material = item.material.name();
        if rules.names.iter().any(|n| material.contains(n.as_str())) {
            return true;
        }
        match item.display_name() {
            Some(display) => {
                let display = display.to_uppercase();
                rules.names.iter().any(|n| display.contains(n.as_str()))
            }
            None => false,
        }
    }
    pub fn is_restricted_material(&self, material: Material) -> bool {
        self.is_restricted(&Item::new(material))
    }
    pub fn restricted_names(&self) -> HashSet<String> {
        self.rules().names.clone()
    }
    pub fn restricted_materials(&self) -> HashSet<Material> {
        self.rules().materials.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(items: &[&str], use_name_matching: bool) -> Settings {
        Settings {
            items: items.iter().map(|s| s.to_string()).collect(),
            use_name_matching,
            ..Settings::default()
        }
    }

    #[test]
    fn explicit_list_without_name_matching() {
        let classifier = ItemClassifier::new(&settings(&["NETHERITE_SWORD"], false));
        assert!(classifier.is_restricted(&Item::new(Material::NETHERITE_SWORD)));
        assert!(!classifier.is_restricted(&Item::new(Material::NETHERITE_AXE)));
        assert!(!classifier.is_restricted(&Item::new(Material::DIAMOND_SWORD).named("NETHERITE_SWORD")));
    }

    #[test]
    fn name_matching_sweeps_every_marked_material() {
        let classifier = ItemClassifier::new(&settings(&[], true));
        for m in Material::ALL {
            assert_eq!(classifier.is_restricted_material(*m), m.name().contains(MARKER), "{m}");
        }
        assert!(classifier.restricted_names().contains("NETHERITE_UPGRADE_SMITHING_TEMPLATE"));
    }

    #[test]
    fn unknown_names_still_match_by_substring() {
        let classifier = ItemClassifier::new(&settings(&["diamond_sword", "NOT_A_MATERIAL"], true));
        assert!(classifier.is_restricted_material(Material::DIAMOND_SWORD));
        assert!(!classifier.restricted_materials().iter().any(|m| m.name() == "NOT_A_MATERIAL"));
        assert!(classifier.restricted_names().contains("NOT_A_MATERIAL"));
        let renamed = Item::new(Material::IRON_SWORD).named("my not_a_material blade");
        assert!(classifier.is_restricted(&renamed));
        assert!(!classifier.is_restricted(&Item::new(Material::IRON_SWORD).named("plain")));
    }

    #[test]
    fn reload_with_same_settings_is_idempotent() {
        let settings = Settings::default();
        let classifier = ItemClassifier::new(&settings);
        let items: Vec<Item> = Material::ALL
            .iter()
            .map(|m| Item::new(*m))
            .chain([Item::new(Material::STONE).named("Netherite-ish rock")])
            .collect();
        let before: Vec<bool> = items.iter().map(|i| classifier.is_restricted(i)).collect();
        let names = classifier.restricted_names();
        classifier.reload(&settings);
        classifier.reload(&settings);
        let after: Vec<bool> = items.iter().map(|i| classifier.is_restricted(i)).collect();
        assert_eq!(before, after);
        assert_eq!(names, classifier.restricted_names());
    }

    #[test]
    fn reload_swaps_rules() {
        let classifier = ItemClassifier::new(&settings(&["NETHERITE_SWORD"], false));
        classifier.reload(&settings(&["ELYTRA"], false));
        assert!(!classifier.is_restricted_material(Material::NETHERITE_SWORD));
        assert!(classifier.is_restricted_material(Material::ELYTRA));
    }
}
