//! The operator command surface: parsing, execution and tab completion.
use crate::prelude::*;
use crate::context::RuntimeContext;
use crate::host::Recipient;
use serde_yaml::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Bool,
    Int { min: i64 },
}

const ITEMS_PATH: &str = "detection.items";

/// Friendly names accepted by `get` and `set`, with the configuration path behind each.
const SETTINGS: &[(&str, &str, Kind)] = &[
    ("enable-destructive-actions", "global.enable-destructive-actions", Kind::Bool),
    ("delay", "timing.delay", Kind::Int { min: 1 }),
    ("multiplier", "timing.multiplier", Kind::Int { min: 1 }),
    ("clear", "inventory.clear", Kind::Bool),
    ("cancel-inventory-move", "inventory.cancel-move", Kind::Bool),
    ("cancel-craft", "interaction.cancel-craft", Kind::Bool),
    ("cancel-equip", "interaction.cancel-equip", Kind::Bool),
    ("cancel-attack", "interaction.cancel-attack", Kind::Bool),
    ("cancel-pickup", "item-handling.cancel-pickup", Kind::Bool),
    ("remove-dropped", "item-handling.remove-dropped", Kind::Bool),
    ("replace-ancient-debris", "ancient-debris.replace-when-mined", Kind::Bool),
    ("replace-on-chunk-load", "ancient-debris.replace-on-chunk-load", Kind::Bool),
    ("only-replace-generated-chunks", "ancient-debris.only-replace-generated-chunks", Kind::Bool),
    ("ensure-chunks-loaded", "ancient-debris.ensure-chunks-loaded", Kind::Bool),
    ("save-replaced-locations", "ancient-debris.save-replaced-locations", Kind::Bool),
    ("notify-player", "ancient-debris.notify-player", Kind::Bool),
    ("restore-debris-on-disable", "performance.restore-debris-on-disable", Kind::Bool),
    ("restore-debris-on-config-change", "performance.restore-debris-on-config-change", Kind::Bool),
    ("max-replacements-per-chunk", "performance.max-replacements-per-chunk", Kind::Int { min: -1 }),
    ("max-locations-per-world", "advanced.max-locations-per-world", Kind::Int { min: -1 }),
    ("command-cooldown-seconds", "advanced.command-cooldown-seconds", Kind::Int { min: 0 }),
    ("log-debris-replacements", "advanced.log-debris-replacements", Kind::Bool),
    ("log-inventory-removals", "advanced.log-inventory-removals", Kind::Bool),
    ("ignore-creative-spectator", "advanced.ignore-creative-spectator", Kind::Bool),
    ("detection.use-name-matching", "detection.use-name-matching", Kind::Bool),
];

/// Accepts a friendly name or a full configuration path.
fn setting(name: &str) -> Result<(&'static str, Kind)> {
    SETTINGS
        .iter()
        .find(|(friendly, path, _)| name.eq_ignore_ascii_case(friendly) || name.eq_ignore_ascii_case(path))
        .map(|(_, path, kind)| (*path, *kind))
        .ok_or_else(|| Error::UnknownSetting(name.to_owned()))
}

fn parse_value(path: &'static str, kind: Kind, raw: &str) -> Result<Value> {
    match kind {
        Kind::Bool if raw.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
        Kind::Bool if raw.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
        Kind::Bool => Err(Error::InvalidValue { setting: path.to_owned(), value: raw.to_owned(), reason: "must be true or false" }),
        Kind::Int { min } => match raw.parse::<i64>() {
            Ok(n) if n >= min => Ok(Value::from(n)),
            Ok(_) => Err(Error::InvalidValue {
                setting: path.to_owned(),
                value: raw.to_owned(),
                reason: match min {
                    1 => "must be at least 1",
                    0 => "must not be negative",
                    _ => "must be -1 (unlimited) or more",
                },
            }),
            Err(_) => Err(Error::InvalidValue { setting: path.to_owned(), value: raw.to_owned(), reason: "must be a whole number" }),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Reload,
    Restore { world: Option<String> },
    DebrisInfo,
    Get { setting: String },
    Set { setting: String, value: String },
    Items { add: bool, item: String },
    Progress { opt_out: bool },
}
impl Command {
    /// Parses the words after the command name. Bad input comes back as the usage line to show.
    pub fn parse(args: &[&str]) -> Result<Self, Message> {
        let Some(sub) = args.first() else { return Ok(Command::Help) };
        Ok(match (sub.to_ascii_lowercase().as_str(), &args[1..]) {
            ("reload", _) => Command::Reload,
            ("restore-debris", rest) => Command::Restore { world: rest.first().map(|w| w.to_string()) },
            ("debris-info", _) => Command::DebrisInfo,
            ("get", [setting, ..]) => Command::Get { setting: setting.to_string() },
            ("get", []) => return Err(Message::error("Usage: /netherguard get <setting>")),
            ("set", [items, action, item, ..]) if items.eq_ignore_ascii_case(ITEMS_PATH) => {
                match action.to_ascii_lowercase().as_str() {
                    "add" => Command::Items { add: true, item: item.to_ascii_uppercase() },
                    "remove" => Command::Items { add: false, item: item.to_ascii_uppercase() },
                    other => return Err(Message::error(format!("Invalid action: {other}. Use 'add' or 'remove'."))),
                }
            }
            ("set", [items, ..]) if items.eq_ignore_ascii_case(ITEMS_PATH) => {
                return Err(Message::error("Usage: /netherguard set detection.items <add|remove> <item>"))
            }
            ("set", [setting, value, ..]) => Command::Set { setting: setting.to_string(), value: value.to_string() },
            ("set", _) => return Err(Message::error("Usage: /netherguard set <setting> <value>")),
            ("progress", [choice, ..]) if choice.eq_ignore_ascii_case("opt-out") => Command::Progress { opt_out: true },
            ("progress", [choice, ..]) if choice.eq_ignore_ascii_case("opt-in") => Command::Progress { opt_out: false },
            ("progress", _) => return Err(Message::error("Usage: /netherguard progress <opt-out|opt-in>")),
            _ => Command::Help,
        })
    }
}

fn help() -> Vec<Message> {
    let line = |text: &str| Message::new(text, Color::Yellow);
    let detail = |text: &str| Message::new(text, Color::Gray);
    vec![
        Message::new("NetherGuard Commands:", Color::Gold),
        line("/netherguard reload - Reload the configuration"),
        line("/netherguard restore-debris [world] - Restore all replaced Ancient Debris"),
        detail("  - Optional world parameter to restore only in a specific world"),
        detail("  - Only restores blocks that are still Netherrack"),
        line("/netherguard debris-info - Show information about stored Ancient Debris locations"),
        line("/netherguard get <setting> - Get a configuration value"),
        line("/netherguard set <setting> <value> - Set a configuration value"),
        line("/netherguard set detection.items <add|remove> <item> - Edit the restricted item list"),
        line("/netherguard progress <opt-out|opt-in> - Toggle restoration progress messages"),
        Message::new("Available settings:", Color::Gold),
        detail(&format!("  {}", SETTINGS.iter().map(|(name, ..)| *name).collect::<Vec<_>>().join(", "))),
    ]
}

impl RuntimeContext {
    /// Runs `command` for `sender` (`None` is the console). Always produces at least
    /// one message for the sender.
    pub fn execute(&self, sender: Option<PlayerId>, command: Command) -> Vec<Message> {
        let result = match command {
            Command::Help => Ok(help()),
            Command::Reload => self.reload().map(|()| vec![Message::success("NetherGuard configuration reloaded.")]),
            Command::Restore { world } => self.restore_command(sender, world.as_deref()),
            Command::DebrisInfo => Ok(self.debris_info()),
            Command::Get { setting } => self.get_command(&setting),
            Command::Set { setting, value } => self.set_command(&setting, &value),
            Command::Items { add, item } => self.items_command(add, item),
            Command::Progress { opt_out } => Ok(match sender {
                Some(player) => {
                    self.reporter().set_opt_out(player, opt_out);
                    vec![Message::success(if opt_out {
                        "You will no longer receive restoration progress messages."
                    } else {
                        "You will receive restoration progress messages again."
                    })]
                }
                None => vec![Message::error("Only players can change their progress messages.")],
            }),
        };
        result.unwrap_or_else(|e| {
            log::debug!("command failed: {e}");
            vec![Message::error(e.to_string())]
        })
    }

    /// Runs `command` and delivers the replies through the host.
    pub fn dispatch_command(&self, sender: Option<PlayerId>, command: Command) {
        for message in self.execute(sender, command) {
            self.host().messenger.notify(Recipient::from(sender), &message);
        }
    }

    fn restore_command(&self, sender: Option<PlayerId>, world: Option<&str>) -> Result<Vec<Message>> {
        if let Err(left) = self.begin_cooldown() {
            return Ok(vec![Message::error(format!(
                "Please wait {}s before using this command again.",
                left.as_secs().max(1)
            ))]);
        }
        let mut replies = vec![];
        let total = self.ledger().count_all();
        if !self.settings().replaces_debris() {
            if total == 0 {
                return Ok(vec![Message::notice(
                    "Ancient Debris replacement is disabled and there are no stored locations to restore.",
                )]);
            }
            replies.push(Message::notice(format!(
                "Ancient Debris replacement is disabled but there are still {total} stored locations. Proceeding with restoration..."
            )));
        }
        let scope = match world {
            Some(name) => match self.host().world.world_by_name(name) {
                Some(id) => Some(id),
                None => return Ok(vec![Message::error(format!("World not found: {name}"))]),
            },
            None => None,
        };
        let count = scope.map_or(total, |id| self.ledger().count_in_scope(id));
        if count == 0 {
            replies.push(Message::notice(match world {
                Some(name) => format!("No Ancient Debris locations to restore in world {name}."),
                None => "No Ancient Debris locations to restore.".to_owned(),
            }));
            return Ok(replies);
        }
        replies.push(Message::notice(match world {
            Some(name) => format!("Restoring {count} Ancient Debris in world {name}..."),
            None => format!("Restoring {count} replaced Ancient Debris..."),
        }));
        if let Some(session) = self.restore(sender, scope)? {
            log::info!("restoration {} started by {:?}", session.id(), Recipient::from(sender));
        }
        Ok(replies)
    }

    fn debris_info(&self) -> Vec<Message> {
        let total = self.ledger().count_all();
        if total == 0 {
            return vec![Message::notice("No Ancient Debris locations are currently stored.")];
        }
        let mut lines = vec![
            Message::success("Ancient Debris Information:"),
            Message::new(format!("Total stored locations: {total}"), Color::White),
        ];
        let world = &self.host().world;
        for id in self.ledger().worlds() {
            let name = world.world_name(id).unwrap_or_else(|| id.to_string());
            lines.push(Message::new(format!("- {name}: {} locations", self.ledger().count_in_scope(id)), Color::White));
        }
        let settings = self.settings();
        lines.push(Message::success("Current config:"));
        for (label, on) in [
            ("Replace when mined", settings.replace_when_mined),
            ("Replace on chunk load", settings.replace_on_chunk_load),
        ] {
            let color = if on { Color::Red } else { Color::Green };
            lines.push(Message::new(format!("- {label}: {}", if on { "Enabled" } else { "Disabled" }), color));
        }
        lines
    }

    fn get_command(&self, name: &str) -> Result<Vec<Message>> {
        if name.eq_ignore_ascii_case(ITEMS_PATH) {
            let mut items: Vec<String> = self.settings().items.clone();
            items.sort();
            let mut lines = vec![Message::new("Restricted items:", Color::Gold)];
            lines.extend(items.into_iter().map(|i| Message::new(format!("- {i}"), Color::Yellow)));
            return Ok(lines);
        }
        let (path, _) = setting(name)?;
        let shown = match self.config_value(path) {
            Some(Value::Bool(b)) => b.to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => format!("{other:?}"),
            None => "not set".to_owned(),
        };
        Ok(vec![Message::new(format!("{name} = "), Color::Yellow).then(shown, Color::Gold)])
    }

    fn set_command(&self, name: &str, raw: &str) -> Result<Vec<Message>> {
        let (path, kind) = setting(name)?;
        let value = parse_value(path, kind, raw)?;
        self.update_config(path, value)?;
        Ok(vec![Message::success(format!("Set {name} to {raw}"))])
    }

    fn items_command(&self, add: bool, item: String) -> Result<Vec<Message>> {
        let mut items = self.settings().items.clone();
        let present = items.iter().any(|i| i.eq_ignore_ascii_case(&item));
        let reply = match (add, present) {
            (true, true) => return Ok(vec![Message::notice(format!("{item} is already in the restricted items list."))]),
            (false, false) => return Ok(vec![Message::notice(format!("{item} is not in the restricted items list."))]),
            (true, false) => {
                items.push(item.clone());
                format!("Added {item} to the restricted items list.")
            }
            (false, true) => {
                items.retain(|i| !i.eq_ignore_ascii_case(&item));
                format!("Removed {item} from the restricted items list.")
            }
        };
        self.update_config(ITEMS_PATH, Value::Sequence(items.into_iter().map(Value::String).collect()))?;
        Ok(vec![Message::success(reply)])
    }

    /// Suggestions for the word being typed, given the words so far.
    pub fn complete(&self, args: &[&str]) -> Vec<String> {
        let candidates: Vec<String> = match args {
            [_] => ["reload", "restore-debris", "debris-info", "get", "set", "progress", "help"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            [sub, _] if sub.eq_ignore_ascii_case("get") || sub.eq_ignore_ascii_case("set") => SETTINGS
                .iter()
                .map(|(_, path, _)| path.to_string())
                .chain([ITEMS_PATH.to_owned()])
                .collect(),
            [sub, _] if sub.eq_ignore_ascii_case("restore-debris") => {
                let world = &self.host().world;
                world.worlds().into_iter().filter_map(|id| world.world_name(id)).collect()
            }
            [sub, _] if sub.eq_ignore_ascii_case("progress") => vec!["opt-out".into(), "opt-in".into()],
            [sub, name, _] if sub.eq_ignore_ascii_case("set") => {
                if name.eq_ignore_ascii_case(ITEMS_PATH) {
                    vec!["add".into(), "remove".into()]
                } else {
                    match setting(name) {
                        Ok((_, Kind::Bool)) => vec!["true".into(), "false".into()],
                        Ok((path, Kind::Int { .. })) => suggested_numbers(path).iter().map(|n| n.to_string()).collect(),
                        Err(_) => vec![],
                    }
                }
            }
            [sub, items, action, _]
                if sub.eq_ignore_ascii_case("set") && items.eq_ignore_ascii_case(ITEMS_PATH) =>
            {
                if action.eq_ignore_ascii_case("remove") {
                    self.settings().items.clone()
                } else {
                    Material::ALL.iter().filter(|m| !m.is_block()).map(|m| m.name().to_owned()).collect()
                }
            }
            _ => vec![],
        };
        let typed = args.last().map(|s| s.to_ascii_lowercase()).unwrap_or_default();
        candidates.into_iter().filter(|c| c.to_ascii_lowercase().starts_with(&typed)).collect()
    }
}

fn suggested_numbers(path: &str) -> &'static [i64] {
    match path {
        "timing.delay" | "advanced.command-cooldown-seconds" => &[1, 5, 10],
        "timing.multiplier" => &[10, 20, 40],
        "performance.max-replacements-per-chunk" => &[25, 50, 100],
        "advanced.max-locations-per-world" => &[5000, 10000, 20000],
        _ => &[],
    }
}
