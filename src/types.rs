use crate::prelude::*;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct V3<T> {
    pub x: T,
    pub y: T,
    pub z: T,
}
#[allow(non_snake_case)]
pub const fn V3<T>(x: T, y: T, z: T) -> V3<T> {
    V3 { x, y, z }
}
pub type BlockPos = V3<i32>;

impl BlockPos {
    pub fn chunk(&self) -> ChunkPos {
        ChunkPos { x: self.x.div_euclid(16), z: self.z.div_euclid(16) }
    }
}
// ledger files store positions as "x,y,z"
impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{}", self.x, self.y, self.z)
    }
}
impl std::str::FromStr for BlockPos {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidLocation(s.to_owned());
        let mut parts = s.split(',').map(|p| p.trim().parse::<i32>());
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(Ok(x)), Some(Ok(y)), Some(Ok(z)), None) => Ok(V3(x, y, z)),
            _ => Err(invalid()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}
impl ChunkPos {
    /// Regions group 32x32 chunks, the unit a region thread owns.
    pub fn region(&self) -> (i32, i32) {
        (self.x >> 5, self.z >> 5)
    }
    pub fn block(&self, x: i32, y: i32, z: i32) -> BlockPos {
        V3(self.x * 16 + x, y, self.z * 16 + z)
    }
}

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub uuid::Uuid);
        impl $name {
            pub fn random() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }
        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
        impl std::str::FromStr for $name {
            type Err = uuid::Error;
            fn from_str(s: &str) -> Result<Self, uuid::Error> {
                uuid::Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}
id_type!(WorldId);
id_type!(PlayerId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Overworld,
    Nether,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameMode {
    Survival,
    Creative,
    Adventure,
    Spectator,
}

/// The player behind an intercepted action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: PlayerId,
    pub mode: GameMode,
}

macro_rules! materials {
    {$($name:ident = $id:literal,)*} => {
        #[allow(non_camel_case_types)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Material {
            $($name,)*
        }
        impl Material {
            pub const ALL: &'static [Material] = &[$(Material::$name,)*];
            pub fn name(self) -> &'static str {
                match self {
                    $(Material::$name => stringify!($name),)*
                }
            }
            pub fn net_id(self) -> u16 {
                match self {
                    $(Material::$name => $id,)*
                }
            }
            pub fn from_net_id(id: u16) -> Option<Self> {
                match id {
                    $($id => Some(Material::$name),)*
                    _ => None,
                }
            }
        }
    };
}
materials! {
    AIR = 0,
    STONE = 1,
    GRASS_BLOCK = 2,
    DIRT = 3,
    COBBLESTONE = 4,
    ANDESITE = 5,
    OBSIDIAN = 6,
    NETHERRACK = 7,
    BASALT = 8,
    BLACKSTONE = 9,
    SOUL_SAND = 10,
    ANCIENT_DEBRIS = 11,
    NETHERITE_BLOCK = 12,
    CRAFTING_TABLE = 13,
    CHEST = 14,
    SMITHING_TABLE = 15,

    NETHERITE_SCRAP = 100,
    NETHERITE_INGOT = 101,
    NETHERITE_UPGRADE_SMITHING_TEMPLATE = 102,
    NETHERITE_SWORD = 103,
    NETHERITE_PICKAXE = 104,
    NETHERITE_AXE = 105,
    NETHERITE_SHOVEL = 106,
    NETHERITE_HOE = 107,
    NETHERITE_HELMET = 108,
    NETHERITE_CHESTPLATE = 109,
    NETHERITE_LEGGINGS = 110,
    NETHERITE_BOOTS = 111,
    DIAMOND = 120,
    DIAMOND_SWORD = 121,
    DIAMOND_PICKAXE = 122,
    DIAMOND_HELMET = 123,
    DIAMOND_CHESTPLATE = 124,
    IRON_INGOT = 130,
    IRON_SWORD = 131,
    GOLD_INGOT = 140,
    ELYTRA = 150,
}
impl Material {
    /// Looks a material up by its canonical (uppercase) identifier.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_uppercase();
        Material::ALL.iter().copied().find(|m| m.name() == name)
    }
    pub fn is_block(self) -> bool {
        self.net_id() < 100
    }
    pub fn is_armor(self) -> bool {
        ["_HELMET", "_CHESTPLATE", "_LEGGINGS", "_BOOTS"].iter().any(|s| self.name().ends_with(s))
            || self == Material::ELYTRA
    }
}
impl std::fmt::Display for Material {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub material: Material,
    pub count: u8,
    pub tag: Option<fastnbt::Value>,
}
impl Item {
    pub fn new(material: Material) -> Self {
        Self { material, count: 1, tag: None }
    }
    /// Reads an item whose tag arrives as raw NBT, as it does off the wire.
    pub fn with_tag_bytes(material: Material, count: u8, tag: &[u8]) -> Result<Self> {
        let tag: fastnbt::Value = fastnbt::from_bytes(tag)?;
        Ok(Self { material, count, tag: Some(tag) })
    }
    pub fn named(mut self, name: &str) -> Self {
        let text = serde_json::json!({ "text": name }).to_string();
        let display = HashMap::from([("Name".to_owned(), fastnbt::Value::String(text))]);
        let mut root = match self.tag.take() {
            Some(fastnbt::Value::Compound(root)) => root,
            _ => HashMap::new(),
        };
        root.insert("display".to_owned(), fastnbt::Value::Compound(display));
        self.tag = Some(fastnbt::Value::Compound(root));
        self
    }
    /// The custom name from the `display.Name` tag, flattened to plain text.
    pub fn display_name(&self) -> Option<String> {
        let fastnbt::Value::Compound(root) = self.tag.as_ref()? else { return None };
        let fastnbt::Value::Compound(display) = root.get("display")? else { return None };
        let fastnbt::Value::String(raw) = display.get("Name")? else { return None };
        Some(match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(component) => flatten_text(&component),
            Err(_) => raw.clone(),
        })
    }
}
fn flatten_text(component: &serde_json::Value) -> String {
    match component {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(parts) => parts.iter().map(flatten_text).collect(),
        serde_json::Value::Object(fields) => {
            let mut text = fields.get("text").map(flatten_text).unwrap_or_default();
            if let Some(extra) = fields.get("extra") {
                text.push_str(&flatten_text(extra));
            }
            text
        }
        _ => String::new(),
    }
}
