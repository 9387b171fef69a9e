use crate::prelude::*;
use crate::host::{Inventories, Messenger, Recipient, WorldAccess};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

// An in-memory server: enough world, players and chat to drive the plugin without a
// real game attached. Chunks that get unloaded keep their blocks, so "generated" is
// simply "we have data for it", loaded or not.

const MIN_Y: i32 = -64;
const HEIGHT: i32 = 384;
const SECTIONS: usize = (HEIGHT / 16) as usize;
const ID_BITS: u32 = 15;
const ID_MASK: u64 = 0b11111_11111_11111;

pub struct Chunk {
    nonaircounts: [u16; SECTIONS],
    // 4 ids of 15 bits per long, x fastest then z then y
    blocks: Box<[u64; (16 * 16 * HEIGHT as usize) / 4]>,
}
impl Chunk {
    pub fn empty() -> Self {
        let blocks = vec![0u64; (16 * 16 * HEIGHT as usize) / 4];
        Self {
            nonaircounts: [0; SECTIONS],
            blocks: blocks.into_boxed_slice().try_into().unwrap_or_else(|_| unreachable!()),
        }
    }
    /// Fills everything from the bottom of the world up to (excluding) `top` with `filler`.
    pub fn filled(filler: Material, top: i32) -> Self {
        let mut chunk = Self::empty();
        for y in MIN_Y..top.min(MIN_Y + HEIGHT) {
            for z in 0..16 {
                for x in 0..16 {
                    chunk.set(x, y, z, filler);
                }
            }
        }
        chunk
    }
    fn index(x: i32, y: i32, z: i32) -> Option<usize> {
        if !(MIN_Y..MIN_Y + HEIGHT).contains(&y) {
            return None;
        }
        Some(((y - MIN_Y) * 16 * 16 + z.rem_euclid(16) * 16 + x.rem_euclid(16)) as usize)
    }
    pub fn get(&self, x: i32, y: i32, z: i32) -> Material {
        let Some(idx) = Self::index(x, y, z) else { return Material::AIR };
        let id = (self.blocks[idx / 4] >> ((idx % 4) as u32 * ID_BITS)) & ID_MASK;
        Material::from_net_id(id as u16).unwrap_or(Material::AIR)
    }
    pub fn set(&mut self, x: i32, y: i32, z: i32, material: Material) -> Option<Material> {
        let idx = Self::index(x, y, z)?;
        let id = material.net_id() as u64;
        let long = &mut self.blocks[idx / 4];
        let shift = (idx % 4) as u32 * ID_BITS;
        let old = (*long >> shift) & ID_MASK;
        *long = (*long & !(ID_MASK << shift)) | id << shift;
        let section = ((y - MIN_Y) / 16) as usize;
        if old == 0 && id != 0 {
            self.nonaircounts[section] += 1;
        } else if old != 0 && id == 0 {
            self.nonaircounts[section] -= 1;
        }
        Some(Material::from_net_id(old as u16).unwrap_or(Material::AIR))
    }
    pub fn non_air(&self) -> usize {
        self.nonaircounts.iter().map(|&n| n as usize).sum()
    }
}

struct WorldState {
    name: String,
    dimension: Dimension,
    loaded: HashMap<ChunkPos, Chunk>,
    unloaded: HashMap<ChunkPos, Chunk>,
}

#[derive(Debug, Clone)]
struct Player {
    world: WorldId,
    position: BlockPos,
    mode: GameMode,
    inventory: Vec<Item>,
}

#[derive(Default)]
pub struct Level {
    worlds: RwLock<HashMap<WorldId, WorldState>>,
    players: RwLock<HashMap<PlayerId, Player>>,
    chat: Mutex<Vec<(Recipient, Message)>>,
}
impl Level {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn create_world(&self, name: &str, dimension: Dimension) -> WorldId {
        let id = WorldId::random();
        self.worlds.write().insert(id, WorldState {
            name: name.to_owned(),
            dimension,
            loaded: HashMap::new(),
            unloaded: HashMap::new(),
        });
        id
    }
    /// Generates (and loads) a chunk filled with `filler` below `top`.
    pub fn generate_chunk(&self, world: WorldId, pos: ChunkPos, filler: Material, top: i32) -> Result<()> {
        let mut worlds = self.worlds.write();
        let state = worlds.get_mut(&world).ok_or(Error::UnknownWorld(world))?;
        state.unloaded.remove(&pos);
        state.loaded.insert(pos, Chunk::filled(filler, top));
        Ok(())
    }
    pub fn unload_chunk(&self, world: WorldId, pos: ChunkPos) -> bool {
        let mut worlds = self.worlds.write();
        let Some(state) = worlds.get_mut(&world) else { return false };
        match state.loaded.remove(&pos) {
            Some(chunk) => {
                state.unloaded.insert(pos, chunk);
                true
            }
            None => false,
        }
    }
    pub fn count(&self, world: WorldId, pos: ChunkPos, material: Material) -> usize {
        let worlds = self.worlds.read();
        let Some(chunk) = worlds.get(&world).and_then(|w| w.loaded.get(&pos).or_else(|| w.unloaded.get(&pos))) else {
            return 0;
        };
        let mut n = 0;
        for y in MIN_Y..MIN_Y + HEIGHT {
            for z in 0..16 {
                for x in 0..16 {
                    n += (chunk.get(x, y, z) == material) as usize;
                }
            }
        }
        n
    }

    pub fn join(&self, world: WorldId, position: BlockPos) -> PlayerId {
        let id = PlayerId::random();
        self.players.write().insert(id, Player { world, position, mode: GameMode::Survival, inventory: vec![] });
        id
    }
    pub fn set_game_mode(&self, player: PlayerId, mode: GameMode) {
        if let Some(p) = self.players.write().get_mut(&player) {
            p.mode = mode;
        }
    }
    /// The player as an event source.
    pub fn actor(&self, player: PlayerId) -> Option<Actor> {
        self.players.read().get(&player).map(|p| Actor { id: player, mode: p.mode })
    }
    pub fn leave(&self, player: PlayerId) {
        self.players.write().remove(&player);
    }
    pub fn give(&self, player: PlayerId, item: Item) {
        if let Some(p) = self.players.write().get_mut(&player) {
            p.inventory.push(item);
        }
    }
    pub fn inventory(&self, player: PlayerId) -> Vec<Item> {
        self.players.read().get(&player).map(|p| p.inventory.clone()).unwrap_or_default()
    }

    pub fn chat(&self) -> Vec<(Recipient, Message)> {
        self.chat.lock().clone()
    }
    pub fn messages_for(&self, to: Recipient) -> Vec<Message> {
        self.chat.lock().iter().filter(|(r, _)| *r == to).map(|(_, m)| m.clone()).collect()
    }
}

impl WorldAccess for Level {
    fn worlds(&self) -> Vec<WorldId> {
        self.worlds.read().keys().copied().collect()
    }
    fn world_by_name(&self, name: &str) -> Option<WorldId> {
        self.worlds.read().iter().find(|(_, w)| w.name == name).map(|(id, _)| *id)
    }
    fn world_name(&self, world: WorldId) -> Option<String> {
        self.worlds.read().get(&world).map(|w| w.name.clone())
    }
    fn dimension(&self, world: WorldId) -> Option<Dimension> {
        self.worlds.read().get(&world).map(|w| w.dimension)
    }
    fn block(&self, world: WorldId, pos: BlockPos) -> Result<Material> {
        let worlds = self.worlds.read();
        let state = worlds.get(&world).ok_or(Error::UnknownWorld(world))?;
        let chunk = state.loaded.get(&pos.chunk()).ok_or(Error::ChunkUnavailable { world, chunk: pos.chunk() })?;
        Ok(chunk.get(pos.x, pos.y, pos.z))
    }
    fn set_block(&self, world: WorldId, pos: BlockPos, material: Material) -> Result<()> {
        let mut worlds = self.worlds.write();
        let state = worlds.get_mut(&world).ok_or(Error::UnknownWorld(world))?;
        let chunk = state.loaded.get_mut(&pos.chunk()).ok_or(Error::ChunkUnavailable { world, chunk: pos.chunk() })?;
        chunk.set(pos.x, pos.y, pos.z, material).ok_or_else(|| Error::InvalidLocation(pos.to_string()))?;
        Ok(())
    }
    fn is_chunk_loaded(&self, world: WorldId, chunk: ChunkPos) -> bool {
        self.worlds.read().get(&world).map_or(false, |w| w.loaded.contains_key(&chunk))
    }
    fn is_chunk_generated(&self, world: WorldId, chunk: ChunkPos) -> bool {
        self.worlds.read().get(&world).map_or(false, |w| w.loaded.contains_key(&chunk) || w.unloaded.contains_key(&chunk))
    }
    fn load_chunk(&self, world: WorldId, pos: ChunkPos) -> bool {
        let mut worlds = self.worlds.write();
        let Some(state) = worlds.get_mut(&world) else { return false };
        if state.loaded.contains_key(&pos) {
            return true;
        }
        match state.unloaded.remove(&pos) {
            Some(chunk) => {
                log::trace!("loading chunk {},{} of {}", pos.x, pos.z, state.name);
                state.loaded.insert(pos, chunk);
                true
            }
            None => false,
        }
    }
}

impl Inventories for Level {
    fn online_players(&self) -> Vec<PlayerId> {
        self.players.read().keys().copied().collect()
    }
    fn player_location(&self, player: PlayerId) -> Option<(WorldId, BlockPos)> {
        self.players.read().get(&player).map(|p| (p.world, p.position))
    }
    fn game_mode(&self, player: PlayerId) -> Option<GameMode> {
        self.players.read().get(&player).map(|p| p.mode)
    }
    fn retain_items(&self, player: PlayerId, keep: &mut dyn FnMut(&Item) -> bool) -> Vec<Item> {
        let mut players = self.players.write();
        let Some(p) = players.get_mut(&player) else { return vec![] };
        let (kept, removed): (Vec<Item>, Vec<Item>) = core::mem::take(&mut p.inventory).into_iter().partition(|i| keep(i));
        p.inventory = kept;
        removed
    }
}

impl Messenger for Level {
    fn notify(&self, to: Recipient, message: &Message) {
        if let Recipient::Player(id) = to {
            if !self.players.read().contains_key(&id) {
                return;
            }
        }
        log::trace!("chat to {to:?}: {}", message.to_json());
        self.chat.lock().push((to, message.clone()));
    }
}
