//! The slice of the game server this crate talks to.
//!
//! Everything here is implemented by whatever embeds the crate. [`crate::world::Level`]
//! is the in-memory implementation used by the bundled binary and the tests.
use crate::prelude::*;
use crate::events::EventBus;
use crate::scheduler::Scheduler;

pub trait WorldAccess: Send + Sync {
    fn worlds(&self) -> Vec<WorldId>;
    fn world_by_name(&self, name: &str) -> Option<WorldId>;
    fn world_name(&self, world: WorldId) -> Option<String>;
    fn dimension(&self, world: WorldId) -> Option<Dimension>;

    /// Fails with [`Error::ChunkUnavailable`] when the chunk isn't loaded.
    fn block(&self, world: WorldId, pos: BlockPos) -> Result<Material>;
    fn set_block(&self, world: WorldId, pos: BlockPos, material: Material) -> Result<()>;

    fn is_chunk_loaded(&self, world: WorldId, chunk: ChunkPos) -> bool;
    fn is_chunk_generated(&self, world: WorldId, chunk: ChunkPos) -> bool;
    /// Loads a previously generated chunk. Never generates new terrain.
    fn load_chunk(&self, world: WorldId, chunk: ChunkPos) -> bool;
}

pub trait Inventories: Send + Sync {
    fn online_players(&self) -> Vec<PlayerId>;
    fn player_location(&self, player: PlayerId) -> Option<(WorldId, BlockPos)>;
    fn game_mode(&self, player: PlayerId) -> Option<GameMode>;
    /// Drops every item `keep` rejects, returning what was removed.
    fn retain_items(&self, player: PlayerId, keep: &mut dyn FnMut(&Item) -> bool) -> Vec<Item>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recipient {
    Console,
    Player(PlayerId),
}
impl From<Option<PlayerId>> for Recipient {
    fn from(player: Option<PlayerId>) -> Self {
        player.map_or(Recipient::Console, Recipient::Player)
    }
}

pub trait Messenger: Send + Sync {
    /// Best effort: silently does nothing for players who are gone.
    fn notify(&self, to: Recipient, message: &Message);
}

#[derive(Clone)]
pub struct Host {
    pub world: Arc<dyn WorldAccess>,
    pub inventories: Arc<dyn Inventories>,
    pub messenger: Arc<dyn Messenger>,
    pub scheduler: Arc<dyn Scheduler>,
    pub events: Arc<EventBus>,
}
impl Host {
    /// Wires every interface to one object, the way [`crate::world::Level`] is used.
    pub fn from_level<L>(level: Arc<L>, scheduler: Arc<dyn Scheduler>) -> Self
    where
        L: WorldAccess + Inventories + Messenger + 'static,
    {
        Self {
            world: level.clone(),
            inventories: level.clone(),
            messenger: level,
            scheduler,
            events: Arc::new(EventBus::new()),
        }
    }
}
impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("worlds", &self.world.worlds().len())
            .field("regions", &self.scheduler.supports_regions())
            .finish()
    }
}
