use crate::types::{ChunkPos, WorldId};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("malformed item tag: {0}")]
    Nbt(#[from] fastnbt::error::Error),
    #[error("no world with id {0}")]
    UnknownWorld(WorldId),
    #[error("invalid location {0:?}, expected \"x,y,z\"")]
    InvalidLocation(String),
    #[error("chunk {chunk:?} of world {world} is not loaded")]
    ChunkUnavailable { world: WorldId, chunk: ChunkPos },
    #[error("shutting down")]
    ShuttingDown,
    #[error("unknown setting {0}")]
    UnknownSetting(String),
    #[error("invalid value {value:?} for {setting}: {reason}")]
    InvalidValue {
        setting: String,
        value: String,
        reason: &'static str,
    },
}
