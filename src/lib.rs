pub mod classifier;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod guard;
pub mod host;
pub mod ledger;
pub mod listeners;
pub mod message;
pub mod restoration;
pub mod scheduler;
pub mod sweep;
pub mod types;
pub mod world;

pub use commands::Command;
pub use context::RuntimeContext;
pub use error::{Error, Result};
pub use host::Host;

mod prelude {
    pub(crate) use crate::error::{Error, Result};
    pub(crate) use crate::message::{Color, Message};
    pub(crate) use crate::types::*;
    pub(crate) use std::{sync::Arc, time};
}

/// Where the moving parts live, and which thread touches what.
///
/// The guard runs inside event dispatch, on whatever thread the host raises the event
/// on: the simulation thread, or the thread owning the block's region. It only ever
/// touches the block it was handed (or the chunk being loaded) and the ledger.
///
/// The ledger is the one structure shared by everybody. Per-coordinate operations are
/// linearizable through the concurrent map; whole-file saves happen on the async lane
/// and collapse when they pile up.
///
/// Restoration never blocks the simulation thread:
///   - single-threaded hosts get a repeating task that reverts a bounded batch each tick
///     and finishes on the same tick as the last batch
///   - region-parallel hosts get one task per location on the owning region, a latch
///     counting them down, and an async waiter that hands the finish step back to the
///     global lane, timeout or not
///
/// Progress reporting is purely observational. It reads session counters once a second
/// and never feeds back into the restoration itself.
///
/// Configuration changes never mutate a live `Settings`; a fresh snapshot replaces the
/// old one and everything keyed on it (listeners, the sweep) is re-registered.
#[allow(non_camel_case_types, dead_code)]
struct threading;
