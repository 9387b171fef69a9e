use crate::prelude::*;
use crate::config::ConfigStore;
use crate::events::Verdict;
use crate::host::{Host, Recipient};
use crate::ledger::LocationLedger;
use std::ops::Range;

pub const PROTECTED: Material = Material::ANCIENT_DEBRIS;
pub const SUBSTITUTE: Material = Material::NETHERRACK;
/// Where the protected block can generate.
const SCAN_Y: Range<i32> = 8..120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkScan {
    pub converted: usize,
    pub budget_exhausted: bool,
}

/// Turns protected blocks into the substitute as players find them, recording every
/// conversion so it can be undone.
#[derive(Debug)]
pub struct ConversionGuard {
    host: Host,
    ledger: Arc<LocationLedger>,
    config: Arc<ConfigStore>,
}
impl ConversionGuard {
    pub fn new(host: Host, ledger: Arc<LocationLedger>, config: Arc<ConfigStore>) -> Self {
        Self { host, ledger, config }
    }

    /// A player started mining `pos`.
    pub fn block_damage(&self, world: WorldId, pos: BlockPos, actor: &Actor) -> Verdict {
        let settings = self.config.get();
        if !settings.replace_when_mined || settings.is_exempt(actor) {
            return Verdict::Allow;
        }
        match self.host.world.block(world, pos) {
            Ok(PROTECTED) => {}
            Ok(_) => return Verdict::Allow,
            Err(e) => {
                log::debug!("ignoring damage at {pos}: {e}");
                return Verdict::Allow;
            }
        }
        if self.ledger.contains(world, pos) {
            return Verdict::Allow;
        }
        // a full ledger leaves the block alone but still stops the mining
        if self.ledger.add(world, pos) {
            if let Err(e) = self.host.world.set_block(world, pos, SUBSTITUTE) {
                log::warn!("could not convert debris at {pos}: {e}");
                self.ledger.remove(world, pos);
                return Verdict::Cancel;
            }
            if settings.log_debris_replacements {
                log::info!("converted debris mined at {pos} in {}", self.world_name(world));
            }
            if settings.notify_player {
                self.host
                    .messenger
                    .notify(Recipient::Player(actor.id), &Message::error("Ancient Debris has been converted to Netherrack!"));
            }
            if settings.save_replaced_locations {
                self.ledger.persist_async(&*self.host.scheduler);
            }
        }
        Verdict::Cancel
    }

    /// A chunk became active. Converts up to the per-chunk budget; whatever is left
    /// waits for the chunk's next load.
    pub fn chunk_load(&self, world: WorldId, chunk: ChunkPos, new_chunk: bool) -> ChunkScan {
        let settings = self.config.get();
        let mut scan = ChunkScan::default();
        if !settings.replace_on_chunk_load
            || (settings.only_replace_generated_chunks && !new_chunk)
            || self.host.world.dimension(world) != Some(Dimension::Nether)
        {
            return scan;
        }
        let budget = settings.max_replacements_per_chunk;
        'scan: for x in 0..16 {
            for z in 0..16 {
                for y in SCAN_Y {
                    let pos = chunk.block(x, y, z);
                    match self.host.world.block(world, pos) {
                        Ok(PROTECTED) => {}
                        Ok(_) => continue,
                        Err(e) => {
                            log::warn!("stopped scanning chunk {},{}: {e}", chunk.x, chunk.z);
                            break 'scan;
                        }
                    }
                    if self.ledger.contains(world, pos) {
                        continue;
                    }
                    if budget >= 0 && scan.converted as i64 >= budget {
                        scan.budget_exhausted = true;
                        log::warn!(
                            "too much debris in chunk {},{} of {}, stopping after {budget} replacements",
                            chunk.x,
                            chunk.z,
                            self.world_name(world)
                        );
                        break 'scan;
                    }
                    if !self.ledger.add(world, pos) {
                        continue;
                    }
                    match self.host.world.set_block(world, pos, SUBSTITUTE) {
                        Ok(()) => scan.converted += 1,
                        Err(e) => {
                            log::warn!("could not convert debris at {pos}: {e}");
                            self.ledger.remove(world, pos);
                        }
                    }
                }
            }
        }
        if scan.converted > 0 {
            if settings.log_debris_replacements {
                log::info!(
                    "replaced {} debris in chunk {},{} of {}",
                    scan.converted,
                    chunk.x,
                    chunk.z,
                    self.world_name(world)
                );
            }
            if settings.save_replaced_locations {
                self.ledger.persist_async(&*self.host.scheduler);
            }
        }
        scan
    }

    fn world_name(&self, world: WorldId) -> String {
        self.host.world.world_name(world).unwrap_or_else(|| world.to_string())
    }
}
