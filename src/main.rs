use netherguard::events::Event;
use netherguard::host::{Recipient, WorldAccess};
use netherguard::scheduler::TickScheduler;
use netherguard::types::*;
use netherguard::world::Level;
use netherguard::{Command, Host, RuntimeContext};
use std::sync::Arc;
use std::time::*;

const TICK: Duration = Duration::from_millis(50);

/// A small nether with some debris tucked into it, so there is something to guard.
fn build_level(level: &Level) -> netherguard::Result<WorldId> {
    let nether = level.create_world("world_nether", Dimension::Nether);
    for cx in -2..2 {
        for cz in -2..2 {
            let chunk = ChunkPos { x: cx, z: cz };
            level.generate_chunk(nether, chunk, Material::NETHERRACK, 128)?;
            for i in 0..6 {
                level.set_block(nether, chunk.block(i * 2, 12 + i * 3, 15 - i), Material::ANCIENT_DEBRIS)?;
            }
        }
    }
    Ok(nether)
}

fn main() -> netherguard::Result<()> {
    env_logger::init();
    let data_dir = std::env::args_os().nth(1).unwrap_or_else(|| "netherguard-data".into());

    let level = Arc::new(Level::new());
    let scheduler = Arc::new(TickScheduler::new());
    let nether = build_level(&level)?;
    let context = RuntimeContext::enable(Host::from_level(level.clone(), scheduler.clone()), &data_dir)?;
    let events = context.host().events.clone();

    for cx in -2..2 {
        for cz in -2..2 {
            events.dispatch(&Event::ChunkLoad { world: nether, chunk: ChunkPos { x: cx, z: cz }, new_chunk: true });
        }
    }
    let player = level.join(nether, V3(0, 70, 0));
    if let Some(actor) = level.actor(player) {
        let verdict = events.dispatch(&Event::BlockDamage { world: nether, pos: V3(0, 12, 15), actor });
        log::info!("mining debris at 0,12,15: {verdict:?}");
    }
    println!("{} debris locations ledgered", context.ledger().count_all());

    match Command::parse(&["restore-debris"]) {
        Ok(command) => context.dispatch_command(None, command),
        Err(usage) => println!("{usage}"),
    }

    let starttime = Instant::now();
    let mut ticks = 0u32;
    while context.reporter().active() > 0 {
        let next_tick_due = starttime + ticks * TICK;
        if let Some(wait) = next_tick_due.checked_duration_since(Instant::now()) {
            std::thread::sleep(wait);
        }
        scheduler.tick();
        ticks += 1;
    }
    for message in level.messages_for(Recipient::Console) {
        println!("{message}");
    }
    println!(
        "{} ticks, {} debris blocks back in place, {} locations left",
        ticks,
        (-2..2)
            .flat_map(|x| (-2..2).map(move |z| ChunkPos { x, z }))
            .map(|chunk| level.count(nether, chunk, Material::ANCIENT_DEBRIS))
            .sum::<usize>(),
        context.ledger().count_all()
    );
    context.disable();
    Ok(())
}
