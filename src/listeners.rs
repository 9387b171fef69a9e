//! Wires the guard and the item checks onto the event bus.
//!
//! Everything registered here shares one token, so a reload drops the whole set
//! and registers a fresh one against the new settings.
use crate::prelude::*;
use crate::classifier::ItemClassifier;
use crate::config::Settings;
use crate::events::{Event, EventBus, EventKind, Token, Verdict};
use crate::guard::ConversionGuard;
use crate::host::{Messenger, Recipient};

/// Answers "is this action allowed" for the simple item checks.
struct Policy {
    classifier: Arc<ItemClassifier>,
    settings: Arc<Settings>,
    messenger: Arc<dyn Messenger>,
}
impl Policy {
    fn deny(&self, actor: &Actor, item: Option<&Item>, verdict: Verdict, why: &str) -> Verdict {
        if self.settings.is_exempt(actor) {
            return Verdict::Allow;
        }
        match item {
            Some(item) if self.classifier.is_restricted(item) => {
                if self.settings.notify_player {
                    self.messenger.notify(Recipient::Player(actor.id), &Message::error(why));
                }
                verdict
            }
            _ => Verdict::Allow,
        }
    }
    /// Removing the item entity outright needs destructive actions turned on.
    fn remove_or_cancel(&self) -> Verdict {
        if self.settings.enable_destructive_actions {
            Verdict::Remove
        } else {
            Verdict::Cancel
        }
    }
}

#[derive(Debug)]
pub struct Listeners {
    bus: Arc<EventBus>,
    token: Token,
}
impl Listeners {
    pub fn register(
        bus: Arc<EventBus>,
        guard: Arc<ConversionGuard>,
        classifier: Arc<ItemClassifier>,
        settings: Arc<Settings>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        let token = bus.token();
        if settings.replace_when_mined {
            let guard = guard.clone();
            bus.subscribe(token, EventKind::BlockDamage, move |event| match event {
                Event::BlockDamage { world, pos, actor } => guard.block_damage(*world, *pos, actor),
                _ => Verdict::Allow,
            });
        }
        if settings.replace_on_chunk_load {
            bus.subscribe(token, EventKind::ChunkLoad, move |event| {
                if let Event::ChunkLoad { world, chunk, new_chunk } = event {
                    guard.chunk_load(*world, *chunk, *new_chunk);
                }
                Verdict::Allow
            });
        }

        let policy = Arc::new(Policy { classifier, settings: settings.clone(), messenger });
        let item_check = |kind: EventKind, check: fn(&Policy, &Event<'_>) -> Verdict| {
            let policy = policy.clone();
            bus.subscribe(token, kind, move |event| check(&policy, event));
        };
        if settings.cancel_craft {
            item_check(EventKind::Craft, |p, event| match event {
                Event::Craft { actor, result } => {
                    p.deny(actor, Some(*result), Verdict::Cancel, "Crafting Netherite items is not allowed!")
                }
                _ => Verdict::Allow,
            });
        }
        if settings.cancel_equip {
            item_check(EventKind::Equip, |p, event| match event {
                Event::Equip { actor, item } if item.material.is_armor() => {
                    p.deny(actor, Some(*item), Verdict::Cancel, "Equipping Netherite armor is not allowed!")
                }
                _ => Verdict::Allow,
            });
        }
        if settings.cancel_attack {
            item_check(EventKind::Attack, |p, event| match event {
                Event::Attack { actor, weapon } => {
                    p.deny(actor, Some(*weapon), Verdict::Cancel, "Attacking with Netherite items is not allowed!")
                }
                _ => Verdict::Allow,
            });
        }
        if settings.cancel_pickup {
            item_check(EventKind::Pickup, |p, event| match event {
                Event::Pickup { actor, item } => {
                    let verdict = if p.settings.remove_dropped { p.remove_or_cancel() } else { Verdict::Cancel };
                    p.deny(actor, Some(*item), verdict, "Picking up Netherite items is not allowed!")
                }
                _ => Verdict::Allow,
            });
        }
        if settings.remove_dropped {
            item_check(EventKind::Drop, |p, event| match event {
                // dropping is never exempt and never announced
                Event::Drop { item, .. } if p.classifier.is_restricted(item) => p.remove_or_cancel(),
                _ => Verdict::Allow,
            });
        }
        if settings.cancel_inventory_move {
            item_check(EventKind::InventoryClick, |p, event| match event {
                Event::InventoryClick { actor, current, cursor } => {
                    let moved = current.filter(|i| p.classifier.is_restricted(i)).or(*cursor);
                    p.deny(actor, moved, Verdict::Cancel, "Moving Netherite items is not allowed!")
                }
                _ => Verdict::Allow,
            });
            item_check(EventKind::ContainerTransfer, |p, event| match event {
                Event::ContainerTransfer { item } if p.classifier.is_restricted(item) => Verdict::Cancel,
                _ => Verdict::Allow,
            });
        }
        log::debug!("registered listeners {token:?}: {bus:?}");
        Self { bus, token }
    }

    pub fn unregister(&self) -> usize {
        self.bus.unsubscribe_all(self.token)
    }
}
