//! Game events the crate intercepts, and the bus that fans them out.
//!
//! Handlers are grouped under a [`Token`] so that everything one component
//! registered can be dropped in one call when configuration changes.
use crate::prelude::*;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! events {
    {$($kind:ident { $($field:ident: $ty:ty),* $(,)? },)*} => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum EventKind {
            $($kind,)*
        }
        #[derive(Debug)]
        pub enum Event<'a> {
            $($kind { $($field: $ty),* },)*
        }
        impl Event<'_> {
            pub fn kind(&self) -> EventKind {
                match self {
                    $(Event::$kind { .. } => EventKind::$kind,)*
                }
            }
        }
    };
}
events! {
    BlockDamage { world: WorldId, pos: BlockPos, actor: Actor },
    ChunkLoad { world: WorldId, chunk: ChunkPos, new_chunk: bool },
    Craft { actor: Actor, result: &'a Item },
    Equip { actor: Actor, item: &'a Item },
    Attack { actor: Actor, weapon: &'a Item },
    Pickup { actor: Actor, item: &'a Item },
    Drop { actor: Actor, item: &'a Item },
    InventoryClick { actor: Actor, current: Option<&'a Item>, cursor: Option<&'a Item> },
    ContainerTransfer { item: &'a Item },
}

/// What the host should do with the action behind an event. When several handlers
/// answer, the strongest verdict wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verdict {
    #[default]
    Allow,
    Cancel,
    /// Cancel, and delete the item entity involved.
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(u64);

pub type Handler = Arc<dyn Fn(&Event<'_>) -> Verdict + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    next: AtomicU64,
    handlers: RwLock<HashMap<EventKind, Vec<(Token, Handler)>>>,
}
impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn token(&self) -> Token {
        Token(self.next.fetch_add(1, Ordering::Relaxed))
    }
    pub fn subscribe(&self, token: Token, kind: EventKind, handler: impl Fn(&Event<'_>) -> Verdict + Send + Sync + 'static) {
        self.handlers.write().entry(kind).or_default().push((token, Arc::new(handler)));
    }
    pub fn unsubscribe_all(&self, token: Token) -> usize {
        let mut removed = 0;
        for handlers in self.handlers.write().values_mut() {
            let before = handlers.len();
            handlers.retain(|(t, _)| *t != token);
            removed += before - handlers.len();
        }
        removed
    }
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.read().get(&kind).map_or(0, Vec::len)
    }
    /// Runs every handler for the event's kind in registration order.
    pub fn dispatch(&self, event: &Event<'_>) -> Verdict {
        // handlers may touch the bus themselves, so don't hold the lock while they run
        let handlers: Vec<Handler> = match self.handlers.read().get(&event.kind()) {
            Some(handlers) => handlers.iter().map(|(_, h)| h.clone()).collect(),
            None => return Verdict::Allow,
        };
        handlers.iter().map(|h| h(event)).max().unwrap_or_default()
    }
}
impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read();
        f.debug_map().entries(handlers.iter().map(|(k, v)| (k, v.len()))).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor() -> Actor {
        Actor { id: PlayerId::random(), mode: GameMode::Survival }
    }

    #[test]
    fn strongest_verdict_wins() {
        let bus = EventBus::new();
        let token = bus.token();
        bus.subscribe(token, EventKind::Drop, |_| Verdict::Cancel);
        bus.subscribe(token, EventKind::Drop, |_| Verdict::Remove);
        bus.subscribe(token, EventKind::Drop, |_| Verdict::Allow);
        let item = Item::new(Material::NETHERITE_INGOT);
        assert_eq!(bus.dispatch(&Event::Drop { actor: actor(), item: &item }), Verdict::Remove);
        assert_eq!(bus.dispatch(&Event::Pickup { actor: actor(), item: &item }), Verdict::Allow);
    }

    #[test]
    fn unsubscribe_only_drops_own_handlers() {
        let bus = EventBus::new();
        let (a, b) = (bus.token(), bus.token());
        bus.subscribe(a, EventKind::Craft, |_| Verdict::Cancel);
        bus.subscribe(a, EventKind::Attack, |_| Verdict::Cancel);
        bus.subscribe(b, EventKind::Craft, |_| Verdict::Allow);
        assert_eq!(bus.unsubscribe_all(a), 2);
        assert_eq!(bus.handler_count(EventKind::Craft), 1);
        assert_eq!(bus.handler_count(EventKind::Attack), 0);
        assert_eq!(bus.unsubscribe_all(a), 0);
    }

    #[test]
    fn handlers_may_subscribe_while_dispatching() {
        let bus = Arc::new(EventBus::new());
        let token = bus.token();
        let inner = bus.clone();
        bus.subscribe(token, EventKind::ChunkLoad, move |_| {
            inner.subscribe(token, EventKind::ChunkLoad, |_| Verdict::Allow);
            Verdict::Allow
        });
        let event = Event::ChunkLoad { world: WorldId::random(), chunk: ChunkPos { x: 0, z: 0 }, new_chunk: true };
        bus.dispatch(&event);
        assert_eq!(bus.handler_count(EventKind::ChunkLoad), 2);
    }
}
