use std::sync::Arc;

use foundation::time::Timestamp;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TickKind {
    /// The clock moved; subscribers may start fetching data for `time`.
    Loading,
    /// The clock settled on `time`; subscribers should render it.
    Committed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TickEvent {
    pub kind: TickKind,
    pub time: Timestamp,
    pub index: usize,
}

/// Something that follows a [`Clock`](crate::clock::Clock).
pub trait TickListener: Send + Sync {
    fn on_tick(&self, event: &TickEvent);
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    listener: Arc<dyn TickListener>,
    detached: bool,
}

/// Ordered subscriber registry for tick delivery.
///
/// Delivery order is subscription order. Detached subscribers stay
/// registered (and keep their id) but are skipped by [`EventBus::receivers`].
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Arc<dyn TickListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push(Subscriber {
            id,
            listener,
            detached: false,
        });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    /// Marks `ids` detached (or reattached). Unknown ids are ignored.
    pub fn set_detached(&mut self, ids: &[SubscriptionId], detached: bool) {
        for s in self.subscribers.iter_mut().filter(|s| ids.contains(&s.id)) {
            s.detached = detached;
        }
    }

    pub fn is_attached(&self, id: SubscriptionId) -> bool {
        self.subscribers.iter().any(|s| s.id == id && !s.detached)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Listeners that should receive the next event.
    pub fn receivers(&self) -> Vec<Arc<dyn TickListener>> {
        self.subscribers
            .iter()
            .filter(|s| !s.detached)
            .map(|s| s.listener.clone())
            .collect()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{EventBus, TickEvent, TickListener};

    struct Nop;

    impl TickListener for Nop {
        fn on_tick(&self, _event: &TickEvent) {}
    }

    #[test]
    fn detached_subscribers_are_skipped_but_kept() {
        let mut bus = EventBus::new();
        let a = bus.subscribe(Arc::new(Nop));
        let b = bus.subscribe(Arc::new(Nop));

        bus.set_detached(&[a], true);
        assert_eq!(bus.receivers().len(), 1);
        assert!(!bus.is_attached(a));
        assert!(bus.is_attached(b));
        assert_eq!(bus.len(), 2);

        bus.set_detached(&[a], false);
        assert_eq!(bus.receivers().len(), 2);
    }

    #[test]
    fn unsubscribe_removes_once() {
        let mut bus = EventBus::new();
        let a = bus.subscribe(Arc::new(Nop));
        assert!(bus.unsubscribe(a));
        assert!(!bus.unsubscribe(a));
        assert!(bus.is_empty());
    }
}
