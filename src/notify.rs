use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast of committed events, fanned out after the journal append.
///
/// Per-resource channels serve calendar watchers; the firehose serves
/// collaborators that react to every transition (guest notifications,
/// audit trails). Lossy by design — a lagging subscriber drops events,
/// it never backpressures the engine.
pub struct ChangeFeed {
    per_resource: DashMap<Ulid, broadcast::Sender<Event>>,
    firehose: broadcast::Sender<Event>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self {
            per_resource: DashMap::new(),
            firehose: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Subscribe to one resource's events. Creates the channel if needed.
    pub fn subscribe(&self, resource_id: Ulid) -> broadcast::Receiver<Event> {
        self.per_resource
            .entry(resource_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Subscribe to every committed event.
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event> {
        self.firehose.subscribe()
    }

    /// Publish a committed event. No-op when nobody is listening.
    pub fn publish(&self, resource_id: Ulid, event: &Event) {
        if let Some(sender) = self.per_resource.get(&resource_id) {
            let _ = sender.send(event.clone());
        }
        let _ = self.firehose.send(event.clone());
    }
}
