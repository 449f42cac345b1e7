//! Sharded registry backend
//!
//! Every connection owns one entry in a concurrent map holding both its
//! subscription and its delivery channel, so connections on different shards
//! never contend. A fan-out snapshot reads topic and sender under the same
//! shard guard: it can never pair a topic with the channel of a later
//! connection that was handed the same recycled id. A sender taken from a
//! connection that is deleted afterwards reports
//! [`Delivery::Closed`](super::Delivery::Closed) and is skipped.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::allocator::IdAllocator;
use super::broadcast::{event_channel, EventReceiver, EventSender};
use super::config::RegistryConfig;
use super::error::RegistryError;
use super::mailbox::{self, DeliverySender, Mailbox};
use super::types::{ConnectionId, Topic};
use super::Registry;

/// Subscription and channel of one connection
#[derive(Debug, Default)]
struct Slot {
    topic: Option<Topic>,
    tx: Option<DeliverySender>,
}

impl Slot {
    fn is_empty(&self) -> bool {
        self.topic.is_none() && self.tx.is_none()
    }
}

/// Registry built on a sharded concurrent map
#[derive(Debug)]
pub struct ShardedRegistry {
    slots: DashMap<ConnectionId, Slot>,
    ids: IdAllocator,
    events: EventSender,
    config: RegistryConfig,
}

impl Registry for ShardedRegistry {
    fn with_config(config: RegistryConfig) -> (Self, EventReceiver) {
        let (events, receiver) = event_channel(config.event_capacity);
        let registry = Self {
            slots: DashMap::new(),
            ids: IdAllocator::new(config.max_connections, config.recycle_ids),
            events,
            config,
        };

        (registry, receiver)
    }

    fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn events(&self) -> &EventSender {
        &self.events
    }

    fn allocate(&self) -> Result<(ConnectionId, Mailbox), RegistryError> {
        let id = self.ids.allocate()?;
        let (tx, mailbox) = mailbox::channel(id, self.config.mailbox_capacity);
        self.slots.entry(id).or_default().tx = Some(tx);

        tracing::debug!(connection_id = %id, "Connection allocated");
        Ok((id, mailbox))
    }

    fn subscribe(&self, id: ConnectionId, topic: Topic) {
        self.slots.entry(id).or_default().topic = Some(topic);
    }

    fn unsubscribe(&self, id: ConnectionId, _topic: &Topic) {
        if let Entry::Occupied(mut slot) = self.slots.entry(id) {
            slot.get_mut().topic = None;
            if slot.get().is_empty() {
                slot.remove();
            }
        }
    }

    fn delete_connection(&self, id: ConnectionId) {
        let removed = self.slots.remove(&id).and_then(|(_, slot)| slot.tx);

        // Only the call that actually removes the channel releases the id
        if removed.is_some() {
            self.ids.release(id);
            tracing::debug!(connection_id = %id, "Connection deleted");
        }
    }

    fn get_topic(&self, id: ConnectionId) -> Option<Topic> {
        self.slots.get(&id).and_then(|slot| slot.topic.clone())
    }

    fn subscribers(&self, topic: &Topic) -> Vec<(ConnectionId, DeliverySender)> {
        let mut targets: Vec<(ConnectionId, DeliverySender)> = self
            .slots
            .iter()
            .filter(|slot| slot.topic.as_ref() == Some(topic))
            .filter_map(|slot| slot.tx.as_ref().map(|tx| (*slot.key(), tx.clone())))
            .collect();
        targets.sort_unstable_by_key(|(id, _)| *id);
        targets
    }

    fn allocated(&self) -> u32 {
        self.ids.allocated()
    }

    fn subscription_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.topic.is_some()).count()
    }

    fn channel_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.tx.is_some()).count()
    }
}
