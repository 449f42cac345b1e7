//! Single-lock registry backend
//!
//! Subscriptions and delivery channels live in plain maps behind one mutex.
//! The fan-out snapshot is taken under the same lock that deletion uses, so a
//! deleted connection is never observed by a later scan.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::allocator::IdAllocator;
use super::broadcast::{event_channel, EventReceiver, EventSender};
use super::config::RegistryConfig;
use super::error::RegistryError;
use super::mailbox::{self, DeliverySender, Mailbox};
use super::types::{ConnectionId, Topic};
use super::Registry;

#[derive(Debug, Default)]
struct Maps {
    /// Ordered so fan-out visits ids in ascending order
    subscriptions: BTreeMap<ConnectionId, Topic>,
    channels: HashMap<ConnectionId, DeliverySender>,
}

/// Registry guarded by one coarse-grained lock
#[derive(Debug)]
pub struct LockedRegistry {
    maps: Mutex<Maps>,
    ids: IdAllocator,
    events: EventSender,
    config: RegistryConfig,
}

impl LockedRegistry {
    fn maps(&self) -> MutexGuard<'_, Maps> {
        // Map updates are single statements; a poisoned lock still holds consistent maps
        self.maps.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Registry for LockedRegistry {
    fn with_config(config: RegistryConfig) -> (Self, EventReceiver) {
        let (events, receiver) = event_channel(config.event_capacity);
        let registry = Self {
            maps: Mutex::new(Maps::default()),
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
        self.maps().channels.insert(id, tx);

        tracing::debug!(connection_id = %id, "Connection allocated");
        Ok((id, mailbox))
    }

    fn subscribe(&self, id: ConnectionId, topic: Topic) {
        self.maps().subscriptions.insert(id, topic);
    }

    fn unsubscribe(&self, id: ConnectionId, _topic: &Topic) {
        self.maps().subscriptions.remove(&id);
    }

    fn delete_connection(&self, id: ConnectionId) {
        let removed = {
            let mut maps = self.maps();
            maps.subscriptions.remove(&id);
            maps.channels.remove(&id)
        };

        // Dropping the sender outside the lock closes the channel
        if removed.is_some() {
            self.ids.release(id);
            tracing::debug!(connection_id = %id, "Connection deleted");
        }
    }

    fn get_topic(&self, id: ConnectionId) -> Option<Topic> {
        self.maps().subscriptions.get(&id).cloned()
    }

    fn subscribers(&self, topic: &Topic) -> Vec<(ConnectionId, DeliverySender)> {
        let maps = self.maps();

        maps.subscriptions
            .iter()
            .filter(|(_, subscribed)| *subscribed == topic)
            .filter_map(|(id, _)| maps.channels.get(id).map(|tx| (*id, tx.clone())))
            .collect()
    }

    fn allocated(&self) -> u32 {
        self.ids.allocated()
    }

    fn subscription_count(&self) -> usize {
        self.maps().subscriptions.len()
    }

    fn channel_count(&self) -> usize {
        self.maps().channels.len()
    }
}
