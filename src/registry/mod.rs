//! Connection registry for topic fan-out
//!
//! The registry hands out connection ids, remembers which topic each
//! connection is subscribed to, and holds the sending half of every
//! connection's mailbox. A single [`BroadcastLoop`] drains published events and
//! delivers them to the mailboxes of every connection on the event's topic.
//!
//! # Architecture
//!
//! ```text
//!                            Arc<impl Registry>
//!                     ┌──────────────────────────────┐
//!                     │ ids: IdAllocator             │
//!                     │ subscriptions: id -> Topic   │
//!                     │ channels: id -> DeliverySender│
//!                     └──────────────┬───────────────┘
//!                                    │ subscribers(topic)
//!   [Session A]                      │
//!   publish() ──► EventSender ──► [BroadcastLoop] ──► Mailbox B ──► socket B
//!                                                └──► Mailbox A ──► socket A
//! ```
//!
//! # Backends
//!
//! - [`LockedRegistry`]: one mutex over plain maps
//! - [`ShardedRegistry`]: independently synchronized concurrent maps
//!
//! Both satisfy the same [`Registry`] contract and are picked at construction.

pub mod allocator;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod locked;
pub mod mailbox;
pub mod sharded;
pub mod types;

use std::future::Future;

pub use allocator::IdAllocator;
pub use broadcast::{event_channel, BroadcastLoop, EventReceiver, EventSender};
pub use config::{DeliveryMode, RegistryConfig, MAX_CONNECTION_IDS};
pub use error::RegistryError;
pub use locked::LockedRegistry;
pub use mailbox::{Delivery, DeliverySender, Mailbox};
pub use sharded::ShardedRegistry;
pub use types::{ConnectionId, Event, Topic};

use crate::protocol::codec::TransportValue;

/// Which registry backend a server runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistryBackend {
    /// [`LockedRegistry`]
    #[default]
    Locked,
    /// [`ShardedRegistry`]
    Sharded,
}

/// Connection registry contract
///
/// Map operations are synchronous and never hold a lock across an await.
pub trait Registry: Send + Sync + Sized + 'static {
    /// Create a registry and the receiving end of its publish queue
    ///
    /// The receiver is meant for a [`BroadcastLoop`].
    fn with_config(config: RegistryConfig) -> (Self, EventReceiver);

    /// Registry configuration
    fn config(&self) -> &RegistryConfig;

    /// Publish queue feeding the broadcast loop
    fn events(&self) -> &EventSender;

    /// Allocate a connection id and create its delivery channel
    ///
    /// Fails with [`RegistryError::Exhausted`] when the id space is used up.
    fn allocate(&self) -> Result<(ConnectionId, Mailbox), RegistryError>;

    /// Subscribe `id` to `topic`, replacing any previous subscription
    fn subscribe(&self, id: ConnectionId, topic: Topic);

    /// Remove the subscription of `id`
    ///
    /// The stored topic is not compared against `topic`.
    fn unsubscribe(&self, id: ConnectionId, topic: &Topic);

    /// Remove the subscription and close the delivery channel of `id`
    ///
    /// Calling this more than once is harmless.
    fn delete_connection(&self, id: ConnectionId);

    /// Current topic of `id`
    fn get_topic(&self, id: ConnectionId) -> Option<Topic>;

    /// Delivery channels of every connection subscribed to `topic`, in
    /// ascending id order
    fn subscribers(&self, topic: &Topic) -> Vec<(ConnectionId, DeliverySender)>;

    /// Number of ids handed out by the counter so far
    fn allocated(&self) -> u32;

    /// Number of live subscriptions
    fn subscription_count(&self) -> usize;

    /// Number of open delivery channels
    fn channel_count(&self) -> usize;

    /// Queue an event for fan-out
    ///
    /// Waits while the publish queue is full. Fails with
    /// [`RegistryError::Closed`] once the broadcast loop has shut down.
    fn publish(
        &self,
        topic: Topic,
        value: TransportValue,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send {
        let events = self.events().clone();
        async move { events.publish(topic, value).await }
    }
}
