//! Broadcast loop
//!
//! One task drains the publish queue and delivers every event to the mailboxes
//! subscribed to its topic, in ascending connection id order. In
//! [`DeliveryMode::Blocking`] a full mailbox holds up the loop (and every
//! topic) until its session drains it or goes away; in
//! [`DeliveryMode::DropWhenFull`] the value is discarded and counted.
//!
//! Shutdown closes the publish queue first, so publishers waiting on a full
//! queue and publishers arriving later get [`RegistryError::Closed`]. Events
//! that were already queued get one non-blocking delivery attempt.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::protocol::codec::TransportValue;
use crate::stats::HubStats;

use super::config::DeliveryMode;
use super::error::RegistryError;
use super::mailbox::Delivery;
use super::types::{Event, Topic};
use super::Registry;

/// Sending end of the publish queue
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
}

impl EventSender {
    /// Queue an event, waiting for capacity
    pub async fn publish(&self, topic: Topic, value: TransportValue) -> Result<(), RegistryError> {
        self.tx
            .send(Event::new(topic, value))
            .await
            .map_err(|_| RegistryError::Closed)
    }

    /// Check whether the broadcast loop has stopped accepting events
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving end of the publish queue
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<Event>,
}

impl EventReceiver {
    /// Receive the next event
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Receive a queued event without waiting
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Refuse further events; queued events can still be received
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Create a publish queue with room for `capacity` events
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender { tx }, EventReceiver { rx })
}

/// Single consumer performing topic fan-out
pub struct BroadcastLoop<R: Registry> {
    registry: Arc<R>,
    events: EventReceiver,
    stats: Arc<HubStats>,
}

impl<R: Registry> BroadcastLoop<R> {
    /// Create a loop over `registry`, consuming `events`
    pub fn new(registry: Arc<R>, events: EventReceiver) -> Self {
        Self {
            registry,
            events,
            stats: Arc::new(HubStats::new()),
        }
    }

    /// Record counters into a shared stats instance
    pub fn with_stats(mut self, stats: Arc<HubStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Counters updated by this loop
    pub fn stats(&self) -> &Arc<HubStats> {
        &self.stats
    }

    /// Spawn the loop on the current runtime
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        let BroadcastLoop {
            registry,
            mut events,
            stats,
        } = self;

        tracing::debug!("Broadcast loop started");

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = events.recv() => event,
            };

            // The registry keeps a sender alive, so this only ends if it was dropped
            let Some(event) = event else {
                break;
            };

            fan_out(registry.as_ref(), &stats, &event, &shutdown).await;
        }

        events.close();

        let mut drained = 0u64;
        while let Some(event) = events.try_recv() {
            fan_out(registry.as_ref(), &stats, &event, &shutdown).await;
            drained += 1;
        }

        tracing::debug!(drained = drained, "Broadcast loop stopped");
    }
}

/// Deliver one event to every subscriber of its topic
async fn fan_out<R: Registry>(
    registry: &R,
    stats: &HubStats,
    event: &Event,
    shutdown: &CancellationToken,
) {
    let mode = registry.config().delivery_mode;
    let targets = registry.subscribers(&event.topic);
    stats.record_event(targets.len());

    for (id, tx) in targets {
        let outcome = if shutdown.is_cancelled() || mode == DeliveryMode::DropWhenFull {
            tx.try_deliver(event.value)
        } else {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => tx.try_deliver(event.value),
                outcome = tx.deliver(event.value, mode) => outcome,
            }
        };

        match outcome {
            Delivery::Delivered => stats.record_delivery(),
            Delivery::Dropped => {
                stats.record_drop();
                tracing::trace!(connection_id = %id, topic = %event.topic, "Mailbox full, value dropped");
            }
            Delivery::Closed => {
                stats.record_closed_receiver();
                tracing::trace!(connection_id = %id, "Mailbox closed during fan-out");
            }
        }
    }
}
