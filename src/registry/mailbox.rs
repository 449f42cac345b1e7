//! Per-connection delivery channels
//!
//! Each connection owns one bounded channel. The registry keeps the sending
//! half ([`DeliverySender`]) and the session keeps the receiving half
//! ([`Mailbox`]). Removing the sender from the registry closes the channel once
//! any in-flight fan-out clone is dropped; a send that races with the receiver
//! going away reports [`Delivery::Closed`] instead of failing hard.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

use crate::protocol::codec::TransportValue;

use super::config::DeliveryMode;
use super::types::ConnectionId;

/// Outcome of handing a value to a mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Value was queued
    Delivered,
    /// Mailbox was full and the value was discarded
    Dropped,
    /// Receiver is gone
    Closed,
}

/// Sending half of a connection's delivery channel
#[derive(Debug, Clone)]
pub struct DeliverySender {
    tx: mpsc::Sender<TransportValue>,
}

impl DeliverySender {
    /// Deliver a value according to `mode`
    pub async fn deliver(&self, value: TransportValue, mode: DeliveryMode) -> Delivery {
        match mode {
            DeliveryMode::Blocking => match self.tx.send(value).await {
                Ok(()) => Delivery::Delivered,
                Err(_) => Delivery::Closed,
            },
            DeliveryMode::DropWhenFull => self.try_deliver(value),
        }
    }

    /// Deliver a value without waiting
    pub fn try_deliver(&self, value: TransportValue) -> Delivery {
        match self.tx.try_send(value) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Check whether the receiving half is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of a connection's delivery channel
#[derive(Debug)]
pub struct Mailbox {
    id: ConnectionId,
    rx: mpsc::Receiver<TransportValue>,
}

impl Mailbox {
    /// Connection this mailbox belongs to
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Receive the next value
    ///
    /// Returns `None` once the registry has closed the channel and every
    /// queued value has been received.
    pub async fn recv(&mut self) -> Option<TransportValue> {
        self.rx.recv().await
    }

    /// Receive a queued value without waiting
    pub fn try_recv(&mut self) -> Result<TransportValue, TryRecvError> {
        self.rx.try_recv()
    }

    /// Stop accepting values; queued values can still be received
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Create a delivery channel for `id`
pub(super) fn channel(id: ConnectionId, capacity: usize) -> (DeliverySender, Mailbox) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (DeliverySender { tx }, Mailbox { id, rx })
}
