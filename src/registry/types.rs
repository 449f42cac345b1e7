//! Identity and routing types
//!
//! This module defines the key types for identifying connections and topics,
//! and the events that travel from publishers to the broadcast loop.

use std::sync::Arc;

use crate::protocol::codec::TransportValue;

/// Identity of a live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u16);

impl ConnectionId {
    /// Wrap a raw id
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Raw id value
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl From<u16> for ConnectionId {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a broadcast group
///
/// Cheap to clone: events for the same topic share one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(Arc<str>);

impl Topic {
    /// Create a new topic
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Topic name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Topic {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Topic {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for Topic {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A published coordinate event waiting for fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Topic the event is published to
    pub topic: Topic,
    /// Packed sender id and coordinate
    pub value: TransportValue,
}

impl Event {
    /// Create a new event
    pub fn new(topic: Topic, value: TransportValue) -> Self {
        Self { topic, value }
    }
}
