//! Session context
//!
//! Identity and counters of one canvas connection, carried through its read
//! and write loops and logged when the session ends.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::registry::{ConnectionId, Topic};
use crate::stats::SessionStats;

/// Per-connection session information
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Registry identity of the connection
    pub id: ConnectionId,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Topic the connection is subscribed to
    pub topic: Topic,

    /// When the session was opened
    pub opened_at: Instant,

    /// Current session statistics
    pub stats: SessionStats,
}

impl SessionContext {
    /// Create a new context
    pub fn new(id: ConnectionId, peer_addr: SocketAddr, topic: Topic) -> Self {
        Self {
            id,
            peer_addr,
            topic,
            opened_at: Instant::now(),
            stats: SessionStats::default(),
        }
    }

    /// Time since the session was opened
    pub fn duration(&self) -> Duration {
        self.opened_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;

    #[test]
    fn test_new_context() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);
        let ctx = SessionContext::new(ConnectionId::new(3), addr, Topic::from("room1"));

        assert_eq!(ctx.id, ConnectionId::new(3));
        assert_eq!(ctx.topic, "room1");
        assert_eq!(ctx.stats.frames_received, 0);
        assert!(ctx.duration() < Duration::from_secs(5));
    }
}
