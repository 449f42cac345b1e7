//! Statistics for the hub and its sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Per-session statistics
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Coordinate frames received
    pub frames_received: u64,
    /// Total payload bytes received
    pub bytes_received: u64,
    /// Coordinate frames written
    pub frames_sent: u64,
    /// Non-binary frames echoed back
    pub frames_echoed: u64,
}

impl SessionStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one inbound coordinate frame
    pub fn on_frame_received(&mut self, len: usize) {
        self.frames_received += 1;
        self.bytes_received += len as u64;
    }

    /// Received kilobytes, rounded down
    pub fn kilobytes_received(&self) -> u64 {
        self.bytes_received / 1024
    }
}

/// Hub-wide counters shared between the listener, sessions and the
/// broadcast loop
#[derive(Debug)]
pub struct HubStats {
    started_at: Instant,
    connections_accepted: AtomicU64,
    connections_rejected: AtomicU64,
    handshake_failures: AtomicU64,
    active_sessions: AtomicU64,
    events_published: AtomicU64,
    events_fanned_out: AtomicU64,
    fan_out_targets: AtomicU64,
    deliveries: AtomicU64,
    dropped: AtomicU64,
    closed_receivers: AtomicU64,
    malformed_frames: AtomicU64,
}

impl Default for HubStats {
    fn default() -> Self {
        Self::new()
    }
}

impl HubStats {
    /// Create zeroed counters; uptime starts now
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            connections_accepted: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            handshake_failures: AtomicU64::new(0),
            active_sessions: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            events_fanned_out: AtomicU64::new(0),
            fan_out_targets: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            closed_receivers: AtomicU64::new(0),
            malformed_frames: AtomicU64::new(0),
        }
    }

    /// A session was allocated an id
    pub fn record_session_start(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// A session was torn down
    pub fn record_session_end(&self) {
        // Never wraps below zero even if start/end are ever unbalanced
        let _ = self
            .active_sessions
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    /// A connection was refused because the id space is used up
    pub fn record_rejection(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// A WebSocket upgrade failed or timed out
    pub fn record_handshake_failure(&self) {
        self.handshake_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A session's event was accepted by the publish queue
    pub fn record_publish(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    /// The broadcast loop picked up an event with `targets` subscribers
    pub fn record_event(&self, targets: usize) {
        self.events_fanned_out.fetch_add(1, Ordering::Relaxed);
        self.fan_out_targets
            .fetch_add(targets as u64, Ordering::Relaxed);
    }

    /// A value was placed in a mailbox
    pub fn record_delivery(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    /// A value was discarded because its mailbox was full
    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// A delivery found the mailbox already closed
    pub fn record_closed_receiver(&self) {
        self.closed_receivers.fetch_add(1, Ordering::Relaxed);
    }

    /// An inbound frame had the wrong size
    pub fn record_malformed_frame(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> HubStatsSnapshot {
        HubStatsSnapshot {
            uptime: self.started_at.elapsed(),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            handshake_failures: self.handshake_failures.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            events_fanned_out: self.events_fanned_out.load(Ordering::Relaxed),
            fan_out_targets: self.fan_out_targets.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            closed_receivers: self.closed_receivers.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`HubStats`] at one moment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStatsSnapshot {
    /// Time since the stats were created
    pub uptime: Duration,
    /// Sessions that were allocated an id
    pub connections_accepted: u64,
    /// Connections refused because the id space was used up
    pub connections_rejected: u64,
    /// Failed or timed out upgrades
    pub handshake_failures: u64,
    /// Sessions currently running
    pub active_sessions: u64,
    /// Events accepted by `publish`
    pub events_published: u64,
    /// Events processed by the broadcast loop
    pub events_fanned_out: u64,
    /// Subscribers matched across all processed events
    pub fan_out_targets: u64,
    /// Values placed in a mailbox
    pub deliveries: u64,
    /// Values discarded because a mailbox was full
    pub dropped: u64,
    /// Sends that found the mailbox already closed
    pub closed_receivers: u64,
    /// Inbound frames with the wrong size
    pub malformed_frames: u64,
}

impl HubStatsSnapshot {
    /// Average number of subscribers per processed event
    pub fn average_fan_out(&self) -> f64 {
        if self.events_fanned_out == 0 {
            0.0
        } else {
            self.fan_out_targets as f64 / self.events_fanned_out as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_stats_new() {
        let stats = SessionStats::new();
        assert_eq!(stats.frames_received, 0);
        assert_eq!(stats.bytes_received, 0);
        assert_eq!(stats.frames_sent, 0);
        assert_eq!(stats.frames_echoed, 0);
    }

    #[test]
    fn test_session_stats_frames() {
        let mut stats = SessionStats::new();
        for _ in 0..512 {
            stats.on_frame_received(4);
        }

        assert_eq!(stats.frames_received, 512);
        assert_eq!(stats.bytes_received, 2048);
        assert_eq!(stats.kilobytes_received(), 2);
    }

    #[test]
    fn test_hub_stats_sessions() {
        let stats = HubStats::new();
        stats.record_session_start();
        stats.record_session_start();
        stats.record_session_end();
        stats.record_rejection();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.connections_accepted, 2);
        assert_eq!(snapshot.active_sessions, 1);
        assert_eq!(snapshot.connections_rejected, 1);
    }

    #[test]
    fn test_active_sessions_never_negative() {
        let stats = HubStats::new();
        stats.record_session_end();

        assert_eq!(stats.snapshot().active_sessions, 0);
    }

    #[test]
    fn test_delivery_counters() {
        let stats = HubStats::new();
        stats.record_publish();
        stats.record_delivery();
        stats.record_delivery();
        stats.record_drop();
        stats.record_closed_receiver();
        stats.record_malformed_frame();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.events_published, 1);
        assert_eq!(snapshot.deliveries, 2);
        assert_eq!(snapshot.dropped, 1);
        assert_eq!(snapshot.closed_receivers, 1);
        assert_eq!(snapshot.malformed_frames, 1);
    }

    #[test]
    fn test_average_fan_out() {
        let stats = HubStats::new();
        assert_eq!(stats.snapshot().average_fan_out(), 0.0);

        stats.record_event(3);
        stats.record_event(1);
        assert_eq!(stats.snapshot().average_fan_out(), 2.0);
    }
}
