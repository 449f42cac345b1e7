//! Registry configuration

/// Size of the connection id space (`u16`)
pub const MAX_CONNECTION_IDS: u32 = 1 << 16;

/// Default per-connection mailbox capacity
pub const DEFAULT_MAILBOX_CAPACITY: usize = 32;

/// Default capacity of the publish queue feeding the broadcast loop
pub const DEFAULT_EVENT_CAPACITY: usize = 1;

/// How the broadcast loop hands a value to a full mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Wait for mailbox capacity. A stalled consumer stalls the whole loop.
    #[default]
    Blocking,
    /// Drop the value and count it when the mailbox is full
    DropWhenFull,
}

/// Registry configuration options
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Number of connection ids available (at most [`MAX_CONNECTION_IDS`])
    pub max_connections: u32,

    /// Reuse ids released by `delete_connection`
    pub recycle_ids: bool,

    /// Per-connection delivery channel capacity
    pub mailbox_capacity: usize,

    /// Publish queue capacity; `publish` waits when it is full
    pub event_capacity: usize,

    /// Delivery behavior on full mailboxes
    pub delivery_mode: DeliveryMode,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_connections: MAX_CONNECTION_IDS,
            recycle_ids: false,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            delivery_mode: DeliveryMode::Blocking,
        }
    }
}

impl RegistryConfig {
    /// Set the number of connection ids (capped at [`MAX_CONNECTION_IDS`])
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.min(MAX_CONNECTION_IDS);
        self
    }

    /// Enable or disable id recycling
    pub fn recycle_ids(mut self, recycle: bool) -> Self {
        self.recycle_ids = recycle;
        self
    }

    /// Set the mailbox capacity (at least 1)
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity.max(1);
        self
    }

    /// Set the publish queue capacity (at least 1)
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Set the delivery mode
    pub fn delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.delivery_mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();

        assert_eq!(config.max_connections, 65_536);
        assert!(!config.recycle_ids);
        assert_eq!(config.mailbox_capacity, DEFAULT_MAILBOX_CAPACITY);
        assert_eq!(config.event_capacity, 1);
        assert_eq!(config.delivery_mode, DeliveryMode::Blocking);
    }

    #[test]
    fn test_builder_max_connections_capped() {
        let config = RegistryConfig::default().max_connections(u32::MAX);
        assert_eq!(config.max_connections, MAX_CONNECTION_IDS);

        let config = RegistryConfig::default().max_connections(10);
        assert_eq!(config.max_connections, 10);
    }

    #[test]
    fn test_builder_capacities_nonzero() {
        let config = RegistryConfig::default()
            .mailbox_capacity(0)
            .event_capacity(0);

        assert_eq!(config.mailbox_capacity, 1);
        assert_eq!(config.event_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = RegistryConfig::default()
            .recycle_ids(true)
            .mailbox_capacity(4)
            .event_capacity(16)
            .delivery_mode(DeliveryMode::DropWhenFull);

        assert!(config.recycle_ids);
        assert_eq!(config.mailbox_capacity, 4);
        assert_eq!(config.event_capacity, 16);
        assert_eq!(config.delivery_mode, DeliveryMode::DropWhenFull);
    }
}
