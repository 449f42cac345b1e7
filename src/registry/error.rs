//! Registry error types
//!
//! Error types for connection registry operations.

/// Error type for registry operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// Connection id space is used up
    Exhausted,
    /// Broadcast loop has shut down
    Closed,
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::Exhausted => write!(f, "Connection id space exhausted"),
            RegistryError::Closed => write!(f, "Broadcast loop closed"),
        }
    }
}

impl std::error::Error for RegistryError {}
