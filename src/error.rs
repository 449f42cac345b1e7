//! Error types
//!
//! Crate-level error type plus the protocol error raised by the wire codec.
//! Registry errors live in [`crate::registry::RegistryError`].

use std::time::Duration;

use tokio_tungstenite::tungstenite;

use crate::registry::RegistryError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Socket I/O failure
    Io(std::io::Error),
    /// WebSocket protocol or transport failure
    WebSocket(tungstenite::Error),
    /// Wire protocol violation
    Protocol(ProtocolError),
    /// Registry operation failed
    Registry(RegistryError),
    /// Invalid configuration value
    Config(String),
    /// Upgrade handshake did not complete in time
    HandshakeTimeout(Duration),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::WebSocket(e) => write!(f, "WebSocket error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Registry(e) => write!(f, "Registry error: {}", e),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::HandshakeTimeout(after) => {
                write!(f, "Handshake timed out after {}ms", after.as_millis())
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::WebSocket(e) => Some(e),
            Error::Protocol(e) => Some(e),
            Error::Registry(e) => Some(e),
            Error::Config(_) | Error::HandshakeTimeout(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Self {
        Error::WebSocket(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}

/// Wire protocol errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload length does not match the frame layout
    MalformedFrame { expected: usize, actual: usize },
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::MalformedFrame { expected, actual } => write!(
                f,
                "Malformed frame: expected {} bytes, got {}",
                expected, actual
            ),
        }
    }
}

impl std::error::Error for ProtocolError {}
