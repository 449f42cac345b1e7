//! Canvas WebSocket server
//!
//! Accept loop, upgrade path check and per-connection session spawning.

pub mod config;
pub mod listener;

pub use config::{ServerConfig, DEFAULT_PORT};
pub use listener::CanvasServer;
