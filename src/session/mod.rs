//! Per-connection session handling

pub mod connection;
pub mod context;

pub use connection::{Session, SessionEnd};
pub use context::SessionContext;
