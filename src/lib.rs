//! # canvas-hub
//!
//! Real-time broadcast hub for collaborative canvases. Clients connect over
//! WebSocket at `/ws/canvas/{room}`, send 4-byte big-endian coordinates, and
//! receive every coordinate published in their room as a 6-byte frame carrying
//! the sender's connection id.
//!
//! # Example
//!
//! ```no_run
//! use canvas_hub::registry::LockedRegistry;
//! use canvas_hub::{CanvasServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> canvas_hub::Result<()> {
//!     let server = CanvasServer::<LockedRegistry>::new(ServerConfig::default());
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```
//!
//! # Modules
//!
//! - [`protocol`]: coordinate frame codec and path routing
//! - [`registry`]: connection ids, subscriptions, mailboxes and fan-out
//! - [`session`]: per-connection read/write loops
//! - [`server`]: accept loop and WebSocket upgrade
//! - [`stats`]: hub and session counters

pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use error::{Error, ProtocolError, Result};
pub use registry::{Registry, RegistryBackend, RegistryConfig, RegistryError};
pub use server::{CanvasServer, ServerConfig};
