//! Phonecam signaling relay
//!
//! Pairs a phone (camera source) with a viewer and relays the WebRTC
//! handshake between them over WebSocket. Media flows peer-to-peer and never
//! touches this service.
//!
//! # Architecture
//!
//! - **Registry**: in-memory table of open connections, their role and matched peer
//! - **Relay**: per-message protocol handling, matching and disconnect propagation
//! - **Server**: axum WebSocket endpoint feeding the relay
//!
//! # Usage
//!
//! ```ignore
//! let config = Config::from_env()?;
//! server::serve(config, async { tokio::signal::ctrl_c().await.ok(); }).await?;
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod server;

pub use config::Config;
pub use error::{Error, Result};
pub use protocol::{ConnectionId, Role, Signal};
pub use registry::{Connection, Connections, Outbox, Registry, RegistryStats};
pub use relay::Relay;
