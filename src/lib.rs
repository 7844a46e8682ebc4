//! Ventas relay
//!
//! Relays the server-initiated sales stream of the internal gRPC
//! `VentasService` to any number of WebSocket dashboard sessions.

pub mod config;
pub mod error;
pub mod proto;
pub mod relay;
pub mod types;
pub mod upstream;

pub use error::{RelayError, Result};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
