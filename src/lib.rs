//! Ghostbox - one-time encrypted mailbox and ephemeral chat relay
//!
//! The server never sees plaintext. Mailboxes hold opaque ciphertext until a
//! single destructive read; rooms fan messages out between the connections
//! attached to them and vanish after a fixed lifetime.

pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod security;
pub mod storage;

// Re-export main components
pub use config::ServerConfig;
pub use core::server::AppState;
pub use error::{GhostboxError, Result};
pub use handlers::routes;
