//! Core functionality for the relay

pub mod connection;
pub mod ip_extractor;
pub mod message_types;
pub mod rate_limiter;
pub mod room;
pub mod server;

// Re-export main components for convenience
pub use connection::Connection;
pub use message_types::{ClientPacket, ServerPacket, SystemNotice};
pub use rate_limiter::{RateLimiter, RateRule, RateScope};
pub use room::{normalize_room_id, RoomHandle, RoomRegistry, RoomSnapshot, RoomState};
pub use server::AppState;
