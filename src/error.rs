use thiserror::Error;
use warp::http::StatusCode;

use crate::core::message_types::SystemNotice;

#[derive(Debug, Error)]
pub enum GhostboxError {
    // Input errors
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    // Mailbox errors
    #[error("Mailbox full")]
    MailboxFull,

    // Abuse protection
    #[error("Rate limit exceeded")]
    RateLimited,

    // Room errors
    #[error("Invalid room id")]
    InvalidRoom,
    #[error("Room expired")]
    RoomExpired,
    #[error("Room actor unavailable")]
    RoomClosed,
    #[error("Policy violation: {0:?}")]
    PolicyViolation(SystemNotice),

    // Access errors
    #[error("Unauthorized access")]
    Unauthorized,
    #[error("Origin not allowed: {0}")]
    OriginForbidden(String),

    // Backing cache errors
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GhostboxError {
    /// HTTP status returned to callers for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidRoom | Self::PolicyViolation(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::MailboxFull | Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::RoomExpired => StatusCode::GONE,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::OriginForbidden(_) => StatusCode::FORBIDDEN,
            Self::RoomClosed | Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to callers. Never carries internal detail.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Invalid data",
            Self::PayloadTooLarge(_) => "Payload too large",
            Self::MailboxFull => "Mailbox full",
            Self::RateLimited => "Too many requests",
            Self::InvalidRoom => "Invalid room",
            Self::RoomExpired => "Room expired",
            Self::PolicyViolation(_) => "Policy violation",
            Self::Unauthorized => "Unauthorized",
            Self::OriginForbidden(_) => "Origin not allowed",
            Self::RoomClosed | Self::Unavailable(_) => "Service unavailable",
            Self::Config(_) => "Internal server error",
        }
    }
}

impl From<reqwest::Error> for GhostboxError {
    fn from(err: reqwest::Error) -> Self {
        GhostboxError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for GhostboxError {
    fn from(err: serde_json::Error) -> Self {
        GhostboxError::Unavailable(format!("malformed cache reply: {}", err))
    }
}

// Generic result type for Ghostbox
pub type Result<T> = std::result::Result<T, GhostboxError>;
