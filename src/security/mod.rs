//! Security utilities

pub mod headers;
pub mod timing;

pub use headers::{json_reply, with_api_security_headers};
pub use timing::{constant_time_eq, secret_matches, AuthTimer};
