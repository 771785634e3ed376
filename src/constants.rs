// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8787;
pub const ROOM_PATH: &str = "room";
pub const MAILBOX_PATH: &str = "mailbox";

// Backing cache key namespace
pub const CACHE_KEY_PREFIX: &str = "securemsg:";
pub const CACHE_REQUEST_TIMEOUT_SECS: u64 = 5;
pub const CACHE_PURGE_INTERVAL_SECS: u64 = 60;

// Mailbox limits
pub const MAILBOX_KEY_MIN_LEN: usize = 6;
pub const MAILBOX_KEY_MAX_LEN: usize = 12;
pub const MAILBOX_CAPACITY: usize = 5;
pub const MAILBOX_TTL_SECS: u64 = 24 * 60 * 60;
pub const MAX_PAYLOAD_BYTES: usize = 16 * 1024;
/// Request bodies carry the payload plus a small JSON envelope
pub const MAX_BODY_BYTES: u64 = (MAX_PAYLOAD_BYTES as u64) + 1024;

// Room limits
pub const ROOM_ID_MIN_LEN: usize = 5;
pub const ROOM_ID_MAX_LEN: usize = 10;
pub const ROOM_TTL_SECS: u64 = 120;
pub const ROOM_IDLE_TIMEOUT_SECS: u64 = 55;
pub const ROOM_THROTTLE_MILLIS: u64 = 1500;
pub const MAX_PACKET_CHARS: usize = 200;
pub const MAX_FRAME_BYTES: usize = 4 * 1024;
pub const ROOM_INBOX_CAPACITY: usize = 256;
/// How long an expired room id keeps refusing upgrades
pub const ROOM_EXPIRED_GRACE_SECS: u64 = 60 * 60;

// Rate limiting
pub const IP_RATE_WINDOW_SECS: u64 = 60;
pub const IP_RATE_MAX: u64 = 60;
pub const KEY_RATE_WINDOW_SECS: u64 = 300;
pub const KEY_RATE_MAX: u64 = 15;

// Admin
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";
pub const MIN_ADMIN_TOKEN_LEN: usize = 24;
pub const ADMIN_AUTH_MIN_MILLIS: u64 = 100;
