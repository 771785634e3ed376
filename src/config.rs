//! Server configuration module
//! Handles dynamic configuration parameters for the relay

use crate::constants::*;
use crate::core::rate_limiter::RateRule;
use crate::error::{GhostboxError, Result};
use std::env;
use std::net::IpAddr;
use std::time::Duration;
use url::Url;

/// Limits applied by the mailbox store
#[derive(Debug, Clone)]
pub struct MailboxSettings {
    pub capacity: usize,
    pub ttl: Duration,
    pub max_payload_bytes: usize,
}

impl Default for MailboxSettings {
    fn default() -> Self {
        Self {
            capacity: MAILBOX_CAPACITY,
            ttl: Duration::from_secs(MAILBOX_TTL_SECS),
            max_payload_bytes: MAX_PAYLOAD_BYTES,
        }
    }
}

/// Lifetime and abuse limits applied by every room actor
#[derive(Debug, Clone)]
pub struct RoomSettings {
    pub ttl: Duration,
    pub idle_timeout: Duration,
    pub throttle: Duration,
    pub max_packet_chars: usize,
    pub inbox_capacity: usize,
    pub expired_grace: Duration,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(ROOM_TTL_SECS),
            idle_timeout: Duration::from_secs(ROOM_IDLE_TIMEOUT_SECS),
            throttle: Duration::from_millis(ROOM_THROTTLE_MILLIS),
            max_packet_chars: MAX_PACKET_CHARS,
            inbox_capacity: ROOM_INBOX_CAPACITY,
            expired_grace: Duration::from_secs(ROOM_EXPIRED_GRACE_SECS),
        }
    }
}

/// Where the backing cache lives
#[derive(Debug, Clone)]
pub enum CacheBackend {
    /// In-process cache, development and tests only
    Memory,
    /// Redis-compatible REST endpoint
    Upstash { url: String, token: String },
}

/// Server configuration parameters
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cache: CacheBackend,
    /// Shared secret for the admin endpoints. `None` disables them.
    pub admin_token: Option<String>,
    /// Empty means any origin is accepted
    pub allowed_origins: Vec<String>,
    /// Development mode (in-memory cache fallback, optional admin token)
    pub development_mode: bool,
    pub trust_proxy_headers: bool,
    pub trusted_proxies: Vec<IpAddr>,
    pub mailbox: MailboxSettings,
    pub room: RoomSettings,
    pub ip_rate: RateRule,
    pub key_rate: RateRule,
    /// TLS configuration
    pub enable_tls: bool,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
}

impl ServerConfig {
    /// Development configuration backed by the in-memory cache
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            cache: CacheBackend::Memory,
            admin_token: Some("test-admin-token-0123456789abcdef".to_string()),
            allowed_origins: Vec::new(),
            development_mode: true,
            trust_proxy_headers: false,
            trusted_proxies: Vec::new(),
            mailbox: MailboxSettings::default(),
            room: RoomSettings::default(),
            ip_rate: RateRule::per_ip(),
            key_rate: RateRule::per_mailbox_key(),
            enable_tls: false,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }

    /// Validate that the admin secret meets security requirements
    fn validate_admin_token(token: &str) -> Result<()> {
        if token.len() < MIN_ADMIN_TOKEN_LEN {
            return Err(GhostboxError::Config(format!(
                "Admin token must be at least {} characters long",
                MIN_ADMIN_TOKEN_LEN
            )));
        }

        let insecure_patterns = ["change-this", "your-secret", "password", "12345", "admin"];
        let lowered = token.to_lowercase();
        for pattern in &insecure_patterns {
            if lowered.contains(pattern) {
                return Err(GhostboxError::Config(format!(
                    "Admin token contains insecure pattern '{}'. Generate one with: openssl rand -base64 32",
                    pattern
                )));
            }
        }

        Ok(())
    }

    /// Normalise and validate one allowed origin (scheme://host[:port])
    pub fn parse_origin(raw: &str) -> Result<String> {
        let url = Url::parse(raw.trim())
            .map_err(|e| GhostboxError::Config(format!("Invalid origin '{}': {}", raw, e)))?;
        if url.host_str().is_none() || !matches!(url.scheme(), "http" | "https") {
            return Err(GhostboxError::Config(format!(
                "Origin '{}' must be an http(s) origin",
                raw
            )));
        }
        Ok(url.origin().ascii_serialization())
    }

    fn parse_cache_url(raw: &str) -> Result<String> {
        let url = Url::parse(raw.trim())
            .map_err(|e| GhostboxError::Config(format!("Invalid cache URL: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(GhostboxError::Config(
                "Cache URL must use http or https".to_string(),
            ));
        }
        Ok(url.as_str().trim_end_matches('/').to_string())
    }

    fn flag(name: &str) -> bool {
        env::var(name)
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let host = env::var("GHOSTBOX_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = env::var("GHOSTBOX_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let development_mode = Self::flag("GHOSTBOX_DEVELOPMENT_MODE");

        let cache_url = env::var("GHOSTBOX_CACHE_URL")
            .or_else(|_| env::var("UPSTASH_REDIS_REST_URL"))
            .ok()
            .filter(|v| !v.trim().is_empty());
        let cache_token = env::var("GHOSTBOX_CACHE_TOKEN")
            .or_else(|_| env::var("UPSTASH_REDIS_REST_TOKEN"))
            .ok()
            .filter(|v| !v.trim().is_empty());

        let cache = match (cache_url, cache_token) {
            (Some(url), Some(token)) => CacheBackend::Upstash {
                url: Self::parse_cache_url(&url)?,
                token,
            },
            (Some(_), None) => {
                return Err(GhostboxError::Config(
                    "GHOSTBOX_CACHE_TOKEN is required when a cache URL is set".to_string(),
                ))
            }
            (None, _) if development_mode => CacheBackend::Memory,
            (None, _) => {
                return Err(GhostboxError::Config(
                    "GHOSTBOX_CACHE_URL is required outside development mode".to_string(),
                ))
            }
        };

        let admin_token = env::var("GHOSTBOX_ADMIN_TOKEN")
            .or_else(|_| env::var("ADMIN_TOKEN"))
            .ok()
            .filter(|v| !v.is_empty());
        match &admin_token {
            Some(token) => Self::validate_admin_token(token)?,
            None if !development_mode => {
                return Err(GhostboxError::Config(
                    "GHOSTBOX_ADMIN_TOKEN environment variable is required. \
                     Generate one with: openssl rand -base64 32"
                        .to_string(),
                ))
            }
            None => {}
        }

        let allowed_origins = env::var("GHOSTBOX_ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .filter(|o| !o.trim().is_empty())
            .map(Self::parse_origin)
            .collect::<Result<Vec<_>>>()?;

        let trust_proxy_headers = Self::flag("GHOSTBOX_TRUST_PROXY_HEADERS");
        let trusted_proxies = env::var("GHOSTBOX_TRUSTED_PROXIES")
            .unwrap_or_default()
            .split(',')
            .filter(|p| !p.trim().is_empty())
            .map(|p| {
                p.trim().parse::<IpAddr>().map_err(|e| {
                    GhostboxError::Config(format!("Invalid trusted proxy '{}': {}", p, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // TLS configuration
        let enable_tls = Self::flag("GHOSTBOX_ENABLE_TLS");
        let tls_cert_path = env::var("GHOSTBOX_TLS_CERT_PATH").ok();
        let tls_key_path = env::var("GHOSTBOX_TLS_KEY_PATH").ok();

        if enable_tls {
            match (&tls_cert_path, &tls_key_path) {
                (Some(cert_path), Some(key_path)) => {
                    if !std::path::Path::new(cert_path).exists() {
                        return Err(GhostboxError::Config(format!(
                            "TLS certificate file does not exist: {}",
                            cert_path
                        )));
                    }
                    if !std::path::Path::new(key_path).exists() {
                        return Err(GhostboxError::Config(format!(
                            "TLS private key file does not exist: {}",
                            key_path
                        )));
                    }
                }
                _ => {
                    return Err(GhostboxError::Config(
                        "TLS is enabled but GHOSTBOX_TLS_CERT_PATH or GHOSTBOX_TLS_KEY_PATH is not set"
                            .to_string(),
                    ))
                }
            }
        }

        Ok(Self {
            host,
            port,
            cache,
            admin_token,
            allowed_origins,
            development_mode,
            trust_proxy_headers,
            trusted_proxies,
            mailbox: MailboxSettings::default(),
            room: RoomSettings::default(),
            ip_rate: RateRule::per_ip(),
            key_rate: RateRule::per_mailbox_key(),
            enable_tls,
            tls_cert_path,
            tls_key_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_testing_uses_memory_cache() {
        let config = ServerConfig::for_testing();
        assert!(config.development_mode);
        assert!(matches!(config.cache, CacheBackend::Memory));
        assert_eq!(config.mailbox.capacity, 5);
        assert_eq!(config.room.ttl, Duration::from_secs(120));
    }

    #[test]
    fn test_admin_token_rules() {
        assert!(ServerConfig::validate_admin_token("short").is_err());
        assert!(ServerConfig::validate_admin_token("change-this-to-something-long").is_err());
        assert!(ServerConfig::validate_admin_token("q8Vt2mZr9LxK4pWc7NbE1sYh").is_ok());
    }

    #[test]
    fn test_parse_origin() {
        assert_eq!(
            ServerConfig::parse_origin("https://chat.example.org/").unwrap(),
            "https://chat.example.org"
        );
        assert_eq!(
            ServerConfig::parse_origin(" http://localhost:5173 ").unwrap(),
            "http://localhost:5173"
        );
        assert!(ServerConfig::parse_origin("not an origin").is_err());
        assert!(ServerConfig::parse_origin("ftp://example.org").is_err());
    }

    #[test]
    fn test_parse_cache_url() {
        assert_eq!(
            ServerConfig::parse_cache_url("https://eu1-cache.upstash.io/").unwrap(),
            "https://eu1-cache.upstash.io"
        );
        assert!(ServerConfig::parse_cache_url("redis://localhost:6379").is_err());
    }
}
