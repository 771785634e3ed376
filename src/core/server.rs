//! Shared server state handed to every request handler

use std::sync::Arc;
use std::time::Duration;

use crate::config::{CacheBackend, ServerConfig};
use crate::constants::CACHE_PURGE_INTERVAL_SECS;
use crate::core::ip_extractor::IpExtractionConfig;
use crate::core::rate_limiter::RateLimiter;
use crate::core::room::RoomRegistry;
use crate::error::Result;
use crate::metrics::{RelayMetrics, SharedMetrics};
use crate::storage::mailbox::MailboxStore;
use crate::storage::memory::MemoryCache;
use crate::storage::traits::SharedCache;
use crate::storage::upstash::UpstashCache;

/// Everything the gateway needs, cheap to clone into filters
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub cache: SharedCache,
    pub limiter: RateLimiter,
    pub mailbox: Arc<MailboxStore>,
    pub rooms: Arc<RoomRegistry>,
    pub metrics: SharedMetrics,
    pub ip_config: IpExtractionConfig,
}

impl AppState {
    /// Wire the components together over an existing cache
    pub fn new(config: ServerConfig, cache: SharedCache) -> Self {
        let metrics: SharedMetrics = Arc::new(RelayMetrics::new());
        let limiter = RateLimiter::new(Arc::clone(&cache));
        let mailbox = Arc::new(MailboxStore::new(
            Arc::clone(&cache),
            limiter.clone(),
            config.key_rate,
            config.mailbox.clone(),
        ));
        let rooms = Arc::new(RoomRegistry::new(config.room.clone(), Arc::clone(&metrics)));
        let ip_config =
            IpExtractionConfig::new(config.trust_proxy_headers, config.trusted_proxies.clone());

        Self {
            config: Arc::new(config),
            cache,
            limiter,
            mailbox,
            rooms,
            metrics,
            ip_config,
        }
    }

    /// Build the configured cache backend, then the state around it.
    /// Must run inside a tokio runtime.
    pub fn from_config(config: ServerConfig) -> Result<Self> {
        let cache: SharedCache = match &config.cache {
            CacheBackend::Memory => {
                log::warn!("Using in-memory cache: mailbox contents will not survive a restart");
                let memory = Arc::new(MemoryCache::new());
                Arc::clone(&memory)
                    .start_cleanup_task(Duration::from_secs(CACHE_PURGE_INTERVAL_SECS));
                memory as SharedCache
            }
            CacheBackend::Upstash { url, token } => {
                Arc::new(UpstashCache::new(url.clone(), token.clone())?) as SharedCache
            }
        };
        Ok(Self::new(config, cache))
    }
}
