//! Rate limiting module to prevent abuse
//!
//! Fixed windows over cache counters: the first hit creates the counter and
//! starts the window, later hits share it until the cache expires it.

use sha2::{Digest, Sha256};
use std::net::IpAddr;
use std::time::Duration;

use crate::constants::{
    CACHE_KEY_PREFIX, IP_RATE_MAX, IP_RATE_WINDOW_SECS, KEY_RATE_MAX, KEY_RATE_WINDOW_SECS,
};
use crate::error::Result;
use crate::storage::traits::SharedCache;

/// What a counter is keyed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateScope {
    /// Per source address, guarding the gateway as a whole
    Ip,
    /// Per mailbox key, guarding one mailbox against key guessing
    MailboxKey,
}

impl RateScope {
    fn prefix(self) -> &'static str {
        match self {
            RateScope::Ip => "rl:ip:",
            RateScope::MailboxKey => "rl:key:",
        }
    }
}

/// Window length and call budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateRule {
    pub window: Duration,
    pub max: u64,
}

impl RateRule {
    pub fn new(window: Duration, max: u64) -> Self {
        Self { window, max }
    }

    /// 60 requests per 60 seconds
    pub fn per_ip() -> Self {
        Self::new(Duration::from_secs(IP_RATE_WINDOW_SECS), IP_RATE_MAX)
    }

    /// 15 requests per 5 minutes
    pub fn per_mailbox_key() -> Self {
        Self::new(Duration::from_secs(KEY_RATE_WINDOW_SECS), KEY_RATE_MAX)
    }
}

/// Counter-based rate limiter shared by the gateway and the mailbox store
#[derive(Clone)]
pub struct RateLimiter {
    cache: SharedCache,
}

impl RateLimiter {
    pub fn new(cache: SharedCache) -> Self {
        Self { cache }
    }

    /// Count one call and report whether it is within budget.
    ///
    /// Calls over budget still increment, so a client that keeps retrying stays
    /// blocked until the window expires on its own.
    pub async fn check_and_increment(
        &self,
        scope: RateScope,
        id: &str,
        rule: RateRule,
    ) -> Result<bool> {
        let key = format!("{}{}{}", CACHE_KEY_PREFIX, scope.prefix(), id);
        let count = self.cache.incr_with_expiry(&key, rule.window).await?;
        let allowed = count <= rule.max;
        if !allowed {
            log::debug!("Rate limit exceeded for {:?} ({}/{})", scope, count, rule.max);
        }
        Ok(allowed)
    }

    /// Per-address check. The address is hashed so the cache never holds it.
    pub async fn check_ip(&self, ip: IpAddr, rule: RateRule) -> Result<bool> {
        self.check_and_increment(RateScope::Ip, &hash_ip(ip), rule)
            .await
    }
}

/// Hex SHA-256 of the textual address
pub fn hash_ip(ip: IpAddr) -> String {
    let digest = Sha256::digest(ip.to_string().as_bytes());
    format!("{:x}", digest)
}
