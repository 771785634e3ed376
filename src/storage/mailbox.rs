//! One-time mailbox store
//!
//! Senders drop opaque ciphertext under a short key they chose; the receiver
//! takes everything queued under that key in one destructive read. All state
//! lives in the backing cache.

use serde::Serialize;

use crate::config::MailboxSettings;
use crate::constants::{CACHE_KEY_PREFIX, MAILBOX_KEY_MAX_LEN, MAILBOX_KEY_MIN_LEN};
use crate::core::rate_limiter::{RateLimiter, RateRule, RateScope};
use crate::error::{GhostboxError, Result};
use crate::storage::traits::{PushOutcome, SharedCache};

pub const STATS_SEND_KEY: &str = "stats:send";
pub const STATS_GET_KEY: &str = "stats:get";

/// Result of a destructive read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TakeOutcome {
    Empty { found: bool },
    Found { found: bool, messages: Vec<String> },
}

impl TakeOutcome {
    fn empty() -> Self {
        TakeOutcome::Empty { found: false }
    }

    fn found(messages: Vec<String>) -> Self {
        TakeOutcome::Found {
            found: true,
            messages,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, TakeOutcome::Found { .. })
    }

    pub fn messages(&self) -> &[String] {
        match self {
            TakeOutcome::Found { messages, .. } => messages,
            TakeOutcome::Empty { .. } => &[],
        }
    }
}

/// Upper-case and validate a mailbox key (6-12 ASCII alphanumerics)
pub fn normalize_key(raw: &str) -> Result<String> {
    let key = raw.trim().to_ascii_uppercase();
    let len_ok = (MAILBOX_KEY_MIN_LEN..=MAILBOX_KEY_MAX_LEN).contains(&key.len());
    if !len_ok || !key.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(GhostboxError::Validation("invalid mailbox key".to_string()));
    }
    Ok(key)
}

/// Mailbox store over the shared cache
pub struct MailboxStore {
    cache: SharedCache,
    limiter: RateLimiter,
    key_rate: RateRule,
    settings: MailboxSettings,
}

impl MailboxStore {
    pub fn new(
        cache: SharedCache,
        limiter: RateLimiter,
        key_rate: RateRule,
        settings: MailboxSettings,
    ) -> Self {
        Self {
            cache,
            limiter,
            key_rate,
            settings,
        }
    }

    fn queue_key(key: &str) -> String {
        format!("{}msg:{}", CACHE_KEY_PREFIX, key)
    }

    fn stats_key(name: &str) -> String {
        format!("{}{}", CACHE_KEY_PREFIX, name)
    }

    async fn enforce_key_budget(&self, key: &str) -> Result<()> {
        if !self
            .limiter
            .check_and_increment(RateScope::MailboxKey, key, self.key_rate)
            .await?
        {
            return Err(GhostboxError::RateLimited);
        }
        Ok(())
    }

    /// Queue a payload under `key`. Returns how many payloads are now waiting.
    pub async fn put(&self, key: &str, payload: &str) -> Result<usize> {
        let key = normalize_key(key)?;
        if payload.is_empty() {
            return Err(GhostboxError::Validation("empty payload".to_string()));
        }
        if payload.len() > self.settings.max_payload_bytes {
            return Err(GhostboxError::PayloadTooLarge(payload.len()));
        }

        self.enforce_key_budget(&key).await?;

        let outcome = self
            .cache
            .push_capped(
                &Self::queue_key(&key),
                payload,
                self.settings.capacity,
                self.settings.ttl,
            )
            .await?;

        match outcome {
            PushOutcome::Queued(queued) => {
                self.bump_stat(STATS_SEND_KEY).await;
                log::debug!("Mailbox {} now holds {} payload(s)", key, queued);
                Ok(queued)
            }
            PushOutcome::Full => Err(GhostboxError::MailboxFull),
        }
    }

    /// Read and delete everything queued under `key`
    pub async fn take(&self, key: &str) -> Result<TakeOutcome> {
        let key = normalize_key(key)?;
        self.enforce_key_budget(&key).await?;

        let messages = self.cache.take_all(&Self::queue_key(&key)).await?;
        if messages.is_empty() {
            return Ok(TakeOutcome::empty());
        }

        self.bump_stat(STATS_GET_KEY).await;
        log::debug!("Mailbox {} delivered {} payload(s)", key, messages.len());
        Ok(TakeOutcome::found(messages))
    }

    /// Aggregate counters as (sends, gets)
    pub async fn stats(&self) -> Result<(u64, u64)> {
        let sends = self
            .cache
            .get_counter(&Self::stats_key(STATS_SEND_KEY))
            .await?
            .unwrap_or(0);
        let gets = self
            .cache
            .get_counter(&Self::stats_key(STATS_GET_KEY))
            .await?
            .unwrap_or(0);
        Ok((sends, gets))
    }

    // Counters are best effort; the write itself already succeeded
    async fn bump_stat(&self, name: &str) {
        if let Err(e) = self.cache.incr(&Self::stats_key(name)).await {
            log::warn!("Failed to update {} counter: {}", name, e);
        }
    }
}
