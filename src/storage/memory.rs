//! In-memory cache implementation for development and testing
//!
//! All entries sit behind one lock, so each trait call is atomic exactly like
//! a single command on the real cache. Expiry uses tokio's clock, which lets
//! tests fast-forward through TTLs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, Instant};

use super::traits::{Cache, PushOutcome};
use crate::error::{GhostboxError, Result};

#[derive(Debug, Clone)]
enum Value {
    Counter(u64),
    List(Vec<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

/// In-memory key-value cache
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Live entry for `key`, dropping it first if it has expired
    fn live<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
        now: Instant,
    ) -> Option<&'a mut Entry> {
        if entries.get(key).map(|e| e.is_expired(now)).unwrap_or(false) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }

    /// Remove expired entries, returning how many were dropped
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries.values().filter(|e| !e.is_expired(now)).count()
    }

    /// Start periodic purge of expired entries
    pub fn start_cleanup_task(self: Arc<Self>, every: Duration) {
        tokio::spawn(async move {
            let mut ticker = interval(every);
            loop {
                ticker.tick().await;
                let purged = self.purge_expired().await;
                if purged > 0 {
                    log::debug!("Purged {} expired cache entries", purged);
                }
            }
        });
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

fn wrong_type(key: &str) -> GhostboxError {
    GhostboxError::Unavailable(format!("wrong value type at key {}", key))
}

#[async_trait]
impl Cache for MemoryCache {
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match Self::live(&mut entries, key, now) {
            Some(Entry {
                value: Value::Counter(count),
                ..
            }) => {
                *count += 1;
                Ok(*count)
            }
            Some(_) => Err(wrong_type(key)),
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Counter(1),
                        expires_at: Some(now + ttl),
                    },
                );
                Ok(1)
            }
        }
    }

    async fn incr(&self, key: &str) -> Result<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match Self::live(&mut entries, key, now) {
            Some(Entry {
                value: Value::Counter(count),
                ..
            }) => {
                *count += 1;
                Ok(*count)
            }
            Some(_) => Err(wrong_type(key)),
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Counter(1),
                        expires_at: None,
                    },
                );
                Ok(1)
            }
        }
    }

    async fn get_counter(&self, key: &str) -> Result<Option<u64>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match Self::live(&mut entries, key, now) {
            Some(Entry {
                value: Value::Counter(count),
                ..
            }) => Ok(Some(*count)),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn push_capped(
        &self,
        key: &str,
        value: &str,
        capacity: usize,
        ttl: Duration,
    ) -> Result<PushOutcome> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match Self::live(&mut entries, key, now) {
            Some(Entry {
                value: Value::List(items),
                expires_at,
            }) => {
                if items.len() >= capacity {
                    return Ok(PushOutcome::Full);
                }
                items.push(value.to_string());
                *expires_at = Some(now + ttl);
                Ok(PushOutcome::Queued(items.len()))
            }
            Some(_) => Err(wrong_type(key)),
            None => {
                if capacity == 0 {
                    return Ok(PushOutcome::Full);
                }
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::List(vec![value.to_string()]),
                        expires_at: Some(now + ttl),
                    },
                );
                Ok(PushOutcome::Queued(1))
            }
        }
    }

    async fn take_all(&self, key: &str) -> Result<Vec<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if Self::live(&mut entries, key, now).is_none() {
            return Ok(Vec::new());
        }
        match entries.remove(key) {
            Some(Entry {
                value: Value::List(items),
                ..
            }) => Ok(items),
            Some(entry) => {
                // Not a list: put it back untouched
                entries.insert(key.to_string(), entry);
                Err(wrong_type(key))
            }
            None => Ok(Vec::new()),
        }
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
