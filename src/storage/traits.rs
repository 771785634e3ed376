//! Abstract interface over the external key-value cache
//!
//! Every operation here is a single atomic step on the backing cache. The
//! mailbox store and the rate limiter rely on that: nothing above this trait
//! takes an in-process lock to get exactly-once or bounded-window semantics.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// Outcome of appending to a capped list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Value appended, list now holds this many items
    Queued(usize),
    /// List already at capacity, nothing written
    Full,
}

/// Key-value cache primitives
#[async_trait]
pub trait Cache: Send + Sync {
    /// Increment a counter, attaching `ttl` only when this call created it.
    /// Later increments never extend the expiry.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64>;

    /// Increment a counter that never expires
    async fn incr(&self, key: &str) -> Result<u64>;

    /// Read a counter without changing it
    async fn get_counter(&self, key: &str) -> Result<Option<u64>>;

    /// Append `value` unless the list already holds `capacity` items.
    /// A successful append resets the whole key's expiry to `ttl`.
    async fn push_capped(
        &self,
        key: &str,
        value: &str,
        capacity: usize,
        ttl: Duration,
    ) -> Result<PushOutcome>;

    /// Return every queued value and delete the key in one step
    async fn take_all(&self, key: &str) -> Result<Vec<String>>;

    /// Health check for the cache backend
    async fn health_check(&self) -> Result<bool>;
}

pub type SharedCache = Arc<dyn Cache>;
