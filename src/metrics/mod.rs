//! Aggregate relay counters
//!
//! Process-wide, lock-free counters for the room side of the relay. Nothing
//! here is keyed by user, room or address; the admin endpoint only ever sees
//! totals.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug)]
pub struct RelayMetrics {
    started_at: Instant,
    rooms_created: AtomicU64,
    rooms_active: AtomicU64,
    rooms_expired: AtomicU64,
    connections_active: AtomicU64,
    connections_total: AtomicU64,
    messages_relayed: AtomicU64,
    messages_throttled: AtomicU64,
    policy_violations: AtomicU64,
    idle_evictions: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub rooms_created: u64,
    pub rooms_active: u64,
    pub rooms_expired: u64,
    pub connections_active: u64,
    pub connections_total: u64,
    pub messages_relayed: u64,
    pub messages_throttled: u64,
    pub policy_violations: u64,
    pub idle_evictions: u64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            rooms_created: AtomicU64::new(0),
            rooms_active: AtomicU64::new(0),
            rooms_expired: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            messages_relayed: AtomicU64::new(0),
            messages_throttled: AtomicU64::new(0),
            policy_violations: AtomicU64::new(0),
            idle_evictions: AtomicU64::new(0),
        }
    }

    pub fn room_opened(&self) {
        self.rooms_created.fetch_add(1, Ordering::Relaxed);
        self.rooms_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn room_closed(&self, expired: bool) {
        decrement(&self.rooms_active);
        if expired {
            self.rooms_expired.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn connection_opened(&self) {
        self.connections_active.fetch_add(1, Ordering::Relaxed);
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        decrement(&self.connections_active);
    }

    pub fn message_relayed(&self) {
        self.messages_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_throttled(&self) {
        self.messages_throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn policy_violation(&self) {
        self.policy_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn idle_eviction(&self) {
        self.idle_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rooms_created: self.rooms_created.load(Ordering::Relaxed),
            rooms_active: self.rooms_active.load(Ordering::Relaxed),
            rooms_expired: self.rooms_expired.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            messages_relayed: self.messages_relayed.load(Ordering::Relaxed),
            messages_throttled: self.messages_throttled.load(Ordering::Relaxed),
            policy_violations: self.policy_violations.load(Ordering::Relaxed),
            idle_evictions: self.idle_evictions.load(Ordering::Relaxed),
        }
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// Gauges never wrap below zero
fn decrement(gauge: &AtomicU64) {
    let _ = gauge.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
}

pub type SharedMetrics = Arc<RelayMetrics>;
