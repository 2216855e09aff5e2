use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Point-in-time pool snapshot, regenerated on every read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub max_open_connections: u64,
    pub open: u64,
    pub in_use: u64,
    pub idle: u64,
    pub wait_count: u64,
    pub wait_duration: Duration,
    pub max_idle_closed: u64,
    pub max_idle_time_closed: u64,
    pub max_lifetime_closed: u64,
}

/// Lock-free counters backing [`ConnectionStats`]. Gauges are published by
/// the pool while it holds its state lock; readers never take that lock.
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    max_open: AtomicU64,
    open: AtomicU64,
    in_use: AtomicU64,
    idle: AtomicU64,
    wait_count: AtomicU64,
    wait_nanos: AtomicU64,
    max_idle_closed: AtomicU64,
    max_idle_time_closed: AtomicU64,
    max_lifetime_closed: AtomicU64,
}

/// Why a connection left the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Eviction {
    MaxIdle,
    IdleTime,
    Lifetime,
}

impl PoolCounters {
    pub(crate) fn publish(&self, open: usize, in_use: usize, idle: usize) {
        self.open.store(open as u64, Ordering::Relaxed);
        self.in_use.store(in_use as u64, Ordering::Relaxed);
        self.idle.store(idle as u64, Ordering::Relaxed);
    }

    pub(crate) fn set_max_open(&self, max_open: u32) {
        self.max_open.store(u64::from(max_open), Ordering::Relaxed);
    }

    pub(crate) fn record_wait_start(&self) {
        self.wait_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_wait(&self, waited: Duration) {
        let nanos = u64::try_from(waited.as_nanos()).unwrap_or(u64::MAX);
        self.wait_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self, reason: Eviction) {
        let counter = match reason {
            Eviction::MaxIdle => &self.max_idle_closed,
            Eviction::IdleTime => &self.max_idle_time_closed,
            Eviction::Lifetime => &self.max_lifetime_closed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ConnectionStats {
        ConnectionStats {
            max_open_connections: self.max_open.load(Ordering::Relaxed),
            open: self.open.load(Ordering::Relaxed),
            in_use: self.in_use.load(Ordering::Relaxed),
            idle: self.idle.load(Ordering::Relaxed),
            wait_count: self.wait_count.load(Ordering::Relaxed),
            wait_duration: Duration::from_nanos(self.wait_nanos.load(Ordering::Relaxed)),
            max_idle_closed: self.max_idle_closed.load(Ordering::Relaxed),
            max_idle_time_closed: self.max_idle_time_closed.load(Ordering::Relaxed),
            max_lifetime_closed: self.max_lifetime_closed.load(Ordering::Relaxed),
        }
    }
}
