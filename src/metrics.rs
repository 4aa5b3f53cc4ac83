//! Process-wide gateway counters.
//!
//! Counters are monotonic and shared by every dispatch lane. The reaper logs a
//! [`snapshot`] each cleanup tick and the server logs one at shutdown.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

static INBOUND: AtomicU64 = AtomicU64::new(0);
static DENIED: AtomicU64 = AtomicU64::new(0);
static RATE_LIMITED: AtomicU64 = AtomicU64::new(0);
static DISPATCH_FAILURES: AtomicU64 = AtomicU64::new(0);
static DISPATCH_TIMEOUTS: AtomicU64 = AtomicU64::new(0);
static SEND_FAILURES: AtomicU64 = AtomicU64::new(0);
static CHUNKS_SENT: AtomicU64 = AtomicU64::new(0);
static SESSIONS_EVICTED: AtomicU64 = AtomicU64::new(0);
static SESSIONS_EXPIRED: AtomicU64 = AtomicU64::new(0);

static PLUGIN_COUNTERS: OnceLock<Mutex<HashMap<String, PluginCounter>>> = OnceLock::new();

pub fn inc_inbound() {
    INBOUND.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_denied() {
    DENIED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_rate_limited() {
    RATE_LIMITED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_dispatch_failures() {
    DISPATCH_FAILURES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_dispatch_timeouts() {
    DISPATCH_TIMEOUTS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_send_failures() {
    SEND_FAILURES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_chunks_sent() {
    CHUNKS_SENT.fetch_add(1, Ordering::Relaxed);
}
pub fn add_sessions_evicted(n: u64) {
    SESSIONS_EVICTED.fetch_add(n, Ordering::Relaxed);
}
pub fn add_sessions_expired(n: u64) {
    SESSIONS_EXPIRED.fetch_add(n, Ordering::Relaxed);
}

/// Usage of a single plugin across all nodes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PluginCounter {
    pub entries: u64,
    pub exits: u64,
    pub currently_active: u64,
    pub concurrent_peak: u64,
}

fn plugin_counter_lock() -> &'static Mutex<HashMap<String, PluginCounter>> {
    PLUGIN_COUNTERS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// A node entered `plugin` from the main menu.
pub fn record_plugin_entry(plugin: &str) -> PluginCounter {
    let mut guard = plugin_counter_lock()
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    let counter = guard.entry(plugin.to_string()).or_default();
    counter.entries = counter.entries.saturating_add(1);
    counter.currently_active = counter.currently_active.saturating_add(1);
    if counter.currently_active > counter.concurrent_peak {
        counter.concurrent_peak = counter.currently_active;
    }
    *counter
}

/// A node left `plugin` (explicit exit, plugin-requested exit, or expiry).
pub fn record_plugin_exit(plugin: &str) -> PluginCounter {
    let mut guard = plugin_counter_lock()
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    let counter = guard.entry(plugin.to_string()).or_default();
    counter.exits = counter.exits.saturating_add(1);
    counter.currently_active = counter.currently_active.saturating_sub(1);
    *counter
}

pub fn plugin_counters_snapshot() -> HashMap<String, PluginCounter> {
    plugin_counter_lock()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub inbound: u64,
    pub denied: u64,
    pub rate_limited: u64,
    pub dispatch_failures: u64,
    pub dispatch_timeouts: u64,
    pub send_failures: u64,
    pub chunks_sent: u64,
    pub sessions_evicted: u64,
    pub sessions_expired: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        inbound: INBOUND.load(Ordering::Relaxed),
        denied: DENIED.load(Ordering::Relaxed),
        rate_limited: RATE_LIMITED.load(Ordering::Relaxed),
        dispatch_failures: DISPATCH_FAILURES.load(Ordering::Relaxed),
        dispatch_timeouts: DISPATCH_TIMEOUTS.load(Ordering::Relaxed),
        send_failures: SEND_FAILURES.load(Ordering::Relaxed),
        chunks_sent: CHUNKS_SENT.load(Ordering::Relaxed),
        sessions_evicted: SESSIONS_EVICTED.load(Ordering::Relaxed),
        sessions_expired: SESSIONS_EXPIRED.load(Ordering::Relaxed),
    }
}

impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "inbound={} denied={} rate_limited={} dispatch_failures={} timeouts={} send_failures={} chunks_sent={} evicted={} expired={}",
            self.inbound,
            self.denied,
            self.rate_limited,
            self.dispatch_failures,
            self.dispatch_timeouts,
            self.send_failures,
            self.chunks_sent,
            self.sessions_evicted,
            self.sessions_expired
        )
    }
}
