//! # Per-node session store
//!
//! One [`Session`] per node id, created on the first admitted event and
//! removed by the idle reaper or by capacity eviction. The store hands out
//! snapshots only; every change goes through a store operation so the
//! invariants below are enforced in one place:
//!
//! - at most one live session per node id
//! - changing the active plugin clears `plugin_state`
//! - a session with a dispatch in flight is never evicted or expired
//!
//! ## Leases
//!
//! The router does not call [`SessionStore::get_or_create`] directly. It calls
//! [`SessionStore::checkout`], which creates or touches the session and marks
//! it in flight under the same lock that capacity eviction takes. Dropping the
//! returned [`SessionLease`] clears the mark, so an early return or a failed
//! plugin call leaves the session exactly as the last commit left it.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::errors::GatewayError;
use crate::config::Config;
use crate::metrics;
use crate::plugin::PluginState;

/// Conversational state of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Random id used to correlate log lines for one session lifetime.
    pub id: String,
    pub node_id: String,
    /// Menu number of the active plugin; `None` means the main menu.
    pub active_plugin: Option<u32>,
    pub plugin_state: PluginState,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    in_flight: bool,
}

impl Session {
    fn new(node_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            node_id: node_id.to_string(),
            active_plugin: None,
            plugin_state: PluginState::new(),
            created_at: now,
            last_active_at: now,
            in_flight: false,
        }
    }

    pub fn is_at_menu(&self) -> bool {
        self.active_plugin.is_none()
    }

    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_active_at
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }
}

/// Shared session table. Cloning shares the same table.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
    timeout: Duration,
    max_sessions: usize,
    max_state_bytes: usize,
}

impl SessionStore {
    /// `max_sessions == 0` and `max_state_bytes == 0` both mean unlimited.
    pub fn new(timeout: std::time::Duration, max_sessions: usize, max_state_bytes: usize) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            timeout: Duration::from_std(timeout).unwrap_or(Duration::MAX),
            max_sessions,
            max_state_bytes,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.server.session_timeout(),
            config.server.max_sessions,
            config.security.max_plugin_state_bytes,
        )
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the node's session, creating it when absent.
    ///
    /// A new node arriving at capacity evicts the least recently active session
    /// that has no dispatch in flight. When every session is in flight the call
    /// fails with [`GatewayError::CapacityExhausted`] and nothing changes.
    pub fn get_or_create(&self, node_id: &str, now: DateTime<Utc>) -> Result<Session, GatewayError> {
        let mut sessions = self.lock();
        let (session, _) = Self::get_or_create_locked(&mut sessions, node_id, now, self.max_sessions)?;
        Ok(session.clone())
    }

    fn get_or_create_locked<'a>(
        sessions: &'a mut HashMap<String, Session>,
        node_id: &str,
        now: DateTime<Utc>,
        max_sessions: usize,
    ) -> Result<(&'a mut Session, Option<Session>), GatewayError> {
        let mut evicted = None;
        if !sessions.contains_key(node_id) {
            if max_sessions > 0 && sessions.len() >= max_sessions {
                let victim = sessions
                    .values()
                    .filter(|s| !s.in_flight)
                    .min_by_key(|s| s.last_active_at)
                    .map(|s| s.node_id.clone())
                    .ok_or(GatewayError::CapacityExhausted(max_sessions))?;
                if let Some(old) = sessions.remove(&victim) {
                    info!(
                        "Evicted session {} for node {} (capacity {})",
                        old.id, old.node_id, max_sessions
                    );
                    metrics::add_sessions_evicted(1);
                    evicted = Some(old);
                }
            }
            let session = Session::new(node_id, now);
            debug!("Created session {} for node {}", session.id, node_id);
            sessions.insert(node_id.to_string(), session);
        }
        let session = sessions
            .get_mut(node_id)
            .ok_or_else(|| GatewayError::CapacityExhausted(max_sessions))?;
        Ok((session, evicted))
    }

    /// Create or touch the node's session and mark it in flight.
    pub fn checkout(&self, node_id: &str, now: DateTime<Utc>) -> Result<SessionLease, GatewayError> {
        let mut sessions = self.lock();
        let (session, evicted) =
            Self::get_or_create_locked(&mut sessions, node_id, now, self.max_sessions)?;
        session.last_active_at = now;
        session.in_flight = true;
        let snapshot = session.clone();
        drop(sessions);
        Ok(SessionLease {
            store: self.clone(),
            snapshot,
            evicted,
        })
    }

    fn release(&self, node_id: &str) {
        if let Some(session) = self.lock().get_mut(node_id) {
            session.in_flight = false;
        }
    }

    /// Update `last_active_at`. Returns false when the node has no session.
    pub fn touch(&self, node_id: &str, now: DateTime<Utc>) -> bool {
        match self.lock().get_mut(node_id) {
            Some(session) => {
                session.last_active_at = now;
                true
            }
            None => false,
        }
    }

    /// Shallow-merge `patch` into the node's plugin state.
    ///
    /// Patch keys overwrite existing keys. An absent or empty patch, or a node
    /// without a session, is a no-op. A merge whose JSON encoding would exceed
    /// the state budget is rejected and leaves the state unchanged.
    pub fn merge_state(&self, node_id: &str, patch: Option<&PluginState>) -> Result<(), GatewayError> {
        let patch = match patch {
            Some(p) if !p.is_empty() => p,
            _ => return Ok(()),
        };
        let mut sessions = self.lock();
        let Some(session) = sessions.get_mut(node_id) else {
            return Ok(());
        };
        let mut merged = session.plugin_state.clone();
        for (key, value) in patch {
            merged.insert(key.clone(), value.clone());
        }
        if self.max_state_bytes > 0 {
            let size = serde_json::to_vec(&merged).map(|v| v.len()).unwrap_or(usize::MAX);
            if size > self.max_state_bytes {
                warn!(
                    "Rejected plugin state patch for {}: {} bytes exceeds {}",
                    node_id, size, self.max_state_bytes
                );
                return Err(GatewayError::StateTooLarge {
                    node_id: node_id.to_string(),
                    size,
                    limit: self.max_state_bytes,
                });
            }
        }
        session.plugin_state = merged;
        Ok(())
    }

    /// Set or clear the active plugin. A change of plugin clears the plugin state.
    pub fn set_active_plugin(&self, node_id: &str, menu_number: Option<u32>) -> bool {
        match self.lock().get_mut(node_id) {
            Some(session) => {
                if session.active_plugin != menu_number {
                    session.active_plugin = menu_number;
                    session.plugin_state.clear();
                }
                true
            }
            None => false,
        }
    }

    /// Remove every session idle longer than the timeout and return them.
    /// Sessions with a dispatch in flight are skipped.
    pub fn drain_idle(&self, now: DateTime<Utc>) -> Vec<Session> {
        let mut sessions = self.lock();
        let expired_ids: Vec<String> = sessions
            .values()
            .filter(|s| !s.in_flight && s.idle_for(now) > self.timeout)
            .map(|s| s.node_id.clone())
            .collect();
        let expired: Vec<Session> = expired_ids
            .iter()
            .filter_map(|id| sessions.remove(id))
            .collect();
        drop(sessions);
        if !expired.is_empty() {
            metrics::add_sessions_expired(expired.len() as u64);
            for session in &expired {
                debug!(
                    "Expired session {} for node {} (created {})",
                    session.id, session.node_id, session.created_at
                );
            }
        }
        expired
    }

    /// Same as [`drain_idle`](Self::drain_idle), reporting only node ids.
    pub fn expire_idle(&self, now: DateTime<Utc>) -> Vec<String> {
        self.drain_idle(now).into_iter().map(|s| s.node_id).collect()
    }

    pub fn remove(&self, node_id: &str) -> Option<Session> {
        self.lock().remove(node_id)
    }

    /// Snapshot of the node's session.
    pub fn get(&self, node_id: &str) -> Option<Session> {
        self.lock().get(node_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }
}

/// Exclusive claim on a node's session for the duration of one dispatch.
///
/// Holds the snapshot taken at checkout. Changes are committed through the
/// store while the lease is alive; dropping the lease ends the claim.
#[derive(Debug)]
pub struct SessionLease {
    store: SessionStore,
    snapshot: Session,
    evicted: Option<Session>,
}

impl SessionLease {
    /// Session as it was at checkout (already touched).
    pub fn session(&self) -> &Session {
        &self.snapshot
    }

    pub fn node_id(&self) -> &str {
        &self.snapshot.node_id
    }

    /// Session removed to make room for this one, if any.
    pub fn evicted(&self) -> Option<&Session> {
        self.evicted.as_ref()
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.store.release(&self.snapshot.node_id);
    }
}
