use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{CapacityPolicy, MemoryConfig};

use super::clock::{Clock, SystemClock};
use super::types::{Role, Session, SessionSummary, StoreStats, Turn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("session capacity reached ({max_sessions} live sessions, none expired)")]
    CapacityExceeded { max_sessions: usize },
}

/// Thread-safe in-memory session store.
///
/// Sessions live in a `DashMap`, so every mutation of one session happens
/// under that entry's shard lock. Creating a session additionally takes
/// `admission`, which makes the capacity check and the insert atomic with
/// respect to other creations. Never hold a map reference while taking
/// `admission`.
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    admission: Mutex<()>,
    max_sessions: usize,
    session_ttl: Duration,
    max_turns_per_session: usize,
    capacity_policy: CapacityPolicy,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(config: &MemoryConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &MemoryConfig, clock: Arc<dyn Clock>) -> Self {
        info!(
            max_sessions = config.max_sessions,
            ttl_secs = config.session_ttl_seconds,
            max_turns = config.max_turns_per_session,
            policy = ?config.capacity_policy,
            "Initializing session store"
        );
        Self {
            sessions: DashMap::new(),
            admission: Mutex::new(()),
            max_sessions: config.max_sessions.max(1),
            session_ttl: Duration::from_secs(config.session_ttl_seconds),
            max_turns_per_session: config.max_turns_per_session.max(1),
            capacity_policy: config.capacity_policy,
            clock,
        }
    }

    /// Create a session under a fresh random id.
    pub fn create_session(&self) -> Result<SessionSummary, MemoryError> {
        let id = Uuid::new_v4().to_string();

        let _admission = self.admission.lock();
        let now = self.clock.now();
        self.make_room(now)?;

        let session = Session::new(id.clone(), now);
        let summary = session.summary(self.max_turns_per_session);
        self.sessions.insert(id, session);

        debug!(session_id = %summary.session_id, "Created session");
        Ok(summary)
    }

    /// Return the live session for `id`, creating it (or replacing an expired
    /// one) under that exact id when needed.
    pub fn ensure_session(&self, id: &str) -> Result<Session, MemoryError> {
        if let Some(session) = self.get_session(id) {
            return Ok(session);
        }

        let _admission = self.admission.lock();
        let now = self.clock.now();

        // Another request may have created it while we waited for admission.
        if let Some(entry) = self.sessions.get(id) {
            if !self.is_expired(&entry, now) {
                return Ok(entry.value().clone());
            }
        }
        if self
            .sessions
            .remove_if(id, |_, s| self.is_expired(s, now))
            .is_some()
        {
            debug!(session_id = %id, "Replacing expired session");
        }

        self.make_room(now)?;

        let session = Session::new(id, now);
        self.sessions.insert(id.to_string(), session.clone());
        debug!(session_id = %id, "Auto-created session");
        Ok(session)
    }

    /// Get a live session. An expired session is removed and reported as absent.
    pub fn get_session(&self, id: &str) -> Option<Session> {
        let now = self.clock.now();
        let entry = self.sessions.get(id)?;

        if self.is_expired(&entry, now) {
            drop(entry); // Release read lock
            self.evict_if_expired(id, now);
            return None;
        }

        Some(entry.value().clone())
    }

    /// Append a turn, creating the session if needed, and return the stored turn.
    pub fn append_turn(
        &self,
        id: &str,
        role: Role,
        content: impl Into<String>,
    ) -> Result<Turn, MemoryError> {
        let content = content.into();

        loop {
            if let Some(mut entry) = self.sessions.get_mut(id) {
                // Read the clock under the entry lock so turn timestamps follow append order.
                let now = self.clock.now();
                if !self.is_expired(&entry, now) {
                    let turn = Turn::new(role, content, now);
                    entry.push_turn(turn.clone(), self.max_turns_per_session);
                    debug!(session_id = %id, %role, turns = entry.turns.len(), "Appended turn");
                    return Ok(turn);
                }
            }

            // Absent, expired, or deleted concurrently: resolve and retry.
            self.ensure_session(id)?;
        }
    }

    /// The most recent turns of a live session, oldest first.
    /// `None` or `Some(0)` returns everything stored.
    pub fn recent_turns(&self, id: &str, limit: Option<usize>) -> Vec<Turn> {
        self.get_session(id)
            .map(|s| s.tail(limit).to_vec())
            .unwrap_or_default()
    }

    /// Empty a session's turns while keeping its identity.
    pub fn clear_turns(&self, id: &str) -> bool {
        let now = self.clock.now();
        let Some(mut entry) = self.sessions.get_mut(id) else {
            return false;
        };

        if self.is_expired(&entry, now) {
            drop(entry);
            self.evict_if_expired(id, now);
            return false;
        }

        entry.clear_turns(now);
        debug!(session_id = %id, "Cleared session turns");
        true
    }

    pub fn delete_session(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            debug!(session_id = %id, "Deleted session");
        }
        removed
    }

    /// Number of stored sessions, including expired ones not yet evicted.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_summary(&self, id: &str) -> Option<SessionSummary> {
        self.get_session(id)
            .map(|s| s.summary(self.max_turns_per_session))
    }

    /// Remove every expired session. Returns number of sessions removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !self.is_expired(s, now));
        let removed = before.saturating_sub(self.sessions.len());

        if removed > 0 {
            info!("Purged {} expired sessions", removed);
        }

        removed
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            active_sessions: self.session_count(),
            max_sessions: self.max_sessions,
            max_turns_per_session: self.max_turns_per_session,
        }
    }

    fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        match now.signed_duration_since(session.updated_at).to_std() {
            Ok(idle) => idle > self.session_ttl,
            // updated_at in the future
            Err(_) => false,
        }
    }

    fn evict_if_expired(&self, id: &str, now: DateTime<Utc>) {
        // A concurrent append may have refreshed it since we looked.
        if self
            .sessions
            .remove_if(id, |_, s| self.is_expired(s, now))
            .is_some()
        {
            debug!(session_id = %id, "Session expired, removed from store");
        }
    }

    /// Must be called with `admission` held.
    fn make_room(&self, now: DateTime<Utc>) -> Result<(), MemoryError> {
        if self.sessions.len() < self.max_sessions {
            return Ok(());
        }

        self.sessions.retain(|_, s| !self.is_expired(s, now));
        if self.sessions.len() < self.max_sessions {
            return Ok(());
        }

        match self.capacity_policy {
            CapacityPolicy::Reject => {
                warn!(
                    max_sessions = self.max_sessions,
                    "Session store full, rejecting new session"
                );
                Err(MemoryError::CapacityExceeded {
                    max_sessions: self.max_sessions,
                })
            }
            CapacityPolicy::EvictLeastRecent => {
                while self.sessions.len() >= self.max_sessions {
                    let oldest = self
                        .sessions
                        .iter()
                        .min_by_key(|e| e.value().updated_at)
                        .map(|e| e.key().clone());

                    let Some(victim) = oldest else { break };
                    warn!(session_id = %victim, "Session store full, evicting least recently updated session");
                    self.sessions.remove(&victim);
                }
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.sessions.len())
            .field("max_sessions", &self.max_sessions)
            .field("session_ttl", &self.session_ttl)
            .field("max_turns_per_session", &self.max_turns_per_session)
            .field("capacity_policy", &self.capacity_policy)
            .finish()
    }
}
