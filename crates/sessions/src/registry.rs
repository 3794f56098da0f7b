//! Session registry: `session_id → actor handle`, created on first
//! reference, rehydrated from the archive, evicted after inactivity.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use vitrine_archive::ArchiveStore;
use vitrine_domain::config::SessionsConfig;

use crate::actor::{spawn_actor, SessionHandle};
use crate::state::{SessionCaps, SessionState};

struct Entry {
    handle: SessionHandle,
    last_active: Instant,
}

/// Owns every live session actor.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Entry>>,
    caps: SessionCaps,
    idle_evict: Duration,
    rehydrate_limit: usize,
    archive: Arc<dyn ArchiveStore>,
}

impl SessionRegistry {
    pub fn new(config: &SessionsConfig, archive: Arc<dyn ArchiveStore>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            caps: SessionCaps::from(config),
            idle_evict: Duration::from_secs(config.idle_evict_secs),
            rehydrate_limit: config.rehydrate_limit,
            archive,
        }
    }

    /// Mint a fresh visitor session id.
    pub fn mint_session_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Resolve the actor for `session_id`, creating (and rehydrating) it
    /// on first reference.
    pub async fn get_or_create(&self, session_id: &str) -> SessionHandle {
        if let Some(handle) = self.touch(session_id) {
            return handle;
        }

        // First reference: rehydrate outside the lock, then insert.
        let seed = match self
            .archive
            .load_recent(session_id, self.rehydrate_limit)
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "session rehydration failed");
                Vec::new()
            }
        };

        let mut sessions = self.sessions.lock();
        // Another request may have won the race while we were loading.
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.last_active = Instant::now();
            return entry.handle.clone();
        }

        let mut state = SessionState::new(session_id, self.caps);
        if !seed.is_empty() {
            tracing::debug!(session_id, entries = seed.len(), "session rehydrated");
            state.seed_history(seed);
        }
        let handle = spawn_actor(state, self.archive.clone());
        sessions.insert(
            session_id.to_owned(),
            Entry {
                handle: handle.clone(),
                last_active: Instant::now(),
            },
        );
        handle
    }

    fn touch(&self, session_id: &str) -> Option<SessionHandle> {
        let mut sessions = self.sessions.lock();
        let entry = sessions.get_mut(session_id)?;
        entry.last_active = Instant::now();
        Some(entry.handle.clone())
    }

    /// Drop actors idle past the eviction window. Their tasks end once
    /// the last handle is gone; the archive holds the durable history.
    pub fn prune_idle(&self) {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        let idle_evict = self.idle_evict;
        sessions.retain(|_, entry| entry.last_active.elapsed() < idle_evict);
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = sessions.len(), "idle sessions evicted");
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
