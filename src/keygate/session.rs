//! Web session storage.
//!
//! The gateway only needs opaque get/set/remove by key plus session lifecycle
//! (create, renew, destroy). [`MemorySessionStore`] keeps everything in process
//! memory, which is enough for a single instance and for tests.

use base64::Engine;
use dashmap::DashMap;
use rand::{rngs::OsRng, RngCore};
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::debug;

pub const SESSION_COOKIE_NAME: &str = "keygate_session";

/// Originally requested URL, written before a challenge and consumed by the callback.
pub const REQUESTED_URL_KEY: &str = "keygate.requested_url";

/// JSON list of authenticated profiles.
pub const PROFILES_KEY: &str = "keygate.profiles";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
    #[error("failed to generate session id: {0}")]
    IdGeneration(String),
}

/// Absolute lifetime of a session, counted from creation or renewal.
pub const DEFAULT_SESSION_TTL_SECONDS: u64 = 12 * 60 * 60;

pub trait SessionStore: Send + Sync {
    /// Create an empty session and return its id.
    ///
    /// # Errors
    /// Returns an error if no id could be generated or the store is unavailable.
    fn create(&self) -> Result<String, SessionError>;

    /// Whether the session id refers to a live session.
    fn exists(&self, session_id: &str) -> bool;

    /// # Errors
    /// Returns an error if the store is unavailable.
    fn get(&self, session_id: &str, key: &str) -> Result<Option<String>, SessionError>;

    /// # Errors
    /// Returns an error if the store is unavailable.
    fn set(&self, session_id: &str, key: &str, value: String) -> Result<(), SessionError>;

    /// # Errors
    /// Returns an error if the store is unavailable.
    fn remove(&self, session_id: &str, key: &str) -> Result<(), SessionError>;

    /// Move the session data under a fresh id and drop the old one.
    ///
    /// # Errors
    /// Returns an error if no id could be generated or the store is unavailable.
    fn renew(&self, session_id: &str) -> Result<String, SessionError>;

    /// # Errors
    /// Returns an error if the store is unavailable.
    fn destroy(&self, session_id: &str) -> Result<(), SessionError>;

    /// Session lifetime, used as the cookie `Max-Age`. `None` keeps a browser-session cookie.
    fn ttl(&self) -> Option<Duration> {
        None
    }
}

#[derive(Debug)]
struct SessionEntry {
    data: HashMap<String, String>,
    created: Instant,
}

impl SessionEntry {
    fn new(data: HashMap<String, String>) -> Self {
        Self {
            data,
            created: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.created.elapsed() >= ttl
    }
}

/// In-process store. Expired sessions are dropped lazily on access and swept on `create`.
#[derive(Debug)]
pub struct MemorySessionStore {
    sessions: DashMap<String, SessionEntry>,
    ttl: Duration,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(DEFAULT_SESSION_TTL_SECONDS))
    }
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop every expired session.
    pub fn purge_expired(&self) {
        let ttl = self.ttl;
        self.sessions.retain(|_, entry| !entry.is_expired(ttl));
    }

    /// Whether the session is live, evicting it when it has expired.
    fn live(&self, session_id: &str) -> bool {
        let ttl = self.ttl;
        if self
            .sessions
            .remove_if(session_id, |_, entry| entry.is_expired(ttl))
            .is_some()
        {
            debug!("Session expired");
            return false;
        }
        self.sessions.contains_key(session_id)
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&self) -> Result<String, SessionError> {
        self.purge_expired();
        let id = generate_session_id()?;
        self.sessions.insert(id.clone(), SessionEntry::new(HashMap::new()));
        Ok(id)
    }

    fn exists(&self, session_id: &str) -> bool {
        self.live(session_id)
    }

    fn get(&self, session_id: &str, key: &str) -> Result<Option<String>, SessionError> {
        if !self.live(session_id) {
            return Ok(None);
        }
        Ok(self
            .sessions
            .get(session_id)
            .and_then(|entry| entry.data.get(key).cloned()))
    }

    fn set(&self, session_id: &str, key: &str, value: String) -> Result<(), SessionError> {
        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry::new(HashMap::new()));
        if entry.is_expired(self.ttl) {
            *entry = SessionEntry::new(HashMap::new());
        }
        entry.data.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, session_id: &str, key: &str) -> Result<(), SessionError> {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.data.remove(key);
        }
        Ok(())
    }

    fn renew(&self, session_id: &str) -> Result<String, SessionError> {
        let new_id = generate_session_id()?;
        let ttl = self.ttl;
        let data = self
            .sessions
            .remove(session_id)
            .filter(|(_, entry)| !entry.is_expired(ttl))
            .map(|(_, entry)| entry.data)
            .unwrap_or_default();
        self.sessions.insert(new_id.clone(), SessionEntry::new(data));
        Ok(new_id)
    }

    fn destroy(&self, session_id: &str) -> Result<(), SessionError> {
        self.sessions.remove(session_id);
        Ok(())
    }

    fn ttl(&self) -> Option<Duration> {
        Some(self.ttl)
    }
}

/// 32 random bytes, base64url without padding.
pub(crate) fn generate_session_id() -> Result<String, SessionError> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| SessionError::IdGeneration(err.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique_and_url_safe() -> Result<(), SessionError> {
        let first = generate_session_id()?;
        let second = generate_session_id()?;
        assert_ne!(first, second);
        assert_eq!(first.len(), 43);
        assert!(first
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        Ok(())
    }

    #[test]
    fn set_get_remove() -> Result<(), SessionError> {
        let store = MemorySessionStore::new();
        let id = store.create()?;
        assert!(store.exists(&id));
        store.set(&id, REQUESTED_URL_KEY, "https://host/app".to_string())?;
        assert_eq!(
            store.get(&id, REQUESTED_URL_KEY)?.as_deref(),
            Some("https://host/app")
        );
        store.remove(&id, REQUESTED_URL_KEY)?;
        assert_eq!(store.get(&id, REQUESTED_URL_KEY)?, None);
        Ok(())
    }

    #[test]
    fn renew_moves_data_to_new_id() -> Result<(), SessionError> {
        let store = MemorySessionStore::new();
        let id = store.create()?;
        store.set(&id, PROFILES_KEY, "[]".to_string())?;
        let renewed = store.renew(&id)?;
        assert_ne!(id, renewed);
        assert!(!store.exists(&id));
        assert_eq!(store.get(&renewed, PROFILES_KEY)?.as_deref(), Some("[]"));
        assert_eq!(store.len(), 1);
        Ok(())
    }

    #[test]
    fn expired_session_is_not_honored() -> Result<(), SessionError> {
        let store = MemorySessionStore::with_ttl(Duration::ZERO);
        let id = store.create()?;
        store.set(&id, PROFILES_KEY, "[]".to_string())?;
        assert!(!store.exists(&id));
        assert_eq!(store.get(&id, PROFILES_KEY)?, None);
        assert!(store.is_empty());
        Ok(())
    }

    #[test]
    fn create_sweeps_expired_sessions() -> Result<(), SessionError> {
        let store = MemorySessionStore::with_ttl(Duration::ZERO);
        for _ in 0..100 {
            store.create()?;
        }
        assert_eq!(store.len(), 1);
        Ok(())
    }

    #[test]
    fn live_sessions_survive_sweep() -> Result<(), SessionError> {
        let store = MemorySessionStore::new();
        let first = store.create()?;
        let second = store.create()?;
        store.purge_expired();
        assert!(store.exists(&first));
        assert!(store.exists(&second));
        assert_eq!(
            store.ttl(),
            Some(Duration::from_secs(DEFAULT_SESSION_TTL_SECONDS))
        );
        Ok(())
    }

    #[test]
    fn destroy_drops_session() -> Result<(), SessionError> {
        let store = MemorySessionStore::new();
        let id = store.create()?;
        store.destroy(&id)?;
        assert!(!store.exists(&id));
        assert!(store.is_empty());
        assert_eq!(store.get(&id, PROFILES_KEY)?, None);
        Ok(())
    }
}
