//! Keyed store of live sessions.
//!
//! The registry is the single source of truth for whether a session exists. It never disposes
//! anything itself: removed and evicted sessions are handed back to the caller.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::entry::Session;
use super::eviction::EvictionPolicy;
use crate::error::Result;

/// Outcome of [`SessionRegistry::get_or_create`].
#[derive(Debug)]
pub struct Acquired {
    pub session: Arc<Session>,
    /// `true` when this call constructed the session.
    pub created: bool,
    /// Sessions removed to make room. The caller must dispose them.
    pub evicted: Vec<Arc<Session>>,
}

/// Registry of sessions keyed by conversation id.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    /// One lock per key under construction, so concurrent callers for a new key build exactly one
    /// session while other keys build in parallel.
    pending: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    policy: EvictionPolicy,
}

impl SessionRegistry {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> &EvictionPolicy {
        &self.policy
    }

    /// Return the session for `conversation_id`, building it with `build` if absent.
    ///
    /// An existing session has its last access refreshed and `build` is not called. A new
    /// session is constructed first, holding only that key's pending lock; then, in one step
    /// under the map lock, the least recently used sessions are removed until there is room and
    /// the new one is inserted. The new session is therefore never its own eviction victim, and
    /// the count never exceeds the capacity once this returns.
    pub async fn get_or_create<F, Fut>(&self, conversation_id: &str, build: F) -> Result<Acquired>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Session>>,
    {
        if let Some(session) = self.lookup_and_touch(conversation_id) {
            return Ok(Acquired {
                session,
                created: false,
                evicted: Vec::new(),
            });
        }

        let mut slot = PendingSlot::claim(self, conversation_id);
        slot.acquire().await;
        if let Some(session) = self.lookup_and_touch(conversation_id) {
            return Ok(Acquired {
                session,
                created: false,
                evicted: Vec::new(),
            });
        }

        let session = Arc::new(build().await?);

        let mut sessions = self.lock();
        let mut evicted = Vec::new();
        while self.policy.at_capacity(sessions.len()) {
            let Some(victim) = self
                .policy
                .select_lru(sessions.values())
                .map(|s| s.conversation_id().to_string())
            else {
                break;
            };
            if let Some(removed) = sessions.remove(&victim) {
                evicted.push(removed);
            }
        }
        sessions.insert(conversation_id.to_string(), session.clone());

        Ok(Acquired {
            session,
            created: true,
            evicted,
        })
    }

    /// Look up a session without refreshing its last access.
    pub fn get(&self, conversation_id: &str) -> Option<Arc<Session>> {
        self.lock().get(conversation_id).cloned()
    }

    pub fn has(&self, conversation_id: &str) -> bool {
        self.lock().contains_key(conversation_id)
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Detach a session without disposing it.
    pub fn remove(&self, conversation_id: &str) -> Option<Arc<Session>> {
        self.lock().remove(conversation_id)
    }

    /// Detach a session only if `predicate` still holds under the lock.
    pub fn remove_if<P>(&self, conversation_id: &str, predicate: P) -> Option<Arc<Session>>
    where
        P: FnOnce(&Session) -> bool,
    {
        let mut sessions = self.lock();
        match sessions.get(conversation_id) {
            Some(session) if predicate(session) => sessions.remove(conversation_id),
            _ => None,
        }
    }

    /// All live sessions.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.lock().values().cloned().collect()
    }

    /// Detach every session.
    pub fn drain(&self) -> Vec<Arc<Session>> {
        self.lock().drain().map(|(_, session)| session).collect()
    }

    fn lookup_and_touch(&self, conversation_id: &str) -> Option<Arc<Session>> {
        let sessions = self.lock();
        let session = sessions.get(conversation_id)?;
        session.touch();
        Some(session.clone())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn pending_keys(&self) -> usize {
        self.lock_pending().len()
    }
}

/// A caller's claim on one key's construction lock.
///
/// The map entry is dropped with the last claim. Claims are cloned and released only under the
/// pending map lock, so the reference count checked there is exact.
struct PendingSlot<'a> {
    registry: &'a SessionRegistry,
    key: String,
    lock: Option<Arc<AsyncMutex<()>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<'a> PendingSlot<'a> {
    fn claim(registry: &'a SessionRegistry, key: &str) -> Self {
        let lock = registry
            .lock_pending()
            .entry(key.to_string())
            .or_default()
            .clone();
        Self {
            registry,
            key: key.to_string(),
            lock: Some(lock),
            guard: None,
        }
    }

    async fn acquire(&mut self) {
        if let Some(lock) = self.lock.clone() {
            self.guard = Some(lock.lock_owned().await);
        }
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut pending = self.registry.lock_pending();
        drop(self.lock.take());
        // Only the map still holds it: nobody else is waiting on this key.
        if pending
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            pending.remove(&self.key);
        }
    }
}
