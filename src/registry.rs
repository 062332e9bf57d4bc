//! Session registry - conversation-to-session correlation state
//!
//! Maps each conversation key to at most one continuation token and
//! provides the per-key exclusivity that serializes invocations for the
//! same conversation. Storage is in-memory only; a process restart
//! loses all correlation and subsequent replies start fresh sessions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

use crate::error::SeanceError;
use crate::types::{ContinuationToken, ConversationKey, SessionInfo, SessionRecord};

/// Guard proving exclusive access to one conversation key.
///
/// Invocations for the key are serialized for as long as the guard is
/// held; dropping it (including on cancellation) releases the slot to
/// the next waiter in FIFO order.
#[derive(Debug)]
pub struct KeyGuard {
    _guard: OwnedMutexGuard<()>,
    key: ConversationKey,
}

impl KeyGuard {
    pub fn key(&self) -> &ConversationKey {
        &self.key
    }
}

/// Concurrency-safe mapping from conversation key to session record,
/// with a per-key mutual-exclusion mechanism.
///
/// Records and lock entries are keyed purely by conversation key and
/// live for the process's uptime. Distinct keys never contend: the lock
/// map is only held long enough to clone out a per-key mutex, and the
/// record map is never iterated while a key mutation is in flight.
pub struct SessionRegistry {
    /// Conversation key -> session record
    records: RwLock<HashMap<ConversationKey, SessionRecord>>,
    /// Conversation key -> exclusivity mutex (fair FIFO wait queue)
    locks: Mutex<HashMap<ConversationKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Look up the record for a conversation. Non-blocking read.
    pub fn lookup(&self, key: &ConversationKey) -> Option<SessionRecord> {
        self.records.read().get(key).cloned()
    }

    /// Create or replace the record's token and activity timestamp.
    pub fn upsert(&self, key: &ConversationKey, token: ContinuationToken) {
        let mut records = self.records.write();
        let record = records
            .entry(key.clone())
            .or_insert_with(|| SessionRecord::new(key.clone()));
        record.token = Some(token.clone());
        record.last_activity = SystemTime::now();
        drop(records);

        info!(conversation = %key, token = %token, "Recorded session token");
    }

    /// Mark an invocation attempt for a conversation, creating the
    /// record if this key has not been seen before. Called on every
    /// attempt regardless of outcome.
    pub fn touch(&self, key: &ConversationKey) {
        let mut records = self.records.write();
        let record = records
            .entry(key.clone())
            .or_insert_with(|| SessionRecord::new(key.clone()));
        record.last_activity = SystemTime::now();
    }

    /// Remove a conversation from tracking.
    ///
    /// Returns true if a record existed.
    pub fn remove(&self, key: &ConversationKey) -> bool {
        let removed = self.records.write().remove(key).is_some();
        if removed {
            info!(conversation = %key, "Removed session record");
        }
        removed
    }

    /// Whether a conversation has a tracked record.
    pub fn contains(&self, key: &ConversationKey) -> bool {
        self.records.read().contains_key(key)
    }

    /// Snapshot of all tracked sessions.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.records
            .read()
            .values()
            .map(|r| SessionInfo {
                conversation: r.conversation.clone(),
                token: r.token.clone(),
            })
            .collect()
    }

    /// Number of tracked conversations.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Acquire exclusive access to a conversation key, waiting at most
    /// `wait` for any in-flight invocation on the same key to finish.
    ///
    /// Waiters are queued fairly, so concurrent invocations for one key
    /// proceed in acquisition order. Returns `SeanceError::Busy` when
    /// the bound expires rather than blocking indefinitely.
    pub async fn acquire(
        &self,
        key: &ConversationKey,
        wait: Duration,
    ) -> Result<KeyGuard, SeanceError> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(
                locks
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };

        match tokio::time::timeout(wait, lock.lock_owned()).await {
            Ok(guard) => {
                debug!(conversation = %key, "Acquired key exclusivity");
                Ok(KeyGuard {
                    _guard: guard,
                    key: key.clone(),
                })
            }
            Err(_) => {
                debug!(conversation = %key, wait_secs = wait.as_secs(), "Key busy");
                Err(SeanceError::Busy(key.clone()))
            }
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> ConversationKey {
        ConversationKey::from(s)
    }

    #[test]
    fn test_lookup_missing_key() {
        let registry = SessionRegistry::new();
        assert!(registry.lookup(&key("T1")).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_upsert_creates_and_replaces() {
        let registry = SessionRegistry::new();
        let k = key("T1");

        registry.upsert(&k, ContinuationToken::new("s1"));
        let record = registry.lookup(&k).unwrap();
        assert_eq!(record.token.as_ref().unwrap().as_str(), "s1");

        registry.upsert(&k, ContinuationToken::new("s2"));
        let record = registry.lookup(&k).unwrap();
        assert_eq!(record.token.as_ref().unwrap().as_str(), "s2");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_touch_creates_tokenless_record() {
        let registry = SessionRegistry::new();
        let k = key("T1");

        registry.touch(&k);
        let record = registry.lookup(&k).unwrap();
        assert!(record.token.is_none());
    }

    #[test]
    fn test_remove_session() {
        let registry = SessionRegistry::new();
        let k = key("T1");

        registry.upsert(&k, ContinuationToken::new("s1"));
        assert!(registry.contains(&k));
        assert!(registry.remove(&k));
        assert!(!registry.contains(&k));
        assert!(!registry.remove(&k));
    }

    #[test]
    fn test_sessions_snapshot() {
        let registry = SessionRegistry::new();
        registry.upsert(&key("T1"), ContinuationToken::new("s1"));
        registry.touch(&key("T2"));

        let mut sessions = registry.sessions();
        sessions.sort_by(|a, b| a.conversation.as_str().cmp(b.conversation.as_str()));
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].token.as_ref().unwrap().as_str(), "s1");
        assert!(sessions[1].token.is_none());
    }

    #[tokio::test]
    async fn test_acquire_serializes_same_key() {
        let registry = Arc::new(SessionRegistry::new());
        let k = key("T1");

        let first = registry.acquire(&k, Duration::from_secs(1)).await.unwrap();

        // Held guard makes a short-bounded second acquire report busy
        let err = registry
            .acquire(&k, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, SeanceError::Busy(_)));

        drop(first);
        let second = registry.acquire(&k, Duration::from_secs(1)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_contend() {
        let registry = SessionRegistry::new();

        let g1 = registry
            .acquire(&key("T1"), Duration::from_millis(10))
            .await
            .unwrap();
        let g2 = registry
            .acquire(&key("T2"), Duration::from_millis(10))
            .await
            .unwrap();

        assert_eq!(g1.key().as_str(), "T1");
        assert_eq!(g2.key().as_str(), "T2");
    }

    #[tokio::test]
    async fn test_waiters_queue_in_order() {
        let registry = Arc::new(SessionRegistry::new());
        let k = key("T1");
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = registry.acquire(&k, Duration::from_secs(1)).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..3 {
            let registry = Arc::clone(&registry);
            let order = Arc::clone(&order);
            let k = k.clone();
            handles.push(tokio::spawn(async move {
                let _guard = registry.acquire(&k, Duration::from_secs(5)).await.unwrap();
                order.lock().push(i);
            }));
            // Let each waiter enqueue before spawning the next
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        drop(first);
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }
}
