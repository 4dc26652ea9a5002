//! In-process KV store.
//!
//! Backs [`KvClient::Memory`](super::KvClient::Memory) for local development
//! and tests. Expiry is checked lazily on read; counter operations preserve
//! an existing expiry like Redis `INCRBY` does.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::KvError;

#[derive(Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Shared in-memory key-value store.
#[derive(Clone, Default)]
pub struct MemoryKv {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryKv {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        // Lock poisoning only happens if a writer panicked; the map itself
        // is still consistent, so keep serving.
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(super) fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    pub(super) fn set(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let entry = Entry {
            value: value.to_owned(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.lock().insert(key.to_owned(), entry);
    }

    pub(super) fn incr_by(&self, key: &str, delta: i64) -> Result<i64, KvError> {
        let now = Instant::now();
        let mut entries = self.lock();
        let (current, expires_at) = match entries.get(key) {
            Some(entry) if entry.is_expired(now) => (0, None),
            Some(entry) => {
                let current = entry.value.parse::<i64>().map_err(|_| {
                    KvError::Command(format!("value at {key} is not an integer"))
                })?;
                (current, entry.expires_at)
            }
            None => (0, None),
        };
        let next = current + delta;
        entries.insert(
            key.to_owned(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    pub(super) fn del(&self, key: &str) {
        self.lock().remove(key);
    }

    pub(super) fn keys_matching(&self, pattern: &str) -> Vec<String> {
        let now = Instant::now();
        let entries = self.lock();
        let matches = |key: &str| {
            pattern.strip_suffix('*').map_or_else(
                || key == pattern,
                |prefix| key.starts_with(prefix),
            )
        };
        entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired(now) && matches(key))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get() {
        let kv = MemoryKv::new();
        kv.set("a", "1", None);
        assert_eq!(kv.get("a").as_deref(), Some("1"));
        assert_eq!(kv.get("missing"), None);
    }

    #[test]
    fn test_incr_preserves_expiry() {
        let kv = MemoryKv::new();
        kv.set("n", "10", Some(Duration::from_secs(60)));
        kv.incr_by("n", 5).unwrap();
        let entries = kv.lock();
        assert!(entries.get("n").unwrap().expires_at.is_some());
    }

    #[test]
    fn test_incr_on_non_integer_fails() {
        let kv = MemoryKv::new();
        kv.set("s", "hello", None);
        assert!(kv.incr_by("s", 1).is_err());
    }

    #[test]
    fn test_expired_entry_removed_on_read() {
        let kv = MemoryKv::new();
        kv.set("ttl", "x", Some(Duration::from_millis(0)));
        assert_eq!(kv.get("ttl"), None);
        assert!(kv.lock().is_empty());
    }

    #[test]
    fn test_pattern_matching() {
        let kv = MemoryKv::new();
        kv.set("cart:1", "x", None);
        kv.set("order:1", "x", None);
        assert_eq!(kv.keys_matching("cart:*"), vec!["cart:1".to_owned()]);
        assert_eq!(kv.keys_matching("order:1"), vec!["order:1".to_owned()]);
        assert!(kv.keys_matching("nope:*").is_empty());
    }
}
