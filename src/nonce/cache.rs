//! Nonce cache backends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

/// Key-value store holding nonce state.
///
/// Implementations own their expiry policy (typically around an hour).
/// `add` and `replace` must be atomic: concurrent callers presenting the
/// same key must see exactly one of them succeed.
pub trait NonceCache: Send + Sync {
    /// Store `value` under `key` only if the key is absent.
    ///
    /// Returns `true` if the value was stored.
    fn add(&self, key: &str, value: &str) -> bool;

    /// Fetch the value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Replace the value under `key` with `new` only if it currently equals
    /// `current`.
    ///
    /// Returns `true` if the value was replaced.
    fn replace(&self, key: &str, current: &str, new: &str) -> bool;
}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// Thread-safe in-process cache with TTL-based expiry.
pub struct MemoryCache {
    /// Map of key -> value and expiry time.
    entries: Mutex<HashMap<String, Entry>>,
    /// Time-to-live for entries.
    ttl: Duration,
}

impl MemoryCache {
    /// Create a new cache with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(), // Recover from mutex poisoning
        }
    }

    /// Get the current number of stored entries. Expired entries are
    /// counted until the next `add` or cleanup removes them.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Force cleanup of expired entries.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.lock().retain(|_, entry| entry.expires_at > now);
    }

    /// Start a background cleanup task.
    ///
    /// This spawns a tokio task that periodically removes expired entries.
    /// Must be called from within a tokio runtime.
    pub fn start_cleanup_task(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            loop {
                interval_timer.tick().await;
                cache.cleanup();
            }
        })
    }
}

impl NonceCache for MemoryCache {
    fn add(&self, key: &str, value: &str) -> bool {
        let mut entries = self.lock();
        let now = Instant::now();

        // Lazy cleanup
        entries.retain(|_, entry| entry.expires_at > now);

        if entries.contains_key(key) {
            return false;
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + self.ttl,
            },
        );
        true
    }

    fn get(&self, key: &str) -> Option<String> {
        let entries = self.lock();
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    fn replace(&self, key: &str, current: &str, new: &str) -> bool {
        let mut entries = self.lock();
        let now = Instant::now();

        match entries.get_mut(key) {
            Some(entry) if entry.expires_at > now && entry.value == current => {
                entry.value = new.to_string();
                entry.expires_at = now + self.ttl;
                true
            }
            _ => false,
        }
    }
}
