//! Ephemeral TTL cache seam used by the IP pipeline.
//!
//! The durable blocklist is the source of truth; the cache only bounds how
//! often it is consulted. `MemoryCache` is the in-process implementation; a
//! shared store (e.g. Redis) can be swapped in behind the same trait.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str, ttl: Duration);
    /// Increment a counter key, initializing it to 1 with `ttl` when absent.
    /// An existing key keeps its original expiry.
    fn incr(&self, key: &str, ttl: Duration) -> u64;
    fn delete(&self, key: &str);
}

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if entry.live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, entry| entry.live(now));
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
    }

    fn incr(&self, key: &str, ttl: Duration) -> u64 {
        let now = Instant::now();
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = entries.get_mut(key) {
            if entry.live(now) {
                let next = entry.value.parse::<u64>().unwrap_or(0).saturating_add(1);
                entry.value = next.to_string();
                return next;
            }
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: "1".to_string(),
                expires_at: now + ttl,
            },
        );
        1
    }

    fn delete(&self, key: &str) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn set_get_round_trip() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("missing"), None);

        cache.set("key", "value", Duration::from_secs(60));
        assert_eq!(cache.get("key"), Some("value".to_string()));

        cache.set("key", "updated", Duration::from_secs(60));
        assert_eq!(cache.get("key"), Some("updated".to_string()));
    }

    #[test]
    fn entries_expire() {
        let cache = MemoryCache::new();
        cache.set("key", "value", Duration::from_millis(10));
        sleep(Duration::from_millis(25));
        assert_eq!(cache.get("key"), None);
    }

    #[test]
    fn incr_initializes_then_counts() {
        let cache = MemoryCache::new();
        assert_eq!(cache.incr("attempts", Duration::from_secs(60)), 1);
        assert_eq!(cache.incr("attempts", Duration::from_secs(60)), 2);
        assert_eq!(cache.incr("attempts", Duration::from_secs(60)), 3);
    }

    #[test]
    fn incr_keeps_the_original_expiry() {
        let cache = MemoryCache::new();
        cache.incr("attempts", Duration::from_millis(20));
        cache.incr("attempts", Duration::from_secs(60));
        sleep(Duration::from_millis(35));
        // The second incr must not have extended the 20 ms window.
        assert_eq!(cache.get("attempts"), None);
        assert_eq!(cache.incr("attempts", Duration::from_secs(60)), 1);
    }

    #[test]
    fn delete_removes_entries() {
        let cache = MemoryCache::new();
        cache.set("key", "value", Duration::from_secs(60));
        cache.delete("key");
        assert_eq!(cache.get("key"), None);
    }
}
