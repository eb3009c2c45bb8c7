//! IP reputation pipeline: an ephemeral failed-attempt counter in front of a
//! durable, permanent blocklist.
//!
//! Blocking is the only self-triggered path; nothing here ever unblocks an
//! address. The durable store remains ground truth, and the cache is an
//! optimization with bounded staleness (one store query per IP per TTL
//! window).

mod cache;
mod repo;

pub use cache::{Cache, MemoryCache};

use anyhow::Result;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u64 = 5;
const DEFAULT_ATTEMPT_TTL_SECONDS: u64 = 15 * 60;
const DEFAULT_BLOCKLIST_CACHE_TTL_SECONDS: u64 = 5 * 60;

/// Thresholds and TTLs for the blocking pipeline.
#[derive(Clone, Copy, Debug)]
pub struct IpPolicy {
    max_attempts: u64,
    attempt_ttl: Duration,
    blocklist_cache_ttl: Duration,
}

impl IpPolicy {
    /// Defaults: 5 failures within 15 minutes block permanently; blocklist
    /// lookups are cached for 5 minutes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_ttl: Duration::from_secs(DEFAULT_ATTEMPT_TTL_SECONDS),
            blocklist_cache_ttl: Duration::from_secs(DEFAULT_BLOCKLIST_CACHE_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u64) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_attempt_ttl_seconds(mut self, seconds: u64) -> Self {
        self.attempt_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_cache_ttl_seconds(mut self, seconds: u64) -> Self {
        self.blocklist_cache_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u64 {
        self.max_attempts
    }

    #[must_use]
    pub fn attempt_ttl(&self) -> Duration {
        self.attempt_ttl
    }

    #[must_use]
    pub fn blocklist_cache_ttl(&self) -> Duration {
        self.blocklist_cache_ttl
    }
}

impl Default for IpPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct IpGuard {
    cache: Arc<dyn Cache>,
    policy: IpPolicy,
}

impl IpGuard {
    #[must_use]
    pub fn new(cache: Arc<dyn Cache>, policy: IpPolicy) -> Self {
        Self { cache, policy }
    }

    /// Whether the address is permanently blocked. Cache first; on a miss
    /// the durable store is consulted and the result (negative included)
    /// cached before returning.
    ///
    /// # Errors
    /// Returns an error if the durable store is unavailable.
    pub async fn is_blocked(&self, pool: &PgPool, ip: &str) -> Result<bool> {
        let cache_key = blocklist_key(ip);
        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok(cached == "1");
        }

        let blocked = repo::blocklist_contains(pool, ip).await?;
        let value = if blocked { "1" } else { "0" };
        self.cache
            .set(&cache_key, value, self.policy.blocklist_cache_ttl());

        Ok(blocked)
    }

    /// Record a failed sensitive action for the address.
    ///
    /// Returns `true` when the address is blocked: either it already was, or
    /// this failure crossed the threshold and a permanent block was written
    /// (cache set positive, counter cleared).
    ///
    /// # Errors
    /// Returns an error if the durable store is unavailable.
    pub async fn record_failure(&self, pool: &PgPool, ip: &str) -> Result<bool> {
        if self.is_blocked(pool, ip).await? {
            return Ok(true);
        }

        let attempts = self.cache.incr(&attempts_key(ip), self.policy.attempt_ttl());

        if attempts >= self.policy.max_attempts() {
            repo::upsert_block(pool, ip).await?;
            self.cache
                .set(&blocklist_key(ip), "1", self.policy.blocklist_cache_ttl());
            self.cache.delete(&attempts_key(ip));
            return Ok(true);
        }

        Ok(false)
    }

    /// Clear the failed-attempt counter, e.g. after a successful login.
    pub fn reset_attempts(&self, ip: &str) {
        self.cache.delete(&attempts_key(ip));
    }
}

fn blocklist_key(ip: &str) -> String {
    format!("blocked_ip:{ip}")
}

fn attempts_key(ip: &str) -> String {
    format!("login_attempts:{ip}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_keys_are_namespaced_per_ip() {
        assert_eq!(blocklist_key("203.0.113.7"), "blocked_ip:203.0.113.7");
        assert_eq!(attempts_key("203.0.113.7"), "login_attempts:203.0.113.7");
    }

    #[test]
    fn policy_defaults_match_the_blocking_contract() {
        let policy = IpPolicy::new();
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.attempt_ttl(), Duration::from_secs(900));
        assert_eq!(policy.blocklist_cache_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn policy_overrides_clamp_max_attempts() {
        let policy = IpPolicy::new()
            .with_max_attempts(0)
            .with_attempt_ttl_seconds(60)
            .with_cache_ttl_seconds(10);
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.attempt_ttl(), Duration::from_secs(60));
        assert_eq!(policy.blocklist_cache_ttl(), Duration::from_secs(10));
    }

    #[test]
    fn reset_attempts_clears_the_counter() {
        let cache = Arc::new(MemoryCache::new());
        let guard = IpGuard::new(cache.clone(), IpPolicy::new());

        cache.incr("login_attempts:198.51.100.4", Duration::from_secs(60));
        guard.reset_attempts("198.51.100.4");
        assert_eq!(cache.get("login_attempts:198.51.100.4"), None);
    }
}
