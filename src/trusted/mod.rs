//! Trusted device registry: remembered browsers that may skip the OTP step
//! for a bounded period.
//!
//! A device past its expiry is treated as absent regardless of the active
//! flag; lookups delete such rows on sight. The number of active devices per
//! user is capped, and enforcement happens before a new record is inserted,
//! inside the same transaction, so concurrent logins cannot overshoot the
//! cap.

mod repo;

pub use repo::{cleanup_expired, enforce_session_limit, lookup_active, register, renew_for_login};

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};
use uuid::Uuid;

const DEFAULT_MAX_SESSIONS: i64 = 5;
const DEFAULT_TRUST_DAYS: i64 = 30;

/// A remembered browser/device for one user.
#[derive(Clone, Debug)]
pub struct TrustedDevice {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_id: String,
    pub browser: String,
    pub os: String,
    pub device: String,
    pub ip_address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub last_login: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
}

impl TrustedDevice {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Fields needed to register a new trusted device. City/country stay unset
/// (no geolocation source).
#[derive(Clone, Debug)]
pub struct NewTrustedDevice {
    pub user_id: Uuid,
    pub device_id: String,
    pub browser: String,
    pub os: String,
    pub device: String,
    pub ip_address: Option<String>,
}

/// Per-user limits for the registry.
#[derive(Clone, Copy, Debug)]
pub struct TrustPolicy {
    max_sessions: i64,
    trust_days: i64,
}

impl TrustPolicy {
    /// Defaults: at most 5 concurrent trusted devices, trusted for 30 days.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            trust_days: DEFAULT_TRUST_DAYS,
        }
    }

    #[must_use]
    pub fn with_max_sessions(mut self, max_sessions: i64) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    #[must_use]
    pub fn with_trust_days(mut self, days: i64) -> Self {
        self.trust_days = days.max(1);
        self
    }

    #[must_use]
    pub fn max_sessions(&self) -> i64 {
        self.max_sessions
    }

    #[must_use]
    pub fn trust_days(&self) -> i64 {
        self.trust_days
    }
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a background task that periodically deletes expired devices.
pub fn spawn_cleanup_worker(pool: PgPool, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(interval).await;

            match cleanup_expired(&pool).await {
                Ok(0) => {}
                Ok(removed) => info!("Removed {removed} expired trusted devices"),
                Err(err) => error!("Trusted device cleanup failed: {err}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn device(expires_at: DateTime<Utc>) -> TrustedDevice {
        TrustedDevice {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            device_id: "token".to_string(),
            browser: "Firefox".to_string(),
            os: "Linux".to_string(),
            device: "PC".to_string(),
            ip_address: Some("203.0.113.7".to_string()),
            city: None,
            country: None,
            last_login: Utc::now(),
            expires_at,
            is_active: true,
        }
    }

    #[test]
    fn expiry_applies_regardless_of_active_flag() {
        let now = Utc::now();

        let live = device(now + ChronoDuration::days(1));
        assert!(!live.is_expired(now));

        let mut stale = device(now - ChronoDuration::seconds(1));
        stale.is_active = true;
        assert!(stale.is_expired(now));
    }

    #[test]
    fn policy_defaults_and_clamps() {
        let policy = TrustPolicy::new();
        assert_eq!(policy.max_sessions(), 5);
        assert_eq!(policy.trust_days(), 30);

        let policy = policy.with_max_sessions(0).with_trust_days(0);
        assert_eq!(policy.max_sessions(), 1);
        assert_eq!(policy.trust_days(), 1);
    }
}
