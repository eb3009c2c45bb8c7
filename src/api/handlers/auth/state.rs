//! Auth configuration and shared per-process state.
//!
//! The original deployment kept its cipher key and cache handles in process
//! globals; here everything is built once at startup and threaded into the
//! handlers through an `Extension<Arc<AuthState>>`, which also makes test
//! doubles straightforward.

use anyhow::Result;

use super::{storage, utils};
use crate::ipguard::IpGuard;
use crate::otp::OtpService;
use crate::trusted::TrustPolicy;

const DEFAULT_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;

/// Deployment flavor. Development is lenient about undetectable client IPs;
/// production rejects such requests outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AuthConfig {
    environment: Environment,
    session_ttl_seconds: i64,
    trust: TrustPolicy,
}

impl AuthConfig {
    #[must_use]
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            trust: TrustPolicy::new(),
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_trust_policy(mut self, trust: TrustPolicy) -> Self {
        self.trust = trust;
        self
    }

    #[must_use]
    pub fn environment(&self) -> Environment {
        self.environment
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn trust_policy(&self) -> &TrustPolicy {
        &self.trust
    }

    /// Whether requests with an undetectable client IP may proceed.
    #[must_use]
    pub fn permissive_ip(&self) -> bool {
        self.environment == Environment::Development
    }
}

pub struct AuthState {
    config: AuthConfig,
    otp: OtpService,
    ip_guard: IpGuard,
    dummy_password_hash: String,
}

impl AuthState {
    /// Build the shared auth state. A throwaway password hash is computed up
    /// front so lookups for unknown accounts still pay the full verification
    /// cost and stay indistinguishable from real ones.
    ///
    /// # Errors
    /// Returns an error if the dummy hash cannot be generated.
    pub fn new(config: AuthConfig, otp: OtpService, ip_guard: IpGuard) -> Result<Self> {
        let dummy_password_hash = storage::hash_password(&utils::generate_session_token()?)?;
        Ok(Self {
            config,
            otp,
            ip_guard,
            dummy_password_hash,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn otp(&self) -> &OtpService {
        &self.otp
    }

    #[must_use]
    pub fn ip_guard(&self) -> &IpGuard {
        &self.ip_guard
    }

    pub(super) fn dummy_password_hash(&self) -> &str {
        &self.dummy_password_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipguard::{IpPolicy, MemoryCache};
    use crate::otp::{OtpCipher, OtpPolicy, OtpService};
    use std::sync::Arc;

    #[test]
    fn environment_parses_common_spellings() {
        assert_eq!(Environment::parse("development"), Some(Environment::Development));
        assert_eq!(Environment::parse("DEV"), Some(Environment::Development));
        assert_eq!(Environment::parse("production"), Some(Environment::Production));
        assert_eq!(Environment::parse(" prod "), Some(Environment::Production));
        assert_eq!(Environment::parse("staging"), None);
    }

    #[test]
    fn config_defaults_and_overrides() {
        let config = AuthConfig::new(Environment::Production);
        assert_eq!(config.session_ttl_seconds(), 12 * 60 * 60);
        assert_eq!(config.trust_policy().max_sessions(), 5);
        assert!(!config.permissive_ip());

        let config = AuthConfig::new(Environment::Development).with_session_ttl_seconds(60);
        assert_eq!(config.session_ttl_seconds(), 60);
        assert!(config.permissive_ip());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn auth_state_builds_a_usable_dummy_hash() {
        let config = AuthConfig::new(Environment::Development);
        let otp = OtpService::new(OtpCipher::new([1u8; 32]), OtpPolicy::new());
        let ip_guard = IpGuard::new(Arc::new(MemoryCache::new()), IpPolicy::new());

        let state = AuthState::new(config, otp, ip_guard).unwrap();

        // The dummy hash must be verifiable (and fail) like a real one.
        assert!(!super::storage::verify_password(
            state.dummy_password_hash(),
            "not-the-password"
        ));
    }
}
