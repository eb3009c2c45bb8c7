use crate::api;
use crate::api::handlers::auth::{AuthConfig, Environment};
use crate::ipguard::IpPolicy;
use crate::otp::{OtpCipher, OtpPolicy};
use crate::trusted::TrustPolicy;
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub secret_key: SecretString,
    pub environment: Environment,
    pub session_ttl_seconds: i64,
    pub trust_days: i64,
    pub max_trusted_devices: i64,
    pub otp_code_length: usize,
    pub otp_ttl_seconds: i64,
    pub otp_base_cooldown_seconds: i64,
    pub ip_max_attempts: u64,
    pub ip_attempt_ttl_seconds: u64,
    pub ip_cache_ttl_seconds: u64,
    pub outbox_poll_seconds: u64,
    pub outbox_batch_size: usize,
    pub outbox_max_attempts: u32,
    pub outbox_backoff_base_seconds: u64,
    pub outbox_backoff_max_seconds: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the secret key is invalid or the server fails to
/// start.
pub async fn execute(args: Args) -> Result<()> {
    let cipher = OtpCipher::from_base64(args.secret_key.expose_secret())
        .context("Invalid secret key (expected base64-encoded 32 bytes)")?;

    let auth_config = AuthConfig::new(args.environment)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_trust_policy(
            TrustPolicy::new()
                .with_trust_days(args.trust_days)
                .with_max_sessions(args.max_trusted_devices),
        );

    let otp_policy = OtpPolicy::new()
        .with_code_length(args.otp_code_length)
        .with_valid_for_seconds(args.otp_ttl_seconds)
        .with_base_cooldown_seconds(args.otp_base_cooldown_seconds);

    let ip_policy = IpPolicy::new()
        .with_max_attempts(args.ip_max_attempts)
        .with_attempt_ttl_seconds(args.ip_attempt_ttl_seconds)
        .with_cache_ttl_seconds(args.ip_cache_ttl_seconds);

    let email_config = api::EmailWorkerConfig::new()
        .with_poll_interval_seconds(args.outbox_poll_seconds)
        .with_batch_size(args.outbox_batch_size)
        .with_max_attempts(args.outbox_max_attempts)
        .with_backoff_base_seconds(args.outbox_backoff_base_seconds)
        .with_backoff_max_seconds(args.outbox_backoff_max_seconds);

    api::new(
        args.port,
        args.dsn,
        cipher,
        auth_config,
        otp_policy,
        ip_policy,
        email_config,
    )
    .await
}
