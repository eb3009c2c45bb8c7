//! Policy arguments for sessions, trusted devices, OTP, IP blocking, and the
//! email outbox worker.

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    let command = with_otp_args(command);
    let command = with_ip_args(command);
    with_outbox_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("session-ttl-seconds")
                .long("session-ttl-seconds")
                .help("Session token TTL in seconds")
                .env("GARDISTO_SESSION_TTL_SECONDS")
                .default_value("43200")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("trust-days")
                .long("trust-days")
                .help("Days a trusted device may bypass the OTP step")
                .env("GARDISTO_TRUST_DAYS")
                .default_value("30")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("max-trusted-devices")
                .long("max-trusted-devices")
                .help("Maximum concurrent trusted devices per user")
                .env("GARDISTO_MAX_TRUSTED_DEVICES")
                .default_value("5")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_otp_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("otp-code-length")
                .long("otp-code-length")
                .help("Digits in a generated OTP code")
                .env("GARDISTO_OTP_CODE_LENGTH")
                .default_value("6")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("otp-ttl-seconds")
                .long("otp-ttl-seconds")
                .help("Validity window for a generated OTP code")
                .env("GARDISTO_OTP_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("otp-base-cooldown-seconds")
                .long("otp-base-cooldown-seconds")
                .help("Base cooldown between OTP requests (doubles per prior failure)")
                .env("GARDISTO_OTP_BASE_COOLDOWN_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_ip_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("ip-max-attempts")
                .long("ip-max-attempts")
                .help("Failed attempts within the counter TTL before a permanent block")
                .env("GARDISTO_IP_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("ip-attempt-ttl-seconds")
                .long("ip-attempt-ttl-seconds")
                .help("TTL of the failed-attempt counter per IP")
                .env("GARDISTO_IP_ATTEMPT_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("ip-cache-ttl-seconds")
                .long("ip-cache-ttl-seconds")
                .help("TTL of cached blocklist lookups")
                .env("GARDISTO_IP_CACHE_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_outbox_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("email-outbox-poll-seconds")
                .long("email-outbox-poll-seconds")
                .help("Email outbox poll interval in seconds")
                .env("GARDISTO_EMAIL_OUTBOX_POLL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-batch-size")
                .long("email-outbox-batch-size")
                .help("Email outbox batch size per poll")
                .env("GARDISTO_EMAIL_OUTBOX_BATCH_SIZE")
                .default_value("10")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("email-outbox-max-attempts")
                .long("email-outbox-max-attempts")
                .help("Max attempts before marking an email as failed")
                .env("GARDISTO_EMAIL_OUTBOX_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("email-outbox-backoff-base-seconds")
                .long("email-outbox-backoff-base-seconds")
                .help("Base delay for email outbox retry backoff")
                .env("GARDISTO_EMAIL_OUTBOX_BACKOFF_BASE_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-backoff-max-seconds")
                .long("email-outbox-backoff-max-seconds")
                .help("Max delay for email outbox retry backoff")
                .env("GARDISTO_EMAIL_OUTBOX_BACKOFF_MAX_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug)]
pub struct OutboxOptions {
    pub poll_seconds: u64,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
}

#[derive(Debug)]
pub struct Options {
    pub session_ttl_seconds: i64,
    pub trust_days: i64,
    pub max_trusted_devices: i64,
    pub otp_code_length: usize,
    pub otp_ttl_seconds: i64,
    pub otp_base_cooldown_seconds: i64,
    pub ip_max_attempts: u64,
    pub ip_attempt_ttl_seconds: u64,
    pub ip_cache_ttl_seconds: u64,
    pub outbox: OutboxOptions,
}

impl Options {
    /// Read the policy options out of parsed matches.
    ///
    /// # Errors
    /// Returns an error if a defaulted argument is unexpectedly missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            session_ttl_seconds: matches
                .get_one::<i64>("session-ttl-seconds")
                .copied()
                .context("missing argument: --session-ttl-seconds")?,
            trust_days: matches
                .get_one::<i64>("trust-days")
                .copied()
                .context("missing argument: --trust-days")?,
            max_trusted_devices: matches
                .get_one::<i64>("max-trusted-devices")
                .copied()
                .context("missing argument: --max-trusted-devices")?,
            otp_code_length: matches
                .get_one::<usize>("otp-code-length")
                .copied()
                .context("missing argument: --otp-code-length")?,
            otp_ttl_seconds: matches
                .get_one::<i64>("otp-ttl-seconds")
                .copied()
                .context("missing argument: --otp-ttl-seconds")?,
            otp_base_cooldown_seconds: matches
                .get_one::<i64>("otp-base-cooldown-seconds")
                .copied()
                .context("missing argument: --otp-base-cooldown-seconds")?,
            ip_max_attempts: matches
                .get_one::<u64>("ip-max-attempts")
                .copied()
                .context("missing argument: --ip-max-attempts")?,
            ip_attempt_ttl_seconds: matches
                .get_one::<u64>("ip-attempt-ttl-seconds")
                .copied()
                .context("missing argument: --ip-attempt-ttl-seconds")?,
            ip_cache_ttl_seconds: matches
                .get_one::<u64>("ip-cache-ttl-seconds")
                .copied()
                .context("missing argument: --ip-cache-ttl-seconds")?,
            outbox: OutboxOptions {
                poll_seconds: matches
                    .get_one::<u64>("email-outbox-poll-seconds")
                    .copied()
                    .context("missing argument: --email-outbox-poll-seconds")?,
                batch_size: matches
                    .get_one::<usize>("email-outbox-batch-size")
                    .copied()
                    .context("missing argument: --email-outbox-batch-size")?,
                max_attempts: matches
                    .get_one::<u32>("email-outbox-max-attempts")
                    .copied()
                    .context("missing argument: --email-outbox-max-attempts")?,
                backoff_base_seconds: matches
                    .get_one::<u64>("email-outbox-backoff-base-seconds")
                    .copied()
                    .context("missing argument: --email-outbox-backoff-base-seconds")?,
                backoff_max_seconds: matches
                    .get_one::<u64>("email-outbox-backoff-max-seconds")
                    .copied()
                    .context("missing argument: --email-outbox-backoff-max-seconds")?,
            },
        })
    }
}
