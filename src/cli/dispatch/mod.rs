//! Command-line argument dispatch and server initialization.
//!
//! Parses validated CLI arguments and maps them to the appropriate action,
//! such as starting the API server with its full configuration state.

use crate::api::handlers::auth::Environment;
use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::auth;
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let secret_key = matches
        .get_one::<String>("secret-key")
        .cloned()
        .context("missing required argument: --secret-key")?;
    let environment = matches
        .get_one::<String>("environment")
        .map(String::as_str)
        .and_then(Environment::parse)
        .context("invalid --environment (expected development or production)")?;

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        secret_key: SecretString::from(secret_key),
        environment,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        trust_days: auth_opts.trust_days,
        max_trusted_devices: auth_opts.max_trusted_devices,
        otp_code_length: auth_opts.otp_code_length,
        otp_ttl_seconds: auth_opts.otp_ttl_seconds,
        otp_base_cooldown_seconds: auth_opts.otp_base_cooldown_seconds,
        ip_max_attempts: auth_opts.ip_max_attempts,
        ip_attempt_ttl_seconds: auth_opts.ip_attempt_ttl_seconds,
        ip_cache_ttl_seconds: auth_opts.ip_cache_ttl_seconds,
        outbox_poll_seconds: auth_opts.outbox.poll_seconds,
        outbox_batch_size: auth_opts.outbox.batch_size,
        outbox_max_attempts: auth_opts.outbox.max_attempts,
        outbox_backoff_base_seconds: auth_opts.outbox.backoff_base_seconds,
        outbox_backoff_max_seconds: auth_opts.outbox.backoff_max_seconds,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_builds_a_server_action() {
        temp_env::with_vars(
            [
                (
                    "GARDISTO_DSN",
                    Some("postgres://gardisto@localhost:5432/gardisto"),
                ),
                (
                    "GARDISTO_SECRET_KEY",
                    Some("Tm90QVJlYWxLZXlOb3RBUmVhbEtleU5vdEFSZWFsIQ=="),
                ),
                ("GARDISTO_ENVIRONMENT", Some("development")),
                ("GARDISTO_TRUST_DAYS", Some("7")),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = match command.try_get_matches_from(vec!["gardisto"]) {
                    Ok(matches) => matches,
                    Err(err) => panic!("expected parse to succeed: {err}"),
                };
                let action = match handler(&matches) {
                    Ok(action) => action,
                    Err(err) => panic!("expected dispatch to succeed: {err}"),
                };

                let Action::Server(args) = action;
                assert_eq!(args.port, 8080);
                assert_eq!(args.environment, Environment::Development);
                assert_eq!(args.trust_days, 7);
                assert_eq!(args.max_trusted_devices, 5);
                assert_eq!(args.otp_code_length, 6);
                assert_eq!(args.ip_max_attempts, 5);
            },
        );
    }
}
