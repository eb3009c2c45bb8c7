//! # Gardisto (Login Protection Service)
//!
//! `gardisto` guards a user directory with password authentication, an email
//! one-time-passcode (OTP) second factor, trusted-device bypass, and
//! automatic IP blocking.
//!
//! ## Login Flow
//!
//! Every `/v1/auth` request first passes the IP block middleware: permanently
//! blocked addresses are rejected before any credential work happens. A
//! successful password check then either completes directly (known trusted
//! device), or generates an OTP and queues it for email delivery. Verifying
//! the OTP registers the browser as a trusted device and returns a device
//! identifier the client presents on future logins to skip the OTP step.
//!
//! ## Abuse Controls
//!
//! - **OTP device**: per-user encrypted code with expiry, a failed-attempt
//!   counter, exponential request cooldown with jitter, and a randomized
//!   temporary lockout after repeated mismatches.
//! - **Trusted devices**: expire after 30 days (renewed on each bypass
//!   login) and are capped per user; the oldest sessions are evicted first.
//! - **IP blocking**: failed sensitive actions increment a TTL counter; at
//!   the threshold the address is written to a permanent blocklist fronted
//!   by a short-lived cache. Blocks are never lifted automatically.
//!
//! Codes are encrypted at rest; plaintext only ever travels to the email
//! outbox. Session and device tokens are stored as SHA-256 hashes.

pub mod api;
pub mod cli;
pub mod ipguard;
pub mod otp;
pub mod trusted;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }
}
