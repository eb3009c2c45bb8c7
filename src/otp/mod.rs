//! OTP device state machine: code generation with exponential cooldown,
//! verification with lockout, and encrypted at-rest storage.
//!
//! Each user owns a single reusable device row. Generation and verification
//! run inside a transaction holding a row lock on the device, so concurrent
//! attempts against the same device serialize instead of racing the
//! failed-attempt counter.

mod crypto;
mod device;
mod repo;
mod service;

pub use crypto::OtpCipher;
pub use device::OtpDevice;
pub use service::OtpService;

const DEFAULT_CODE_LENGTH: usize = 6;
const DEFAULT_VALID_FOR_SECONDS: i64 = 300;
const DEFAULT_BASE_COOLDOWN_SECONDS: i64 = 60;
const DEFAULT_JITTER_MIN_SECONDS: i64 = 5;
const DEFAULT_JITTER_MAX_SECONDS: i64 = 15;
const DEFAULT_LOCK_MIN_SECONDS: i64 = 5 * 60;
const DEFAULT_LOCK_MAX_SECONDS: i64 = 10 * 60;

/// Tunable limits for code generation and verification.
#[derive(Clone, Copy, Debug)]
pub struct OtpPolicy {
    code_length: usize,
    valid_for_seconds: i64,
    base_cooldown_seconds: i64,
    jitter_min_seconds: i64,
    jitter_max_seconds: i64,
    lock_min_seconds: i64,
    lock_max_seconds: i64,
}

impl OtpPolicy {
    /// Defaults: 6-digit codes valid 5 minutes, 60 s base cooldown with
    /// 5–15 s jitter, 5–10 minute randomized lockout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            code_length: DEFAULT_CODE_LENGTH,
            valid_for_seconds: DEFAULT_VALID_FOR_SECONDS,
            base_cooldown_seconds: DEFAULT_BASE_COOLDOWN_SECONDS,
            jitter_min_seconds: DEFAULT_JITTER_MIN_SECONDS,
            jitter_max_seconds: DEFAULT_JITTER_MAX_SECONDS,
            lock_min_seconds: DEFAULT_LOCK_MIN_SECONDS,
            lock_max_seconds: DEFAULT_LOCK_MAX_SECONDS,
        }
    }

    #[must_use]
    pub fn with_code_length(mut self, length: usize) -> Self {
        self.code_length = length.max(1);
        self
    }

    #[must_use]
    pub fn with_valid_for_seconds(mut self, seconds: i64) -> Self {
        self.valid_for_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_base_cooldown_seconds(mut self, seconds: i64) -> Self {
        self.base_cooldown_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_jitter_seconds(mut self, min: i64, max: i64) -> Self {
        self.jitter_min_seconds = min;
        self.jitter_max_seconds = max;
        self
    }

    #[must_use]
    pub fn with_lock_seconds(mut self, min: i64, max: i64) -> Self {
        self.lock_min_seconds = min;
        self.lock_max_seconds = max;
        self
    }

    #[must_use]
    pub fn code_length(&self) -> usize {
        self.code_length
    }

    #[must_use]
    pub fn valid_for_seconds(&self) -> i64 {
        self.valid_for_seconds
    }

    #[must_use]
    pub fn base_cooldown_seconds(&self) -> i64 {
        self.base_cooldown_seconds
    }

    pub(crate) fn jitter_range(&self) -> (i64, i64) {
        (self.jitter_min_seconds, self.jitter_max_seconds)
    }

    pub(crate) fn lock_range(&self) -> (i64, i64) {
        (self.lock_min_seconds, self.lock_max_seconds)
    }
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Why an OTP operation was refused. Infrastructure failures collapse into
/// `Internal` so no storage or cipher detail reaches the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OtpRejection {
    /// Cooldown between code requests is still in effect.
    RateLimited { retry_after_seconds: i64 },
    /// Device is locked out after repeated failures.
    Locked { retry_after_seconds: i64 },
    Invalid,
    Expired,
    AlreadyUsed,
    Internal,
}

impl OtpRejection {
    /// Caller-facing message. Remaining wait times are disclosed on purpose;
    /// everything else stays generic.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::RateLimited {
                retry_after_seconds,
            } => format!(
                "Please wait before requesting another OTP. You can try again in {}.",
                wait_phrase(*retry_after_seconds)
            ),
            Self::Locked {
                retry_after_seconds,
            } => format!(
                "Too many failed attempts. Please try again in {}.",
                wait_phrase(*retry_after_seconds)
            ),
            Self::Invalid => "Invalid OTP. Please try again.".to_string(),
            Self::Expired => "This OTP has expired.".to_string(),
            Self::AlreadyUsed => "This OTP has already been used.".to_string(),
            Self::Internal => "An error occurred. Please try again.".to_string(),
        }
    }
}

/// Render a remaining wait as whole minutes when possible, seconds otherwise.
#[must_use]
pub fn wait_phrase(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let minutes = seconds / 60;
    if minutes > 0 {
        format!("{minutes} minutes")
    } else {
        format!("{seconds} seconds")
    }
}
