use chrono::{DateTime, Duration, Utc};
use rand::{Rng, rngs::OsRng};
use tracing::error;
use uuid::Uuid;

use super::{OtpCipher, OtpPolicy, OtpRejection};

/// One OTP device per user. The row is created lazily on the first code
/// request and reused for every later login.
///
/// Invariants:
/// - at most one unexpired, unused code is outstanding per device;
/// - a code marked used or expired never verifies again;
/// - only ciphertext is ever stored.
#[derive(Clone, Debug)]
pub struct OtpDevice {
    pub id: Uuid,
    pub user_id: Uuid,
    pub otp_encrypted: Option<Vec<u8>>,
    pub otp_created_at: Option<DateTime<Utc>>,
    pub otp_expiry: Option<DateTime<Utc>>,
    pub used: bool,
    pub failed_attempts: i32,
    pub max_failed_attempts: i32,
    pub last_request_at: Option<DateTime<Utc>>,
    pub next_allowed_request_at: Option<DateTime<Utc>>,
    pub cooldown_multiplier: f64,
    pub lock_until: Option<DateTime<Utc>>,
}

impl OtpDevice {
    /// Generate a fresh code, overwriting any previous one.
    ///
    /// Rate limiting applies first, then the lock check (an elapsed lock is
    /// cleared and the failed-attempt count reset). The next allowed request
    /// time compounds exponentially with the failed-attempt count observed
    /// *before* this generation resets it, plus additive random jitter.
    ///
    /// # Errors
    /// Returns `RateLimited` or `Locked` with the remaining wait, or
    /// `Internal` if encryption fails.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn generate(
        &mut self,
        policy: &OtpPolicy,
        cipher: &OtpCipher,
        now: DateTime<Utc>,
    ) -> Result<String, OtpRejection> {
        if let Some(next_allowed) = self.next_allowed_request_at {
            if now < next_allowed {
                return Err(OtpRejection::RateLimited {
                    retry_after_seconds: (next_allowed - now).num_seconds(),
                });
            }
        }

        if let Some(lock_until) = self.lock_until {
            if now >= lock_until {
                self.lock_until = None;
                self.failed_attempts = 0;
            } else {
                return Err(OtpRejection::Locked {
                    retry_after_seconds: (lock_until - now).num_seconds(),
                });
            }
        }

        let code: String = (0..policy.code_length())
            .map(|_| char::from(b'0' + OsRng.gen_range(0..10u8)))
            .collect();

        let encrypted = cipher
            .encrypt_code(self.user_id, self.id, &code)
            .map_err(|err| {
                error!("Failed to encrypt OTP code: {err}");
                OtpRejection::Internal
            })?;

        self.otp_encrypted = Some(encrypted);
        self.otp_created_at = Some(now);
        self.otp_expiry = Some(now + Duration::seconds(policy.valid_for_seconds()));
        self.used = false;

        // Cooldown must use the count before the reset so rapid re-requests
        // after failures compound the wait.
        let cooldown_seconds = policy.base_cooldown_seconds() as f64
            * self.cooldown_multiplier.powi(self.failed_attempts);
        self.failed_attempts = 0;
        self.last_request_at = Some(now);

        let (jitter_min, jitter_max) = policy.jitter_range();
        let jitter = if jitter_max > jitter_min {
            OsRng.gen_range(jitter_min..=jitter_max)
        } else {
            0
        };
        self.next_allowed_request_at =
            Some(now + Duration::seconds(cooldown_seconds as i64 + jitter));

        Ok(code)
    }

    /// Verify a submitted code against the stored ciphertext.
    ///
    /// Success is terminal for the code: it is marked used and the ciphertext
    /// cleared. A mismatch increments the failed-attempt count; reaching the
    /// maximum sets a randomized lock.
    ///
    /// # Errors
    /// Returns the rejection describing why the code was refused.
    pub fn verify(
        &mut self,
        policy: &OtpPolicy,
        cipher: &OtpCipher,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<(), OtpRejection> {
        if let Some(lock_until) = self.lock_until {
            if now >= lock_until {
                self.lock_until = None;
                self.failed_attempts = 0;
            } else {
                return Err(OtpRejection::Locked {
                    retry_after_seconds: (lock_until - now).num_seconds(),
                });
            }
        }

        let Some(encrypted) = self.otp_encrypted.as_deref() else {
            return Err(OtpRejection::Invalid);
        };

        if let Some(expiry) = self.otp_expiry {
            if now > expiry {
                return Err(OtpRejection::Expired);
            }
        }

        if self.used {
            return Err(OtpRejection::AlreadyUsed);
        }

        let decrypted = match cipher.decrypt_code(self.user_id, self.id, encrypted) {
            Ok(code) => code,
            Err(err) => {
                error!("Failed to decrypt stored OTP code: {err}");
                return Err(OtpRejection::Internal);
            }
        };

        if decrypted != token {
            self.failed_attempts += 1;

            if self.failed_attempts >= self.max_failed_attempts {
                let (lock_min, lock_max) = policy.lock_range();
                let lock_seconds = if lock_max > lock_min {
                    OsRng.gen_range(lock_min..=lock_max)
                } else {
                    lock_min
                };
                self.lock_until = Some(now + Duration::seconds(lock_seconds));
                return Err(OtpRejection::Locked {
                    retry_after_seconds: lock_seconds,
                });
            }

            return Err(OtpRejection::Invalid);
        }

        self.used = true;
        self.failed_attempts = 0;
        self.lock_until = None;
        self.otp_encrypted = None;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> OtpCipher {
        OtpCipher::new([7u8; 32])
    }

    fn wrong_code(code: &str) -> String {
        code.chars()
            .map(|c| if c == '9' { '0' } else { '9' })
            .collect()
    }

    fn device() -> OtpDevice {
        OtpDevice {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            otp_encrypted: None,
            otp_created_at: None,
            otp_expiry: None,
            used: false,
            failed_attempts: 0,
            max_failed_attempts: 5,
            last_request_at: None,
            next_allowed_request_at: None,
            cooldown_multiplier: 2.0,
            lock_until: None,
        }
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn generate_stores_ciphertext_and_schedules_cooldown() {
        let cipher = cipher();
        let policy = OtpPolicy::new();
        let mut device = device();
        let now = Utc::now();

        let code = device.generate(&policy, &cipher, now).unwrap();

        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
        assert!(device.otp_encrypted.is_some());
        assert!(!device.used);
        assert_eq!(device.failed_attempts, 0);
        assert_eq!(device.otp_expiry, Some(now + Duration::seconds(300)));

        let next_allowed = device.next_allowed_request_at.unwrap();
        assert!(next_allowed >= now + Duration::seconds(60 + 5));
        assert!(next_allowed <= now + Duration::seconds(60 + 15));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn generate_is_rate_limited_before_next_allowed() {
        let cipher = cipher();
        let policy = OtpPolicy::new();
        let mut device = device();
        let now = Utc::now();

        device.generate(&policy, &cipher, now).unwrap();

        let result = device.generate(&policy, &cipher, now + Duration::seconds(1));
        match result {
            Err(OtpRejection::RateLimited {
                retry_after_seconds,
            }) => assert!(retry_after_seconds > 0),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn cooldown_compounds_with_prior_failures() {
        let cipher = cipher();
        let policy = OtpPolicy::new();
        let mut device = device();
        let now = Utc::now();

        // Three prior failures: cooldown must be at least 60 * 2^3 = 480s.
        device.failed_attempts = 3;
        device.generate(&policy, &cipher, now).unwrap();

        let next_allowed = device.next_allowed_request_at.unwrap();
        assert!(next_allowed >= now + Duration::seconds(480 + 5));
        assert!(next_allowed <= now + Duration::seconds(480 + 15));
        assert_eq!(device.failed_attempts, 0);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn generate_rejects_while_locked_and_unlocks_after() {
        let cipher = cipher();
        let policy = OtpPolicy::new();
        let mut device = device();
        let now = Utc::now();

        device.failed_attempts = 5;
        device.lock_until = Some(now + Duration::seconds(100));

        match device.generate(&policy, &cipher, now) {
            Err(OtpRejection::Locked {
                retry_after_seconds,
            }) => assert_eq!(retry_after_seconds, 100),
            other => panic!("expected Locked, got {other:?}"),
        }

        // After the lock elapses the device auto-unlocks and resets.
        let later = now + Duration::seconds(101);
        device.generate(&policy, &cipher, later).unwrap();
        assert!(device.lock_until.is_none());
        assert_eq!(device.failed_attempts, 0);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn verify_success_is_single_use() {
        let cipher = cipher();
        let policy = OtpPolicy::new();
        let mut device = device();
        let now = Utc::now();

        let code = device.generate(&policy, &cipher, now).unwrap();

        device.verify(&policy, &cipher, &code, now).unwrap();
        assert!(device.used);
        assert!(device.otp_encrypted.is_none());
        assert!(device.lock_until.is_none());

        // Replaying the same code finds no ciphertext left to match.
        assert_eq!(
            device.verify(&policy, &cipher, &code, now),
            Err(OtpRejection::Invalid)
        );
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn verify_locks_after_max_failures_and_rejects_correct_code() {
        let cipher = cipher();
        // Short lock so the code is still unexpired once the lock elapses.
        let policy = OtpPolicy::new().with_lock_seconds(60, 60);
        let mut device = device();
        let now = Utc::now();

        let code = device.generate(&policy, &cipher, now).unwrap();
        let wrong = wrong_code(&code);

        for attempt in 1..=4 {
            assert_eq!(
                device.verify(&policy, &cipher, &wrong, now),
                Err(OtpRejection::Invalid),
                "attempt {attempt} should be a plain mismatch"
            );
        }

        match device.verify(&policy, &cipher, &wrong, now) {
            Err(OtpRejection::Locked {
                retry_after_seconds,
            }) => assert_eq!(retry_after_seconds, 60),
            other => panic!("expected Locked, got {other:?}"),
        }
        let lock_until = device.lock_until.unwrap();

        // Even the correct code is rejected while the lock holds.
        match device.verify(&policy, &cipher, &code, now + Duration::seconds(1)) {
            Err(OtpRejection::Locked { .. }) => {}
            other => panic!("expected Locked, got {other:?}"),
        }

        // Once the lock elapses the correct code goes through again.
        device
            .verify(&policy, &cipher, &code, lock_until + Duration::seconds(1))
            .unwrap();
        assert!(device.used);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn default_lock_window_is_randomized_between_five_and_ten_minutes() {
        let cipher = cipher();
        let policy = OtpPolicy::new();
        let mut device = device();
        let now = Utc::now();

        let code = device.generate(&policy, &cipher, now).unwrap();
        device.failed_attempts = 4;

        match device.verify(&policy, &cipher, &wrong_code(&code), now) {
            Err(OtpRejection::Locked {
                retry_after_seconds,
            }) => assert!((300..=600).contains(&retry_after_seconds)),
            other => panic!("expected Locked, got {other:?}"),
        }
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn verify_rejects_expired_code() {
        let cipher = cipher();
        let policy = OtpPolicy::new();
        let mut device = device();
        let now = Utc::now();

        let code = device.generate(&policy, &cipher, now).unwrap();

        let after_expiry = now + Duration::seconds(301);
        assert_eq!(
            device.verify(&policy, &cipher, &code, after_expiry),
            Err(OtpRejection::Expired)
        );
    }

    #[test]
    fn verify_without_generated_code_is_invalid() {
        let cipher = cipher();
        let policy = OtpPolicy::new();
        let mut device = device();

        assert_eq!(
            device.verify(&policy, &cipher, "123456", Utc::now()),
            Err(OtpRejection::Invalid)
        );
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn verify_rejects_already_used_code() {
        let cipher = cipher();
        let policy = OtpPolicy::new();
        let mut device = device();
        let now = Utc::now();

        let code = device.generate(&policy, &cipher, now).unwrap();
        // Simulate a row where the used flag stuck but ciphertext remains.
        device.used = true;

        assert_eq!(
            device.verify(&policy, &cipher, &code, now),
            Err(OtpRejection::AlreadyUsed)
        );
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn new_code_invalidates_previous_one() {
        let cipher = cipher();
        let policy = OtpPolicy::new();
        let mut device = device();
        let now = Utc::now();

        let first = device.generate(&policy, &cipher, now).unwrap();

        // Skip past the cooldown and request a replacement code.
        device.next_allowed_request_at = None;
        let second = device.generate(&policy, &cipher, now).unwrap();
        assert_ne!(
            device.otp_encrypted, None,
            "replacement code must be stored"
        );

        if first != second {
            assert_eq!(
                device.verify(&policy, &cipher, &first, now),
                Err(OtpRejection::Invalid)
            );
        }
        device.verify(&policy, &cipher, &second, now).unwrap();
    }
}
