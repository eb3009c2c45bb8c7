use chrono::Utc;
use sqlx::PgPool;
use std::fmt::Display;
use tracing::error;
use uuid::Uuid;

use super::{OtpCipher, OtpPolicy, OtpRejection, repo};
use crate::api::email;

/// Generates and verifies OTP codes for users, one transaction per
/// operation. The delivery email is enqueued in the same transaction that
/// stores the generated code.
#[derive(Clone)]
pub struct OtpService {
    cipher: OtpCipher,
    policy: OtpPolicy,
}

impl OtpService {
    #[must_use]
    pub fn new(cipher: OtpCipher, policy: OtpPolicy) -> Self {
        Self { cipher, policy }
    }

    #[must_use]
    pub fn policy(&self) -> &OtpPolicy {
        &self.policy
    }

    /// Generate a fresh code for the user and queue it for email delivery.
    ///
    /// The plaintext code never leaves this method; the caller only learns
    /// whether a code is on its way.
    ///
    /// # Errors
    /// Returns `RateLimited`/`Locked` with the remaining wait, or `Internal`
    /// when storage or encryption fails.
    pub async fn request_code(
        &self,
        pool: &PgPool,
        user_id: Uuid,
        email_address: &str,
    ) -> Result<(), OtpRejection> {
        let mut tx = pool.begin().await.map_err(internal)?;

        let mut device = repo::get_or_create_for_update(&mut tx, user_id)
            .await
            .map_err(internal)?;

        let code = device.generate(&self.policy, &self.cipher, Utc::now())?;

        repo::persist(&mut tx, &device).await.map_err(internal)?;
        email::enqueue_otp_email(&mut tx, email_address, &code)
            .await
            .map_err(internal)?;

        tx.commit().await.map_err(internal)?;

        Ok(())
    }

    /// Verify a submitted code for the user.
    ///
    /// Mutations from failed attempts (counter, lock) are persisted before
    /// the rejection is returned.
    ///
    /// # Errors
    /// Returns the rejection describing why the code was refused; a user
    /// without a device gets `Invalid`.
    pub async fn verify_code(
        &self,
        pool: &PgPool,
        user_id: Uuid,
        code: &str,
    ) -> Result<(), OtpRejection> {
        let mut tx = pool.begin().await.map_err(internal)?;

        let Some(mut device) = repo::get_for_update(&mut tx, user_id)
            .await
            .map_err(internal)?
        else {
            return Err(OtpRejection::Invalid);
        };

        let result = device.verify(&self.policy, &self.cipher, code, Utc::now());

        repo::persist(&mut tx, &device).await.map_err(internal)?;
        tx.commit().await.map_err(internal)?;

        result
    }
}

fn internal<E: Display>(err: E) -> OtpRejection {
    error!("OTP storage failure: {err}");
    OtpRejection::Internal
}
