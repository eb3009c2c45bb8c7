//! Row access for OTP devices. All reads take a `FOR UPDATE` lock so
//! generation and verification serialize per device.

use anyhow::{Context, Result};
use sqlx::{Postgres, Row, Transaction, postgres::PgRow};
use tracing::Instrument;
use uuid::Uuid;

use super::device::OtpDevice;

const DEVICE_COLUMNS: &str = r"
    id, user_id, otp_encrypted, otp_created_at, otp_expiry, used,
    failed_attempts, max_failed_attempts, last_request_at,
    next_allowed_request_at, cooldown_multiplier, lock_until
";

/// Fetch the user's device, creating the row on first use.
pub(crate) async fn get_or_create_for_update(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<OtpDevice> {
    let query = "INSERT INTO otp_devices (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to create OTP device")?;

    get_for_update(tx, user_id)
        .await?
        .context("OTP device missing after creation")
}

/// Fetch and lock the user's device, if one exists.
pub(crate) async fn get_for_update(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<Option<OtpDevice>> {
    let query =
        format!("SELECT {DEVICE_COLUMNS} FROM otp_devices WHERE user_id = $1 FOR UPDATE");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to load OTP device")?;

    Ok(row.map(device_from_row))
}

/// Write back every state-machine field in one statement, keeping counters
/// and timestamps consistent with the code write.
pub(crate) async fn persist(
    tx: &mut Transaction<'_, Postgres>,
    device: &OtpDevice,
) -> Result<()> {
    let query = r"
        UPDATE otp_devices
        SET otp_encrypted = $2,
            otp_created_at = $3,
            otp_expiry = $4,
            used = $5,
            failed_attempts = $6,
            last_request_at = $7,
            next_allowed_request_at = $8,
            lock_until = $9,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(device.id)
        .bind(device.otp_encrypted.as_deref())
        .bind(device.otp_created_at)
        .bind(device.otp_expiry)
        .bind(device.used)
        .bind(device.failed_attempts)
        .bind(device.last_request_at)
        .bind(device.next_allowed_request_at)
        .bind(device.lock_until)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to persist OTP device")?;

    Ok(())
}

fn device_from_row(row: PgRow) -> OtpDevice {
    OtpDevice {
        id: row.get("id"),
        user_id: row.get("user_id"),
        otp_encrypted: row.get("otp_encrypted"),
        otp_created_at: row.get("otp_created_at"),
        otp_expiry: row.get("otp_expiry"),
        used: row.get("used"),
        failed_attempts: row.get("failed_attempts"),
        max_failed_attempts: row.get("max_failed_attempts"),
        last_request_at: row.get("last_request_at"),
        next_allowed_request_at: row.get("next_allowed_request_at"),
        cooldown_multiplier: row.get("cooldown_multiplier"),
        lock_until: row.get("lock_until"),
    }
}
