//! Database access for the trusted device registry.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use tracing::Instrument;
use uuid::Uuid;

use super::{NewTrustedDevice, TrustPolicy, TrustedDevice};

const DEVICE_COLUMNS: &str = r"
    id, user_id, device_id, browser, os, device, ip_address, city, country,
    last_login, expires_at, is_active
";

/// Look up an active trusted device. An expired match is deleted as a side
/// effect and reported as a miss.
pub async fn lookup_active(
    pool: &PgPool,
    user_id: Uuid,
    device_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<TrustedDevice>> {
    let query = format!(
        "SELECT {DEVICE_COLUMNS} FROM trusted_devices \
         WHERE user_id = $1 AND device_id = $2 AND is_active = TRUE LIMIT 1"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .bind(device_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to look up trusted device")?;

    let Some(device) = row.map(device_from_row) else {
        return Ok(None);
    };

    if device.is_expired(now) {
        delete_by_id(pool, device.id).await?;
        return Ok(None);
    }

    Ok(Some(device))
}

/// Register a new trusted device, evicting the user's oldest sessions first.
/// Enforcement and insertion share one transaction so concurrent logins from
/// the same user cannot overshoot the cap.
pub async fn register(
    pool: &PgPool,
    new_device: &NewTrustedDevice,
    policy: &TrustPolicy,
) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to begin trusted device transaction")?;

    enforce_session_limit(&mut tx, new_device.user_id, policy.max_sessions()).await?;
    insert(&mut tx, new_device, policy.trust_days()).await?;

    tx.commit()
        .await
        .context("failed to commit trusted device transaction")?;

    Ok(())
}

/// Delete the user's oldest active devices (by last login) until at most
/// `max_sessions` remain. The row locks serialize concurrent enforcement for
/// the same user.
pub async fn enforce_session_limit(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    max_sessions: i64,
) -> Result<()> {
    let query = r"
        SELECT id
        FROM trusted_devices
        WHERE user_id = $1
          AND is_active = TRUE
        ORDER BY last_login ASC
        FOR UPDATE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(user_id)
        .fetch_all(&mut **tx)
        .instrument(span)
        .await
        .context("failed to count active trusted devices")?;

    let active = i64::try_from(rows.len()).unwrap_or(i64::MAX);
    if active <= max_sessions {
        return Ok(());
    }

    let excess = usize::try_from(active - max_sessions).unwrap_or(rows.len());
    let doomed: Vec<Uuid> = rows
        .iter()
        .take(excess)
        .map(|row| row.get("id"))
        .collect();

    let query = "DELETE FROM trusted_devices WHERE id = ANY($1)";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(&doomed)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to evict oldest trusted devices")?;

    Ok(())
}

async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    new_device: &NewTrustedDevice,
    trust_days: i64,
) -> Result<()> {
    let query = r"
        INSERT INTO trusted_devices
            (user_id, device_id, browser, os, device, ip_address,
             last_login, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW() + ($7 * INTERVAL '1 day'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(new_device.user_id)
        .bind(&new_device.device_id)
        .bind(&new_device.browser)
        .bind(&new_device.os)
        .bind(&new_device.device)
        .bind(new_device.ip_address.as_deref())
        .bind(trust_days)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert trusted device")?;

    Ok(())
}

/// Renew a trusted device on a bypass login: extend expiry, bump last login,
/// and overwrite the connection metadata with what this login presented.
pub async fn renew_for_login(
    pool: &PgPool,
    id: Uuid,
    browser: &str,
    os: &str,
    device: &str,
    ip_address: Option<&str>,
    trust_days: i64,
) -> Result<()> {
    let query = r"
        UPDATE trusted_devices
        SET browser = $2,
            os = $3,
            device = $4,
            ip_address = $5,
            city = NULL,
            country = NULL,
            last_login = NOW(),
            expires_at = NOW() + ($6 * INTERVAL '1 day')
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .bind(browser)
        .bind(os)
        .bind(device)
        .bind(ip_address)
        .bind(trust_days)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to renew trusted device")?;

    Ok(())
}

/// Bulk-delete every expired device. Returns the number removed.
pub async fn cleanup_expired(pool: &PgPool) -> Result<u64> {
    let query = "DELETE FROM trusted_devices WHERE expires_at < NOW()";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete expired trusted devices")?;

    Ok(result.rows_affected())
}

async fn delete_by_id(pool: &PgPool, id: Uuid) -> Result<()> {
    let query = "DELETE FROM trusted_devices WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete expired trusted device")?;
    Ok(())
}

fn device_from_row(row: PgRow) -> TrustedDevice {
    TrustedDevice {
        id: row.get("id"),
        user_id: row.get("user_id"),
        device_id: row.get("device_id"),
        browser: row.get("browser"),
        os: row.get("os"),
        device: row.get("device"),
        ip_address: row.get("ip_address"),
        city: row.get("city"),
        country: row.get("country"),
        last_login: row.get("last_login"),
        expires_at: row.get("expires_at"),
        is_active: row.get("is_active"),
    }
}
