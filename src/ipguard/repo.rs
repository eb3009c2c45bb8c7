use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::Instrument;

/// Check the durable blocklist for an address.
pub(crate) async fn blocklist_contains(pool: &PgPool, ip: &str) -> Result<bool> {
    let query = "SELECT 1 FROM blocked_ips WHERE blocked_ip = $1 AND is_blocked = TRUE LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(ip)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to query blocklist")?;
    Ok(row.is_some())
}

/// Write a permanent block, re-flagging a previously cleared record.
pub(crate) async fn upsert_block(pool: &PgPool, ip: &str) -> Result<()> {
    let query = r"
        INSERT INTO blocked_ips (blocked_ip, is_blocked)
        VALUES ($1, TRUE)
        ON CONFLICT (blocked_ip) DO UPDATE
        SET is_blocked = TRUE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(ip)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to upsert block record")?;
    Ok(())
}
