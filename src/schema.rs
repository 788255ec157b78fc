//! Database schema management for `sensorflow-risk`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `devices` registry, `sensor_readings`, their `assessments` and
/// the `alerts` raised from them. Safe to call on every startup; no-op if
/// objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            id            BIGSERIAL PRIMARY KEY,
            device_id     TEXT        NOT NULL UNIQUE,
            name          TEXT        NOT NULL,
            location      TEXT        NOT NULL,
            area          TEXT,
            operator_name TEXT,
            active        BOOLEAN     NOT NULL DEFAULT TRUE,
            last_seen     TIMESTAMPTZ
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_readings (
            id            BIGSERIAL PRIMARY KEY,
            device_id     TEXT             NOT NULL,
            temperature_c DOUBLE PRECISION NOT NULL,
            humidity_pct  DOUBLE PRECISION NOT NULL,
            current_a     DOUBLE PRECISION NOT NULL,
            recorded_at   TIMESTAMPTZ      NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assessments (
            id                  BIGSERIAL PRIMARY KEY,
            reading_id          BIGINT           NOT NULL REFERENCES sensor_readings (id),
            device_id           TEXT             NOT NULL,
            risk_level          TEXT             NOT NULL,
            failure_probability DOUBLE PRECISION NOT NULL,
            factors             TEXT[]           NOT NULL,
            created_at          TIMESTAMPTZ      NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alerts (
            id            BIGSERIAL PRIMARY KEY,
            assessment_id BIGINT      NOT NULL REFERENCES assessments (id),
            device_id     TEXT        NOT NULL,
            alert_type    TEXT        NOT NULL,
            message       TEXT        NOT NULL,
            severity      TEXT        NOT NULL,
            status        TEXT        NOT NULL DEFAULT 'pendiente',
            is_read       BOOLEAN     NOT NULL DEFAULT FALSE,
            notes         TEXT        NOT NULL DEFAULT '',
            created_at    TIMESTAMPTZ NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Indexes for the per-device lookups
    for ddl in [
        "CREATE INDEX IF NOT EXISTS idx_sensor_readings_device_time \
            ON sensor_readings (device_id, recorded_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_assessments_reading_id ON assessments (reading_id)",
        "CREATE INDEX IF NOT EXISTS idx_alerts_device_status ON alerts (device_id, status)",
    ] {
        sqlx::query(ddl).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(())
}
