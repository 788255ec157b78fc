//! PostgreSQL [`Storage`] built on sqlx.
//!
//! Tables are created by [`crate::schema::create_schema`]. Enum columns are
//! stored as their wire text and parsed back on read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{Storage, StorageResult};
use crate::error::StorageError;
use crate::models::{
    Alert, AlertDraft, AlertStatus, Assessment, Device, HistoryFilter, NewDevice, Prediction,
    ReadingWithRisk, RiskLevel, SensorReading,
};

// ---

#[derive(Debug, Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ReadingRow {
    id: i64,
    device_id: String,
    temperature_c: f64,
    humidity_pct: f64,
    current_a: f64,
    recorded_at: DateTime<Utc>,
    risk_level: Option<String>,
    failure_probability: Option<f64>,
}

impl TryFrom<ReadingRow> for ReadingWithRisk {
    type Error = StorageError;

    fn try_from(row: ReadingRow) -> Result<Self, Self::Error> {
        Ok(ReadingWithRisk {
            reading: SensorReading {
                id: row.id,
                device_id: row.device_id,
                temperature: row.temperature_c,
                humidity: row.humidity_pct,
                current: row.current_a,
                timestamp: row.recorded_at,
            },
            risk_level: row
                .risk_level
                .as_deref()
                .map(decode::<RiskLevel>)
                .transpose()?,
            failure_probability: row.failure_probability,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AssessmentRow {
    id: i64,
    reading_id: i64,
    device_id: String,
    risk_level: String,
    failure_probability: f64,
    factors: Vec<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AssessmentRow> for Assessment {
    type Error = StorageError;

    fn try_from(row: AssessmentRow) -> Result<Self, Self::Error> {
        Ok(Assessment {
            id: row.id,
            reading_id: row.reading_id,
            device_id: row.device_id,
            risk_level: decode(&row.risk_level)?,
            failure_probability: row.failure_probability,
            influential_factors: row.factors,
            timestamp: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AlertRow {
    id: i64,
    assessment_id: i64,
    device_id: String,
    alert_type: String,
    message: String,
    severity: String,
    status: String,
    is_read: bool,
    notes: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AlertRow> for Alert {
    type Error = StorageError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        Ok(Alert {
            id: row.id,
            assessment_id: row.assessment_id,
            device_id: row.device_id,
            alert_type: decode(&row.alert_type)?,
            message: row.message,
            severity: decode(&row.severity)?,
            status: decode(&row.status)?,
            read: row.is_read,
            notes: row.notes,
            timestamp: row.created_at,
        })
    }
}

/// Parse a stored enum column.
fn decode<T>(text: &str) -> Result<T, StorageError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    text.parse::<T>()
        .map_err(|e| StorageError::Decode(e.to_string()))
}

fn decode_all<R, T>(rows: Vec<R>) -> StorageResult<Vec<T>>
where
    T: TryFrom<R, Error = StorageError>,
{
    rows.into_iter().map(T::try_from).collect()
}

const ALERT_COLUMNS: &str = "id, assessment_id, device_id, alert_type, message, severity, \
                             status, is_read, notes, created_at";

const DEVICE_COLUMNS: &str = "id, device_id, name, location, area, operator_name AS operator, \
                              active, last_seen";

#[async_trait]
impl Storage for PgStorage {
    async fn insert_reading(
        &self,
        device_id: &str,
        temperature: f64,
        humidity: f64,
        current: f64,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<i64> {
        // ---
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sensor_readings (
                device_id, temperature_c, humidity_pct, current_a, recorded_at
            ) VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(device_id)
        .bind(temperature)
        .bind(humidity)
        .bind(current)
        .bind(timestamp)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE devices SET last_seen = $2 WHERE device_id = $1")
            .bind(device_id)
            .bind(timestamp)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(id)
    }

    async fn insert_assessment(
        &self,
        reading_id: i64,
        device_id: &str,
        prediction: &Prediction,
    ) -> StorageResult<i64> {
        // ---
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO assessments (
                reading_id, device_id, risk_level, failure_probability, factors, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(reading_id)
        .bind(device_id)
        .bind(prediction.risk_level.as_str())
        .bind(prediction.failure_probability)
        .bind(&prediction.influential_factors)
        .bind(prediction.timestamp)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn insert_alert(
        &self,
        assessment_id: i64,
        device_id: &str,
        alert: &AlertDraft,
    ) -> StorageResult<i64> {
        // ---
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO alerts (
                assessment_id, device_id, alert_type, message, severity, created_at
            ) VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING id
            "#,
        )
        .bind(assessment_id)
        .bind(device_id)
        .bind(alert.alert_type.as_str())
        .bind(&alert.message)
        .bind(alert.severity.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn resolve_stale_alerts(&self, device_id: &str) -> StorageResult<u64> {
        // ---
        let result = sqlx::query(
            r#"
            UPDATE alerts
               SET status = $2, is_read = TRUE
             WHERE device_id = $1 AND status <> $2
            "#,
        )
        .bind(device_id)
        .bind(AlertStatus::Resolved.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn filtered_readings(
        &self,
        filter: &HistoryFilter,
    ) -> StorageResult<Vec<ReadingWithRisk>> {
        // ---
        let rows: Vec<ReadingRow> = sqlx::query_as(
            r#"
            SELECT r.id, r.device_id, r.temperature_c, r.humidity_pct, r.current_a,
                   r.recorded_at, a.risk_level, a.failure_probability
              FROM sensor_readings r
              LEFT JOIN assessments a ON a.reading_id = r.id
             WHERE ($1::TEXT IS NULL OR r.device_id = $1)
               AND ($2::TIMESTAMPTZ IS NULL OR r.recorded_at >= $2)
               AND ($3::TIMESTAMPTZ IS NULL OR r.recorded_at <= $3)
             ORDER BY r.recorded_at DESC, r.id DESC
             LIMIT $4
            "#,
        )
        .bind(filter.device_id.as_deref())
        .bind(filter.from)
        .bind(filter.to)
        .bind(i64::from(filter.limit))
        .fetch_all(&self.pool)
        .await?;

        decode_all(rows)
    }

    async fn assessment_for_reading(&self, reading_id: i64) -> StorageResult<Option<Assessment>> {
        // ---
        let row: Option<AssessmentRow> = sqlx::query_as(
            r#"
            SELECT id, reading_id, device_id, risk_level, failure_probability, factors, created_at
              FROM assessments
             WHERE reading_id = $1
             ORDER BY id DESC
             LIMIT 1
            "#,
        )
        .bind(reading_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Assessment::try_from).transpose()
    }

    async fn unread_alerts(&self, limit: u32) -> StorageResult<Vec<Alert>> {
        // ---
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE NOT is_read \
             ORDER BY created_at DESC, id DESC LIMIT $1"
        );
        let rows: Vec<AlertRow> = sqlx::query_as(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        decode_all(rows)
    }

    async fn alerts(&self, device_id: Option<&str>, limit: u32) -> StorageResult<Vec<Alert>> {
        // ---
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE ($1::TEXT IS NULL OR device_id = $1) \
             ORDER BY created_at DESC, id DESC LIMIT $2"
        );
        let rows: Vec<AlertRow> = sqlx::query_as(&sql)
            .bind(device_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        decode_all(rows)
    }

    async fn alert(&self, id: i64) -> StorageResult<Option<Alert>> {
        // ---
        let sql = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = $1");
        let row: Option<AlertRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Alert::try_from).transpose()
    }

    async fn update_alert_status(
        &self,
        id: i64,
        from: AlertStatus,
        to: AlertStatus,
        notes: &str,
    ) -> StorageResult<bool> {
        // ---
        let result = sqlx::query(
            r#"
            UPDATE alerts
               SET status = $3, notes = $4, is_read = $5
             WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(notes)
        .bind(to.marks_read())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn active_alert_count(&self, device_id: &str) -> StorageResult<i64> {
        // ---
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM alerts WHERE device_id = $1 AND status <> $2",
        )
        .bind(device_id)
        .bind(AlertStatus::Resolved.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn devices(&self) -> StorageResult<Vec<Device>> {
        // ---
        let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices ORDER BY name");
        let devices: Vec<Device> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(devices)
    }

    async fn device(&self, device_id: &str) -> StorageResult<Option<Device>> {
        // ---
        let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE device_id = $1");
        let device: Option<Device> = sqlx::query_as(&sql)
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(device)
    }

    async fn register_device(&self, device: &NewDevice) -> StorageResult<Device> {
        // ---
        let sql = format!(
            r#"
            INSERT INTO devices (device_id, name, location, area, operator_name)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (device_id) DO UPDATE SET
                name          = EXCLUDED.name,
                location      = EXCLUDED.location,
                area          = EXCLUDED.area,
                operator_name = EXCLUDED.operator_name
            RETURNING {DEVICE_COLUMNS}
            "#
        );
        let registered: Device = sqlx::query_as(&sql)
            .bind(&device.device_id)
            .bind(&device.name)
            .bind(&device.location)
            .bind(&device.area)
            .bind(&device.operator)
            .fetch_one(&self.pool)
            .await?;
        Ok(registered)
    }
}
