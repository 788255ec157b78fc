//! Persistence boundary.
//!
//! The engine only talks to storage through [`Storage`]. Each call is
//! expected to be atomic on its own; nothing here spans a transaction across
//! calls. [`with_timeout`] bounds a call and never retries it.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::models::{
    Alert, AlertDraft, AlertStatus, Assessment, Device, HistoryFilter, NewDevice, Prediction,
    ReadingWithRisk,
};

mod memory;
mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    // --- ingestion path ---

    /// Store a reading and stamp the device's `last_seen`.
    async fn insert_reading(
        &self,
        device_id: &str,
        temperature: f64,
        humidity: f64,
        current: f64,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<i64>;

    async fn insert_assessment(
        &self,
        reading_id: i64,
        device_id: &str,
        prediction: &Prediction,
    ) -> StorageResult<i64>;

    async fn insert_alert(
        &self,
        assessment_id: i64,
        device_id: &str,
        alert: &AlertDraft,
    ) -> StorageResult<i64>;

    /// Mark every unresolved alert of `device_id` resolved and read.
    /// Returns the number of alerts changed.
    async fn resolve_stale_alerts(&self, device_id: &str) -> StorageResult<u64>;

    // --- reads ---

    /// Readings joined with their assessment, newest first.
    async fn filtered_readings(
        &self,
        filter: &HistoryFilter,
    ) -> StorageResult<Vec<ReadingWithRisk>>;

    async fn assessment_for_reading(&self, reading_id: i64) -> StorageResult<Option<Assessment>>;

    async fn unread_alerts(&self, limit: u32) -> StorageResult<Vec<Alert>>;

    /// Alerts newest first, optionally for a single device.
    async fn alerts(&self, device_id: Option<&str>, limit: u32) -> StorageResult<Vec<Alert>>;

    async fn alert(&self, id: i64) -> StorageResult<Option<Alert>>;

    /// Move alert `id` from `from` to `to` and replace its notes.
    ///
    /// Compare-and-set: nothing is written, and `false` returned, unless the
    /// stored status is still `from` (or no alert has this id).
    async fn update_alert_status(
        &self,
        id: i64,
        from: AlertStatus,
        to: AlertStatus,
        notes: &str,
    ) -> StorageResult<bool>;

    async fn active_alert_count(&self, device_id: &str) -> StorageResult<i64>;

    // --- device registry ---

    /// All devices ordered by name.
    async fn devices(&self) -> StorageResult<Vec<Device>>;

    async fn device(&self, device_id: &str) -> StorageResult<Option<Device>>;

    /// Insert or update by `device_id`.
    async fn register_device(&self, device: &NewDevice) -> StorageResult<Device>;
}

/// Run a storage call with an upper bound on its duration.
pub async fn with_timeout<T, F>(op: &'static str, limit: Duration, fut: F) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    // ---
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout {
            op,
            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// Latest reading, optionally for one device.
pub async fn latest_reading(
    storage: &dyn Storage,
    device_id: Option<&str>,
) -> StorageResult<Option<ReadingWithRisk>> {
    // ---
    let filter = HistoryFilter {
        device_id: device_id.map(str::to_string),
        limit: 1,
        ..HistoryFilter::default()
    };
    Ok(storage.filtered_readings(&filter).await?.into_iter().next())
}
