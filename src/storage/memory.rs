//! In-process [`Storage`] backed by vectors behind a mutex.
//!
//! Used by the test suites and handy for running the engine without a
//! database. Ids are assigned sequentially from 1.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Storage, StorageResult};
use crate::error::StorageError;
use crate::models::{
    Alert, AlertDraft, AlertStatus, Assessment, Device, HistoryFilter, NewDevice, Prediction,
    ReadingWithRisk, SensorReading,
};

#[derive(Debug, Default)]
struct Tables {
    readings: Vec<SensorReading>,
    assessments: Vec<Assessment>,
    alerts: Vec<Alert>,
    devices: Vec<Device>,
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: Mutex<Tables>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StorageError::Decode("memory storage lock poisoned".into()))
    }

    /// Snapshot of every stored alert, in insertion order.
    pub fn all_alerts(&self) -> Vec<Alert> {
        self.tables
            .lock()
            .map(|t| t.alerts.clone())
            .unwrap_or_default()
    }
}

/// Newest first, ties broken by id.
fn newest_first_by<T>(items: &mut [T], key: impl Fn(&T) -> (DateTime<Utc>, i64)) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn insert_reading(
        &self,
        device_id: &str,
        temperature: f64,
        humidity: f64,
        current: f64,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<i64> {
        // ---
        let mut t = self.lock()?;
        let id = t.readings.len() as i64 + 1;
        t.readings.push(SensorReading {
            id,
            device_id: device_id.to_string(),
            temperature,
            humidity,
            current,
            timestamp,
        });
        if let Some(device) = t.devices.iter_mut().find(|d| d.device_id == device_id) {
            device.last_seen = Some(timestamp);
        }
        Ok(id)
    }

    async fn insert_assessment(
        &self,
        reading_id: i64,
        device_id: &str,
        prediction: &Prediction,
    ) -> StorageResult<i64> {
        // ---
        let mut t = self.lock()?;
        let id = t.assessments.len() as i64 + 1;
        t.assessments.push(Assessment {
            id,
            reading_id,
            device_id: device_id.to_string(),
            risk_level: prediction.risk_level,
            failure_probability: prediction.failure_probability,
            influential_factors: prediction.influential_factors.clone(),
            timestamp: prediction.timestamp,
        });
        Ok(id)
    }

    async fn insert_alert(
        &self,
        assessment_id: i64,
        device_id: &str,
        alert: &AlertDraft,
    ) -> StorageResult<i64> {
        // ---
        let mut t = self.lock()?;
        let id = t.alerts.len() as i64 + 1;
        t.alerts.push(Alert {
            id,
            assessment_id,
            device_id: device_id.to_string(),
            alert_type: alert.alert_type,
            message: alert.message.clone(),
            severity: alert.severity,
            status: AlertStatus::Pending,
            read: false,
            notes: String::new(),
            timestamp: Utc::now(),
        });
        Ok(id)
    }

    async fn resolve_stale_alerts(&self, device_id: &str) -> StorageResult<u64> {
        // ---
        let mut t = self.lock()?;
        let mut changed = 0;
        for alert in t
            .alerts
            .iter_mut()
            .filter(|a| a.device_id == device_id && a.status != AlertStatus::Resolved)
        {
            alert.status = AlertStatus::Resolved;
            alert.read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn filtered_readings(
        &self,
        filter: &HistoryFilter,
    ) -> StorageResult<Vec<ReadingWithRisk>> {
        // ---
        let t = self.lock()?;
        let mut rows: Vec<ReadingWithRisk> = t
            .readings
            .iter()
            .filter(|r| filter.device_id.as_ref().map_or(true, |id| &r.device_id == id))
            .filter(|r| filter.from.map_or(true, |from| r.timestamp >= from))
            .filter(|r| filter.to.map_or(true, |to| r.timestamp <= to))
            .map(|r| {
                let assessment = t.assessments.iter().find(|a| a.reading_id == r.id);
                ReadingWithRisk {
                    reading: r.clone(),
                    risk_level: assessment.map(|a| a.risk_level),
                    failure_probability: assessment.map(|a| a.failure_probability),
                }
            })
            .collect();
        newest_first_by(&mut rows, |r| (r.reading.timestamp, r.reading.id));
        rows.truncate(filter.limit as usize);
        Ok(rows)
    }

    async fn assessment_for_reading(&self, reading_id: i64) -> StorageResult<Option<Assessment>> {
        let t = self.lock()?;
        Ok(t.assessments.iter().find(|a| a.reading_id == reading_id).cloned())
    }

    async fn unread_alerts(&self, limit: u32) -> StorageResult<Vec<Alert>> {
        // ---
        let t = self.lock()?;
        let mut rows: Vec<Alert> = t.alerts.iter().filter(|a| !a.read).cloned().collect();
        newest_first_by(&mut rows, |a| (a.timestamp, a.id));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn alerts(&self, device_id: Option<&str>, limit: u32) -> StorageResult<Vec<Alert>> {
        // ---
        let t = self.lock()?;
        let mut rows: Vec<Alert> = t
            .alerts
            .iter()
            .filter(|a| device_id.map_or(true, |id| a.device_id == id))
            .cloned()
            .collect();
        newest_first_by(&mut rows, |a| (a.timestamp, a.id));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn alert(&self, id: i64) -> StorageResult<Option<Alert>> {
        let t = self.lock()?;
        Ok(t.alerts.iter().find(|a| a.id == id).cloned())
    }

    async fn update_alert_status(
        &self,
        id: i64,
        from: AlertStatus,
        to: AlertStatus,
        notes: &str,
    ) -> StorageResult<bool> {
        // ---
        let mut t = self.lock()?;
        match t.alerts.iter_mut().find(|a| a.id == id && a.status == from) {
            Some(alert) => {
                alert.status = to;
                alert.notes = notes.to_string();
                alert.read = to.marks_read();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn active_alert_count(&self, device_id: &str) -> StorageResult<i64> {
        let t = self.lock()?;
        Ok(t.alerts
            .iter()
            .filter(|a| a.device_id == device_id && a.status != AlertStatus::Resolved)
            .count() as i64)
    }

    async fn devices(&self) -> StorageResult<Vec<Device>> {
        // ---
        let t = self.lock()?;
        let mut devices = t.devices.clone();
        devices.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(devices)
    }

    async fn device(&self, device_id: &str) -> StorageResult<Option<Device>> {
        let t = self.lock()?;
        Ok(t.devices.iter().find(|d| d.device_id == device_id).cloned())
    }

    async fn register_device(&self, device: &NewDevice) -> StorageResult<Device> {
        // ---
        let mut t = self.lock()?;
        if let Some(existing) = t
            .devices
            .iter_mut()
            .find(|d| d.device_id == device.device_id)
        {
            existing.name = device.name.clone();
            existing.location = device.location.clone();
            existing.area = device.area.clone();
            existing.operator = device.operator.clone();
            return Ok(existing.clone());
        }

        let registered = Device {
            id: t.devices.len() as i64 + 1,
            device_id: device.device_id.clone(),
            name: device.name.clone(),
            location: device.location.clone(),
            area: device.area.clone(),
            operator: device.operator.clone(),
            active: true,
            last_seen: None,
        };
        t.devices.push(registered.clone());
        Ok(registered)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{AlertType, RiskLevel, Severity};
    use chrono::{Duration, TimeZone};

    fn draft(alert_type: AlertType) -> AlertDraft {
        AlertDraft {
            alert_type,
            message: format!("{alert_type} alert"),
            severity: Severity::Warning,
        }
    }

    #[tokio::test]
    async fn reading_assessment_round_trip() {
        // ---
        let store = MemoryStorage::new();
        let at = Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, 0).unwrap();
        let reading_id = store
            .insert_reading("ESP32_002", 41.5, 66.0, -3.25, at)
            .await
            .unwrap();

        let prediction = Prediction {
            risk_level: RiskLevel::Low,
            failure_probability: 20.0,
            influential_factors: vec!["Temperatura elevada".into()],
            timestamp: at,
        };
        store
            .insert_assessment(reading_id, "ESP32_002", &prediction)
            .await
            .unwrap();

        let rows = store
            .filtered_readings(&HistoryFilter {
                limit: 10,
                ..HistoryFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reading.temperature, 41.5);
        assert_eq!(rows[0].reading.current, -3.25);
        assert_eq!(rows[0].reading.timestamp, at);
        assert_eq!(rows[0].risk_level, Some(RiskLevel::Low));

        let assessment = store.assessment_for_reading(reading_id).await.unwrap().unwrap();
        assert_eq!(assessment.influential_factors, prediction.influential_factors);
        assert_eq!(assessment.failure_probability, 20.0);
    }

    #[tokio::test]
    async fn sweep_only_touches_one_device() {
        // ---
        let store = MemoryStorage::new();
        store.insert_alert(1, "ESP32_001", &draft(AlertType::Humidity)).await.unwrap();
        store.insert_alert(2, "ESP32_002", &draft(AlertType::Current)).await.unwrap();
        store.insert_alert(3, "ESP32_001", &draft(AlertType::System)).await.unwrap();
        store
            .update_alert_status(3, AlertStatus::Pending, AlertStatus::Resolved, "done")
            .await
            .unwrap();

        assert_eq!(store.resolve_stale_alerts("ESP32_001").await.unwrap(), 1);
        assert_eq!(store.resolve_stale_alerts("ESP32_001").await.unwrap(), 0);

        let other = store.alert(2).await.unwrap().unwrap();
        assert_eq!(other.status, AlertStatus::Pending);
        assert!(!other.read);

        let swept = store.alert(1).await.unwrap().unwrap();
        assert_eq!(swept.status, AlertStatus::Resolved);
        assert!(swept.read);
    }

    #[tokio::test]
    async fn history_filter_bounds_are_inclusive() {
        // ---
        let store = MemoryStorage::new();
        let day = Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap();
        for h in 0..5 {
            store
                .insert_reading("ESP32_001", 20.0, 40.0, 1.0, day + Duration::hours(h))
                .await
                .unwrap();
        }
        store
            .insert_reading("ESP32_003", 20.0, 40.0, 1.0, day + Duration::hours(2))
            .await
            .unwrap();

        let rows = store
            .filtered_readings(&HistoryFilter {
                device_id: Some("ESP32_001".into()),
                from: Some(day + Duration::hours(1)),
                to: Some(day + Duration::hours(3)),
                limit: 500,
            })
            .await
            .unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.reading.id).collect();
        assert_eq!(ids, vec![4, 3, 2]);
    }

    #[tokio::test]
    async fn register_device_upserts() {
        // ---
        let store = MemoryStorage::new();
        let mut new = NewDevice {
            device_id: "ESP32_001".into(),
            name: "Laptop RRHH".into(),
            location: "UGEL Lambayeque".into(),
            area: None,
            operator: None,
        };
        store.register_device(&new).await.unwrap();
        new.name = "Laptop Recursos Humanos".into();
        new.area = Some("RRHH".into());
        let updated = store.register_device(&new).await.unwrap();

        assert_eq!(updated.id, 1);
        assert_eq!(store.devices().await.unwrap().len(), 1);
        assert_eq!(updated.area.as_deref(), Some("RRHH"));
        assert_eq!(
            store.device("ESP32_001").await.unwrap().unwrap().name,
            "Laptop Recursos Humanos"
        );
    }

    #[tokio::test]
    async fn status_update_needs_the_expected_status() {
        // ---
        let store = MemoryStorage::new();
        store.insert_alert(1, "ESP32_001", &draft(AlertType::Temperature)).await.unwrap();
        store.resolve_stale_alerts("ESP32_001").await.unwrap();

        let moved = store
            .update_alert_status(1, AlertStatus::Pending, AlertStatus::InProgress, "late")
            .await
            .unwrap();
        assert!(!moved);
        let alert = store.alert(1).await.unwrap().unwrap();
        assert_eq!(alert.status, AlertStatus::Resolved);
        assert!(alert.notes.is_empty());

        let moved = store
            .update_alert_status(1, AlertStatus::Resolved, AlertStatus::Resolved, "ok")
            .await
            .unwrap();
        assert!(moved);
        assert_eq!(store.alert(1).await.unwrap().unwrap().notes, "ok");
    }
}
