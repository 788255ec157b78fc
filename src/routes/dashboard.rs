use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{AppState, DeviceQuery};
use crate::{latest_reading, Alert, CoreResult, RiskLevel};

// ---

const DASHBOARD_ALERTS: u32 = 10;

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/api/dashboard", get(handler))
}

/// Latest values shown on the dashboard gauges.
#[derive(Debug, Serialize)]
struct Snapshot {
    device_id: Option<String>,
    temperature: f64,
    humidity: f64,
    current: f64,
    risk_level: RiskLevel,
    failure_probability: f64,
    timestamp: Option<DateTime<Utc>>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            device_id: None,
            temperature: 0.0,
            humidity: 0.0,
            current: 0.0,
            risk_level: RiskLevel::Low,
            failure_probability: 0.0,
            timestamp: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct DashboardResponse {
    current: Snapshot,
    alerts: Vec<Alert>,
}

/// Handle `GET /api/dashboard?device_id=`.
///
/// Latest reading and the newest alerts, for one device when given. With no
/// readings yet the snapshot is zeroed and the alert list empty.
async fn handler(
    Query(params): Query<DeviceQuery>,
    State(state): State<AppState>,
) -> CoreResult<Json<DashboardResponse>> {
    // ---
    let device_id = params.device_id.as_deref();
    let storage = state.storage.as_ref();

    let latest = state
        .bounded("latest_reading", latest_reading(storage, device_id))
        .await?;

    let Some(latest) = latest else {
        return Ok(Json(DashboardResponse {
            current: Snapshot::default(),
            alerts: Vec::new(),
        }));
    };

    let alerts = state
        .bounded("alerts", storage.alerts(device_id, DASHBOARD_ALERTS))
        .await?;

    let reading = latest.reading;
    Ok(Json(DashboardResponse {
        current: Snapshot {
            device_id: Some(reading.device_id),
            temperature: reading.temperature,
            humidity: reading.humidity,
            current: reading.current,
            risk_level: latest.risk_level.unwrap_or(RiskLevel::Low),
            failure_probability: latest.failure_probability.unwrap_or(0.0),
            timestamp: Some(reading.timestamp),
        },
        alerts,
    }))
}
