//! Device registry endpoints.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{json_body, AppState};
use crate::{
    latest_reading, Assessment, CoreError, CoreResult, Device, NewDevice, ReadingWithRisk,
};

// ---

/// A device counts as online when its latest reading is younger than this.
const ONLINE_WINDOW_SECS: i64 = 30;
const DEFAULT_LOCATION: &str = "UGEL Lambayeque";

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/equipos/todos", get(list))
        .route("/api/equipos/registrar", post(register))
        .route("/api/equipos/{device_id}", get(detail))
}

#[derive(Debug, Serialize)]
struct DeviceOverview {
    #[serde(flatten)]
    device: Device,
    active_alerts: i64,
    online: bool,
    latest_reading: Option<ReadingWithRisk>,
}

#[derive(Debug, Serialize)]
struct DevicesResponse {
    devices: Vec<DeviceOverview>,
}

#[derive(Debug, Serialize)]
struct DeviceDetail {
    #[serde(flatten)]
    overview: DeviceOverview,
    latest_assessment: Option<Assessment>,
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    #[serde(default, alias = "equipo_id")]
    device_id: Option<String>,
    #[serde(default, alias = "nombre")]
    name: Option<String>,
    #[serde(default, alias = "ubicacion")]
    location: Option<String>,
    #[serde(default)]
    area: Option<String>,
    #[serde(default, alias = "operador")]
    operator: Option<String>,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    success: bool,
    device: Device,
}

async fn overview(state: &AppState, device: Device) -> CoreResult<DeviceOverview> {
    // ---
    let storage = state.storage.as_ref();
    let latest = state
        .bounded("latest_reading", latest_reading(storage, Some(device.device_id.as_str())))
        .await?;
    let active_alerts = state
        .bounded("active_alert_count", storage.active_alert_count(&device.device_id))
        .await?;
    let online = latest
        .as_ref()
        .is_some_and(|r| Utc::now() - r.reading.timestamp < TimeDelta::seconds(ONLINE_WINDOW_SECS));

    Ok(DeviceOverview {
        device,
        active_alerts,
        online,
        latest_reading: latest,
    })
}

/// Handle `GET /api/equipos/todos`.
async fn list(State(state): State<AppState>) -> CoreResult<Json<DevicesResponse>> {
    // ---
    let devices = state.bounded("devices", state.storage.devices()).await?;
    let mut overviews = Vec::with_capacity(devices.len());
    for device in devices {
        overviews.push(overview(&state, device).await?);
    }
    Ok(Json(DevicesResponse { devices: overviews }))
}

/// Handle `GET /api/equipos/{device_id}`.
async fn detail(
    Path(device_id): Path<String>,
    State(state): State<AppState>,
) -> CoreResult<Json<DeviceDetail>> {
    // ---
    let storage = state.storage.as_ref();
    let device = state
        .bounded("device", storage.device(&device_id))
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "device",
            id: device_id.clone(),
        })?;

    let overview = overview(&state, device).await?;
    let latest_assessment = match &overview.latest_reading {
        Some(latest) => {
            state
                .bounded(
                    "assessment_for_reading",
                    storage.assessment_for_reading(latest.reading.id),
                )
                .await?
        }
        None => None,
    };

    Ok(Json(DeviceDetail {
        overview,
        latest_assessment,
    }))
}

/// Handle `POST /api/equipos/registrar`.
async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> CoreResult<Json<RegisterResponse>> {
    // ---
    let req = json_body(payload)?;
    let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let (Some(device_id), Some(name)) = (present(req.device_id), present(req.name)) else {
        return Err(CoreError::Validation(
            "device_id and name are required".into(),
        ));
    };

    let new = NewDevice {
        device_id,
        name,
        location: present(req.location).unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
        area: req.area,
        operator: req.operator,
    };
    let device = state
        .bounded("register_device", state.storage.register_device(&new))
        .await?;
    info!("Registered device {} ({})", device.device_id, device.name);

    Ok(Json(RegisterResponse {
        success: true,
        device,
    }))
}
