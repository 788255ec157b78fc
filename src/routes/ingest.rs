//! `POST /api/ingest` and `POST /api/ingest/v2`.
//!
//! Both accept `{device_id?, temperature, humidity, current}` (`equipo_id` is
//! accepted as an alias for `device_id`). A payload without a device id is
//! filed under the configured default device.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{json_body, AppState};
use crate::{CoreError, CoreResult, IngestOutcome};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/ingest", post(handler))
        .route("/api/ingest/v2", post(handler))
}

#[derive(Debug, Deserialize)]
struct IngestRequest {
    #[serde(default, alias = "equipo_id")]
    device_id: Option<String>,
    temperature: Option<f64>,
    humidity: Option<f64>,
    current: Option<f64>,
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    success: bool,
    #[serde(flatten)]
    outcome: IngestOutcome,
}

async fn handler(
    State(state): State<AppState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> CoreResult<Json<IngestResponse>> {
    // ---
    let req = json_body(payload)?;
    debug!("POST /api/ingest - {:?}", req);

    let temperature = required("temperature", req.temperature)?;
    let humidity = required("humidity", req.humidity)?;
    let current = required("current", req.current)?;
    let device_id = req
        .device_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| state.default_device_id.clone());

    info!(
        "[{}] Temp: {}°C, Hum: {}%, Current: {}A",
        device_id, temperature, humidity, current
    );

    let outcome = state
        .orchestrator
        .ingest(&device_id, temperature, humidity, current)
        .await?;

    Ok(Json(IngestResponse {
        success: true,
        outcome,
    }))
}

fn required(field: &str, value: Option<f64>) -> CoreResult<f64> {
    value.ok_or_else(|| CoreError::Validation(format!("{field} is required")))
}
