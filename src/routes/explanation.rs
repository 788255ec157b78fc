use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use super::{AppState, DeviceQuery};
use crate::{explain, latest_reading, CoreResult, DeviceDirectory, Explanation};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/api/explicacion", get(handler))
}

#[derive(Debug, Serialize)]
struct ExplanationResponse {
    #[serde(flatten)]
    explanation: Explanation,
    device_id: Option<String>,
    device_name: String,
}

/// Handle `GET /api/explicacion?device_id=`.
///
/// Explains the latest reading of the device, or of any device when none is
/// given.
async fn handler(
    Query(params): Query<DeviceQuery>,
    State(state): State<AppState>,
) -> CoreResult<Json<ExplanationResponse>> {
    // ---
    let storage = state.storage.as_ref();
    let latest = state
        .bounded(
            "latest_reading",
            latest_reading(storage, params.device_id.as_deref()),
        )
        .await?;

    let Some(latest) = latest else {
        return Ok(Json(ExplanationResponse {
            explanation: Explanation::no_data(),
            device_id: params.device_id,
            device_name: "Sin datos".to_string(),
        }));
    };

    let r = latest.reading;
    let devices = state.bounded("devices", storage.devices()).await?;
    let device_name = DeviceDirectory::from_devices(&devices).display_name(&r.device_id);

    Ok(Json(ExplanationResponse {
        explanation: explain(r.temperature, r.humidity, r.current),
        device_id: Some(r.device_id),
        device_name,
    }))
}
