//! Alert listing and the operator status update.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{json_body, AppState, DeviceQuery};
use crate::{Alert, AlertStatus, CoreError, CoreResult, DeviceDirectory};

// ---

const UNREAD_LIMIT: u32 = 10;
const ALL_LIMIT: u32 = 50;

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/alertas", get(unread))
        .route("/api/alertas/todas", get(all))
        .route("/api/alertas/{id}/estado", put(update_status))
}

#[derive(Debug, Serialize)]
struct AlertsResponse<T> {
    alerts: Vec<T>,
}

#[derive(Debug, Serialize)]
struct NamedAlert {
    #[serde(flatten)]
    alert: Alert,
    device_name: String,
}

#[derive(Debug, Deserialize)]
struct StatusUpdate {
    #[serde(alias = "estado")]
    status: String,
    #[serde(default, alias = "notas")]
    notes: String,
}

#[derive(Debug, Serialize)]
struct UpdateResponse {
    success: bool,
    message: &'static str,
}

/// Handle `GET /api/alertas`: newest unread alerts.
async fn unread(State(state): State<AppState>) -> CoreResult<Json<AlertsResponse<Alert>>> {
    let alerts = state
        .bounded("unread_alerts", state.storage.unread_alerts(UNREAD_LIMIT))
        .await?;
    Ok(Json(AlertsResponse { alerts }))
}

/// Handle `GET /api/alertas/todas?device_id=`: newest alerts in any state.
async fn all(
    Query(params): Query<DeviceQuery>,
    State(state): State<AppState>,
) -> CoreResult<Json<AlertsResponse<NamedAlert>>> {
    // ---
    let storage = state.storage.as_ref();
    let alerts = state
        .bounded("alerts", storage.alerts(params.device_id.as_deref(), ALL_LIMIT))
        .await?;
    let devices = state.bounded("devices", storage.devices()).await?;
    let directory = DeviceDirectory::from_devices(&devices);

    Ok(Json(AlertsResponse {
        alerts: alerts
            .into_iter()
            .map(|alert| NamedAlert {
                device_name: directory.display_name(&alert.device_id),
                alert,
            })
            .collect(),
    }))
}

/// Handle `PUT /api/alertas/{id}/estado`.
///
/// Statuses only move forward; moving a resolved alert back is rejected. The
/// write is conditional on the status that was checked, so a concurrent
/// auto-resolve cannot be undone.
async fn update_status(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> CoreResult<Json<UpdateResponse>> {
    // ---
    let update = json_body(payload)?;
    let next: AlertStatus = update.status.parse()?;
    info!("Updating alert {} to status {}", id, next);

    let storage = state.storage.as_ref();
    let current = load_alert(&state, id).await?;
    check_transition(id, current.status, next)?;

    let updated = state
        .bounded(
            "update_alert_status",
            storage.update_alert_status(id, current.status, next, &update.notes),
        )
        .await?;
    if !updated {
        // status moved under us; report against what is stored now
        let now = load_alert(&state, id).await?;
        warn!(
            "Alert {} changed from {} to {} before the update",
            id, current.status, now.status
        );
        check_transition(id, now.status, next)?;
        return Err(CoreError::Validation(format!(
            "alert {id} changed status concurrently, retry the update"
        )));
    }

    Ok(Json(UpdateResponse {
        success: true,
        message: "Alerta actualizada",
    }))
}

async fn load_alert(state: &AppState, id: i64) -> CoreResult<Alert> {
    state
        .bounded("alert", state.storage.alert(id))
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "alert",
            id: id.to_string(),
        })
}

fn check_transition(id: i64, from: AlertStatus, to: AlertStatus) -> CoreResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "alert {id} cannot move from {from} to {to}"
        )))
    }
}
