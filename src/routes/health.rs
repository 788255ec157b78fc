// src/routes/health.rs
//! API health check endpoint.
//!
//! Used by container orchestrators and field devices to verify that the
//! service is up before they start posting readings. It is a sibling module
//! in the `routes` directory and follows the Explicit Module Boundary
//! Pattern (EMBP): the gateway (`mod.rs`) merges the subrouter returned here.

use axum::{routing::get, Json, Router};
use serde::Serialize;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
}

/// Handle `GET /health`.
///
/// Does not touch storage.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "Backend funcionando correctamente",
    })
}

/// Create a subrouter containing the `/health` route.
///
/// Generic over the application state so it merges with the gateway router
/// whatever the state type is.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health))
}
