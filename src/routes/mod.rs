use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::{Json, Router};
use serde::{Deserialize, Deserializer};

use crate::{
    with_timeout, Config, CoreError, CoreResult, IngestionOrchestrator, Storage, StorageError,
    ThresholdConfig,
};

mod alerts;
mod dashboard;
mod devices;
mod explanation;
mod health;
mod history;
mod ingest;

// ---

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub orchestrator: Arc<IngestionOrchestrator>,
    pub default_device_id: String,
    pub storage_timeout: Duration,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn Storage>,
        thresholds: ThresholdConfig,
        storage_timeout: Duration,
        default_device_id: impl Into<String>,
    ) -> Self {
        // ---
        let orchestrator = Arc::new(IngestionOrchestrator::new(
            storage.clone(),
            thresholds,
            storage_timeout,
        ));
        Self {
            storage,
            orchestrator,
            default_device_id: default_device_id.into(),
            storage_timeout,
        }
    }

    pub fn from_config(storage: Arc<dyn Storage>, config: &Config) -> Self {
        Self::new(
            storage,
            config.thresholds,
            Duration::from_millis(config.storage_timeout_ms),
            config.default_device_id.clone(),
        )
    }

    /// Run a storage call under the configured timeout.
    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, StorageError>>,
    ) -> CoreResult<T> {
        Ok(with_timeout(op, self.storage_timeout, fut).await?)
    }
}

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(ingest::router())
        .merge(dashboard::router())
        .merge(history::router())
        .merge(explanation::router())
        .merge(alerts::router())
        .merge(devices::router())
        .merge(health::router())
        .with_state(state)
}

/// `?device_id=` (or `?equipo_id=`) filter; an empty value means no filter.
#[derive(Debug, Default, Deserialize)]
struct DeviceQuery {
    #[serde(default, alias = "equipo_id", deserialize_with = "non_empty")]
    device_id: Option<String>,
}

fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}

/// Unwrap a JSON body; a malformed or incomplete one is a validation error.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> CoreResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| CoreError::Validation(e.body_text()))
}
