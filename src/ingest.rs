//! Per-reading ingestion pipeline.
//!
//! Sequence: store reading → evaluate → store assessment → generate alerts →
//! store each alert → auto-resolve sweep. The steps are not wrapped in a
//! transaction: a failing step aborts the ingestion with an error and leaves
//! the rows already written in place. Storage calls are bounded by the
//! configured timeout and never retried.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::alerts::{AlertGenerator, AutoResolvePolicy};
use crate::config::ThresholdConfig;
use crate::error::{CoreError, CoreResult, StorageError};
use crate::models::{AlertDraft, Prediction};
use crate::risk::RiskEvaluator;
use crate::storage::{with_timeout, Storage};

/// What one ingestion produced.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub device_id: String,
    pub reading_id: i64,
    pub prediction: Prediction,
    pub alerts: Vec<AlertDraft>,
    /// Alerts of this device closed by the auto-resolve sweep.
    pub resolved_alerts: u64,
}

pub struct IngestionOrchestrator {
    storage: Arc<dyn Storage>,
    evaluator: RiskEvaluator,
    generator: AlertGenerator,
    auto_resolve: AutoResolvePolicy,
    storage_timeout: Duration,
}

impl IngestionOrchestrator {
    pub fn new(
        storage: Arc<dyn Storage>,
        thresholds: ThresholdConfig,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            evaluator: RiskEvaluator::new(thresholds),
            generator: AlertGenerator::new(thresholds),
            auto_resolve: AutoResolvePolicy::new(&thresholds),
            storage_timeout,
        }
    }

    pub fn evaluator(&self) -> &RiskEvaluator {
        &self.evaluator
    }

    #[tracing::instrument(
        name = "ingest",
        skip(self),
        fields(ingest_id = %Uuid::new_v4())
    )]
    pub async fn ingest(
        &self,
        device_id: &str,
        temperature: f64,
        humidity: f64,
        current: f64,
    ) -> CoreResult<IngestOutcome> {
        // ---
        validate(device_id, temperature, humidity, current)?;

        let storage = self.storage.as_ref();

        // Step 1: reading
        let reading_id = self
            .bounded(
                "insert_reading",
                storage.insert_reading(device_id, temperature, humidity, current, Utc::now()),
            )
            .await?;
        debug!(reading_id, "reading stored");

        // Step 2: assessment
        let prediction = self.evaluator.evaluate(temperature, humidity, current);
        let assessment_id = self
            .bounded(
                "insert_assessment",
                storage.insert_assessment(reading_id, device_id, &prediction),
            )
            .await?;

        // Step 3: alerts
        let alerts =
            self.generator
                .generate(temperature, humidity, current, prediction.risk_level);
        for alert in &alerts {
            self.bounded(
                "insert_alert",
                storage.insert_alert(assessment_id, device_id, alert),
            )
            .await?;
        }

        // Step 4: auto-resolve this device's outstanding alerts
        let resolved_alerts = if self.auto_resolve.should_resolve(temperature, current) {
            let count = self
                .bounded("resolve_stale_alerts", storage.resolve_stale_alerts(device_id))
                .await?;
            if count > 0 {
                info!(count, "alerts resolved automatically");
            }
            count
        } else {
            0
        };

        info!(
            risk_level = %prediction.risk_level,
            failure_probability = prediction.failure_probability,
            alerts = alerts.len(),
            "ingestion complete"
        );

        Ok(IngestOutcome {
            device_id: device_id.to_string(),
            reading_id,
            prediction,
            alerts,
            resolved_alerts,
        })
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl std::future::Future<Output = Result<T, StorageError>>,
    ) -> CoreResult<T> {
        with_timeout(op, self.storage_timeout, fut)
            .await
            .map_err(|e| {
                error!(op, error = %e, "storage call failed, aborting ingestion");
                CoreError::from(e)
            })
    }
}

fn validate(device_id: &str, temperature: f64, humidity: f64, current: f64) -> CoreResult<()> {
    // ---
    if device_id.trim().is_empty() {
        return Err(CoreError::Validation("device_id must not be empty".into()));
    }
    for (name, value) in [
        ("temperature", temperature),
        ("humidity", humidity),
        ("current", current),
    ] {
        if !value.is_finite() {
            return Err(CoreError::Validation(format!(
                "{name} must be a finite number"
            )));
        }
    }
    Ok(())
}
