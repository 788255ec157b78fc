//! Risk evaluation and alerting backend for field sensor devices.
//!
//! Devices post (temperature, humidity, current) readings. Each reading is
//! stored, classified into a risk level with a failure probability, turned
//! into zero or more alerts, and used to auto-resolve the device's stale
//! alerts once conditions are back to normal.
//!
//! Module layout follows the Explicit Module Boundary Pattern (EMBP): the
//! items below are re-exported here so sibling modules (notably `routes/*`)
//! import from the crate root rather than from each other.

mod alerts;
mod config;
mod error;
mod ingest;
mod models;
mod registry;
mod risk;
mod routes;
mod schema;
mod storage;

pub use alerts::{AlertGenerator, AutoResolvePolicy};
pub use config::{load_from_env, Config, ThresholdConfig, TierThresholds};
pub use error::{CoreError, CoreResult, StorageError};
pub use ingest::{IngestOutcome, IngestionOrchestrator};
pub use models::{
    Alert, AlertDraft, AlertStatus, AlertType, Assessment, Device, HistoryFilter, NewDevice,
    Prediction, ReadingWithRisk, RiskLevel, SensorReading, Severity,
};
pub use registry::DeviceDirectory;
pub use risk::{explain, rank_factors, Explanation, FactorImportance, RiskEvaluator, Tier};
pub use routes::{router, AppState};
pub use schema::create_schema;
pub use storage::{
    latest_reading, with_timeout, MemoryStorage, PgStorage, Storage, StorageResult,
};

/// Device id used for payloads that do not name their device (single-device
/// firmware).
pub const DEFAULT_DEVICE_ID: &str = "ESP32_001";
