//! End-to-end tests over the full router, backed by in-memory storage.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio_test::assert_ok;
use tower::ServiceExt;

use sensorflow_risk::{
    router, Alert, AlertDraft, AlertStatus, AppState, Assessment, Device, HistoryFilter,
    MemoryStorage, NewDevice, Prediction, ReadingWithRisk, Storage, StorageResult,
    ThresholdConfig, DEFAULT_DEVICE_ID,
};

// ---

fn app_over(storage: Arc<dyn Storage>) -> Router {
    // ---
    let state = AppState::new(
        storage,
        ThresholdConfig::default(),
        Duration::from_secs(2),
        DEFAULT_DEVICE_ID,
    );
    router(state)
}

fn test_app() -> (Router, Arc<MemoryStorage>) {
    let store = Arc::new(MemoryStorage::new());
    (app_over(store.clone()), store)
}

fn reading(device_id: &str, temperature: f64, humidity: f64, current: f64) -> Value {
    json!({
        "device_id": device_id,
        "temperature": temperature,
        "humidity": humidity,
        "current": current,
    })
}

async fn send(app: &Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
    // ---
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        assert_ok!(serde_json::from_slice(&bytes))
    };
    Ok((status, json))
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    // ---
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))?,
        None => builder.body(Body::empty())?,
    };
    send(app, request).await
}

async fn ingest(app: &Router, body: Value) -> Result<Value> {
    let (status, json) = call(app, Method::POST, "/api/ingest/v2", Some(body)).await?;
    assert_eq!(status, StatusCode::OK, "ingest failed: {json}");
    Ok(json)
}

#[tokio::test]
async fn health_is_ok() -> Result<()> {
    // ---
    let (app, _) = test_app();
    let (status, json) = call(&app, Method::GET, "/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn ingest_classifies_and_raises_alerts() -> Result<()> {
    // ---
    let (app, store) = test_app();
    let body = json!({"temperature": 50.0, "humidity": 50.0, "current": 2.0});
    let (status, json) = call(&app, Method::POST, "/api/ingest", Some(body)).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["device_id"], DEFAULT_DEVICE_ID);
    assert_eq!(json["reading_id"], 1);
    assert_eq!(json["prediction"]["risk_level"], "alto");
    assert_eq!(json["prediction"]["failure_probability"], 80.0);
    assert_eq!(
        json["prediction"]["influential_factors"],
        json!(["Temperatura elevada"])
    );

    let alerts = json["alerts"].as_array().expect("alerts array");
    let kinds: Vec<(&str, &str)> = alerts
        .iter()
        .map(|a| (a["type"].as_str().unwrap(), a["severity"].as_str().unwrap()))
        .collect();
    assert_eq!(kinds, vec![("temperature", "critico"), ("system", "advertencia")]);
    assert_eq!(alerts[0]["message"], "Temperatura critica: 50.0°C");

    assert_eq!(store.all_alerts().len(), 2);
    Ok(())
}

#[tokio::test]
async fn ingest_accepts_equipo_id_alias() -> Result<()> {
    // ---
    let (app, _) = test_app();
    let json = ingest(
        &app,
        json!({"equipo_id": "ESP32_003", "temperature": 46.0, "humidity": 90.0, "current": 1.0}),
    )
    .await?;
    assert_eq!(json["device_id"], "ESP32_003");
    assert_eq!(json["prediction"]["risk_level"], "critico");
    assert_eq!(json["prediction"]["failure_probability"], 100.0);
    Ok(())
}

#[tokio::test]
async fn ingest_rejects_bad_payloads() -> Result<()> {
    // ---
    let (app, store) = test_app();

    let (status, json) = call(
        &app,
        Method::POST,
        "/api/ingest",
        Some(json!({"humidity": 50.0, "current": 1.0})),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "temperature is required");

    let (status, json) = call(
        &app,
        Method::POST,
        "/api/ingest",
        Some(json!({"temperature": "hot", "humidity": 50.0, "current": 1.0})),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");

    let history = store
        .filtered_readings(&HistoryFilter {
            limit: 10,
            ..Default::default()
        })
        .await?;
    assert!(history.is_empty());
    Ok(())
}

#[tokio::test]
async fn normal_reading_resolves_only_its_own_device() -> Result<()> {
    // ---
    let (app, store) = test_app();
    ingest(&app, reading("ESP32_001", 50.0, 50.0, 2.0)).await?;
    ingest(&app, reading("ESP32_002", 50.0, 50.0, 2.0)).await?;

    let json = ingest(&app, reading("ESP32_001", 24.0, 45.0, 1.0)).await?;
    assert_eq!(json["resolved_alerts"], 2);

    for alert in store.all_alerts() {
        let expected = if alert.device_id == "ESP32_001" {
            AlertStatus::Resolved
        } else {
            AlertStatus::Pending
        };
        assert_eq!(alert.status, expected, "alert {}", alert.id);
    }

    let (_, unread) = call(&app, Method::GET, "/api/alertas", None).await?;
    let unread = unread["alerts"].as_array().expect("alerts array");
    assert_eq!(unread.len(), 2);
    assert!(unread.iter().all(|a| a["device_id"] == "ESP32_002"));
    Ok(())
}

#[tokio::test]
async fn dashboard_reports_latest_reading() -> Result<()> {
    // ---
    let (app, _) = test_app();

    let (status, json) = call(&app, Method::GET, "/api/dashboard", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["current"]["risk_level"], "bajo");
    assert_eq!(json["current"]["failure_probability"], 0.0);
    assert_eq!(json["alerts"], json!([]));

    ingest(&app, reading("ESP32_001", 36.0, 75.0, 1.0)).await?;
    ingest(&app, reading("ESP32_002", 20.0, 40.0, 0.5)).await?;

    let uri = "/api/dashboard?equipo_id=ESP32_001";
    let (_, json) = call(&app, Method::GET, uri, None).await?;
    assert_eq!(json["current"]["device_id"], "ESP32_001");
    assert_eq!(json["current"]["temperature"], 36.0);
    assert_eq!(json["current"]["risk_level"], "medio");
    assert_eq!(json["current"]["failure_probability"], 50.0);
    assert_eq!(json["alerts"].as_array().map(Vec::len), Some(2));

    let (_, json) = call(&app, Method::GET, "/api/dashboard", None).await?;
    assert_eq!(json["current"]["device_id"], "ESP32_002");
    Ok(())
}

#[tokio::test]
async fn history_filters_and_names_devices() -> Result<()> {
    // ---
    let (app, _) = test_app();
    let (status, _) = call(
        &app,
        Method::POST,
        "/api/equipos/registrar",
        Some(json!({"equipo_id": "ESP32_001", "nombre": "Laptop RRHH"})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    ingest(&app, reading("ESP32_001", 20.0, 40.0, 0.5)).await?;
    ingest(&app, reading("ESP32_009", 21.0, 41.0, 0.6)).await?;

    let (_, json) = call(&app, Method::GET, "/api/history?limit=1", None).await?;
    let readings = json["readings"].as_array().expect("readings array");
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0]["device_id"], "ESP32_009");
    assert_eq!(readings[0]["device_name"], "ESP32_009");
    assert_eq!(readings[0]["risk_level"], "bajo");
    assert_eq!(readings[0]["failure_probability"], 5.0);

    let (_, json) = call(&app, Method::GET, "/api/historial?equipo_id=ESP32_001", None).await?;
    let readings = json["readings"].as_array().expect("readings array");
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0]["device_name"], "Laptop RRHH");

    let uri = "/api/historial?start_date=2025-13-40";
    let (status, json) = call(&app, Method::GET, uri, None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");

    let (_, json) = call(&app, Method::GET, "/api/historial?end_date=2000-01-01", None).await?;
    assert_eq!(json["readings"], json!([]));
    Ok(())
}

#[tokio::test]
async fn explanation_ranks_factors() -> Result<()> {
    // ---
    let (app, _) = test_app();

    let (_, json) = call(&app, Method::GET, "/api/explicacion", None).await?;
    assert_eq!(json["device_name"], "Sin datos");
    assert_eq!(json["factors"], json!([]));

    ingest(&app, reading("ESP32_002", 25.0, 50.0, 6.0)).await?;
    let uri = "/api/explicacion?equipo_id=ESP32_002";
    let (_, json) = call(&app, Method::GET, uri, None).await?;
    assert_eq!(json["device_id"], "ESP32_002");
    assert_eq!(json["factors"][0]["factor"], "Corriente");
    assert_eq!(json["factors"][0]["importance"], 40.0);
    assert_eq!(json["factors"][1]["factor"], "Temperatura");
    assert_eq!(json["factors"][2]["factor"], "Humedad");
    assert_eq!(
        json["main_reason"],
        "La corriente (6.0A) supera los niveles seguros."
    );
    Ok(())
}

#[tokio::test]
async fn alert_status_moves_forward_only() -> Result<()> {
    // ---
    let (app, store) = test_app();
    ingest(&app, reading("ESP32_001", 40.0, 50.0, 1.0)).await?;
    let id = store.all_alerts()[0].id;
    let uri = format!("/api/alertas/{id}/estado");

    let body = json!({"estado": "en_proceso", "notas": "revisando"});
    let (status, _) = call(&app, Method::PUT, &uri, Some(body)).await?;
    assert_eq!(status, StatusCode::OK);
    let alert = store.alert(id).await?.expect("alert exists");
    assert_eq!(alert.status, AlertStatus::InProgress);
    assert_eq!(alert.notes, "revisando");
    assert!(alert.read);

    let (status, _) = call(&app, Method::PUT, &uri, Some(json!({"estado": "pendiente"}))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, Method::PUT, &uri, Some(json!({"status": "resuelto"}))).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = call(&app, Method::PUT, &uri, Some(json!({"status": "archivado"}))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "unknown alert status `archivado`");

    let body = json!({"estado": "resuelto"});
    let (status, _) = call(&app, Method::PUT, "/api/alertas/999/estado", Some(body)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let uri = "/api/alertas/todas?equipo_id=ESP32_001";
    let (_, json) = call(&app, Method::GET, uri, None).await?;
    let all = json["alerts"].as_array().expect("alerts array");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0]["status"], "resuelto");
    assert_eq!(all[0]["device_name"], "ESP32_001");
    Ok(())
}

#[tokio::test]
async fn incomplete_bodies_are_json_validation_errors() -> Result<()> {
    // ---
    let (app, store) = test_app();
    ingest(&app, reading("ESP32_001", 40.0, 50.0, 1.0)).await?;
    let uri = format!("/api/alertas/{}/estado", store.all_alerts()[0].id);

    let (status, json) = call(&app, Method::PUT, &uri, Some(json!({"notas": "x"}))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(json["error"].as_str().is_some_and(|e| e.contains("status")));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/equipos/registrar")
        .header("content-type", "application/json")
        .body(Body::from("{\"equipo_id\": \"ESP32_001\","))?;
    let (status, json) = send(&app, request).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");

    let body = json!({"equipo_id": "ESP32_001", "nombre": 42});
    let (status, json) = call(&app, Method::POST, "/api/equipos/registrar", Some(body)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    Ok(())
}

#[tokio::test]
async fn device_registry_round_trip() -> Result<()> {
    // ---
    let (app, _) = test_app();

    let body = json!({"nombre": "Sin id"});
    let (status, _) = call(&app, Method::POST, "/api/equipos/registrar", Some(body)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = call(
        &app,
        Method::POST,
        "/api/equipos/registrar",
        Some(json!({
            "equipo_id": "ESP32_002",
            "nombre": "Laptop Contabilidad",
            "area": "Contabilidad",
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["device"]["location"], "UGEL Lambayeque");

    let (status, _) = call(&app, Method::GET, "/api/equipos/ESP32_404", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    ingest(&app, reading("ESP32_002", 37.0, 50.0, 1.0)).await?;

    let (_, json) = call(&app, Method::GET, "/api/equipos/todos", None).await?;
    let devices = json["devices"].as_array().expect("devices array");
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0]["device_id"], "ESP32_002");
    assert_eq!(devices[0]["online"], true);
    assert_eq!(devices[0]["active_alerts"], 1);
    assert!(devices[0]["last_seen"].is_string());

    let (status, json) = call(&app, Method::GET, "/api/equipos/ESP32_002", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["latest_reading"]["temperature"], 37.0);
    assert_eq!(
        json["latest_assessment"]["influential_factors"],
        json!(["Temperatura elevada"])
    );
    Ok(())
}

// ---

/// Storage whose first `alert()` lookup hands out the stored snapshot and
/// then lets an auto-resolve sweep land before the caller writes.
struct SweepAfterRead {
    inner: MemoryStorage,
    swept: AtomicBool,
}

#[async_trait]
impl Storage for SweepAfterRead {
    async fn insert_reading(
        &self,
        device_id: &str,
        temperature: f64,
        humidity: f64,
        current: f64,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<i64> {
        self.inner
            .insert_reading(device_id, temperature, humidity, current, timestamp)
            .await
    }

    async fn insert_assessment(
        &self,
        reading_id: i64,
        device_id: &str,
        prediction: &Prediction,
    ) -> StorageResult<i64> {
        self.inner
            .insert_assessment(reading_id, device_id, prediction)
            .await
    }

    async fn insert_alert(
        &self,
        assessment_id: i64,
        device_id: &str,
        alert: &AlertDraft,
    ) -> StorageResult<i64> {
        self.inner.insert_alert(assessment_id, device_id, alert).await
    }

    async fn resolve_stale_alerts(&self, device_id: &str) -> StorageResult<u64> {
        self.inner.resolve_stale_alerts(device_id).await
    }

    async fn filtered_readings(
        &self,
        filter: &HistoryFilter,
    ) -> StorageResult<Vec<ReadingWithRisk>> {
        self.inner.filtered_readings(filter).await
    }

    async fn assessment_for_reading(&self, reading_id: i64) -> StorageResult<Option<Assessment>> {
        self.inner.assessment_for_reading(reading_id).await
    }

    async fn unread_alerts(&self, limit: u32) -> StorageResult<Vec<Alert>> {
        self.inner.unread_alerts(limit).await
    }

    async fn alerts(&self, device_id: Option<&str>, limit: u32) -> StorageResult<Vec<Alert>> {
        self.inner.alerts(device_id, limit).await
    }

    async fn alert(&self, id: i64) -> StorageResult<Option<Alert>> {
        // ---
        let snapshot = self.inner.alert(id).await?;
        if let Some(alert) = &snapshot {
            if !self.swept.swap(true, Ordering::SeqCst) {
                self.inner.resolve_stale_alerts(&alert.device_id).await?;
            }
        }
        Ok(snapshot)
    }

    async fn update_alert_status(
        &self,
        id: i64,
        from: AlertStatus,
        to: AlertStatus,
        notes: &str,
    ) -> StorageResult<bool> {
        self.inner.update_alert_status(id, from, to, notes).await
    }

    async fn active_alert_count(&self, device_id: &str) -> StorageResult<i64> {
        self.inner.active_alert_count(device_id).await
    }

    async fn devices(&self) -> StorageResult<Vec<Device>> {
        self.inner.devices().await
    }

    async fn device(&self, device_id: &str) -> StorageResult<Option<Device>> {
        self.inner.device(device_id).await
    }

    async fn register_device(&self, device: &NewDevice) -> StorageResult<Device> {
        self.inner.register_device(device).await
    }
}

#[tokio::test]
async fn status_update_does_not_reopen_a_swept_alert() -> Result<()> {
    // ---
    let store = Arc::new(SweepAfterRead {
        inner: MemoryStorage::new(),
        swept: AtomicBool::new(false),
    });
    let app = app_over(store.clone());
    ingest(&app, reading("ESP32_001", 40.0, 50.0, 1.0)).await?;
    let id = store.inner.all_alerts()[0].id;

    let uri = format!("/api/alertas/{id}/estado");
    let body = json!({"estado": "en_proceso"});
    let (status, json) = call(&app, Method::PUT, &uri, Some(body)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{json}");
    assert_eq!(json["code"], "VALIDATION_ERROR");

    let alert = store.inner.alert(id).await?.expect("alert exists");
    assert_eq!(alert.status, AlertStatus::Resolved);
    assert!(alert.read);
    Ok(())
}
