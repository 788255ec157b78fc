use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{non_empty, AppState};
use crate::{CoreError, CoreResult, DeviceDirectory, HistoryFilter, ReadingWithRisk};

// ---

const DEFAULT_HISTORY_LIMIT: u32 = 100;
const MAX_HISTORY_LIMIT: u32 = 500;

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/history", get(latest))
        .route("/api/historial", get(filtered))
}

#[derive(Debug, Serialize)]
struct HistoryEntry {
    #[serde(flatten)]
    reading: ReadingWithRisk,
    device_name: String,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    readings: Vec<HistoryEntry>,
}

#[derive(Debug, Deserialize)]
struct LatestQuery {
    limit: Option<u32>,
}

/// Query parameters for the date-filtered history.
#[derive(Debug, Deserialize)]
struct FilteredQuery {
    #[serde(default, alias = "equipo_id", deserialize_with = "non_empty")]
    device_id: Option<String>,
    /// `YYYY-MM-DD`, from the start of that day (UTC).
    #[serde(default, deserialize_with = "non_empty")]
    start_date: Option<String>,
    /// `YYYY-MM-DD`, through the end of that day (UTC).
    #[serde(default, deserialize_with = "non_empty")]
    end_date: Option<String>,
}

/// Handle `GET /api/history?limit=`.
async fn latest(
    Query(params): Query<LatestQuery>,
    State(state): State<AppState>,
) -> CoreResult<Json<HistoryResponse>> {
    // ---
    let filter = HistoryFilter {
        limit: params
            .limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .min(MAX_HISTORY_LIMIT),
        ..HistoryFilter::default()
    };
    respond(&state, filter).await
}

/// Handle `GET /api/historial?start_date=&end_date=&device_id=`.
async fn filtered(
    Query(params): Query<FilteredQuery>,
    State(state): State<AppState>,
) -> CoreResult<Json<HistoryResponse>> {
    // ---
    info!("GET /api/historial - filters: {:?}", params);

    let from = params
        .start_date
        .as_deref()
        .map(|d| day_start("start_date", d))
        .transpose()?;
    // last instant of the end day
    let to = params
        .end_date
        .as_deref()
        .map(|d| day_start("end_date", d))
        .transpose()?
        .map(|start| start + TimeDelta::days(1) - TimeDelta::microseconds(1));

    let filter = HistoryFilter {
        device_id: params.device_id,
        from,
        to,
        limit: MAX_HISTORY_LIMIT,
    };
    respond(&state, filter).await
}

async fn respond(state: &AppState, filter: HistoryFilter) -> CoreResult<Json<HistoryResponse>> {
    // ---
    let storage = state.storage.as_ref();
    let readings = state
        .bounded("filtered_readings", storage.filtered_readings(&filter))
        .await?;
    let devices = state.bounded("devices", storage.devices()).await?;
    let directory = DeviceDirectory::from_devices(&devices);

    info!("Returning {} history rows", readings.len());
    Ok(Json(HistoryResponse {
        readings: readings
            .into_iter()
            .map(|reading| HistoryEntry {
                device_name: directory.display_name(&reading.reading.device_id),
                reading,
            })
            .collect(),
    }))
}

fn day_start(field: &str, date: &str) -> CoreResult<DateTime<Utc>> {
    // ---
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
        CoreError::Validation(format!("{field} must be a YYYY-MM-DD date, got `{date}`"))
    })?;
    Ok(day.and_time(NaiveTime::MIN).and_utc())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn day_start_is_utc_midnight() {
        // ---
        let start = day_start("start_date", "2025-03-01").unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn malformed_date_is_a_validation_error() {
        // ---
        let err = day_start("end_date", "01/03/2025").unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
