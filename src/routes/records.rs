use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backup::DeliveryError;
use crate::constants::REPORT_FILE_PREFIX;
use crate::extractors::{JsonBody, QueryParams};
use crate::history::{HistoryFilter, TimeRange};
use crate::report::{report_caption, report_file_name, ReportArtifact, ReportRenderer};
use crate::response::{created, ok, AppError};
use crate::state::AppState;
use crate::store::operations::records::WeighingRecord;
use crate::store::operations::reference::{CargoType, Destination, ReferenceEntity, Season, Source, Vehicle};
use crate::store::Store;
use crate::validation::{validate_recipient, validate_weights};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(query_history).post(create_record))
        .route("/ranges", get(list_ranges))
        .route("/export", post(export_report))
        .route(
            "/:id",
            get(get_record).put(update_record).delete(delete_record),
        )
}

/// Weighing fields a client may set. The timestamp is always server-side:
/// a backdated record would land behind the backup marker and never be sent.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordRequest {
    vehicle_id: String,
    cargo_type_id: String,
    /// Defaults to the most recent season.
    season_id: Option<String>,
    source_id: Option<String>,
    from_id: String,
    to_id: String,
    gross_weight: f64,
    /// Defaults to the vehicle's tare weight.
    tare_weight: Option<f64>,
    comment: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn require<T: ReferenceEntity>(store: &Store, id: &str, label: &str) -> Result<T, AppError> {
    if id.trim().is_empty() {
        return Err(AppError::validation(&format!("Select a {label}")));
    }
    store
        .get_reference::<T>(id)?
        .ok_or_else(|| AppError::validation(&format!("Unknown {label} '{id}'")))
}

fn build_record(
    store: &Store,
    id: String,
    req: RecordRequest,
    timestamp: DateTime<Utc>,
) -> Result<WeighingRecord, AppError> {
    let vehicle: Vehicle = require(store, &req.vehicle_id, "vehicle")?;
    require::<CargoType>(store, &req.cargo_type_id, "cargo type")?;
    require::<Destination>(store, &req.from_id, "origin")?;
    require::<Destination>(store, &req.to_id, "destination")?;

    let season_id = match non_blank(req.season_id) {
        Some(season_id) => require::<Season>(store, &season_id, "season")?.id,
        None => store
            .latest_season()?
            .map(|season| season.id)
            .ok_or_else(|| AppError::validation("Create a season first"))?,
    };
    let source_id = match non_blank(req.source_id) {
        Some(source_id) => Some(require::<Source>(store, &source_id, "source")?.id),
        None => None,
    };

    let tare_weight = req.tare_weight.unwrap_or(vehicle.tare_weight);
    let net_weight = validate_weights(req.gross_weight, tare_weight).map_err(AppError::validation)?;

    Ok(WeighingRecord {
        id,
        timestamp,
        vehicle_id: vehicle.id,
        cargo_type_id: req.cargo_type_id,
        season_id,
        source_id,
        from_id: req.from_id,
        to_id: req.to_id,
        gross_weight: req.gross_weight,
        tare_weight,
        net_weight,
        comment: non_blank(req.comment),
    })
}

async fn create_record(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RecordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let now = state.clock().now();
    let record = build_record(state.store(), uuid::Uuid::new_v4().to_string(), req, now)?;
    state.store().create_weighing_record(&record)?;
    tracing::info!(
        record_id = %record.id,
        net_weight = record.net_weight,
        "Weighing recorded"
    );
    Ok(created(record))
}

async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let record = state
        .store()
        .get_weighing_record(&id)?
        .ok_or_else(|| AppError::not_found("Record not found"))?;
    Ok(ok(record))
}

async fn update_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<RecordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let existing = state
        .store()
        .get_weighing_record(&id)?
        .ok_or_else(|| AppError::not_found("Record not found"))?;
    let record = build_record(state.store(), id, req, existing.timestamp)?;
    state.store().update_weighing_record(&record)?;
    Ok(ok(record))
}

async fn delete_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if !state.store().delete_weighing_record(&id)? {
        return Err(AppError::not_found("Record not found"));
    }
    tracing::info!(record_id = %id, "Weighing deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn query_history(
    State(state): State<AppState>,
    QueryParams(filter): QueryParams<HistoryFilter>,
) -> Result<impl IntoResponse, AppError> {
    let page = state
        .store()
        .query_history(&filter, state.clock().now(), state.utc_offset())?;
    Ok(ok(page))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RangeOption {
    value: TimeRange,
    title: &'static str,
}

async fn list_ranges() -> impl IntoResponse {
    let options: Vec<RangeOption> = TimeRange::ALL
        .into_iter()
        .map(|range| RangeOption {
            value: range,
            title: range.display_name(),
        })
        .collect();
    ok(options)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportRequest {
    #[serde(default)]
    recipient: String,
    #[serde(default)]
    filter: HistoryFilter,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportResponse {
    records: usize,
    caption: String,
}

/// Renders the filtered history and sends it to `recipient`. The backup
/// marker is not involved.
async fn export_report(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ExportRequest>,
) -> Result<impl IntoResponse, AppError> {
    let recipient = req.recipient.trim().to_string();
    validate_recipient(&recipient).map_err(AppError::validation)?;

    let now = state.clock().now();
    let offset = state.utc_offset();
    let page = state.store().query_history(&req.filter, now, offset)?;
    let Some(caption) = report_caption(REPORT_FILE_PREFIX, &page.entries, offset) else {
        return Err(AppError::validation("No records to export"));
    };
    let count = page.entries.len();

    let renderer = Arc::clone(state.renderer());
    let file_name = report_file_name(REPORT_FILE_PREFIX, now, offset, renderer.format());
    let _artifact = ReportArtifact::new(renderer.output_path(&file_name));
    let entries = page.entries;
    let path = tokio::task::spawn_blocking(move || renderer.render(&entries, &file_name))
        .await
        .map_err(|e| AppError::internal(&e.to_string()))?
        .map_err(|e| AppError::internal(&e.to_string()))?;

    let timeout = Duration::from_secs(state.config().backup.delivery_timeout_secs);
    match tokio::time::timeout(
        timeout,
        state.channel().send_document(&recipient, &path, &caption),
    )
    .await
    {
        Ok(result) => result?,
        Err(_) => return Err(DeliveryError::Timeout.into()),
    }

    tracing::info!(records = count, "Report exported");
    Ok(ok(ExportResponse {
        records: count,
        caption,
    }))
}
