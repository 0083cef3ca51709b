use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(|| async { StatusCode::OK }))
        .route("/ready", get(readiness))
        .route("/database", get(database_health))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    status: &'static str,
    uptime_secs: u64,
    backup_scheduler: SchedulerHealth,
    store: StoreHealth,
}

#[derive(Debug, Serialize)]
struct SchedulerHealth {
    running: bool,
}

#[derive(Debug, Serialize)]
struct StoreHealth {
    records: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseHealth {
    healthy: bool,
    latency_us: u64,
    size_on_disk_bytes: Option<u64>,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok",
        uptime_secs: state.uptime_secs(),
        backup_scheduler: SchedulerHealth {
            running: state.scheduler().is_running(),
        },
        store: StoreHealth {
            records: state.store().count_weighing_records(),
        },
    })
}

/// Ready once the store answers a settings read.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if let Err(e) = state.store().get_backup_settings() {
        tracing::warn!(error = %e, "Readiness check failed");
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

pub async fn database_health(State(state): State<AppState>) -> Json<DatabaseHealth> {
    let check_started = Instant::now();
    let healthy = state.store().get_weighing_record("health-check").is_ok();
    Json(DatabaseHealth {
        healthy,
        latency_us: check_started.elapsed().as_micros() as u64,
        size_on_disk_bytes: state.store().raw_db().size_on_disk().ok(),
    })
}
