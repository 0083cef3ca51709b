use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;

use crate::backup::SettingsUpdate;
use crate::extractors::JsonBody;
use crate::response::{ok, AppError};
use crate::state::AppState;
use crate::store::operations::backup_settings::BackupPeriod;
use crate::validation::validate_recipient;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/settings", get(get_settings).put(save_settings))
        .route("/periods", get(list_periods))
        .route("/check", post(check_now))
}

async fn get_settings(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.scheduler().current_settings()?))
}

/// Saves the configuration. The recipient is only required while enabled;
/// the sent marker is preserved.
async fn save_settings(
    State(state): State<AppState>,
    JsonBody(update): JsonBody<SettingsUpdate>,
) -> Result<impl IntoResponse, AppError> {
    if update.enabled {
        validate_recipient(&update.recipient).map_err(AppError::validation)?;
    }

    let settings = state.scheduler().update_settings(update).await?;

    if settings.enabled {
        let scheduler = Arc::clone(state.scheduler());
        tokio::spawn(async move {
            scheduler.check_now(false).await;
        });
    }
    Ok(ok(settings))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PeriodOption {
    value: BackupPeriod,
    title: &'static str,
    hours: i64,
}

async fn list_periods() -> impl IntoResponse {
    let options: Vec<PeriodOption> = BackupPeriod::ALL
        .into_iter()
        .map(|period| PeriodOption {
            value: period,
            title: period.display_name(),
            hours: period.as_duration().num_hours(),
        })
        .collect();
    ok(options)
}

/// Forced due-check; reports the outcome, or the failure that kept the marker.
async fn check_now(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let outcome = state.scheduler().check_and_send(true).await?;
    Ok(ok(outcome))
}
