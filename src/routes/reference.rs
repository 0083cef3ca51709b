use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::extractors::JsonBody;
use crate::response::{created, ok, AppError};
use crate::state::AppState;
use crate::store::operations::reference::{Destination, Field, ReferenceEntity};

/// CRUD routes shared by every reference table.
pub fn router<T: ReferenceEntity>() -> Router<AppState> {
    Router::new()
        .route("/", get(list::<T>).post(create::<T>))
        .route("/:id", get(get_one::<T>).put(replace::<T>).delete(remove::<T>))
}

fn not_found<T: ReferenceEntity>(id: &str) -> AppError {
    AppError::not_found(&format!("{} '{}' not found", T::ENTITY, id))
}

async fn list<T: ReferenceEntity>(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.store().list_references::<T>()?))
}

async fn get_one<T: ReferenceEntity>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let entity = state
        .store()
        .get_reference::<T>(&id)?
        .ok_or_else(|| not_found::<T>(&id))?;
    Ok(ok(entity))
}

async fn create<T: ReferenceEntity>(
    State(state): State<AppState>,
    JsonBody(mut entity): JsonBody<T>,
) -> Result<impl IntoResponse, AppError> {
    entity.set_id(String::new());
    state.store().put_reference(&mut entity)?;
    tracing::info!(entity = T::ENTITY, id = entity.id(), "Reference created");
    Ok(created(entity))
}

async fn replace<T: ReferenceEntity>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(mut entity): JsonBody<T>,
) -> Result<impl IntoResponse, AppError> {
    if !state.store().reference_exists::<T>(&id)? {
        return Err(not_found::<T>(&id));
    }
    entity.set_id(id);
    state.store().put_reference(&mut entity)?;
    Ok(ok(entity))
}

async fn remove<T: ReferenceEntity>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if !state.store().delete_reference::<T>(&id)? {
        return Err(not_found::<T>(&id));
    }
    tracing::info!(entity = T::ENTITY, id = %id, "Reference deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn latest_season(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let season = state
        .store()
        .latest_season()?
        .ok_or_else(|| AppError::not_found("No seasons yet"))?;
    Ok(ok(season))
}

/// Registers a field as a destination so it can be picked as origin or target.
pub async fn destination_from_field(
    State(state): State<AppState>,
    Path(field_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let field = state
        .store()
        .get_reference::<Field>(&field_id)?
        .ok_or_else(|| not_found::<Field>(&field_id))?;
    let mut destination = Destination::from_field(&field);
    state.store().put_reference(&mut destination)?;
    Ok(created(destination))
}
