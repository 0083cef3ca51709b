pub mod backup;
pub mod health;
pub mod records;
pub mod reference;

use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;

use crate::middleware::request_id;
use crate::response::AppError;
use crate::state::AppState;
use crate::store::operations::reference::{CargoType, Destination, Field, Season, Source, Vehicle};

/// Maximum request body size: 256 KiB.
const MAX_BODY_SIZE: usize = 256 * 1024;

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .nest("/vehicles", reference::router::<Vehicle>())
        .nest("/cargo-types", reference::router::<CargoType>())
        .nest(
            "/seasons",
            reference::router::<Season>().route("/latest", axum::routing::get(reference::latest_season)),
        )
        .nest(
            "/destinations",
            reference::router::<Destination>()
                .route("/from-field/:field_id", post(reference::destination_from_field)),
        )
        .nest("/fields", reference::router::<Field>())
        .nest("/sources", reference::router::<Source>())
        .nest("/records", records::router())
        .nest("/backup", backup::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE));

    Router::new()
        .nest("/api", api_routes)
        .nest("/health", health::router())
        .fallback(fallback_404)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .with_state(state)
}

async fn fallback_404() -> AppError {
    AppError::not_found("Not found")
}
