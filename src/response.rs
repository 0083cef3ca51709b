use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::backup::{BackupError, DeliveryError};
use crate::store::StoreError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub trace_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub is_operational: bool,
}

impl AppError {
    fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.to_string(),
            is_operational: status != StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn bad_request(code: &str, message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn validation(message: &str) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    /// The messaging API refused or never answered.
    pub fn bad_gateway(message: &str) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "DELIVERY_FAILED", message)
    }

    pub fn service_unavailable(code: &str, message: &str) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, code, message)
    }

    /// Logged in full, answered with a generic message.
    pub fn internal(message: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let exposed_message = if self.is_operational {
            tracing::warn!(status = %self.status, code = %self.code, error = %self.message, "Request rejected");
            self.message
        } else {
            tracing::error!(status = %self.status, code = %self.code, error = %self.message, "Request failed");
            "Internal server error".to_string()
        };

        (
            self.status,
            Json(ErrorBody {
                success: false,
                code: self.code,
                message: exposed_message,
                trace_id: None,
            }),
        )
            .into_response()
    }
}

// Validation and not-found messages are safe to expose; everything else is
// reported as an internal error and redacted in `into_response`.
impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        match &value {
            StoreError::Validation(msg) => AppError::validation(msg),
            StoreError::NotFound { entity, key } => {
                AppError::not_found(&format!("{entity} '{key}' not found"))
            }
            _ => AppError::internal(&value.to_string()),
        }
    }
}

impl From<DeliveryError> for AppError {
    fn from(value: DeliveryError) -> Self {
        match &value {
            DeliveryError::NotConfigured => AppError::service_unavailable(
                "DELIVERY_NOT_CONFIGURED",
                "Messaging bot token is not configured",
            ),
            DeliveryError::InvalidRecipient(_) => AppError::validation(&value.to_string()),
            DeliveryError::Io(_) => AppError::internal(&value.to_string()),
            _ => AppError::bad_gateway(&value.to_string()),
        }
    }
}

impl From<BackupError> for AppError {
    fn from(value: BackupError) -> Self {
        match value {
            BackupError::Store(e) => e.into(),
            BackupError::Delivery(e) => e.into(),
            other => AppError::internal(&other.to_string()),
        }
    }
}

fn success<T: Serialize>(status: StatusCode, data: T) -> impl IntoResponse {
    (status, Json(ApiResponse { success: true, data }))
}

pub fn ok<T: Serialize>(data: T) -> impl IntoResponse {
    success(StatusCode::OK, data)
}

pub fn created<T: Serialize>(data: T) -> impl IntoResponse {
    success(StatusCode::CREATED, data)
}
