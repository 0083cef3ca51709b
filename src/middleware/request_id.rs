use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http_body_util::BodyExt;
use serde_json::Value;
use tracing::Instrument;

use crate::response::ErrorBody;

const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_REQUEST_ID_LEN: usize = 128;

/// Tags every request with an id, logs its completion and makes sure error
/// responses carry the id as `traceId`.
pub async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = resolve_request_id(req.headers());
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let started = Instant::now();

    let response = next
        .run(req)
        .instrument(tracing::info_span!("request", request_id = %request_id))
        .await;

    let status = response.status();
    tracing::info!(
        request_id = %request_id,
        %method,
        %path,
        status = status.as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "request completed"
    );

    let mut response = if status.is_client_error() || status.is_server_error() {
        with_trace_id(response, &request_id).await
    } else {
        response
    };
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// The client's `x-request-id` when well formed, a fresh uuid otherwise.
fn resolve_request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|id| is_valid_request_id(id))
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_owned)
}

fn is_valid_request_id(id: &str) -> bool {
    (1..=MAX_REQUEST_ID_LEN).contains(&id.len())
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

async fn with_trace_id(response: Response, request_id: &str) -> Response {
    let json_body = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    let (parts, body) = response.into_parts();
    let Ok(collected) = body.collect().await else {
        return Response::from_parts(parts, Body::empty());
    };
    let bytes = collected.to_bytes();

    if json_body {
        let patched = insert_trace_id(&bytes, request_id).unwrap_or_else(|| bytes.to_vec());
        return Response::from_parts(parts, Body::from(patched));
    }

    // axum's own rejections (unknown route, 405, 413) are plain text.
    let status = parts.status;
    (
        status,
        axum::Json(ErrorBody {
            success: false,
            code: code_for_status(status).to_owned(),
            message: plain_text_message(status, &bytes),
            trace_id: Some(request_id.to_owned()),
        }),
    )
        .into_response()
}

fn insert_trace_id(bytes: &Bytes, request_id: &str) -> Option<Vec<u8>> {
    let mut json: Value = serde_json::from_slice(bytes).ok()?;
    json.as_object_mut()?
        .insert("traceId".into(), Value::String(request_id.to_owned()));
    serde_json::to_vec(&json).ok()
}

fn plain_text_message(status: StatusCode, bytes: &Bytes) -> String {
    let text = String::from_utf8_lossy(bytes);
    match text.trim() {
        "" => status.canonical_reason().unwrap_or("Error").to_owned(),
        trimmed => trimmed.to_owned(),
    }
}

fn code_for_status(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "BAD_REQUEST",
        StatusCode::NOT_FOUND => "NOT_FOUND",
        StatusCode::METHOD_NOT_ALLOWED => "METHOD_NOT_ALLOWED",
        StatusCode::PAYLOAD_TOO_LARGE => "PAYLOAD_TOO_LARGE",
        StatusCode::UNSUPPORTED_MEDIA_TYPE => "UNSUPPORTED_MEDIA_TYPE",
        StatusCode::UNPROCESSABLE_ENTITY => "VALIDATION_ERROR",
        StatusCode::BAD_GATEWAY => "DELIVERY_FAILED",
        _ => "INTERNAL_ERROR",
    }
}
