use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::core::http::response_envelope::{ApiErrorDetail, ApiResponse};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request id set by [`json_error_mapper`], `-` when absent.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("-")
}

async fn take_body(res: Response) -> (axum::http::response::Parts, Bytes) {
    let (parts, body) = res.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    (parts, bytes)
}

fn ensure_request_id(headers: &mut HeaderMap) -> HeaderValue {
    if let Some(h) = headers.get(REQUEST_ID_HEADER) {
        if h.to_str().is_ok_and(|v| !v.trim().is_empty()) {
            return h.clone();
        }
    }
    let nanos = Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| Utc::now().timestamp_micros() * 1000);
    let id = HeaderValue::from_str(&format!("req-{nanos}"))
        .unwrap_or_else(|_| HeaderValue::from_static("req-unknown"));
    headers.insert(REQUEST_ID_HEADER, id.clone());
    id
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

fn code_for(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => "BAD_REQUEST",
        StatusCode::NOT_FOUND => "NOT_FOUND",
        StatusCode::METHOD_NOT_ALLOWED => "METHOD_NOT_ALLOWED",
        StatusCode::UNSUPPORTED_MEDIA_TYPE => "UNSUPPORTED_MEDIA_TYPE",
        StatusCode::PAYLOAD_TOO_LARGE => "PAYLOAD_TOO_LARGE",
        _ => "CLIENT_ERROR",
    }
}

/// Tags every request with an `X-Request-Id` (kept when the caller sent one)
/// and rewrites plain-text client errors produced by axum itself (unknown
/// routes, path rejections, wrong method) into the JSON error envelope.
/// Handler errors already carry the envelope and pass through untouched.
pub async fn json_error_mapper(mut req: Request<Body>, next: Next) -> Response {
    let id = ensure_request_id(req.headers_mut());

    let mut res = next.run(req).await;
    res.headers_mut().insert(REQUEST_ID_HEADER, id);

    let status = res.status();
    if !status.is_client_error() || is_json(res.headers()) {
        return res;
    }

    let (mut parts, bytes) = take_body(res).await;
    let original = String::from_utf8_lossy(&bytes);
    let message = match original.trim() {
        "" => status.canonical_reason().unwrap_or("request failed").to_string(),
        text => text.to_string(),
    };

    let hint = if original.contains("expected a sequence") {
        Some("Expected an array for this field (e.g. [\"a.pdf\", \"b.pdf\"]).".into())
    } else if original.contains("expected a map") || original.contains("expected struct") {
        Some("Expected a JSON object here (e.g. { \"field\": \"value\" }).".into())
    } else {
        None
    };
    let details = hint
        .map(|hint| ApiErrorDetail {
            path: None,
            hint: Some(hint),
        })
        .into_iter()
        .collect();

    // 422 from typed extractors is reported as a plain bad request.
    if parts.status == StatusCode::UNPROCESSABLE_ENTITY {
        parts.status = StatusCode::BAD_REQUEST;
    }
    let envelope = ApiResponse::error(code_for(status), message, details);

    let body = match serde_json::to_vec(&envelope) {
        Ok(v) => v,
        Err(_) => bytes.to_vec(),
    };

    parts.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    parts.headers.remove(header::CONTENT_LENGTH);

    Response::from_parts(parts, body.into())
}
