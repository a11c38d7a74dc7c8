use super::protocol::*;
use super::stack_service::StackService;
use super::types::{DataResult, Headers, Message, PushArgs};
use crate::error::StackError;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Extension, Path};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

/// Builds the REST router over `service`.
pub fn router(service: StackService) -> Router {
    Router::new()
        .route(
            ENDPOINT_SECTION,
            get(handle_peek).post(handle_push).delete(handle_pop),
        )
        .layer(DefaultBodyLimit::disable())
        .layer(Extension(service))
}

pub async fn handle_push(
    Extension(service): Extension<StackService>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let message = Message {
        headers: stored_headers(&headers),
        body: body.to_vec(),
    };
    let header_count = message.headers.len();
    let body_len = message.body.len();

    let args = PushArgs {
        section: key.clone(),
        message,
    };

    match service.push(args).await {
        Ok(depth) => {
            tracing::info!(
                "[PUSH] Pushed {} bytes with {} header(s) to {} with depth-index {}",
                body_len,
                header_count,
                key,
                depth
            );
            let depth = depth.to_string();
            let mut response_headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(&depth) {
                response_headers.insert(HEADER_ID, value);
            }
            response_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            (StatusCode::OK, response_headers, depth).into_response()
        }
        Err(e) => error_response("[PUSH]", &key, e),
    }
}

pub async fn handle_peek(
    Extension(service): Extension<StackService>,
    Path(key): Path<String>,
) -> Response {
    match service.peek(key.clone()).await {
        Ok(result) => {
            tracing::info!(
                "[PEEK] Read stack {} headers: {} item(s), body: {} bytes",
                key,
                result.message.headers.len(),
                result.message.body.len()
            );
            let depth = result.depth;
            message_response(result, depth)
        }
        Err(e) => error_response("[PEEK]", &key, e),
    }
}

pub async fn handle_pop(
    Extension(service): Extension<StackService>,
    Path(key): Path<String>,
) -> Response {
    match service.pop(key.clone()).await {
        Ok(result) => {
            tracing::info!(
                "[POP] Read stack {} headers: {} item(s), body: {} bytes",
                key,
                result.message.headers.len(),
                result.message.body.len()
            );
            let depth = result.depth.saturating_sub(1);
            message_response(result, depth)
        }
        Err(e) => error_response("[POP]", &key, e),
    }
}

/// Collects request headers carrying the stored-header prefix.
fn stored_headers(headers: &HeaderMap) -> Headers {
    let mut stored = Headers::new();
    for name in headers.keys() {
        if !name.as_str().starts_with(STORED_HEADER_PREFIX) {
            continue;
        }
        // First value wins for repeated headers.
        match headers.get(name).map(|value| value.to_str()) {
            Some(Ok(value)) => {
                stored.insert(name.as_str().to_string(), value.to_string());
            }
            _ => tracing::warn!("[PUSH] Dropping non-text header {}", name),
        }
    }
    stored
}

fn message_response(result: DataResult, count: usize) -> Response {
    let mut headers = HeaderMap::new();

    for (name, value) in &result.message.headers {
        if RESERVED_HEADERS
            .iter()
            .any(|reserved| name.eq_ignore_ascii_case(reserved))
        {
            tracing::warn!("Stored header {} clashes with a response header, skipped", name);
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::warn!("Stored header {} cannot be sent over HTTP", name),
        }
    }
    headers.insert(HEADER_COUNT, HeaderValue::from(count));

    (StatusCode::OK, headers, result.message.body).into_response()
}

fn error_response(tag: &str, key: &str, err: StackError) -> Response {
    match err {
        StackError::NotFound(_) => {
            tracing::info!("{} Stack {} not exists", tag, key);
            (StatusCode::NOT_FOUND, BODY_NOT_FOUND).into_response()
        }
        StackError::Empty(_) => {
            tracing::info!("{} Stack {} is empty", tag, key);
            (StatusCode::NOT_FOUND, BODY_EMPTY).into_response()
        }
        StackError::Closed => {
            tracing::warn!("{} Registry closed while serving {}", tag, key);
            (StatusCode::SERVICE_UNAVAILABLE, err.to_string()).into_response()
        }
        StackError::Io(_) | StackError::Decode(_) => {
            tracing::error!("{} Failed on stack {}: {}", tag, key, err);
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}
