//! RPC over HTTP
//!
//! Carries the binary RPC contract over HTTP as transport only: one bincode
//! `RpcRequest` per POST body, one bincode `RpcResponse` per reply body.

use super::protocol::*;
use super::server::dispatch;
use crate::service::stack_service::StackService;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Extension};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;

pub fn router(service: StackService) -> Router {
    Router::new()
        .route(ENDPOINT_RPC_HTTP, post(handle_rpc))
        .layer(DefaultBodyLimit::disable())
        .layer(Extension(service))
}

pub async fn handle_rpc(Extension(service): Extension<StackService>, body: Bytes) -> Response {
    let request: RpcRequest = match bincode::deserialize(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("[RPC] Rejected malformed HTTP request body: {}", e);
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let response = dispatch(&service, request).await;

    match bincode::serialize(&response) {
        Ok(payload) => (
            StatusCode::OK,
            [(CONTENT_TYPE, CONTENT_TYPE_RPC)],
            payload,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("[RPC] Failed to encode response {}: {}", response.seq, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
