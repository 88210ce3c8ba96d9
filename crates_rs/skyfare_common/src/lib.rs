//! Shared HTTP plumbing for the skyfare services: tower layers that every
//! service stacks in front of its router, plus startup policy checks.

pub mod host_guard;
pub mod internal_auth;
pub mod request_id;
pub mod secret_policy;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Serialize)]
struct ErrorBody<'a> {
    detail: &'a str,
}

/// Error response in the same `{"detail": ...}` shape the services use.
pub(crate) fn reject(status: StatusCode, detail: &str) -> Response {
    (status, axum::Json(ErrorBody { detail })).into_response()
}

pub(crate) fn is_production_like(env_name: &str) -> bool {
    let env = env_name.trim().to_ascii_lowercase();
    matches!(env.as_str(), "prod" | "production" | "staging")
}
