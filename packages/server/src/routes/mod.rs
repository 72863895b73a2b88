//! REST API for LifePlan
//!
//! Thin handlers over [`PlanService`]. Every route except the health check is
//! scoped to the caller named by the `X-User-Id` header.
//!
//! # Architecture
//!
//! The API is organized into endpoint modules merged into one router:
//! - `plan_endpoints`: plans, sub-plans, progress, reordering
//! - `content_endpoints`: content blocks and checklist tasks
//! - `media_endpoints`: uploads and media release
//! - `user_endpoints`: XP and achievements
//!
//! Successful responses are wrapped as `{ "success": true, "data": ... }`;
//! failures use [`HttpError`].

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts},
    http::{header, request::Parts, HeaderValue, Method},
    response::Json,
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use lifeplan_core::services::PlanService;

use crate::http_error::HttpError;

mod content_endpoints;
mod media_endpoints;
mod plan_endpoints;
mod user_endpoints;

/// Header carrying the caller's user id
pub const OWNER_HEADER: &str = "x-user-id";

/// Upload size cap for multipart bodies
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Application state shared across all endpoints
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PlanService>,
}

impl AppState {
    pub fn new(service: PlanService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

/// Success envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

pub(crate) fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

pub(crate) type ApiResult<T> = Result<Json<ApiResponse<T>>, HttpError>;

/// Caller identity taken from the `X-User-Id` header
#[derive(Debug, Clone)]
pub struct Owner(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for Owner
where
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Owner(value.to_string()))
            .ok_or_else(|| HttpError::new("Missing X-User-Id header", "MISSING_OWNER"))
    }
}

/// Create the application router with all endpoint modules
pub fn create_router(state: AppState, cors_origin: Option<&str>) -> Router {
    Router::new()
        .merge(plan_endpoints::routes(state.clone()))
        .merge(content_endpoints::routes(state.clone()))
        .merge(media_endpoints::routes(state.clone()))
        .merge(user_endpoints::routes(state))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
}

/// CORS layer: a single configured origin, or any origin when unset
///
/// An origin that is not a valid header value falls back to any origin.
fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static(OWNER_HEADER),
        ]);

    match origin.map(str::parse::<HeaderValue>) {
        Some(Ok(origin)) => layer.allow_origin(origin),
        Some(Err(_)) => {
            tracing::warn!("Ignoring invalid CORS origin, allowing any origin");
            layer.allow_origin(Any)
        }
        None => layer.allow_origin(Any),
    }
}
