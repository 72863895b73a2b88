//! Plan Endpoints
//!
//! # Endpoints
//!
//! - `GET /api/health` - Health check endpoint
//! - `GET /api/plans` - List the caller's root plans
//! - `POST /api/plans` - Create a root plan
//! - `GET /api/plans/:id` - Get a plan by ID
//! - `PUT /api/plans/:id` - Partially update a plan
//! - `DELETE /api/plans/:id` - Delete a plan with all sub-plans and media
//! - `PUT /api/plans/:id/progress` - Set progress and re-aggregate ancestors
//! - `GET /api/plans/:id/subplans` - List direct sub-plans
//! - `POST /api/plans/:id/subplans` - Create a sub-plan
//! - `PUT /api/plans/:id/subplans/order` - Reorder direct sub-plans

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lifeplan_core::models::{NewPlan, PlanNode, PlanPatch, PositionUpdate};
use lifeplan_core::services::{PlanDeletion, ProgressOutcome};

use super::{ok, ApiResponse, ApiResult, AppState, Owner};
use crate::http_error::HttpError;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ProgressBody {
    pub progress: i64,
}

/// Health check endpoint
///
/// ```bash
/// curl http://localhost:5000/api/health
/// ```
async fn health_check() -> Json<ApiResponse<HealthStatus>> {
    ok(HealthStatus {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

async fn list_plans(State(state): State<AppState>, Owner(owner): Owner) -> ApiResult<Vec<PlanNode>> {
    Ok(ok(state.service.list_plans(&owner).await?))
}

async fn create_plan(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Json(plan): Json<NewPlan>,
) -> Result<(StatusCode, Json<ApiResponse<PlanNode>>), HttpError> {
    let node = state.service.create_plan(&owner, plan).await?;
    Ok((StatusCode::CREATED, ok(node)))
}

async fn get_plan(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> ApiResult<PlanNode> {
    Ok(ok(state.service.get_plan(&owner, &id).await?))
}

async fn update_plan(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<String>,
    Json(patch): Json<PlanPatch>,
) -> ApiResult<PlanNode> {
    Ok(ok(state.service.update_plan(&owner, &id, patch).await?))
}

/// Delete a plan, its sub-plans and their media
///
/// The response lists deleted node ids, released and orphaned media, and the
/// ancestors whose progress was recomputed.
async fn delete_plan(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> ApiResult<PlanDeletion> {
    Ok(ok(state.service.delete_plan(&owner, &id).await?))
}

async fn set_progress(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<String>,
    Json(body): Json<ProgressBody>,
) -> ApiResult<ProgressOutcome> {
    Ok(ok(state.service.set_progress(&owner, &id, body.progress).await?))
}

async fn list_subplans(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> ApiResult<Vec<PlanNode>> {
    Ok(ok(state.service.list_children(&owner, &id).await?))
}

async fn create_subplan(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<String>,
    Json(plan): Json<NewPlan>,
) -> Result<(StatusCode, Json<ApiResponse<PlanNode>>), HttpError> {
    let node = state.service.create_child(&owner, &id, plan).await?;
    Ok((StatusCode::CREATED, ok(node)))
}

async fn reorder_subplans(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<String>,
    Json(order): Json<Vec<PositionUpdate>>,
) -> ApiResult<Vec<PlanNode>> {
    Ok(ok(state
        .service
        .reorder_children(&owner, Some(&id), order)
        .await?))
}

/// Create plan endpoint routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/plans", get(list_plans).post(create_plan))
        .route(
            "/api/plans/:id",
            get(get_plan).put(update_plan).delete(delete_plan),
        )
        .route("/api/plans/:id/progress", put(set_progress))
        .route(
            "/api/plans/:id/subplans",
            get(list_subplans).post(create_subplan),
        )
        .route("/api/plans/:id/subplans/order", put(reorder_subplans))
        .with_state(state)
}
