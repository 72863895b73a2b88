//! Content Endpoints
//!
//! # Endpoints
//!
//! - `PUT /api/plans/:id/content` - Replace all content blocks
//! - `POST /api/plans/:id/content` - Append a content block
//! - `PUT /api/plans/:id/content/:content_id` - Replace one block
//! - `DELETE /api/plans/:id/content/:content_id` - Remove one block
//! - `PUT /api/plans/:id/content/:content_id/tasks/:index` - Tick a checklist task
//!
//! Media dropped by an edit is released on the media host.

use axum::{
    extract::{Path, State},
    response::Json,
    routing::put,
    Router,
};
use serde::Deserialize;

use lifeplan_core::models::{ContentBlock, ContentItem, PlanNode};

use super::{ok, ApiResult, AppState, Owner};

#[derive(Debug, Deserialize)]
pub struct ContentBody {
    pub content: Vec<ContentItem>,
}

#[derive(Debug, Deserialize)]
pub struct TaskBody {
    pub completed: bool,
}

async fn replace_content(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<String>,
    Json(body): Json<ContentBody>,
) -> ApiResult<PlanNode> {
    Ok(ok(state
        .service
        .replace_content(&owner, &id, body.content)
        .await?))
}

async fn add_content(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(id): Path<String>,
    Json(item): Json<ContentItem>,
) -> ApiResult<PlanNode> {
    Ok(ok(state.service.add_content_item(&owner, &id, item).await?))
}

async fn update_content(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path((id, content_id)): Path<(String, String)>,
    Json(block): Json<ContentBlock>,
) -> ApiResult<PlanNode> {
    Ok(ok(state
        .service
        .update_content_item(&owner, &id, &content_id, block)
        .await?))
}

async fn remove_content(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path((id, content_id)): Path<(String, String)>,
) -> ApiResult<PlanNode> {
    Ok(ok(state
        .service
        .remove_content_item(&owner, &id, &content_id)
        .await?))
}

async fn set_task(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path((id, content_id, index)): Path<(String, String, usize)>,
    Json(body): Json<TaskBody>,
) -> ApiResult<PlanNode> {
    Ok(ok(state
        .service
        .set_checklist_task(&owner, &id, &content_id, index, body.completed)
        .await?))
}

/// Create content endpoint routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/plans/:id/content",
            put(replace_content).post(add_content),
        )
        .route(
            "/api/plans/:id/content/:content_id",
            put(update_content).delete(remove_content),
        )
        .route(
            "/api/plans/:id/content/:content_id/tasks/:index",
            put(set_task),
        )
        .with_state(state)
}
