//! User Endpoints
//!
//! # Endpoints
//!
//! - `GET /api/user/xp` - XP total, level and achievements of the caller

use axum::{extract::State, routing::get, Router};

use lifeplan_core::models::XpSummary;

use super::{ok, ApiResult, AppState, Owner};

/// XP summary for the caller
///
/// ```bash
/// curl -H 'X-User-Id: u1' http://localhost:5000/api/user/xp
/// ```
async fn user_xp(State(state): State<AppState>, Owner(owner): Owner) -> ApiResult<XpSummary> {
    Ok(ok(state.service.user_xp(&owner).await?))
}

/// Create user endpoint routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/user/xp", get(user_xp))
        .with_state(state)
}
