//! Aggregate read endpoints.

use axum::extract::State;
use axum::Json;
use store::{MinuteCount, Overview, RepoCount, TOP_REPOS_LIMIT};

use crate::error::ApiError;
use crate::state::AppState;

/// `GET /api/overview`: total events, distinct actors, commit sum.
pub async fn overview(State(state): State<AppState>) -> Result<Json<Overview>, ApiError> {
    let overview = state
        .store
        .overview()
        .await
        .map_err(ApiError::query("overview"))?;
    Ok(Json(overview))
}

/// `GET /api/top-repos`: busiest repositories, at most ten.
pub async fn top_repos(State(state): State<AppState>) -> Result<Json<Vec<RepoCount>>, ApiError> {
    let repos = state
        .store
        .top_repos(TOP_REPOS_LIMIT)
        .await
        .map_err(ApiError::query("top repos"))?;
    Ok(Json(repos))
}

/// `GET /api/activity`: events per minute-of-hour.
pub async fn activity(State(state): State<AppState>) -> Result<Json<Vec<MinuteCount>>, ApiError> {
    let minutes = state
        .store
        .activity_by_minute()
        .await
        .map_err(ApiError::query("activity"))?;
    Ok(Json(minutes))
}
