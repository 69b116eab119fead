use crate::error::ApiError;
use crate::handlers::{health, stats};
use crate::state::AppState;
use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/overview", get(stats::overview))
        .route("/top-repos", get(stats::top_repos))
        .route("/activity", get(stats::activity));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api", api_routes)
        .fallback(|| async { ApiError::NotFound })
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
