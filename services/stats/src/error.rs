use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use store::StoreError;
use thiserror::Error;

/// Errors surfaced by the read API. Bodies never carry internal detail.
#[derive(Debug, Error)]
pub enum ApiError {
    /// An aggregate query failed; `what` names the resource for the body.
    #[error("failed to fetch {what}: {source}")]
    Query {
        what: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("not found")]
    NotFound,
}

impl ApiError {
    pub fn query(what: &'static str) -> impl FnOnce(StoreError) -> ApiError {
        move |source| ApiError::Query { what, source }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Query { what, source } => {
                tracing::error!(error = %source, "Error fetching {}", what);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to fetch {what}"),
                )
            }
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
