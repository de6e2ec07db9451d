//! Health and monitoring endpoints

use axum::{extract::State, response::IntoResponse, Json};

use crate::api::middleware::ApiError;
use crate::api::server::SharedAppState;

/// GET /api/health
pub async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "lnredeem",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /api/stats
pub async fn handle_stats(State(state): State<SharedAppState>) -> Result<impl IntoResponse, ApiError> {
    let stats = state.service.stats().await?;
    Ok(Json(stats))
}
