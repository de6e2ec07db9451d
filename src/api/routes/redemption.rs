//! Redemption endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::error;

use crate::api::middleware::{status_for, ApiError};
use crate::api::server::SharedAppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub token: String,
    #[serde(default)]
    pub lightning_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct AddressRequest {
    pub address: String,
}

/// POST /api/decode
pub async fn handle_decode(
    State(state): State<SharedAppState>,
    Json(req): Json<TokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let info = state.service.decode_token(&req.token)?;
    Ok(Json(info))
}

/// POST /api/redeem
///
/// The redemption runs on its own task so a dropped client connection
/// cannot cancel an in-flight melt.
pub async fn handle_redeem(
    State(state): State<SharedAppState>,
    Json(req): Json<RedeemRequest>,
) -> Response {
    let service = state.service.clone();
    let task = tokio::spawn(async move {
        service
            .redeem(&req.token, req.lightning_address.as_deref())
            .await
    });

    match task.await {
        Ok(result) => {
            let status = if result.success {
                StatusCode::OK
            } else {
                result
                    .error_kind()
                    .map(status_for)
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            };
            (status, Json(result)).into_response()
        }
        Err(e) => {
            error!(error = %e, "redemption task aborted");
            ApiError::internal("redemption task aborted").into_response()
        }
    }
}

/// POST /api/validate-address
pub async fn handle_validate_address(
    State(state): State<SharedAppState>,
    Json(req): Json<AddressRequest>,
) -> impl IntoResponse {
    Json(state.service.validate_address(&req.address).await)
}

/// POST /api/check-spendable
pub async fn handle_check_spendable(
    State(state): State<SharedAppState>,
    Json(req): Json<TokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.service.check_spendable(&req.token).await?;
    Ok(Json(report))
}

/// GET /api/redemption/:id
pub async fn handle_status(
    State(state): State<SharedAppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.service.get_status(&id).await? {
        Some(attempt) => Ok(Json(attempt)),
        None => Err(ApiError::not_found(format!("redemption {} not found", id))),
    }
}
