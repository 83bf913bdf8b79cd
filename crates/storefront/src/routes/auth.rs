//! Password reset route handlers.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{ApiJson, SuccessResponse};
use crate::error::Result;
use crate::state::AppState;

/// Body of `POST /auth/password-reset`.
#[derive(Debug, Default, Deserialize)]
pub struct ResetRequestBody {
    #[serde(default)]
    pub email: String,
}

/// Body of `POST /auth/password-reset/confirm`.
#[derive(Deserialize)]
pub struct ResetConfirmBody {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub password: String,
}

/// Response for a reset request.
#[derive(Debug, Serialize)]
pub struct ResetRequestResponse {
    pub success: bool,
    pub message: &'static str,
}

/// Email a password reset link.
///
/// POST /auth/password-reset
///
/// Answers the same way whether or not the email has an account.
#[instrument(skip_all)]
pub async fn request_reset(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ResetRequestBody>,
) -> Result<Json<ResetRequestResponse>> {
    state.password_reset().request_reset(&body.email).await?;

    Ok(Json(ResetRequestResponse {
        success: true,
        message: "If an account exists for that email, a reset link is on its way.",
    }))
}

/// Redeem a reset token.
///
/// POST /auth/password-reset/confirm
#[instrument(skip_all)]
pub async fn confirm_reset(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ResetConfirmBody>,
) -> Result<Json<SuccessResponse>> {
    state
        .password_reset()
        .confirm_reset(&body.token, &body.password)
        .await?;

    Ok(Json(SuccessResponse::ok()))
}
