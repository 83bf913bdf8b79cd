//! Contact form route handler.

use axum::{Json, extract::State};
use serde::Serialize;
use tracing::instrument;

use super::ApiJson;
use crate::error::Result;
use crate::services::ContactForm;
use crate::state::AppState;

/// Response for a contact form submission.
#[derive(Debug, Serialize)]
pub struct ContactResponse {
    pub success: bool,
    /// Whether the message reached the inbox.
    pub delivered: bool,
}

/// Forward a contact message to the shop inbox.
///
/// POST /contact
///
/// A failed delivery is logged but still answers success; the visitor's
/// submission was valid.
#[instrument(skip_all)]
pub async fn submit(
    State(state): State<AppState>,
    ApiJson(form): ApiJson<ContactForm>,
) -> Result<Json<ContactResponse>> {
    let outcome = state.contact().submit(form).await?;

    Ok(Json(ContactResponse {
        success: true,
        delivered: outcome.success,
    }))
}
