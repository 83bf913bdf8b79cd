//! Download route handlers.

use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use printshelf_core::ProductId;

use super::ApiJson;
use crate::error::{AppError, Result};
use crate::services::downloads::StreamRequest;
use crate::state::AppState;

/// Body of `POST /download`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignBody {
    #[serde(default)]
    pub product_id: Option<String>,
    /// Order number, required for paid products.
    #[serde(default)]
    pub order: Option<String>,
}

/// Response for a signed download.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedDownloadResponse {
    pub success: bool,
    pub url: String,
    /// Seconds until `url` stops working.
    pub expires_in: u64,
}

/// Query of `GET /download`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    pub file: Option<String>,
    pub name: Option<String>,
    pub product_id: Option<String>,
    pub order: Option<String>,
}

/// Query of `GET /products/{id}/download`.
#[derive(Debug, Default, Deserialize)]
pub struct RedirectQuery {
    pub order: Option<String>,
}

/// Issue a signed URL for a product file.
///
/// POST /download
#[instrument(skip(state, body))]
pub async fn sign(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SignBody>,
) -> Result<Json<SignedDownloadResponse>> {
    let product_id = body
        .product_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(ProductId::new)
        .ok_or_else(|| AppError::BadRequest("productId is required".to_string()))?;

    let ticket = state
        .downloads()
        .fulfill(&product_id, body.order.as_deref())
        .await?;

    Ok(Json(SignedDownloadResponse {
        success: true,
        url: ticket.url,
        expires_in: ticket.expires_in.as_secs(),
    }))
}

/// Stream a product file as an attachment.
///
/// GET /download?productId=&file=&name=&order=
#[instrument(skip(state))]
pub async fn stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Result<Response> {
    let download = state
        .downloads()
        .stream_download(StreamRequest {
            product_id: query.product_id,
            file: query.file,
            name: query.name,
            order: query.order,
        })
        .await?;

    let content_type = download
        .object
        .content_type
        .as_deref()
        .and_then(|v| HeaderValue::from_str(v).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/pdf"));
    let disposition = HeaderValue::from_str(&content_disposition(&download.file_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    let mut response = Body::from_stream(download.object.body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("private, no-store"),
    );
    if let Some(length) = download.object.content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    Ok(response)
}

/// Redirect to a signed URL for a product file.
///
/// GET /products/{id}/download?order=
#[instrument(skip(state))]
pub async fn redirect(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RedirectQuery>,
) -> Result<Redirect> {
    let ticket = state
        .downloads()
        .fulfill(&ProductId::new(id), query.order.as_deref())
        .await?;

    Ok(Redirect::to(&ticket.url))
}

/// `Content-Disposition` value for an already-sanitized ASCII file name.
fn content_disposition(file_name: &str) -> String {
    format!(
        "attachment; filename=\"{file_name}\"; filename*=UTF-8''{}",
        urlencoding::encode(file_name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition("Sleepy Fox.pdf"),
            "attachment; filename=\"Sleepy Fox.pdf\"; filename*=UTF-8''Sleepy%20Fox.pdf"
        );
    }
}
