//! Catalog lookups for product and category pages.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use tracing::instrument;

use super::DataResponse;
use crate::error::{AppError, Result};
use crate::models::{Category, Product};
use crate::state::AppState;

/// A category together with the collection it belongs to.
#[derive(Debug, Serialize)]
pub struct CategoryResponse {
    pub success: bool,
    pub category: Category,
    /// `None` for top-level collections.
    pub parent: Option<Category>,
}

/// Look up a product by slug and count the view.
///
/// GET /catalog/products/{slug}
#[instrument(skip(state))]
pub async fn product(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<DataResponse<Product>>> {
    let catalog = state.catalog();
    let mut product = catalog
        .product_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound("product".to_string()))?;

    match catalog.increment_views(&product.id).await {
        Ok(()) => product.views += 1,
        Err(e) => {
            tracing::warn!(product_id = %product.id, error = %e, "Failed to count product view");
        }
    }

    Ok(Json(DataResponse::new(product)))
}

/// Look up a collection or category by slug.
///
/// GET /catalog/categories/{slug}
#[instrument(skip(state))]
pub async fn category(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<CategoryResponse>> {
    let catalog = state.catalog();
    let category = catalog
        .category_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound("category".to_string()))?;

    let parent = match &category.parent_id {
        Some(parent_id) => catalog.category(parent_id).await?,
        None => None,
    };

    Ok(Json(CategoryResponse {
        success: true,
        category,
        parent,
    }))
}
