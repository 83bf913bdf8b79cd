//! HTTP route handlers for the storefront API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                          - Liveness
//! GET    /health/ready                    - Readiness (database ping)
//!
//! # Catalog
//! GET    /catalog/products/{slug}         - Product lookup (counts a view)
//! GET    /catalog/categories/{slug}       - Category with its parent collection
//!
//! # Orders
//! POST   /orders                          - Checkout (rate limited)
//! GET    /orders?status=&page=&limit=     - Order listing (admin)
//! GET    /orders/number/{orderNumber}     - Order lookup for the confirmation page
//! PATCH  /orders/{id}                     - Status transition (admin)
//! DELETE /orders/{id}                     - Hard delete (admin)
//!
//! # Downloads
//! POST   /download                        - Signed URL for a product (rate limited)
//! GET    /download?productId=&file=&name=&order= - Proxied file stream
//! GET    /products/{id}/download?order=   - 303 redirect to a signed URL
//!
//! # Account
//! POST   /auth/password-reset             - Email a reset link (rate limited)
//! POST   /auth/password-reset/confirm     - Redeem a reset token (rate limited)
//!
//! # Contact
//! POST   /contact                         - Forward a contact message (rate limited)
//! ```
//!
//! The admin routes carry no authentication of their own; they are expected
//! to sit behind an authenticating proxy.

pub mod auth;
pub mod catalog;
pub mod contact;
pub mod downloads;
pub mod orders;

use axum::{
    Router,
    extract::{FromRequest, State},
    http::StatusCode,
    routing::{MethodRouter, get, patch, post},
};
use serde::Serialize;

use crate::error::AppError;
use crate::middleware::{RateLimiterLayer, checkout_rate_limiter, sensitive_rate_limiter};
use crate::state::AppState;

/// JSON body extractor whose rejections render as `AppError`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Body of responses that only report success.
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    #[must_use]
    pub const fn ok() -> Self {
        Self { success: true }
    }
}

/// Body of responses carrying a single record.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> DataResponse<T> {
    #[must_use]
    pub const fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Apply `layer` to a method router when rate limiting is on.
fn limited(
    route: MethodRouter<AppState>,
    layer: Option<&RateLimiterLayer>,
) -> MethodRouter<AppState> {
    match layer {
        Some(layer) => route.layer(layer.clone()),
        None => route,
    }
}

/// Create all routes for the storefront.
///
/// With `rate_limit` off no limiter is installed, which is what tests and
/// deployments without a client-IP source want.
pub fn routes(rate_limit: bool) -> Router<AppState> {
    let checkout = rate_limit.then(checkout_rate_limiter).flatten();
    let sensitive = rate_limit.then(sensitive_rate_limiter).flatten();

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        // Catalog
        .route("/catalog/products/{slug}", get(catalog::product))
        .route("/catalog/categories/{slug}", get(catalog::category))
        // Orders
        .route(
            "/orders",
            limited(post(orders::create), checkout.as_ref()).get(orders::list),
        )
        .route("/orders/number/{order_number}", get(orders::show_by_number))
        .route(
            "/orders/{id}",
            patch(orders::update_status).delete(orders::delete),
        )
        // Downloads
        .route(
            "/download",
            limited(post(downloads::sign), checkout.as_ref()).get(downloads::stream),
        )
        .route("/products/{id}/download", get(downloads::redirect))
        // Account
        .route(
            "/auth/password-reset",
            limited(post(auth::request_reset), sensitive.as_ref()),
        )
        .route(
            "/auth/password-reset/confirm",
            limited(post(auth::confirm_reset), sensitive.as_ref()),
        )
        // Contact
        .route(
            "/contact",
            limited(post(contact::submit), sensitive.as_ref()),
        )
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Verifies database connectivity before returning OK.
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    let Some(pool) = state.pool() else {
        return StatusCode::OK;
    };
    match sqlx::query("SELECT 1").fetch_one(pool).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
