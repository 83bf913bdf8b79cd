//! Printshelf storefront library.
//!
//! Checkout, download fulfillment, password reset and contact for a shop
//! selling printable coloring pages. The binary in `main.rs` wires this up
//! against Postgres, Supabase storage and SMTP; tests build the same router
//! over in-memory backends through [`state::AppState::from_backends`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod storage;

use axum::Router;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the full application router with its middleware stack.
///
/// Layers, innermost first: request id, HTTP tracing, then Sentry so it sees
/// the whole request.
pub fn app(state: AppState, rate_limit: bool) -> Router {
    routes::routes(rate_limit)
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(middleware::make_request_span::<axum::body::Body>))
        .with_state(state)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
