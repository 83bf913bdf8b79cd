//! HTTP middleware stack for the storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request span via [`make_request_span`])
//! 3. Request ID (records into that span)
//! 4. Rate limiting (governor), on write routes only

pub mod rate_limit;
pub mod request_id;

pub use rate_limit::{RateLimiterLayer, checkout_rate_limiter, sensitive_rate_limiter};
pub use request_id::{RequestId, make_request_span, request_id_middleware};
