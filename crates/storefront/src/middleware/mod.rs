//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Session layer (tower-sessions with an in-memory store)
//! 5. CSRF verification for state-changing requests
//! 6. Rate limiting (fixed window per client IP, per route group)

pub mod auth;
pub mod csrf;
pub mod rate_limit;
pub mod request_id;
pub mod session;

pub use auth::{OptionalAuth, RequireAuth, clear_current_user, set_current_user};
pub use csrf::{CSRF_HEADER, csrf_middleware, issue_token};
pub use rate_limit::{RateLimiter, client_ip, rate_limit};
pub use request_id::request_id_middleware;
pub use session::{SESSION_COOKIE_NAME, create_session_layer};
