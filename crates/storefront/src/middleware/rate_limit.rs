//! Fixed-window rate limiting keyed by client IP.
//!
//! Two limiters are mounted by the router:
//! - auth: login and logout (10 requests per minute by default)
//! - api: everything else under `/api` (100 requests per minute by default)
//!
//! A window opens at a client's first request and lasts `window`; requests
//! past `limit` inside it get `429` with a `Retry-After` header. Windows
//! live in a `moka` cache whose TTL equals the window length, so an expired
//! window simply disappears.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use moka::future::Cache;
use tracing::warn;

use crate::error::AppError;

/// Upper bound on tracked client windows.
const MAX_TRACKED_CLIENTS: u64 = 100_000;

/// One client's current window.
#[derive(Debug)]
struct Window {
    started: Instant,
    count: AtomicU32,
}

/// Per-IP fixed-window counter.
#[derive(Clone)]
pub struct RateLimiter {
    name: &'static str,
    limit: u32,
    window: Duration,
    windows: Cache<IpAddr, Arc<Window>>,
}

impl RateLimiter {
    /// Create a limiter allowing `limit` requests per `window` per client.
    #[must_use]
    pub fn new(name: &'static str, limit: u32, window: Duration) -> Self {
        Self {
            name,
            limit,
            window,
            windows: Cache::builder()
                .max_capacity(MAX_TRACKED_CLIENTS)
                .time_to_live(window)
                .build(),
        }
    }

    /// Count a request from `ip`.
    ///
    /// # Errors
    ///
    /// Returns the number of seconds until the window resets when `ip` has
    /// used up its budget.
    pub async fn check(&self, ip: IpAddr) -> Result<(), u64> {
        let window = self
            .windows
            .get_with(ip, async {
                Arc::new(Window {
                    started: Instant::now(),
                    count: AtomicU32::new(0),
                })
            })
            .await;

        let count = window.count.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        if count <= self.limit {
            return Ok(());
        }

        let remaining = self.window.saturating_sub(window.started.elapsed());
        Err(remaining.as_secs().max(1))
    }
}

/// Real client IP: proxy headers first (Cloudflare, then standard proxies,
/// then Fly.io), then the socket peer address.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> IpAddr {
    let header_ip = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
    };

    header_ip("cf-connecting-ip")
        .or_else(|| header_ip("x-forwarded-for"))
        .or_else(|| header_ip("x-real-ip"))
        .or_else(|| header_ip("fly-client-ip"))
        .or_else(|| peer.map(|addr| addr.ip()))
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Middleware enforcing a [`RateLimiter`].
///
/// Mount with `axum::middleware::from_fn_with_state(limiter, rate_limit)`.
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(request.headers(), peer);

    match limiter.check(ip).await {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            warn!(%ip, limiter = limiter.name, retry_after, "Rate limit exceeded");
            AppError::RateLimited(retry_after).into_response()
        }
    }
}
