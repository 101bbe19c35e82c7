//! Per-client sliding-window rate limiting for the collect endpoint.

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::RateLimitConfig;
use crate::error::ServerError;
use crate::state::AppState;

/// Idle windows are pruned once this many clients are tracked.
const PRUNE_THRESHOLD: usize = 10_000;

/// Sliding window request timestamps for one client.
#[derive(Debug)]
struct SlidingWindow {
    /// Request timestamps within the window.
    timestamps: VecDeque<Instant>,
}

impl SlidingWindow {
    fn new(max_requests: u32) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(max_requests as usize + 1),
        }
    }

    /// Drops timestamps at or before `now - window`.
    fn expire(&mut self, now: Instant, window: Duration) {
        while self
            .timestamps
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= window)
        {
            self.timestamps.pop_front();
        }
    }

    /// Time until the oldest request leaves the window.
    fn reset_after(&self, now: Instant, window: Duration) -> Duration {
        self.timestamps
            .front()
            .map_or(Duration::ZERO, |oldest| {
                window.saturating_sub(now.saturating_duration_since(*oldest))
            })
    }
}

/// Outcome of a rate-limit check, with the numbers the response headers need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Requests allowed per window.
    pub limit: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Time until the window frees a slot.
    pub reset_after: Duration,
}

/// Request rate limiter using a sliding window per client address.
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum requests per window.
    max_requests: u32,
    /// Window size.
    window: Duration,
    /// Sliding windows per IP.
    windows: RwLock<HashMap<IpAddr, SlidingWindow>>,
}

impl RateLimiter {
    /// Create a rate limiter allowing `max_requests` per `window`.
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Create from configuration.
    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window)
    }

    /// Check if a request from `ip` is allowed and record it if so.
    pub fn check(&self, ip: IpAddr) -> RateDecision {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> RateDecision {
        let mut windows = self.windows.write();
        if windows.len() >= PRUNE_THRESHOLD {
            let window = self.window;
            windows.retain(|_, w| {
                w.expire(now, window);
                !w.timestamps.is_empty()
            });
        }

        let window = windows
            .entry(ip)
            .or_insert_with(|| SlidingWindow::new(self.max_requests));
        window.expire(now, self.window);

        let used = u32::try_from(window.timestamps.len()).unwrap_or(u32::MAX);
        let allowed = used < self.max_requests;
        if allowed {
            window.timestamps.push_back(now);
        } else {
            debug!(ip = %ip, count = used, "Rate limit exceeded");
        }

        let used = if allowed { used + 1 } else { used };
        RateDecision {
            allowed,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(used),
            reset_after: window.reset_after(now, self.window),
        }
    }

    /// Get current request count for an IP.
    #[cfg(test)]
    fn current_count(&self, ip: &IpAddr) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.write();
        windows.get_mut(ip).map_or(0, |w| {
            w.expire(now, self.window);
            w.timestamps.len()
        })
    }

    /// Get number of tracked IPs.
    #[cfg(test)]
    fn tracked_count(&self) -> usize {
        self.windows.read().len()
    }

    /// Get the max requests per window.
    #[must_use]
    pub const fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Get the window size.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }
}

/// Rate limits a route by client address and reports the window in
/// `X-RateLimit-*` headers.
///
/// Requests without connection info share one bucket.
pub async fn limit_by_client(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |info| info.0.ip());

    let decision = state.rate_limiter().check(ip);
    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        warn!(ip = %ip, limit = decision.limit, "Collect rate limit exceeded");
        ServerError::RateLimited.into_response()
    };
    apply_headers(response.headers_mut(), &decision);
    response
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    let reset_secs = decision.reset_after.as_secs()
        + u64::from(decision.reset_after.subsec_nanos() > 0);
    let now = u64::try_from(Utc::now().timestamp()).unwrap_or(0);

    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(now + reset_secs));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn allows_up_to_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check(ip(1));
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let decision = limiter.check(ip(1));
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.limit, 3);
        assert!(decision.reset_after > Duration::ZERO);
    }

    #[test]
    fn clients_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check(ip(1)).allowed);
        assert!(!limiter.check(ip(1)).allowed);
        assert!(limiter.check(ip(2)).allowed);
        assert_eq!(limiter.tracked_count(), 2);
    }

    #[test]
    fn window_slides() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        let start = Instant::now();

        assert!(limiter.check_at(ip(1), start).allowed);
        assert!(limiter.check_at(ip(1), start + Duration::from_secs(5)).allowed);
        assert!(!limiter.check_at(ip(1), start + Duration::from_secs(9)).allowed);

        // The first request has left the window
        let decision = limiter.check_at(ip(1), start + Duration::from_secs(10));
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn rejected_requests_are_not_recorded() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        limiter.check(ip(1));
        limiter.check(ip(1));
        limiter.check(ip(1));
        assert_eq!(limiter.current_count(&ip(1)), 1);
    }

    #[test]
    fn zero_limit_rejects_everything() {
        let limiter = RateLimiter::new(0, Duration::from_secs(60));
        assert!(!limiter.check(ip(1)).allowed);
    }

    #[test]
    fn headers_report_window() {
        let mut headers = HeaderMap::new();
        let decision = RateDecision {
            allowed: true,
            limit: 100,
            remaining: 99,
            reset_after: Duration::from_millis(59_500),
        };
        apply_headers(&mut headers, &decision);

        assert_eq!(headers["x-ratelimit-limit"], "100");
        assert_eq!(headers["x-ratelimit-remaining"], "99");
        let reset: i64 = headers["x-ratelimit-reset"]
            .to_str()
            .expect("ascii")
            .parse()
            .expect("number");
        let delta = reset - Utc::now().timestamp();
        assert!((59..=60).contains(&delta), "reset {delta}s ahead");
    }

    #[test]
    fn from_config() {
        let limiter = RateLimiter::from_config(&RateLimitConfig::default());
        assert_eq!(limiter.max_requests(), 100);
        assert_eq!(limiter.window(), Duration::from_secs(60));
    }
}
