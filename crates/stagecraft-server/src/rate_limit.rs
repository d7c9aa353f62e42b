use std::{num::NonZeroU32, sync::Arc, time::Duration};

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DashMapStateStore};
use http::StatusCode;
use stagecraft_config::RequestRateLimit;

type KeyedLimiter = RateLimiter<String, DashMapStateStore<String>, DefaultClock>;

/// Path subject to the per-IP limit; listing and health stay open
const LIMITED_PATH: &str = "/api/edit";

/// Per-IP request limiter backed by governor's keyed in-memory store
pub struct EditRateLimiter {
    limiter: Arc<KeyedLimiter>,
}

impl EditRateLimiter {
    /// Create a limiter from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the window does not parse as a duration or the
    /// limit values are degenerate
    pub fn new(config: &RequestRateLimit) -> anyhow::Result<Self> {
        let window: Duration = duration_str::parse(&config.window)
            .map_err(|e| anyhow::anyhow!("invalid rate limit window '{}': {e}", config.window))?;
        if window.is_zero() {
            anyhow::bail!("rate limit window must be > 0");
        }

        let burst = NonZeroU32::new(config.requests)
            .ok_or_else(|| anyhow::anyhow!("rate limit requests must be > 0"))?;

        // Spread replenishment evenly across the window, allowing the full
        // budget as burst
        let replenish_interval = window / config.requests;
        let quota = Quota::with_period(replenish_interval)
            .ok_or_else(|| anyhow::anyhow!("invalid rate limit period"))?
            .allow_burst(burst);

        Ok(Self {
            limiter: Arc::new(RateLimiter::dashmap(quota)),
        })
    }

    /// Check whether a request from this IP is allowed
    ///
    /// Returns the seconds to wait when over the limit.
    fn check(&self, ip: &str) -> Result<(), u64> {
        match self.limiter.check_key(&ip.to_string()) {
            Ok(()) => Ok(()),
            Err(not_until) => {
                let retry_after = not_until
                    .wait_time_from(governor::clock::Clock::now(&DefaultClock::default()));
                Err(retry_after.as_secs().max(1))
            }
        }
    }
}

/// Rate limiting middleware for the edit route
pub async fn rate_limit_middleware(limiter: Arc<EditRateLimiter>, request: Request, next: Next) -> Response {
    if request.uri().path() != LIMITED_PATH {
        return next.run(request).await;
    }

    if let Some(ip) = extract_client_ip(&request)
        && let Err(retry_after) = limiter.check(&ip)
    {
        tracing::warn!(retry_after, "edit request rate limited");
        return limited_response(retry_after);
    }

    next.run(request).await
}

fn extract_client_ip(request: &Request) -> Option<String> {
    // Try X-Forwarded-For first
    if let Some(forwarded) = request.headers().get("x-forwarded-for")
        && let Ok(val) = forwarded.to_str()
        && let Some(first) = val.split(',').next()
    {
        return Some(first.trim().to_string());
    }

    // Try X-Real-IP
    if let Some(real_ip) = request.headers().get("x-real-ip")
        && let Ok(val) = real_ip.to_str()
    {
        return Some(val.trim().to_string());
    }

    None
}

fn limited_response(retry_after: u64) -> Response {
    let body = serde_json::json!({
        "detail": format!("rate limit exceeded, retry after {retry_after}s"),
        "type": "rate_limited",
        "code": StatusCode::TOO_MANY_REQUESTS.as_u16(),
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response();

    if let Ok(val) = retry_after.to_string().parse() {
        response.headers_mut().insert("retry-after", val);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(requests: u32, window: &str) -> EditRateLimiter {
        EditRateLimiter::new(&RequestRateLimit {
            requests,
            window: window.to_string(),
        })
        .unwrap()
    }

    #[test]
    fn allows_up_to_the_budget_then_rejects() {
        let limiter = limiter(2, "1h");
        assert!(limiter.check("203.0.113.7").is_ok());
        assert!(limiter.check("203.0.113.7").is_ok());

        let retry_after = limiter.check("203.0.113.7").unwrap_err();
        assert!(retry_after >= 1);
    }

    #[test]
    fn keys_are_independent() {
        let limiter = limiter(1, "1h");
        assert!(limiter.check("203.0.113.7").is_ok());
        assert!(limiter.check("203.0.113.8").is_ok());
        assert!(limiter.check("203.0.113.7").is_err());
    }

    #[test]
    fn invalid_window_is_rejected() {
        let result = EditRateLimiter::new(&RequestRateLimit {
            requests: 100,
            window: "not-a-duration".to_string(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn zero_requests_is_rejected() {
        let result = EditRateLimiter::new(&RequestRateLimit {
            requests: 0,
            window: "1h".to_string(),
        });
        assert!(result.is_err());
    }
}
