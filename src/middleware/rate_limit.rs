use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::AppError;
use crate::middleware::gate::{Flow, Gate};
use crate::services::rate_limiter::{Decision, RateLimitStore};

/// Client identity used as the rate-limit key.
pub fn client_key(req: &Request<Body>) -> String {
    // Get client IP from X-Forwarded-For header (for proxied requests) or X-Real-IP
    req.headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            req.headers()
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.trim().to_string())
        })
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

pub struct RateLimitGate {
    store: Arc<dyn RateLimitStore>,
}

impl RateLimitGate {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }
}

fn too_many_requests(decision: &Decision) -> Response {
    let retry_after = decision.reset_after.as_secs().max(1);
    let mut response = AppError::RateLimited { retry_after }.into_response();

    let headers = response.headers_mut();
    headers.insert(HeaderName::from_static("retry-after"), HeaderValue::from(retry_after));
    headers.insert(
        HeaderName::from_static("x-ratelimit-limit"),
        HeaderValue::from(decision.limit),
    );
    headers.insert(
        HeaderName::from_static("x-ratelimit-remaining"),
        HeaderValue::from(decision.remaining),
    );
    response
}

#[async_trait]
impl Gate for RateLimitGate {
    fn name(&self) -> &'static str {
        "rate-limit"
    }

    async fn check(&self, req: &mut Request<Body>) -> Flow {
        let key = client_key(req);

        match self.store.hit(&key).await {
            Ok(decision) if decision.allowed => Flow::Continue,
            Ok(decision) => {
                tracing::warn!("Rate limit exceeded for client: {}", key);
                Flow::Halt(too_many_requests(&decision))
            }
            Err(e) => {
                // Log error but allow request through (fail open)
                tracing::error!("Rate limiter error: {} - allowing request", e);
                Flow::Continue
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rate_limiter::RateLimitError;
    use axum::http::{self, StatusCode};

    struct Broken;

    #[async_trait]
    impl RateLimitStore for Broken {
        async fn hit(&self, _key: &str) -> Result<Decision, RateLimitError> {
            Err(RateLimitError::Connection("refused".to_string()))
        }
    }

    struct Exhausted;

    #[async_trait]
    impl RateLimitStore for Exhausted {
        async fn hit(&self, _key: &str) -> Result<Decision, RateLimitError> {
            Ok(Decision {
                allowed: false,
                limit: 100,
                remaining: 0,
                reset_after: std::time::Duration::from_secs(42),
            })
        }
    }

    fn request() -> Request<Body> {
        http::Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    #[test]
    fn forwarded_for_wins_over_real_ip() {
        let req = http::Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("x-real-ip", "10.0.0.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_key(&req), "203.0.113.7");
    }

    #[test]
    fn falls_back_to_peer_address_then_unknown() {
        let mut req = request();
        assert_eq!(client_key(&req), "unknown");

        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4000))));
        assert_eq!(client_key(&req), "192.0.2.1");
    }

    #[tokio::test]
    async fn backend_failure_fails_open() {
        let gate = RateLimitGate::new(Arc::new(Broken));
        assert!(matches!(gate.check(&mut request()).await, Flow::Continue));
    }

    #[tokio::test]
    async fn exhausted_budget_answers_429_with_headers() {
        let gate = RateLimitGate::new(Arc::new(Exhausted));

        let Flow::Halt(resp) = gate.check(&mut request()).await else {
            panic!("exhausted client was let through");
        };
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers()["retry-after"], "42");
        assert_eq!(resp.headers()["x-ratelimit-limit"], "100");
        assert_eq!(resp.headers()["x-ratelimit-remaining"], "0");
    }
}
