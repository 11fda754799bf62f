//! Application routes, all served behind the rate limit gate.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};

use super::gate::{rate_limit_gate, Gate};
use super::identity::IdentityResolver;
use crate::ratelimit::RateLimiter;

/// Build the router with the gate applied to every route, the fallback included.
pub fn router(limiter: Arc<RateLimiter>, resolver: IdentityResolver) -> Router {
    let gate = Gate::new(limiter, resolver);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/v1/limiter", post(limiter_hello))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(gate, rate_limit_gate))
}

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "OK" }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn limiter_hello() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Hello world" }))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({ "message": "not found" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentityConfig;
    use crate::http::gate::{RejectionBody, REJECTION_MESSAGE};
    use crate::ratelimit::{LimitPolicy, Policies};
    use crate::storage::{CounterStore, MemoryStore, StoreError};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{header, Method, Request, Response};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_policies() -> Policies {
        Policies {
            window: Duration::from_secs(1),
            ip: LimitPolicy::new(3, Duration::from_secs(3)),
            token: LimitPolicy::new(4, Duration::from_secs(4)),
        }
    }

    fn app_with_store(store: Arc<dyn CounterStore>) -> Router {
        let limiter = Arc::new(RateLimiter::new(store, test_policies()));
        let resolver = IdentityResolver::from_config(&IdentityConfig::default()).unwrap();
        router(limiter, resolver)
    }

    fn app() -> Router {
        app_with_store(Arc::new(MemoryStore::new()))
    }

    fn request(path: &str) -> Request<Body> {
        let mut request = Request::builder().uri(path).body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo::<SocketAddr>("10.0.0.1:40000".parse().unwrap()));
        request
    }

    fn with_token(path: &str, token: &str) -> Request<Body> {
        let mut request = request(path);
        request.headers_mut().insert("api_key", token.parse().unwrap());
        request
    }

    async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
        app.clone().oneshot(request).await.unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response<Body>) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Store that answers every call with a timeout.
    struct UnreachableStore;

    #[async_trait]
    impl CounterStore for UnreachableStore {
        async fn increment(&self, _key: &str, _window: Duration) -> Result<u64, StoreError> {
            Err(StoreError::Timeout { operation: "increment", after: Duration::from_secs(3) })
        }

        async fn is_blocked(&self, _key: &str) -> Result<bool, StoreError> {
            Err(StoreError::Timeout { operation: "is_blocked", after: Duration::from_secs(3) })
        }

        async fn block(&self, _key: &str, _duration: Duration) -> Result<(), StoreError> {
            Err(StoreError::Timeout { operation: "block", after: Duration::from_secs(3) })
        }

        async fn reset(&self, _key: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), StoreError> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "unreachable"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_address_limit_scenario() {
        let app = app();

        for i in 1..=3 {
            let response = send(&app, request("/")).await;
            assert_eq!(response.status(), StatusCode::OK, "request {} should pass", i);
        }

        let response = send(&app, request("/")).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body: RejectionBody = body_json(response).await;
        assert_eq!(body.message, REJECTION_MESSAGE);

        // Still blocked
        let response = send(&app, request("/")).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        tokio::time::advance(Duration::from_millis(3001)).await;
        let response = send(&app, request("/")).await;
        assert_eq!(response.status(), StatusCode::OK);

        // Counting restarted at 1, so two more fit in this window
        for _ in 0..2 {
            assert_eq!(send(&app, request("/")).await.status(), StatusCode::OK);
        }
        assert_eq!(
            send(&app, request("/")).await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_not_affected_by_exhausted_address() {
        let app = app();

        for _ in 0..4 {
            send(&app, request("/")).await;
        }
        assert_eq!(
            send(&app, request("/")).await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );

        // Same address, but with a credential
        for _ in 0..4 {
            let response = send(&app, with_token("/", "X")).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(
            send(&app, with_token("/", "X")).await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );

        // A different credential has its own budget
        assert_eq!(send(&app, with_token("/", "Y")).await.status(), StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_is_gated() {
        let app = app();

        for _ in 0..3 {
            let response = send(&app, request("/health")).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(
            send(&app, request("/health")).await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_routes_are_gated() {
        let app = app();

        for _ in 0..3 {
            assert_eq!(send(&app, request("/missing")).await.status(), StatusCode::NOT_FOUND);
        }
        assert_eq!(
            send(&app, request("/missing")).await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[tokio::test]
    async fn test_store_failure_is_internal_error() {
        let app = app_with_store(Arc::new(UnreachableStore));

        let response = send(&app, request("/")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Internal Server Error");
    }

    #[tokio::test]
    async fn test_allowed_request_reaches_handler() {
        let app = app();

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/limiter")
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::empty())
            .unwrap();
        let response = send(&app, request).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response).await;
        assert_eq!(body["message"], "Hello world");
    }

    #[tokio::test]
    async fn test_health_reports_status() {
        let response = send(&app(), request("/health")).await;
        let body: serde_json::Value = body_json(response).await;

        assert_eq!(body["status"], "healthy");
        assert!(body["timestamp"].is_string());
    }
}
