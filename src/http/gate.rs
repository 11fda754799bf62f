//! Request gate: admission control in front of every route.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info_span, Instrument};
use uuid::Uuid;

use super::identity::IdentityResolver;
use crate::ratelimit::RateLimiter;

/// Body text returned with every 429.
pub const REJECTION_MESSAGE: &str =
    "you have reached the maximum number of requests or actions allowed within a certain time frame";

/// JSON body of a rejected request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionBody {
    pub message: String,
}

/// Shared state for the gate middleware.
#[derive(Clone)]
pub struct Gate {
    limiter: Arc<RateLimiter>,
    resolver: Arc<IdentityResolver>,
}

impl Gate {
    pub fn new(limiter: Arc<RateLimiter>, resolver: IdentityResolver) -> Self {
        Self {
            limiter,
            resolver: Arc::new(resolver),
        }
    }

    /// Decide on one request and either forward it or answer it directly.
    async fn admit(&self, request: Request, next: Next) -> Response {
        let key = self.resolver.resolve(&request);

        match self.limiter.check(&key).await {
            Ok(decision) if decision.is_allowed() => next.run(request).await,
            Ok(decision) => {
                debug!(key = %key, decision = ?decision, "Request rejected");
                rejection()
            }
            Err(e) => {
                error!(key = %key, error = %e, "Rate limit check failed");
                internal_error()
            }
        }
    }
}

/// Axum middleware running every request through the rate limiter.
///
/// Install with `axum::middleware::from_fn_with_state(gate, rate_limit_gate)`.
pub async fn rate_limit_gate(State(gate): State<Gate>, request: Request, next: Next) -> Response {
    let span = info_span!(
        "gate",
        request_id = %Uuid::new_v4(),
        method = %request.method(),
        path = %request.uri().path(),
    );

    gate.admit(request, next).instrument(span).await
}

fn rejection() -> Response {
    let body = RejectionBody {
        message: REJECTION_MESSAGE.to_string(),
    };
    (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}
