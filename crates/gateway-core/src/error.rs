//! Central error vocabulary for the gateway.
//!
//! Every fallible operation in the pipeline returns `GatewayError`. It implements
//! `actix_web::ResponseError` once, rendering RFC 7807 `application/problem+json`
//! bodies, and exposes a WebSocket close-code mapping for the upgrade-side pipeline.

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("no route matches {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("unknown service: {service_id}")]
    ServiceNotFound { service_id: String },

    #[error("endpoint does not support websocket upgrade: {path}")]
    NotWebSocket { path: String },

    #[error("unauthorized: {reason}")]
    Unauthorized { reason: String },

    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("bad request: {reason}")]
    BadRequest { reason: String },

    #[error("payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("header too large: {which}")]
    HeaderTooLarge { which: String },

    #[error("rate limit exceeded for {key}")]
    RateLimited {
        key: String,
        retry_after_seconds: u64,
        limit: u64,
        window_seconds: u64,
        reset_at_millis: u64,
        /// Whether `X-RateLimit-*` headers should be attached (`rateLimiting.includeHeaders`, §6).
        include_headers: bool,
    },

    #[error("upstream connection failure ({classification}): {message}")]
    BadGateway {
        message: String,
        classification: String,
        url: String,
    },

    #[error("upstream request timed out after {timeout_seconds}s")]
    GatewayTimeout { timeout_seconds: u64, url: String },

    #[error("internal error: {message}")]
    Internal { message: String },

    #[error("storage unavailable: {message}")]
    StorageUnavailable { message: String },

    #[error("at capacity: {current}/{max} active websocket sessions")]
    AtCapacity { current: usize, max: usize },
}

impl GatewayError {
    /// WebSocket close code this error maps to when it occurs on the upgrade side,
    /// per the reserved-range propagation rule (§7): unclassified failures become 1011.
    pub fn ws_close_code(&self) -> u16 {
        match self {
            GatewayError::Unauthorized { .. } => 4001,
            GatewayError::Forbidden { .. } => 4003,
            GatewayError::RateLimited { .. } => 1008,
            _ => 1011,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::RouteNotFound { .. } => "route_not_found",
            GatewayError::ServiceNotFound { .. } => "service_not_found",
            GatewayError::NotWebSocket { .. } => "not_websocket",
            GatewayError::Unauthorized { .. } => "unauthorized",
            GatewayError::Forbidden { .. } => "forbidden",
            GatewayError::BadRequest { .. } => "bad_request",
            GatewayError::PayloadTooLarge { .. } => "payload_too_large",
            GatewayError::HeaderTooLarge { .. } => "header_too_large",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::BadGateway { .. } => "bad_gateway",
            GatewayError::GatewayTimeout { .. } => "gateway_timeout",
            GatewayError::Internal { .. } => "internal_error",
            GatewayError::StorageUnavailable { .. } => "storage_unavailable",
            GatewayError::AtCapacity { .. } => "at_capacity",
        }
    }
}

impl actix_web::error::ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::ServiceNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::NotWebSocket { .. } => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden { .. } => StatusCode::FORBIDDEN,
            GatewayError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::HeaderTooLarge { .. } => StatusCode::from_u16(431).unwrap(),
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::GatewayTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::StorageUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::AtCapacity { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let mut builder = HttpResponse::build(status);
        builder.content_type("application/problem+json");
        let mut response = builder.json(json!({
            "type": format!("https://aussie-gateway/errors/{}", self.kind()),
            "title": self.kind(),
            "status": status.as_u16(),
            "detail": self.to_string(),
        }));

        if let GatewayError::RateLimited {
            retry_after_seconds,
            limit,
            reset_at_millis,
            include_headers,
            ..
        } = self
        {
            let headers = response.headers_mut();
            headers.insert(
                actix_web::http::header::RETRY_AFTER,
                actix_web::http::header::HeaderValue::from_str(&retry_after_seconds.to_string()).unwrap(),
            );
            if *include_headers {
                for (name, value) in [
                    ("X-RateLimit-Limit", limit.to_string()),
                    ("X-RateLimit-Remaining", "0".to_string()),
                    ("X-RateLimit-Reset", (reset_at_millis / 1000).to_string()),
                ] {
                    if let Ok(value) = actix_web::http::header::HeaderValue::from_str(&value) {
                        headers.insert(actix_web::http::header::HeaderName::from_static(
                            match name {
                                "X-RateLimit-Limit" => "x-ratelimit-limit",
                                "X-RateLimit-Remaining" => "x-ratelimit-remaining",
                                _ => "x-ratelimit-reset",
                            },
                        ), value);
                    }
                }
            }
        }

        response
    }
}
