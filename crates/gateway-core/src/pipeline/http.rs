//! The HTTP gateway pipeline (§4.6):
//! `ENTRY → RESOLVE_ROUTE → RATE_LIMIT → AUTHENTICATE → PREPARE → DISPATCH → RESPOND`.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use log::warn;

use crate::auth::AuthResult;
use crate::error::GatewayError;
use crate::model::request::{GatewayRequest, ProxyResponse};
use crate::model::{RateLimitKey, RateLimitKeyKind};
use crate::prepare::filter_response_headers;
use crate::ratelimit::resolve_effective_limit;

use super::{current_millis, resolve_client_ip, resolve_route, PipelineContext};

/// Runs the full HTTP state machine for one inbound request.
pub struct HttpPipeline {
    ctx: Arc<PipelineContext>,
}

impl HttpPipeline {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        HttpPipeline { ctx }
    }

    pub async fn handle(&self, request: &GatewayRequest, peer_addr: Option<IpAddr>) -> Result<ProxyResponse, GatewayError> {
        let start = Instant::now();
        let result = self.run(request, peer_addr).await;

        if let Err(err) = &result {
            if let Some(metrics) = &self.ctx.metrics {
                metrics.incr_errors_total(err.kind());
                if matches!(err, GatewayError::Unauthorized { .. }) {
                    metrics.incr_auth_failures(err.kind());
                }
            }
            warn!("request failed after {:?}: {err}", start.elapsed());
        }

        result
    }

    async fn run(&self, request: &GatewayRequest, peer_addr: Option<IpAddr>) -> Result<ProxyResponse, GatewayError> {
        // ENTRY: enforce size limits before any further work.
        self.check_limits(request)?;

        let client_ip = resolve_client_ip(peer_addr, request.header("x-forwarded-for"), &self.ctx.trusted_proxy);
        let client_id = client_ip.map(|ip| ip.to_string()).unwrap_or_else(|| "unknown".to_string());

        // RESOLVE_ROUTE
        let route = resolve_route(&self.ctx.registry, &request.path, request.method.as_str()).await?;
        let service_id = route.service.service_id.clone();

        // RATE_LIMIT
        let mut rate_limit_headers = Vec::new();
        if self.ctx.rate_limiting_enabled {
            let limit = resolve_effective_limit(&route.endpoint, &route.service, &self.ctx.http_rate_limit_defaults);
            let key = RateLimitKey {
                kind: RateLimitKeyKind::Http,
                service_id: service_id.clone(),
                endpoint_id: Some(route.endpoint.id.clone()),
                client_id: client_id.clone(),
                ws_connection_id: None,
            };
            let decision = self.ctx.rate_limit_backend.check_and_consume(&key, &limit, current_millis()).await;

            if self.ctx.rate_limit_headers_enabled {
                rate_limit_headers.push(("X-RateLimit-Limit".to_string(), decision.limit.to_string()));
                rate_limit_headers.push(("X-RateLimit-Remaining".to_string(), decision.remaining.to_string()));
                rate_limit_headers.push(("X-RateLimit-Reset".to_string(), (decision.reset_at_millis / 1000).to_string()));
            }

            if !decision.allowed {
                if let Some(metrics) = &self.ctx.metrics {
                    metrics.incr_rate_limit_exceeded(&service_id);
                }
                return Err(GatewayError::RateLimited {
                    key: key.to_string(),
                    retry_after_seconds: decision.retry_after_seconds,
                    limit: decision.limit,
                    window_seconds: decision.window_seconds,
                    reset_at_millis: decision.reset_at_millis,
                    include_headers: self.ctx.rate_limit_headers_enabled,
                });
            }
        }

        // AUTHENTICATE
        let header_pairs: Vec<(&str, &str)> = request.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let cookie_header = request.header("cookie");
        let source_domain = request.header("host");
        let auth_result = self
            .ctx
            .auth
            .evaluate(&route, header_pairs.into_iter(), cookie_header, client_ip, source_domain)
            .await;

        let downstream_token = match auth_result {
            AuthResult::NotRequired { downstream_token } => downstream_token,
            AuthResult::Authenticated { downstream_token, .. } => Some(downstream_token),
            AuthResult::Unauthorized { reason } => {
                if let Some(security) = &self.ctx.security {
                    security.record_auth_failure(&client_id, &reason);
                }
                return Err(GatewayError::Unauthorized { reason });
            }
            AuthResult::Forbidden { reason } => {
                if let Some(security) = &self.ctx.security {
                    security.record_access_denied(&client_id, &service_id);
                }
                return Err(GatewayError::Forbidden { reason });
            }
            AuthResult::BadRequest { reason } => return Err(GatewayError::BadRequest { reason }),
        };

        // PREPARE
        let mut prepared = self.ctx.preparer.prepare(request, &route, client_ip, downstream_token.as_deref())?;

        // DISPATCH
        let upstream = url::Url::parse(&prepared.target_uri).ok();
        let span = self.ctx.tracer.as_ref().map(|tracer| {
            let mut span = tracer.start_client_span("gateway.dispatch");
            span.set_attribute("http.method", request.method.as_str());
            span.set_attribute("http.url", &prepared.target_uri);
            if let Some(uri) = &upstream {
                if let Some(host) = uri.host_str() {
                    span.set_attribute("net.peer.name", host);
                }
                if let Some(port) = uri.port_or_known_default() {
                    span.set_attribute("net.peer.port", &port.to_string());
                }
            }
            span
        });

        // Trace context propagation (§4.8): the tracer's own traceparent, if
        // it generates one, takes precedence over whatever the inbound
        // request carried (already passed through by the hop-by-hop filter).
        if let Some(traceparent) = span.as_ref().and_then(|s| s.traceparent()) {
            prepared.headers.retain(|(name, _)| !name.eq_ignore_ascii_case("traceparent"));
            prepared.headers.push(("traceparent".to_string(), traceparent));
        }

        let dispatch_start = Instant::now();
        let dispatch_result = self.ctx.transport.dispatch(&prepared).await;
        let dispatch_elapsed_ms = dispatch_start.elapsed().as_secs_f64() * 1000.0;

        if let Some(mut span) = span {
            match &dispatch_result {
                Ok(response) => span.set_attribute("http.status_code", &response.status_code.to_string()),
                Err(err) => span.record_error(&err.to_string()),
            }
            span.end();
        }

        if let Some(metrics) = &self.ctx.metrics {
            metrics.observe_upstream_latency_ms(&service_id, dispatch_elapsed_ms);
            if matches!(&dispatch_result, Err(GatewayError::GatewayTimeout { .. })) {
                let host = upstream.as_ref().and_then(|u| u.host_str()).unwrap_or(&service_id);
                metrics.incr_proxy_timeout(host, "request");
            }
        }

        let mut response = dispatch_result?;

        // RESPOND
        response.headers = filter_response_headers(&response.headers);
        response.headers.extend(rate_limit_headers);

        if let Some(metrics) = &self.ctx.metrics {
            metrics.incr_requests_total(&service_id, response.status_code);
            metrics.observe_request_bytes(&service_id, request.body.len() as u64);
            metrics.observe_response_bytes(&service_id, response.body.len() as u64);
        }
        if let Some(traffic) = &self.ctx.traffic {
            traffic.record(&service_id, request.body.len() as u64, response.body.len() as u64, dispatch_elapsed_ms);
        }

        Ok(response)
    }

    fn check_limits(&self, request: &GatewayRequest) -> Result<(), GatewayError> {
        let limits = &self.ctx.limits;
        if request.body.len() > limits.max_body_size {
            return Err(GatewayError::PayloadTooLarge {
                size: request.body.len(),
                limit: limits.max_body_size,
            });
        }

        let mut total_header_bytes = 0usize;
        for (name, value) in &request.headers {
            let header_len = name.len() + value.len();
            if header_len > limits.max_header_size {
                return Err(GatewayError::HeaderTooLarge { which: name.clone() });
            }
            total_header_bytes += header_len;
        }
        if total_header_bytes > limits.max_total_headers_size {
            return Err(GatewayError::HeaderTooLarge {
                which: "total".to_string(),
            });
        }

        Ok(())
    }
}
