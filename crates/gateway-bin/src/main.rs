//! Aussie API Gateway server binary.
//!
//! Wires the `gateway-core` pipelines (routing, rate limiting, auth,
//! preparation, transport) to a concrete actix-web server: one catch-all
//! route that dispatches to either the HTTP or the WebSocket pipeline
//! depending on whether the request is an upgrade, plus the ambient health
//! and session-invalidation surfaces.

mod adapters;
mod health;

use std::net::IpAddr;
use std::sync::Arc;

use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use gateway_core::auth::{ApiKeyTokenValidator, AuthEvaluator, DownstreamTokenMinter, JwtTokenValidator, PermissionExpander, SessionTokenValidator};
use gateway_core::config::{load_settings, ConfigValidator, Settings};
use gateway_core::error::GatewayError;
use gateway_core::logs::configure_logger;
use gateway_core::model::request::{GatewayRequest, RequestBody};
use gateway_core::model::CloseIntent;
use gateway_core::net::TrustedProxyValidator;
use gateway_core::pipeline::{HttpPipeline, PipelineContext, WsPipeline};
use gateway_core::prepare::RequestPreparer;
use gateway_core::ratelimit::{InMemoryRateLimitBackend, PlatformRateLimitDefaults};
use gateway_core::routing::ServiceRegistry;
use gateway_core::session_table::SessionTable;
use gateway_core::transport::HttpTransport;
use log::{error, info, warn};
use serde::Deserialize;

use adapters::{
    AtomicMetrics, FlatRoleRepository, LoggingSecurityMonitoring, LoggingTrafficAttributing, NoApiKeyRepository, NoGroupRepository, NoSessionRepository,
    NoopTracer, StaticServiceRepository,
};

/// Builds the shared `PipelineContext` every inbound request's pipeline runs
/// against, wiring the concrete adapters (§1 external collaborators) behind
/// `gateway-core`'s ports.
fn build_context(settings: &Settings) -> Arc<PipelineContext> {
    let services_path = std::env::var("AUSSIE_SERVICES_PATH").unwrap_or_else(|_| "./services.json".to_string());
    let repository = Arc::new(StaticServiceRepository::from_file(&services_path));
    let registry = Arc::new(ServiceRegistry::new(
        repository,
        std::time::Duration::from_secs(settings.local_cache.ttl_seconds),
        settings.local_cache.max_entries,
    ));

    let rate_limit_backend = InMemoryRateLimitBackend::new();
    rate_limit_backend.spawn_cleanup(settings.rate_limiting.window_seconds);

    let jwt_secret = std::env::var("AUSSIE_JWT_SECRET").unwrap_or_else(|_| {
        warn!("AUSSIE_JWT_SECRET not set; falling back to a development-only secret. Do not use in production.");
        "development-only-secret-change-me".to_string()
    });
    let jwt_validator = JwtTokenValidator::new_hmac(&jwt_secret, &settings.auth.issuer, settings.auth.default_audience.as_deref(), 30);
    let session_validator = SessionTokenValidator::new(Arc::new(NoSessionRepository), 20);
    let api_key_validator = ApiKeyTokenValidator::new(Arc::new(NoApiKeyRepository), 10);

    let permissions = PermissionExpander::new(Arc::new(FlatRoleRepository), Arc::new(NoGroupRepository));
    let minter = DownstreamTokenMinter::new_hs256(
        &jwt_secret,
        settings.auth.downstream_token_ttl_seconds,
        settings.auth.default_audience.clone(),
        settings.auth.require_audience,
    );
    let validators: Vec<Arc<dyn gateway_core::ports::TokenValidator>> =
        vec![Arc::new(jwt_validator), Arc::new(session_validator), Arc::new(api_key_validator)];
    let auth = Arc::new(AuthEvaluator::new(validators, permissions, minter));

    let preparer = Arc::new(RequestPreparer::new(settings.forwarding.use_rfc7239, settings.gateway_host.clone()));
    let transport = Arc::new(HttpTransport::new(settings.http_client.connect_timeout_seconds, settings.http_client.request_timeout_seconds));
    let trusted_proxy = Arc::new(TrustedProxyValidator::new(settings.trusted_proxy.enabled, &settings.trusted_proxy.proxies));

    let http_defaults = PlatformRateLimitDefaults {
        requests_per_window: settings.rate_limiting.burst_capacity.max(1),
        window_seconds: settings.rate_limiting.window_seconds,
        burst_capacity: settings.rate_limiting.burst_capacity,
        max_requests_per_window: settings.rate_limiting.platform_max_requests_per_window,
        max_burst_capacity: settings.rate_limiting.platform_max_burst_capacity,
    };
    let ws_conn_defaults = PlatformRateLimitDefaults {
        requests_per_window: settings.rate_limiting.websocket_connection.requests_per_window,
        window_seconds: settings.rate_limiting.websocket_connection.window_seconds,
        burst_capacity: settings.rate_limiting.websocket_connection.burst_capacity,
        max_requests_per_window: settings.rate_limiting.platform_max_requests_per_window,
        max_burst_capacity: settings.rate_limiting.platform_max_burst_capacity,
    };
    let ws_msg_defaults = PlatformRateLimitDefaults {
        requests_per_window: settings.rate_limiting.websocket_message.requests_per_window,
        window_seconds: settings.rate_limiting.websocket_message.window_seconds,
        burst_capacity: settings.rate_limiting.websocket_message.burst_capacity,
        max_requests_per_window: settings.rate_limiting.platform_max_requests_per_window,
        max_burst_capacity: settings.rate_limiting.platform_max_burst_capacity,
    };

    Arc::new(PipelineContext {
        registry,
        rate_limit_backend,
        rate_limiting_enabled: settings.rate_limiting.enabled,
        rate_limit_headers_enabled: settings.rate_limiting.include_headers,
        http_rate_limit_defaults: http_defaults,
        ws_connection_rate_limit_defaults: ws_conn_defaults,
        ws_connection_rate_limit_enabled: settings.rate_limiting.websocket_connection.enabled,
        ws_message_rate_limit_defaults: ws_msg_defaults,
        ws_message_rate_limit_enabled: settings.rate_limiting.websocket_message.enabled,
        auth,
        preparer,
        transport,
        trusted_proxy,
        limits: settings.limits.clone(),
        websocket: settings.websocket.clone(),
        session_table: Arc::new(SessionTable::new()),
        metrics: Some(Arc::new(AtomicMetrics::default())),
        security: Some(Arc::new(LoggingSecurityMonitoring)),
        traffic: Some(Arc::new(LoggingTrafficAttributing)),
        tracer: Some(Arc::new(NoopTracer)),
    })
}

/// Buffers a raw request payload into `Bytes`. Only called on the non-upgrade
/// path — an upgrade request's `web::Payload` is handed to `actix_ws::handle`
/// untouched, since a stream can only be consumed once.
async fn buffer_payload(mut payload: web::Payload) -> Result<web::Bytes, GatewayError> {
    use bytes::BytesMut;
    use futures_util::StreamExt;

    let mut buffer = BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|err| GatewayError::BadRequest {
            reason: format!("failed to read request body: {err}"),
        })?;
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}

/// Converts an inbound actix-web request/body into the pipeline's immutable
/// `GatewayRequest` (§3).
fn to_gateway_request(req: &HttpRequest, body: web::Bytes) -> GatewayRequest {
    let headers = req
        .headers()
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect();

    GatewayRequest {
        method: req.method().clone(),
        path: req.path().to_string(),
        query_string: req.query_string().to_string(),
        headers,
        body: if body.is_empty() { RequestBody::Empty } else { RequestBody::Buffered(body) },
        peer_addr: req.peer_addr().map(|addr| addr.ip()),
    }
}

fn is_websocket_upgrade(req: &HttpRequest) -> bool {
    let has_upgrade_header = req
        .headers()
        .get("upgrade")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    let has_connection_upgrade = req
        .headers()
        .get("connection")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("upgrade"));
    has_upgrade_header && has_connection_upgrade
}

/// The single entry point for every inbound request under the registered
/// path space: dispatches to the WebSocket pipeline on upgrade requests and
/// to the HTTP pipeline otherwise (§2 data flow).
async fn gateway_entry(
    req: HttpRequest,
    payload: web::Payload,
    http_pipeline: web::Data<Arc<HttpPipeline>>,
    ws_pipeline: web::Data<Arc<WsPipeline>>,
) -> Result<HttpResponse, GatewayError> {
    let peer_addr: Option<IpAddr> = req.peer_addr().map(|addr| addr.ip());

    if is_websocket_upgrade(&req) {
        return ws_pipeline.handle_upgrade(req, payload, peer_addr).await;
    }

    let body = buffer_payload(payload).await?;
    let gateway_request = to_gateway_request(&req, body);
    let response = http_pipeline.handle(&gateway_request, peer_addr).await?;

    let mut builder = HttpResponse::build(
        actix_web::http::StatusCode::from_u16(response.status_code).unwrap_or(actix_web::http::StatusCode::OK),
    );
    for (name, value) in &response.headers {
        if let (Ok(name), Ok(value)) = (
            actix_web::http::header::HeaderName::try_from(name.as_str()),
            actix_web::http::header::HeaderValue::from_str(value),
        ) {
            builder.append_header((name, value));
        }
    }
    Ok(builder.body(response.body))
}

#[derive(Debug, Deserialize)]
struct InvalidateSessionRequest {
    user_id: Option<String>,
    auth_session_id: Option<String>,
    #[serde(default = "default_logout_reason")]
    reason: String,
}

fn default_logout_reason() -> String {
    "Session logged out".to_string()
}

/// The `SessionInvalidated(userId, authSessionId)` contract (§4.3, §4.7): an
/// external identity collaborator (out of scope per §1) calls this so the
/// gateway can close any live WebSocket sessions for that user/session with
/// close code 1000.
async fn invalidate_session(
    body: web::Json<InvalidateSessionRequest>,
    session_table: web::Data<Arc<SessionTable>>,
) -> HttpResponse {
    let signalled = session_table.invalidate(
        body.user_id.as_deref(),
        body.auth_session_id.as_deref(),
        CloseIntent { code: 1000, reason: body.reason.clone() },
    );
    HttpResponse::Ok().json(serde_json::json!({ "sessions_closed": signalled }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    configure_logger();

    let settings: Settings = load_settings().unwrap_or_else(|err| {
        warn!("failed to load settings ({err}); starting with defaults");
        Settings::default()
    });

    info!("starting aussie-gateway v{}", settings.version);

    let validation_result = ConfigValidator::validate_comprehensive(&settings);
    if !validation_result.is_valid {
        for err in &validation_result.errors {
            error!("configuration error: {err}");
        }
        std::process::exit(1);
    }
    for warning in &validation_result.warnings {
        warn!("configuration warning: {warning}");
    }

    let ctx = build_context(&settings);
    ctx.registry.load().await.unwrap_or_else(|err| {
        warn!("initial registry load failed, starting with an empty registry: {err}");
    });

    let http_pipeline = Arc::new(HttpPipeline::new(ctx.clone()));
    let ws_pipeline = Arc::new(WsPipeline::new(ctx.clone()));
    let session_table = ctx.session_table.clone();

    let host = settings.host.clone();
    let port = settings.port;

    info!("listening on {host}:{port}");

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(http_pipeline.clone()))
            .app_data(web::Data::new(ws_pipeline.clone()))
            .app_data(web::Data::new(session_table.clone()))
            .configure(health::configure_health)
            .route("/internal/session-invalidate", web::post().to(invalidate_session))
            .default_service(web::route().to(gateway_entry))
    })
    .bind((host.as_str(), port))?
    .run();

    let server_handle = server.handle();

    tokio::select! {
        result = server => {
            match result {
                Ok(_) => info!("server stopped"),
                Err(err) => error!("server error: {err}"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal, draining in-flight work");
            ctx.session_table.close_all(CloseIntent { code: 1001, reason: "server shutting down".to_string() });
            server_handle.stop(true).await;
        }
    }

    Ok(())
}
