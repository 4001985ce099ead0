//! The WebSocket gateway pipeline (§4.7):
//! `RECEIVE_UPGRADE → RESOLVE → AUTHZ → CAPACITY → DIAL_BACKEND → UPGRADE_CLIENT → RUNNING → CLOSING`.
//!
//! Grounded on the teacher's `WebSocketHandler::handle_websocket` for the
//! `actix_ws::handle` + `connect_async` + twin `actix_rt::spawn` relay-task
//! shape and its tungstenite-to-actix_ws `CloseCode` mapping, but reordered:
//! the teacher upgrades the client first and only then dials the backend.
//! Per spec §4.7 ("dial-backend-first"), this pipeline dials the backend
//! first and only upgrades the client once the backend answers, so a dead
//! backend never leaves a client socket open with nothing behind it.

use std::net::IpAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::{CloseCode as ActixCloseCode, CloseReason, Message as ActixMessage};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc::unbounded_channel;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as TungsteniteCloseCode;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;

use crate::auth::AuthResult;
use crate::error::GatewayError;
use crate::model::service::EndpointType;
use crate::model::{CloseIntent, RateLimitKey, RateLimitKeyKind, WebSocketProxySession};
use crate::ratelimit::resolve_effective_limit;
use crate::transport::ws::{build_backend_url, dial_backend};

use super::{current_millis, resolve_client_ip, resolve_route, PipelineContext};

pub struct WsPipeline {
    ctx: Arc<PipelineContext>,
}

impl WsPipeline {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        WsPipeline { ctx }
    }

    pub async fn handle_upgrade(&self, req: HttpRequest, payload: web::Payload, peer_addr: Option<IpAddr>) -> Result<HttpResponse, GatewayError> {
        // RESOLVE
        let route = resolve_route(&self.ctx.registry, req.path(), req.method().as_str()).await?;
        if route.endpoint.endpoint_type != EndpointType::Websocket {
            return Err(GatewayError::NotWebSocket { path: req.path().to_string() });
        }

        let client_ip = resolve_client_ip(
            peer_addr,
            req.headers().get("x-forwarded-for").and_then(|v| v.to_str().ok()),
            &self.ctx.trusted_proxy,
        );
        let client_id = client_ip.map(|ip| ip.to_string()).unwrap_or_else(|| "unknown".to_string());

        // AUTHZ
        let header_pairs: Vec<(&str, &str)> = req
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
            .collect();
        let cookie_header = req.headers().get("cookie").and_then(|v| v.to_str().ok());
        let source_domain = req.headers().get("host").and_then(|v| v.to_str().ok());
        let auth_result = self
            .ctx
            .auth
            .evaluate(&route, header_pairs.into_iter(), cookie_header, client_ip, source_domain)
            .await;

        let (downstream_token, auth_session_id, user_id) = match auth_result {
            AuthResult::NotRequired { downstream_token } => (downstream_token, None, None),
            AuthResult::Authenticated {
                downstream_token,
                auth_session_id,
                subject,
            } => (Some(downstream_token), auth_session_id, Some(subject)),
            AuthResult::Unauthorized { reason } => {
                if let Some(security) = &self.ctx.security {
                    security.record_auth_failure(&client_id, &reason);
                }
                return Err(GatewayError::Unauthorized { reason });
            }
            AuthResult::Forbidden { reason } => {
                if let Some(security) = &self.ctx.security {
                    security.record_access_denied(&client_id, &route.service.service_id);
                }
                return Err(GatewayError::Forbidden { reason });
            }
            AuthResult::BadRequest { reason } => return Err(GatewayError::BadRequest { reason }),
        };

        // connection-level rate limit, evaluated alongside capacity
        if self.ctx.ws_connection_rate_limit_enabled {
            let limit = resolve_effective_limit(&route.endpoint, &route.service, &self.ctx.ws_connection_rate_limit_defaults);
            let key = RateLimitKey {
                kind: RateLimitKeyKind::WsConn,
                service_id: route.service.service_id.clone(),
                endpoint_id: Some(route.endpoint.id.clone()),
                client_id: client_id.clone(),
                ws_connection_id: None,
            };
            let decision = self.ctx.rate_limit_backend.check_and_consume(&key, &limit, current_millis()).await;
            if !decision.allowed {
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

        // CAPACITY
        let current = self.ctx.session_table.len();
        if current >= self.ctx.websocket.max_connections {
            return Err(GatewayError::AtCapacity {
                current,
                max: self.ctx.websocket.max_connections,
            });
        }

        // DIAL_BACKEND — propagate the same downstream Authorization the HTTP
        // pipeline would send, if this request authenticated (§4.7).
        let backend_url = build_backend_url(&route.service.base_url, &route.matched_path_on_service);
        let mut backend_stream = dial_backend(&backend_url, downstream_token.as_deref()).await?;

        // UPGRADE_CLIENT — only after the backend accepted the dial. Per §4.7,
        // a failure here must not leave the dialed backend socket dangling: it
        // gets a 1001 close before we report the upgrade failure.
        let (response, client_session, client_msg_stream) = match actix_ws::handle(&req, payload) {
            Ok(upgrade) => upgrade,
            Err(err) => {
                let _ = backend_stream
                    .send(tokio_tungstenite::tungstenite::Message::Close(Some(tokio_tungstenite::tungstenite::protocol::CloseFrame {
                        code: tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::Away,
                        reason: "client upgrade failed".into(),
                    })))
                    .await;
                return Err(GatewayError::Internal {
                    message: format!("websocket upgrade failed: {err}"),
                });
            }
        };

        info!("websocket session established: service={} backend={}", route.service.service_id, backend_url);

        let session_id = uuid::Uuid::new_v4().to_string();
        let (close_tx, close_rx) = unbounded_channel::<CloseIntent>();
        let now = current_millis() as i64;
        let session = Arc::new(WebSocketProxySession {
            session_id: session_id.clone(),
            service_id: route.service.service_id.clone(),
            auth_session_id,
            user_id,
            created_at_millis: now,
            last_activity_millis: AtomicI64::new(now),
            max_lifetime_deadline_millis: now + (self.ctx.websocket.max_lifetime_seconds as i64) * 1000,
            close_sender: close_tx,
        });
        self.ctx.session_table.insert(session.clone());

        spawn_relay(
            self.ctx.clone(),
            route.service.service_id.clone(),
            route.endpoint.id.clone(),
            session,
            close_rx,
            client_session,
            client_msg_stream,
            backend_stream,
        );

        Ok(response)
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_relay(
    ctx: Arc<PipelineContext>,
    service_id: String,
    endpoint_id: String,
    session: Arc<WebSocketProxySession>,
    mut close_rx: tokio::sync::mpsc::UnboundedReceiver<CloseIntent>,
    mut client_session: actix_ws::Session,
    mut client_msg_stream: actix_ws::MessageStream,
    backend_stream: crate::transport::ws::BackendWsStream,
) {
    let (mut backend_write, mut backend_read) = backend_stream.split();
    let session_id = session.session_id.clone();

    let idle_timeout_millis = (ctx.websocket.idle_timeout_seconds as i64) * 1000;

    // client -> backend
    {
        let ctx = ctx.clone();
        let session = session.clone();
        let service_id = service_id.clone();
        let endpoint_id = endpoint_id.clone();
        let session_id = session_id.clone();
        actix_web::rt::spawn(async move {
            while let Some(Ok(msg)) = client_msg_stream.next().await {
                session.touch(current_millis() as i64);

                if ctx.ws_message_rate_limit_enabled {
                    // Per-message limiting uses the platform default directly rather than
                    // endpoint/service overrides: by the time a message arrives, the
                    // `Endpoint`/`Service` values used to resolve an override are no longer
                    // in scope (only their ids survive into the relay task).
                    let limit = crate::model::EffectiveRateLimit {
                        requests_per_window: ctx.ws_message_rate_limit_defaults.requests_per_window,
                        window_seconds: ctx.ws_message_rate_limit_defaults.window_seconds,
                        burst_capacity: ctx.ws_message_rate_limit_defaults.burst_capacity,
                    };
                    let key = RateLimitKey {
                        kind: RateLimitKeyKind::WsMsg,
                        service_id: service_id.clone(),
                        endpoint_id: Some(endpoint_id.clone()),
                        client_id: session_id.clone(),
                        ws_connection_id: Some(session_id.clone()),
                    };
                    let decision = ctx.rate_limit_backend.check_and_consume(&key, &limit, current_millis()).await;
                    if !decision.allowed {
                        // §4.5/§7: on message-bucket rejection the session closes with
                        // code 1008, not a silently dropped frame.
                        debug!("closing {session_id}: message rate exceeded");
                        let _ = session.close_sender.send(CloseIntent {
                            code: 1008,
                            reason: "message rate limit exceeded".to_string(),
                        });
                        let _ = backend_write.close().await;
                        break;
                    }
                }

                let backend_msg = match msg {
                    ActixMessage::Text(text) => TungsteniteMessage::Text(text.to_string()),
                    ActixMessage::Binary(bin) => TungsteniteMessage::Binary(bin.to_vec()),
                    ActixMessage::Ping(bytes) => TungsteniteMessage::Ping(bytes.to_vec()),
                    ActixMessage::Pong(bytes) => TungsteniteMessage::Pong(bytes.to_vec()),
                    ActixMessage::Close(reason) => {
                        debug!("client closed {session_id}: {reason:?}");
                        let _ = backend_write.close().await;
                        break;
                    }
                    _ => continue,
                };

                if let Err(err) = backend_write.send(backend_msg).await {
                    warn!("failed to forward message to backend for {session_id}: {err}");
                    break;
                }
            }
        });
    }

    // backend -> client, plus idle/lifetime timers and cross-task close intents
    {
        let ctx = ctx.clone();
        let session = session.clone();
        actix_web::rt::spawn(async move {
            let mut idle_check = tokio::time::interval(std::time::Duration::from_secs(10));
            loop {
                tokio::select! {
                    maybe_msg = backend_read.next() => {
                        let Some(msg_result) = maybe_msg else { break };
                        session.touch(current_millis() as i64);
                        match msg_result {
                            Ok(TungsteniteMessage::Text(text)) => {
                                if client_session.text(text).await.is_err() { break; }
                            }
                            Ok(TungsteniteMessage::Binary(bin)) => {
                                if client_session.binary(bin).await.is_err() { break; }
                            }
                            Ok(TungsteniteMessage::Ping(bytes)) => {
                                if client_session.ping(&bytes).await.is_err() { break; }
                            }
                            Ok(TungsteniteMessage::Pong(bytes)) => {
                                if client_session.pong(&bytes).await.is_err() { break; }
                            }
                            Ok(TungsteniteMessage::Close(reason)) => {
                                let _ = client_session.close(reason.map(map_close_reason)).await;
                                break;
                            }
                            Ok(_) => continue,
                            Err(err) => {
                                warn!("error receiving from backend for {}: {err}", session.session_id);
                                let _ = client_session.close(Some(CloseReason { code: ActixCloseCode::Error, description: Some(err.to_string()) })).await;
                                break;
                            }
                        }
                    }
                    intent = close_rx.recv() => {
                        let Some(intent) = intent else { break };
                        let _ = client_session.close(Some(CloseReason { code: close_code_from_u16(intent.code), description: Some(intent.reason) })).await;
                        break;
                    }
                    _ = idle_check.tick() => {
                        let now = current_millis() as i64;
                        if session.idle_for_millis(now) >= idle_timeout_millis {
                            let _ = client_session.close(Some(CloseReason { code: ActixCloseCode::Normal, description: Some("idle timeout".to_string()) })).await;
                            break;
                        }
                        if session.past_max_lifetime(now) {
                            let _ = client_session.close(Some(CloseReason { code: ActixCloseCode::Normal, description: Some("max lifetime exceeded".to_string()) })).await;
                            break;
                        }
                    }
                }
            }

            ctx.session_table.remove(&session.session_id);
            ctx.rate_limit_backend.remove_keys_matching(&session.session_id).await;
            debug!("websocket session {} closed and cleaned up", session.session_id);
        });
    }
}

fn map_close_reason(reason: tokio_tungstenite::tungstenite::protocol::CloseFrame) -> CloseReason {
    CloseReason {
        code: map_close_code(reason.code),
        description: Some(reason.reason.to_string()),
    }
}

fn map_close_code(code: TungsteniteCloseCode) -> ActixCloseCode {
    match code {
        TungsteniteCloseCode::Normal => ActixCloseCode::Normal,
        TungsteniteCloseCode::Away => ActixCloseCode::Away,
        TungsteniteCloseCode::Protocol => ActixCloseCode::Protocol,
        TungsteniteCloseCode::Unsupported => ActixCloseCode::Unsupported,
        TungsteniteCloseCode::Abnormal => ActixCloseCode::Abnormal,
        TungsteniteCloseCode::Invalid => ActixCloseCode::Invalid,
        TungsteniteCloseCode::Policy => ActixCloseCode::Policy,
        TungsteniteCloseCode::Size => ActixCloseCode::Size,
        TungsteniteCloseCode::Extension => ActixCloseCode::Extension,
        TungsteniteCloseCode::Error => ActixCloseCode::Error,
        TungsteniteCloseCode::Restart => ActixCloseCode::Restart,
        TungsteniteCloseCode::Again => ActixCloseCode::Again,
        _ => ActixCloseCode::Error,
    }
}

fn close_code_from_u16(code: u16) -> ActixCloseCode {
    match code {
        1000 => ActixCloseCode::Normal,
        1001 => ActixCloseCode::Away,
        1008 => ActixCloseCode::Policy,
        _ => ActixCloseCode::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_code_from_u16_maps_logout_and_policy_codes() {
        assert_eq!(close_code_from_u16(1000), ActixCloseCode::Normal);
        assert_eq!(close_code_from_u16(1001), ActixCloseCode::Away);
        assert_eq!(close_code_from_u16(1008), ActixCloseCode::Policy);
        assert_eq!(close_code_from_u16(4000), ActixCloseCode::Error);
    }

    #[test]
    fn map_close_code_passes_through_known_tungstenite_codes() {
        assert_eq!(map_close_code(TungsteniteCloseCode::Normal), ActixCloseCode::Normal);
        assert_eq!(map_close_code(TungsteniteCloseCode::Policy), ActixCloseCode::Policy);
        assert_eq!(map_close_code(TungsteniteCloseCode::Size), ActixCloseCode::Size);
    }

    #[test]
    fn map_close_reason_carries_the_description_through() {
        let frame = tokio_tungstenite::tungstenite::protocol::CloseFrame {
            code: TungsteniteCloseCode::Away,
            reason: "backend went away".into(),
        };
        let reason = map_close_reason(frame);
        assert_eq!(reason.code, ActixCloseCode::Away);
        assert_eq!(reason.description.as_deref(), Some("backend went away"));
    }
}
