//! Outbound WebSocket dialing (§4.7).
//!
//! Grounded on the teacher's `WebSocketHandler::build_backend_url`
//! (http/https → ws/wss scheme mapping) and its use of `connect_async` to
//! reach the backend, generalized to build the URL from a `Service`'s
//! `base_url` plus a matched path instead of a `host`/`port` pair.

use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::{HeaderValue, Request};
use tokio_tungstenite::tungstenite::protocol::Message as TungsteniteMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::GatewayError;

use super::http::classify_failure;

pub type BackendWsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
pub use TungsteniteMessage as BackendMessage;

/// Rewrites a service's `http(s)://` base URL into its `ws(s)://` equivalent
/// and appends the resolved backend path (§4.7 step "dial backend").
pub fn build_backend_url(base_url: &str, path: &str) -> String {
    let ws_scheme = if base_url.starts_with("https://") || base_url.starts_with("wss://") {
        "wss://"
    } else {
        "ws://"
    };

    let without_scheme = base_url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("wss://")
        .trim_start_matches("ws://")
        .trim_end_matches('/');

    let path = if path.starts_with('/') { path.to_string() } else { format!("/{path}") };

    format!("{ws_scheme}{without_scheme}{path}")
}

/// Dials the backend WebSocket endpoint. Per §4.7's corrected ordering, this
/// runs *before* the client's own upgrade completes — the gateway doesn't
/// commit to a client upgrade for a backend that never answers.
///
/// When `downstream_token` is set (the request was authenticated, §4.3 step 5),
/// it is forwarded to the backend as `Authorization: Bearer <token>` so an
/// authenticated WS backend sees the same credential an authenticated HTTP
/// backend would (§4.7 "propagate the same downstream Authorization if
/// authenticated").
pub async fn dial_backend(backend_url: &str, downstream_token: Option<&str>) -> Result<BackendWsStream, GatewayError> {
    let request = build_backend_request(backend_url, downstream_token).map_err(|err| bad_gateway(backend_url, &err))?;

    match connect_async(request).await {
        Ok((stream, _response)) => Ok(stream),
        Err(err) => Err(bad_gateway(backend_url, &err)),
    }
}

fn build_backend_request(backend_url: &str, downstream_token: Option<&str>) -> Result<Request<()>, String> {
    let mut request = backend_url.into_client_request().map_err(|err| err.to_string())?;
    if let Some(token) = downstream_token {
        let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|err| err.to_string())?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    Ok(request)
}

fn bad_gateway(backend_url: &str, err: &dyn std::fmt::Display) -> GatewayError {
    GatewayError::BadGateway {
        message: err.to_string(),
        classification: classify_failure(&err.to_string()).to_string(),
        url: backend_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_http_to_ws() {
        assert_eq!(build_backend_url("http://orders:8080", "/v1/stream"), "ws://orders:8080/v1/stream");
    }

    #[test]
    fn maps_https_to_wss() {
        assert_eq!(build_backend_url("https://orders:8443/", "/v1/stream"), "wss://orders:8443/v1/stream");
    }

    #[test]
    fn preserves_already_ws_scheme() {
        assert_eq!(build_backend_url("ws://orders:8080", "stream"), "ws://orders:8080/stream");
    }

    #[test]
    fn request_without_token_carries_no_authorization_header() {
        let request = build_backend_request("ws://orders:8080/v1/stream", None).unwrap();
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn request_with_token_carries_bearer_authorization_header() {
        let request = build_backend_request("ws://orders:8080/v1/stream", Some("the-jws")).unwrap();
        assert_eq!(request.headers().get(AUTHORIZATION).unwrap(), "Bearer the-jws");
    }
}
