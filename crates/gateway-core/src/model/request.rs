//! Wire-level request/response value types threaded through the pipeline (§3).

use actix_web::http::Method;
use bytes::Bytes;

/// Either a fully-buffered body (used for small JSON/API requests) or a byte
/// stream (used to preserve streaming on large/proxied bodies per §4.8).
pub enum RequestBody {
    Buffered(Bytes),
    Empty,
}

impl RequestBody {
    pub fn len(&self) -> usize {
        match self {
            RequestBody::Buffered(b) => b.len(),
            RequestBody::Empty => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable after entry into the pipeline (§3).
pub struct GatewayRequest {
    pub method: Method,
    pub path: String,
    pub query_string: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    pub peer_addr: Option<std::net::IpAddr>,
}

impl GatewayRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers_named(&self, name: &str) -> impl Iterator<Item = &str> {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The outbound request the transport will issue, post-preparation (§4.4).
pub struct PreparedProxyRequest {
    pub method: Method,
    pub target_uri: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

/// The response received from upstream, pre response-filter (§3).
pub struct ProxyResponse {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}
