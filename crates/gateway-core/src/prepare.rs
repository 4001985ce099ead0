//! Request preparation (§2 component 7, §4.4): builds the outbound
//! `PreparedProxyRequest` from a matched route and the inbound request —
//! hop-by-hop header filtering, Host rewrite, forwarding headers, `Via`, and
//! downstream-token injection — and filters the response on the way back.
//!
//! Grounded on the teacher's `services::http::RouteHandler::build_headers_optimized`
//! (skips `host`/`connection`/`upgrade`/`proxy-connection`, sets a default
//! `User-Agent`), generalized to the full hop-by-hop set and the RFC 7239
//! forwarding builder instead of a hardcoded skip-list.

use std::net::IpAddr;

use url::Url;

use crate::error::GatewayError;
use crate::model::request::{GatewayRequest, PreparedProxyRequest};
use crate::model::route_match::RouteMatch;
use crate::net::{ForwardedBuilder, ForwardedHop};

/// Headers that apply to a single transport hop and must never be forwarded
/// (RFC 7230 §6.1, §4.4). Compared case-insensitively.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const GATEWAY_VIA_TOKEN: &str = "Aussie";

pub struct RequestPreparer {
    forwarded: ForwardedBuilder,
    gateway_host: String,
}

impl RequestPreparer {
    pub fn new(use_rfc7239: bool, gateway_host: impl Into<String>) -> Self {
        RequestPreparer {
            forwarded: ForwardedBuilder::new(use_rfc7239),
            gateway_host: gateway_host.into(),
        }
    }

    pub fn prepare(
        &self,
        request: &GatewayRequest,
        route: &RouteMatch,
        client_ip: Option<IpAddr>,
        downstream_token: Option<&str>,
    ) -> Result<PreparedProxyRequest, GatewayError> {
        let target_uri = self.build_target_uri(request, route)?;
        let parsed = Url::parse(&target_uri).map_err(|err| GatewayError::Internal {
            message: format!("invalid target uri {target_uri}: {err}"),
        })?;

        let mut headers = filter_hop_by_hop(&request.headers);

        headers.push(("Host".to_string(), host_header_value(&parsed)));

        let existing_forwarded = request.header("forwarded").map(str::to_string);
        let existing_xff = request.header("x-forwarded-for").map(str::to_string);
        let hop = ForwardedHop {
            for_addr: client_ip.map(|ip| ip.to_string()),
            proto: Some(parsed.scheme().to_string()),
            host: request.header("host").map(str::to_string),
        };
        headers.extend(self.forwarded.build(&hop, existing_forwarded.as_deref(), existing_xff.as_deref()));

        let via_value = match request.header("via") {
            Some(prev) if !prev.is_empty() => format!("{prev}, 1.1 {} ({GATEWAY_VIA_TOKEN})", self.gateway_host),
            _ => format!("1.1 {} ({GATEWAY_VIA_TOKEN})", self.gateway_host),
        };
        headers.push(("Via".to_string(), via_value));

        if let Some(token) = downstream_token {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }

        Ok(PreparedProxyRequest {
            method: request.method.clone(),
            target_uri,
            headers,
            body: take_body(request),
        })
    }

    fn build_target_uri(&self, request: &GatewayRequest, route: &RouteMatch) -> Result<String, GatewayError> {
        let base = route.service.base_url.trim_end_matches('/');
        let path = match &route.endpoint.path_rewrite {
            Some(rewrite) => substitute_variables(rewrite, &route.path_variables),
            None => route.matched_path_on_service.clone(),
        };
        let path = if path.starts_with('/') { path } else { format!("/{path}") };

        let mut uri = format!("{base}{path}");
        if !request.query_string.is_empty() {
            uri.push('?');
            uri.push_str(&request.query_string);
        }
        Ok(uri)
    }
}

/// Substitutes `{name}` placeholders in a path-rewrite template with captured
/// path variables (§4.4, §8 scenario 2).
fn substitute_variables(template: &str, variables: &std::collections::HashMap<String, String>) -> String {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            let mut name = String::new();
            for inner in chars.by_ref() {
                if inner == '}' {
                    break;
                }
                name.push(inner);
            }
            match variables.get(&name) {
                Some(value) => result.push_str(value),
                None => {
                    result.push('{');
                    result.push_str(&name);
                    result.push('}');
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn filter_hop_by_hop(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| {
            let lower = name.to_ascii_lowercase();
            !HOP_BY_HOP_HEADERS.contains(&lower.as_str()) && lower != "host" && lower != "content-length"
        })
        .cloned()
        .collect()
}

fn host_header_value(uri: &Url) -> String {
    let host = uri.host_str().unwrap_or_default();
    match (uri.scheme(), uri.port()) {
        ("http", Some(80)) | ("https", Some(443)) | (_, None) => host.to_string(),
        (_, Some(port)) => format!("{host}:{port}"),
    }
}

/// Response post-filter: strips the same hop-by-hop set from upstream
/// response headers before they reach the client (§4.4).
pub fn filter_response_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    filter_hop_by_hop(headers)
}

fn take_body(request: &GatewayRequest) -> crate::model::request::RequestBody {
    match &request.body {
        crate::model::request::RequestBody::Buffered(bytes) => crate::model::request::RequestBody::Buffered(bytes.clone()),
        crate::model::request::RequestBody::Empty => crate::model::request::RequestBody::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_by_hop_headers_are_stripped() {
        let headers = vec![
            ("Connection".to_string(), "keep-alive".to_string()),
            ("X-Custom".to_string(), "value".to_string()),
            ("Upgrade".to_string(), "websocket".to_string()),
            ("Host".to_string(), "inbound.example.com".to_string()),
        ];
        let filtered = filter_hop_by_hop(&headers);
        assert_eq!(filtered, vec![("X-Custom".to_string(), "value".to_string())]);
    }

    #[test]
    fn substitutes_named_variables() {
        let mut vars = std::collections::HashMap::new();
        vars.insert("id".to_string(), "42".to_string());
        assert_eq!(substitute_variables("/users/{id}", &vars), "/users/42");
    }

    #[test]
    fn leaves_unknown_placeholders_untouched() {
        let vars = std::collections::HashMap::new();
        assert_eq!(substitute_variables("/users/{id}", &vars), "/users/{id}");
    }

    #[test]
    fn host_header_omits_default_ports() {
        let https = Url::parse("https://example.com:443/x").unwrap();
        assert_eq!(host_header_value(&https), "example.com");
        let custom = Url::parse("http://example.com:8080/x").unwrap();
        assert_eq!(host_header_value(&custom), "example.com:8080");
    }
}
