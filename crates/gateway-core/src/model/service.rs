//! Service and endpoint definitions: the registry's unit of configuration (§3).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::access::AccessConfig;

/// Default visibility for a service/endpoint that doesn't specify one (DESIGN.md
/// open-question resolution #1: default is PUBLIC, matching the teacher's
/// permissive-by-default route registration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Visibility {
    Public,
    Private,
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Public
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EndpointType {
    Http,
    Websocket,
}

/// Per-service or per-endpoint rate-limit override (§4.5 resolution order:
/// endpoint → service → platform default).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitOverride {
    pub requests_per_window: Option<u64>,
    pub window_seconds: Option<u64>,
    pub burst_capacity: Option<u64>,
}

/// Trace-sampling override; consumed by the `Tracer` port, not interpreted here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub sample_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    /// Glob pattern: literal segments, `{name}` captures, `*` and `**` wildcards.
    pub path: String,
    /// Method set; the literal `"*"` entry matches any method.
    pub methods: HashSet<String>,
    #[serde(rename = "type")]
    pub endpoint_type: EndpointType,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub auth_required: Option<bool>,
    #[serde(default)]
    pub path_rewrite: Option<String>,
    #[serde(default)]
    pub required_permissions: Vec<String>,
    #[serde(default)]
    pub access: Option<AccessConfig>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitOverride>,
    #[serde(default)]
    pub sampling: Option<SamplingConfig>,
    /// Per-endpoint downstream-token audience override (§4.3 step 5); falls
    /// back to the platform default / `requireAudience`'s `serviceId` when unset.
    #[serde(default)]
    pub audience: Option<String>,
}

impl Endpoint {
    pub fn matches_method(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == "*") || self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub service_id: String,
    pub display_name: String,
    pub base_url: String,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub access: Option<AccessConfig>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitOverride>,
    #[serde(default)]
    pub sampling: Option<SamplingConfig>,
    #[serde(default)]
    pub default_visibility: Visibility,
    #[serde(default)]
    pub default_auth_required: bool,
    #[serde(default)]
    pub route_prefix: Option<String>,
}

impl Service {
    pub fn effective_visibility(&self, endpoint: &Endpoint) -> Visibility {
        endpoint.visibility.unwrap_or(self.default_visibility)
    }

    pub fn effective_auth_required(&self, endpoint: &Endpoint) -> bool {
        endpoint.auth_required.unwrap_or(self.default_auth_required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_defaults_to_public() {
        assert_eq!(Visibility::default(), Visibility::Public);
    }

    #[test]
    fn endpoint_method_wildcard_matches_anything() {
        let endpoint = Endpoint {
            id: "e1".into(),
            path: "/x".into(),
            methods: ["*".to_string()].into_iter().collect(),
            endpoint_type: EndpointType::Http,
            visibility: None,
            auth_required: None,
            path_rewrite: None,
            required_permissions: vec![],
            access: None,
            rate_limit: None,
            sampling: None,
            audience: None,
        };
        assert!(endpoint.matches_method("DELETE"));
    }

    #[test]
    fn effective_visibility_falls_back_to_service_default() {
        let endpoint = Endpoint {
            id: "e1".into(),
            path: "/x".into(),
            methods: ["GET".to_string()].into_iter().collect(),
            endpoint_type: EndpointType::Http,
            visibility: None,
            auth_required: None,
            path_rewrite: None,
            required_permissions: vec![],
            access: None,
            rate_limit: None,
            sampling: None,
            audience: None,
        };
        let service = Service {
            service_id: "users".into(),
            display_name: "Users".into(),
            base_url: "http://u:3001".into(),
            endpoints: vec![],
            access: None,
            rate_limit: None,
            sampling: None,
            default_visibility: Visibility::Private,
            default_auth_required: true,
            route_prefix: None,
        };
        assert_eq!(service.effective_visibility(&endpoint), Visibility::Private);
        assert!(service.effective_auth_required(&endpoint));
    }
}
