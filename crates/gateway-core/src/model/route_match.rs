//! Result of resolving a request against the registry (§3 `RouteMatch`).

use std::collections::HashMap;

use super::service::{Endpoint, Service};

/// Created per request, lives for the duration of the pipeline. Carries the
/// matched service/endpoint plus the path the match was performed against
/// (useful in pass-through mode, where it differs from the full request path)
/// and any captured `{name}` path variables.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub service: Service,
    pub endpoint: Endpoint,
    pub matched_path_on_service: String,
    pub path_variables: HashMap<String, String>,
}

impl RouteMatch {
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.path_variables.get(name).map(String::as_str)
    }
}
