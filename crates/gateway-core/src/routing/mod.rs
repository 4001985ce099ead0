//! Path matching and the service registry (§4.1, §4.2).

pub mod path_matcher;
pub mod registry;

pub use path_matcher::{method_matches, CompiledPattern, PatternError};
pub use registry::ServiceRegistry;

use std::collections::HashSet;

use crate::model::service::{Endpoint, EndpointType};

/// The synthetic endpoint used for a pass-through match: any method, HTTP
/// type, no path rewrite (the remaining path is forwarded verbatim), no
/// per-endpoint overrides — those instead come from the service itself.
pub fn pass_through_endpoint() -> Endpoint {
    Endpoint {
        id: "__pass_through__".to_string(),
        path: "/**".to_string(),
        methods: HashSet::from(["*".to_string()]),
        endpoint_type: EndpointType::Http,
        visibility: None,
        auth_required: None,
        path_rewrite: None,
        required_permissions: vec![],
        access: None,
        rate_limit: None,
        sampling: None,
        audience: None,
    }
}
