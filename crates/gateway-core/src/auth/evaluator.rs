//! The authentication/authorization orchestrator (§4.3): runs the six-step
//! policy over a resolved route and the inbound request, producing a tagged
//! result the HTTP and WebSocket pipelines both consume.

use std::net::IpAddr;
use std::sync::Arc;

use crate::model::route_match::RouteMatch;
use crate::model::service::Visibility;

use super::credential::{extract_credential, Credential};
use super::mint::DownstreamTokenMinter;
use super::rbac::{has_required_permissions, PermissionExpander};
use crate::ports::{TokenValidator, ValidationOutcome};

/// Result of evaluating auth for one request (§4.3).
pub enum AuthResult {
    NotRequired {
        downstream_token: Option<String>,
    },
    Authenticated {
        downstream_token: String,
        /// Opaque session id the credential resolved through, if any (§4.3, §4.7).
        auth_session_id: Option<String>,
        subject: String,
    },
    Unauthorized { reason: String },
    Forbidden { reason: String },
    BadRequest { reason: String },
}

pub struct AuthEvaluator {
    /// Ordered highest-priority-first; the first non-`Skip` outcome wins (§4.3 step 3).
    validators: Vec<Arc<dyn TokenValidator>>,
    permissions: PermissionExpander,
    minter: DownstreamTokenMinter,
}

impl AuthEvaluator {
    pub fn new(mut validators: Vec<Arc<dyn TokenValidator>>, permissions: PermissionExpander, minter: DownstreamTokenMinter) -> Self {
        validators.sort_by(|a, b| b.priority().cmp(&a.priority()));
        AuthEvaluator { validators, permissions, minter }
    }

    pub async fn evaluate<'a>(
        &self,
        route: &RouteMatch,
        headers: impl Iterator<Item = (&'a str, &'a str)>,
        cookie_header: Option<&str>,
        source_ip: Option<IpAddr>,
        source_domain: Option<&str>,
    ) -> AuthResult {
        let auth_required = route.service.effective_auth_required(&route.endpoint);

        let (subject, roles, groups, auth_session_id) = if !auth_required {
            (None, vec![], vec![], None)
        } else {
            let credential = match extract_credential(headers, cookie_header) {
                Some(c) => c,
                None => {
                    return AuthResult::Unauthorized {
                        reason: "no credential presented".to_string(),
                    }
                }
            };
            let raw = credential_value(&credential);

            match self.validate(raw).await {
                Ok((subject, roles, groups, session_id)) => (Some(subject), roles, groups, session_id),
                Err(result) => return result,
            }
        };

        let granted = match self.permissions.expand(&roles, &groups).await {
            Ok(set) => set,
            Err(err) => {
                return AuthResult::Forbidden {
                    reason: format!("permission expansion failed: {err}"),
                }
            }
        };

        if !has_required_permissions(&granted, &route.endpoint.required_permissions) {
            return AuthResult::Forbidden {
                reason: "missing required permission".to_string(),
            };
        }

        if route.service.effective_visibility(&route.endpoint) == Visibility::Private {
            let access = route.endpoint.access.as_ref().or(route.service.access.as_ref());
            if let Some(access) = access {
                if !access.allows(source_ip, source_domain) {
                    return AuthResult::Forbidden {
                        reason: "source not in access allowlist".to_string(),
                    };
                }
            }
        }

        let permissions: Vec<String> = granted.into_iter().collect();

        let endpoint_audience = route.endpoint.audience.as_deref();
        let mint_result = self.minter.mint(
            subject.as_deref().unwrap_or("anonymous"),
            &route.service.service_id,
            endpoint_audience,
            permissions,
        );

        match mint_result {
            Ok(token) if auth_required => AuthResult::Authenticated {
                downstream_token: token,
                auth_session_id,
                subject: subject.unwrap_or_else(|| "anonymous".to_string()),
            },
            Ok(token) => AuthResult::NotRequired {
                downstream_token: Some(token),
            },
            Err(err) => AuthResult::BadRequest {
                reason: format!("failed to mint downstream token: {err}"),
            },
        }
    }

    async fn validate(&self, credential: &str) -> Result<(String, Vec<String>, Vec<String>, Option<String>), AuthResult> {
        for validator in &self.validators {
            match validator.validate(credential).await {
                ValidationOutcome::Skip => continue,
                ValidationOutcome::Valid { subject, roles, groups, session_id } => return Ok((subject, roles, groups, session_id)),
                ValidationOutcome::Invalid { reason } => return Err(AuthResult::Unauthorized { reason }),
            }
        }
        Err(AuthResult::Unauthorized {
            reason: "no provider recognized the credential".to_string(),
        })
    }
}

fn credential_value(credential: &Credential) -> &str {
    match credential {
        Credential::SessionCookie(v) => v,
        Credential::BearerToken(v) => v,
        Credential::ApiKey(v) => v,
        Credential::ApiKeyId(v) => v,
        Credential::SessionHeader(v) => v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    use crate::model::service::{Endpoint, EndpointType, Service, Visibility};
    use crate::ports::{GroupRepository, RoleRepository};

    struct FixedValidator(i32, ValidationOutcome);

    #[async_trait]
    impl TokenValidator for FixedValidator {
        fn priority(&self) -> i32 {
            self.0
        }
        async fn validate(&self, _credential: &str) -> ValidationOutcome {
            clone_outcome(&self.1)
        }
    }

    fn clone_outcome(outcome: &ValidationOutcome) -> ValidationOutcome {
        match outcome {
            ValidationOutcome::Skip => ValidationOutcome::Skip,
            ValidationOutcome::Valid { subject, roles, groups, session_id } => ValidationOutcome::Valid {
                subject: subject.clone(),
                roles: roles.clone(),
                groups: groups.clone(),
                session_id: session_id.clone(),
            },
            ValidationOutcome::Invalid { reason } => ValidationOutcome::Invalid { reason: reason.clone() },
        }
    }

    struct FlatRoles;
    #[async_trait]
    impl RoleRepository for FlatRoles {
        async fn permissions_for_role(&self, role: &str) -> Result<Vec<String>, crate::error::GatewayError> {
            Ok(vec![role.to_string()])
        }
    }

    struct NoGroups;
    #[async_trait]
    impl GroupRepository for NoGroups {
        async fn roles_for_group(&self, _group: &str) -> Result<Vec<String>, crate::error::GatewayError> {
            Ok(vec![])
        }
    }

    fn evaluator_with(validator: ValidationOutcome) -> AuthEvaluator {
        let validators: Vec<Arc<dyn TokenValidator>> = vec![Arc::new(FixedValidator(10, validator))];
        let permissions = PermissionExpander::new(Arc::new(FlatRoles), Arc::new(NoGroups));
        let minter = DownstreamTokenMinter::new_hs256("test-secret-value-long-enough", 300, None, false);
        AuthEvaluator::new(validators, permissions, minter)
    }

    fn route(auth_required: bool, audience: Option<&str>) -> RouteMatch {
        let endpoint = Endpoint {
            id: "e1".into(),
            path: "/x".into(),
            methods: ["GET".to_string()].into_iter().collect(),
            endpoint_type: EndpointType::Http,
            visibility: None,
            auth_required: Some(auth_required),
            path_rewrite: None,
            required_permissions: vec![],
            access: None,
            rate_limit: None,
            sampling: None,
            audience: audience.map(str::to_string),
        };
        let service = Service {
            service_id: "users".into(),
            display_name: "Users".into(),
            base_url: "http://u:3001".into(),
            endpoints: vec![],
            access: None,
            rate_limit: None,
            sampling: None,
            default_visibility: Visibility::Public,
            default_auth_required: false,
            route_prefix: None,
        };
        RouteMatch {
            service,
            endpoint,
            matched_path_on_service: "/x".to_string(),
            path_variables: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn no_credential_on_required_route_is_unauthorized() {
        let eval = evaluator_with(ValidationOutcome::Skip);
        let route = route(true, None);
        let result = eval.evaluate(&route, std::iter::empty(), None, None, None).await;
        assert!(matches!(result, AuthResult::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn successful_session_auth_carries_session_id_onto_authenticated() {
        let eval = evaluator_with(ValidationOutcome::Valid {
            subject: "user-1".to_string(),
            roles: vec!["member".to_string()],
            groups: vec![],
            session_id: Some("sess-42".to_string()),
        });
        let route = route(true, None);
        let headers = vec![("Authorization", "Bearer some-jws")];
        let result = eval.evaluate(&route, headers.into_iter(), None, None, None).await;
        match result {
            AuthResult::Authenticated { subject, auth_session_id, .. } => {
                assert_eq!(subject, "user-1");
                assert_eq!(auth_session_id, Some("sess-42".to_string()));
            }
            _ => panic!("expected Authenticated"),
        }
    }

    #[tokio::test]
    async fn missing_required_permission_is_forbidden() {
        let mut route = route(true, None);
        route.endpoint.required_permissions = vec!["admin".to_string()];
        let eval = evaluator_with(ValidationOutcome::Valid {
            subject: "user-1".to_string(),
            roles: vec!["member".to_string()],
            groups: vec![],
            session_id: None,
        });
        let headers = vec![("Authorization", "Bearer some-jws")];
        let result = eval.evaluate(&route, headers.into_iter(), None, None, None).await;
        assert!(matches!(result, AuthResult::Forbidden { .. }));
    }

    #[tokio::test]
    async fn private_endpoint_denies_source_outside_allowlist() {
        let mut route = route(false, None);
        route.service.default_visibility = Visibility::Private;
        route.service.access = Some(crate::model::access::AccessConfig {
            allowed_ips: vec!["10.0.0.0/8".to_string()],
            allowed_domains: vec![],
            allowed_subdomains: vec![],
        });
        let eval = evaluator_with(ValidationOutcome::Skip);
        let source: IpAddr = "192.0.2.10".parse().unwrap();
        let result = eval.evaluate(&route, std::iter::empty(), None, Some(source), None).await;
        assert!(matches!(result, AuthResult::Forbidden { .. }));
    }

    #[tokio::test]
    async fn endpoint_audience_override_is_not_required_to_mint_successfully() {
        let route = route(true, Some("custom-aud"));
        let eval = evaluator_with(ValidationOutcome::Valid {
            subject: "user-1".to_string(),
            roles: vec![],
            groups: vec![],
            session_id: None,
        });
        let headers = vec![("Authorization", "Bearer some-jws")];
        let result = eval.evaluate(&route, headers.into_iter(), None, None, None).await;
        assert!(matches!(result, AuthResult::Authenticated { .. }));
    }
}
