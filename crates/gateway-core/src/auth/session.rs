//! Session-cookie/session-header `TokenValidator` (§4.3 step 3): looks up an
//! opaque session id in the session store, rejecting expired sessions.
//!
//! Grounded on `apikey.rs`'s repository-lookup shape. Unlike the JWT
//! validator, an opaque session id has no shape to check up front, so a
//! miss is reported as `Skip` rather than `Invalid` — the credential might
//! still be an API key the next validator in the chain recognizes.

use async_trait::async_trait;
use std::sync::Arc;

use crate::ports::{SessionRepository, TokenValidator, ValidationOutcome};

pub struct SessionTokenValidator {
    repository: Arc<dyn SessionRepository>,
    priority: i32,
}

impl SessionTokenValidator {
    pub fn new(repository: Arc<dyn SessionRepository>, priority: i32) -> Self {
        SessionTokenValidator { repository, priority }
    }
}

#[async_trait]
impl TokenValidator for SessionTokenValidator {
    fn priority(&self) -> i32 {
        self.priority
    }

    async fn validate(&self, credential: &str) -> ValidationOutcome {
        match self.repository.find_by_id(credential).await {
            Ok(Some(record)) if record.expires_at < chrono::Utc::now() => ValidationOutcome::Invalid {
                reason: "session expired".to_string(),
            },
            Ok(Some(record)) => ValidationOutcome::Valid {
                subject: record.user_id,
                roles: record.roles,
                groups: record.groups,
                session_id: Some(record.session_id),
            },
            Ok(None) => ValidationOutcome::Skip,
            Err(err) => ValidationOutcome::Invalid {
                reason: format!("session lookup failed: {err}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::ports::SessionRecord;

    struct FakeRepository(Option<SessionRecord>);

    #[async_trait]
    impl SessionRepository for FakeRepository {
        async fn find_by_id(&self, _session_id: &str) -> Result<Option<SessionRecord>, GatewayError> {
            Ok(self.0.clone())
        }
    }

    fn record(expires_at: chrono::DateTime<chrono::Utc>) -> SessionRecord {
        SessionRecord {
            session_id: "s1".to_string(),
            user_id: "user-1".to_string(),
            roles: vec!["member".to_string()],
            groups: vec![],
            expires_at,
        }
    }

    #[tokio::test]
    async fn unknown_session_is_skipped_not_rejected() {
        let validator = SessionTokenValidator::new(Arc::new(FakeRepository(None)), 10);
        assert!(matches!(validator.validate("opaque-id").await, ValidationOutcome::Skip));
    }

    #[tokio::test]
    async fn expired_session_is_invalid() {
        let past = chrono::Utc::now() - chrono::Duration::seconds(10);
        let validator = SessionTokenValidator::new(Arc::new(FakeRepository(Some(record(past)))), 10);
        assert!(matches!(validator.validate("s1").await, ValidationOutcome::Invalid { .. }));
    }

    #[tokio::test]
    async fn live_session_resolves_subject_and_roles() {
        let future = chrono::Utc::now() + chrono::Duration::hours(1);
        let validator = SessionTokenValidator::new(Arc::new(FakeRepository(Some(record(future)))), 10);
        match validator.validate("s1").await {
            ValidationOutcome::Valid { subject, roles, .. } => {
                assert_eq!(subject, "user-1");
                assert_eq!(roles, vec!["member".to_string()]);
            }
            _ => panic!("expected Valid"),
        }
    }
}
