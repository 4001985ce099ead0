//! API-key `TokenValidator` (§4.3 step 3): SHA-256 hashes the plaintext key
//! and looks up the hash in the key repository, rejecting revoked or expired
//! keys.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::ports::{ApiKeyRepository, TokenValidator, ValidationOutcome};

pub struct ApiKeyTokenValidator {
    repository: Arc<dyn ApiKeyRepository>,
    priority: i32,
}

impl ApiKeyTokenValidator {
    pub fn new(repository: Arc<dyn ApiKeyRepository>, priority: i32) -> Self {
        ApiKeyTokenValidator { repository, priority }
    }
}

pub fn hash_key(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    BASE64.encode(hasher.finalize())
}

#[async_trait]
impl TokenValidator for ApiKeyTokenValidator {
    fn priority(&self) -> i32 {
        self.priority
    }

    async fn validate(&self, credential: &str) -> ValidationOutcome {
        let hash = hash_key(credential);
        match self.repository.find_by_hash(&hash).await {
            Ok(Some(record)) if record.revoked => ValidationOutcome::Invalid {
                reason: "api key revoked".to_string(),
            },
            Ok(Some(record)) if record.expires_at.is_some_and(|exp| exp < chrono::Utc::now()) => {
                ValidationOutcome::Invalid {
                    reason: "api key expired".to_string(),
                }
            }
            Ok(Some(record)) => ValidationOutcome::Valid {
                subject: record.owner_sub,
                roles: record.roles,
                groups: vec![],
                session_id: None,
            },
            Ok(None) => ValidationOutcome::Invalid {
                reason: "unknown api key".to_string(),
            },
            Err(err) => ValidationOutcome::Invalid {
                reason: format!("api key lookup failed: {err}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_base64() {
        let a = hash_key("secret-key");
        let b = hash_key("secret-key");
        assert_eq!(a, b);
        assert_ne!(a, hash_key("other-key"));
    }
}
