//! Downstream token ("Aussie token") minting (§4.3 step 5, §3).

use jsonwebtoken::{encode, EncodingKey, Header};

use crate::error::GatewayError;
use crate::model::token::DownstreamClaims;

#[derive(Debug, Clone, Copy)]
pub enum SigningAlgorithm {
    Rs256,
    Hs256,
}

pub struct DownstreamTokenMinter {
    encoding_key: EncodingKey,
    algorithm: SigningAlgorithm,
    ttl_seconds: i64,
    default_audience: Option<String>,
    require_audience: bool,
}

impl DownstreamTokenMinter {
    pub fn new_rs256(private_key_pem: &[u8], ttl_seconds: i64, default_audience: Option<String>, require_audience: bool) -> Result<Self, GatewayError> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem).map_err(|err| GatewayError::Internal {
            message: format!("invalid downstream signing key: {err}"),
        })?;
        Ok(DownstreamTokenMinter {
            encoding_key,
            algorithm: SigningAlgorithm::Rs256,
            ttl_seconds,
            default_audience,
            require_audience,
        })
    }

    pub fn new_hs256(secret: &str, ttl_seconds: i64, default_audience: Option<String>, require_audience: bool) -> Self {
        DownstreamTokenMinter {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            algorithm: SigningAlgorithm::Hs256,
            ttl_seconds,
            default_audience,
            require_audience,
        }
    }

    /// Mints a 5-minute (by default) RS256 downstream token carrying `sub`,
    /// the resolved audience, and the caller's permission set (§4.3 step 5).
    /// `endpoint_audience` takes precedence over the platform default; if
    /// neither is set and `require_audience` is configured, `service_id` is
    /// used as a last resort.
    pub fn mint(&self, subject: &str, service_id: &str, endpoint_audience: Option<&str>, permissions: Vec<String>) -> Result<String, GatewayError> {
        let audience = endpoint_audience
            .map(str::to_string)
            .or_else(|| self.default_audience.clone())
            .or_else(|| self.require_audience.then(|| service_id.to_string()));

        let claims = DownstreamClaims::new(subject, audience, permissions, self.ttl_seconds, chrono::Utc::now());

        let header = match self.algorithm {
            SigningAlgorithm::Rs256 => Header::new(jsonwebtoken::Algorithm::RS256),
            SigningAlgorithm::Hs256 => Header::new(jsonwebtoken::Algorithm::HS256),
        };

        encode(&header, &claims, &self.encoding_key).map_err(|err| GatewayError::Internal {
            message: format!("failed to mint downstream token: {err}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mints_hs256_token_with_required_audience_fallback() {
        let minter = DownstreamTokenMinter::new_hs256("test-secret-value-long-enough", 300, None, true);
        let token = minter.mint("user-1", "users", None, vec!["read".to_string()]).unwrap();
        assert!(!token.is_empty());
    }
}
