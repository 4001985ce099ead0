//! Claims carried by the short-lived downstream token minted after a
//! successful authentication (the "Aussie token", §3, §4.3).

use serde::{Deserialize, Serialize};

pub const DOWNSTREAM_TOKEN_ISSUER: &str = "aussie-gateway";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownstreamClaims {
    pub sub: String,
    pub iss: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    pub permissions: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

impl DownstreamClaims {
    pub fn new(sub: impl Into<String>, aud: Option<String>, permissions: Vec<String>, ttl_seconds: i64, now: chrono::DateTime<chrono::Utc>) -> Self {
        DownstreamClaims {
            sub: sub.into(),
            iss: DOWNSTREAM_TOKEN_ISSUER.to_string(),
            aud,
            permissions,
            iat: now.timestamp(),
            exp: now.timestamp() + ttl_seconds,
        }
    }
}
