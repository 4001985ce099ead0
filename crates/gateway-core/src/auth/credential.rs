//! Credential extraction from an inbound request, in priority order (§4.3
//! step 2): session cookie → Bearer token → API key → API-key id → session id
//! header.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    SessionCookie(String),
    BearerToken(String),
    ApiKey(String),
    ApiKeyId(String),
    SessionHeader(String),
}

const SESSION_COOKIE_NAME: &str = "aussie_session";

/// `headers` is the raw `(name, value)` list preserved in request order;
/// `cookie_header` is the parsed `Cookie` header value, if present.
pub fn extract_credential<'a>(headers: impl Iterator<Item = (&'a str, &'a str)>, cookie_header: Option<&str>) -> Option<Credential> {
    if let Some(cookie_value) = cookie_header.and_then(|raw| parse_cookie(raw, SESSION_COOKIE_NAME)) {
        return Some(Credential::SessionCookie(cookie_value));
    }

    let mut bearer = None;
    let mut api_key = None;
    let mut api_key_id = None;
    let mut session_header = None;

    for (name, value) in headers {
        if name.eq_ignore_ascii_case("authorization") {
            if let Some(token) = value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer ")) {
                bearer = Some(token.trim().to_string());
            }
        } else if name.eq_ignore_ascii_case("x-api-key") {
            api_key = Some(value.trim().to_string());
        } else if name.eq_ignore_ascii_case("x-api-key-id") {
            api_key_id = Some(value.trim().to_string());
        } else if name.eq_ignore_ascii_case("x-session-id") {
            session_header = Some(value.trim().to_string());
        }
    }

    bearer
        .map(Credential::BearerToken)
        .or_else(|| api_key.map(Credential::ApiKey))
        .or_else(|| api_key_id.map(Credential::ApiKeyId))
        .or_else(|| session_header.map(Credential::SessionHeader))
}

fn parse_cookie(cookie_header: &str, name: &str) -> Option<String> {
    cookie_header.split(';').find_map(|pair| {
        let mut parts = pair.trim().splitn(2, '=');
        let key = parts.next()?.trim();
        let value = parts.next()?.trim();
        (key == name).then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_takes_priority_over_bearer() {
        let headers = vec![("Authorization", "Bearer abc")];
        let credential = extract_credential(headers.into_iter(), Some("aussie_session=sess-1; other=x"));
        assert_eq!(credential, Some(Credential::SessionCookie("sess-1".to_string())));
    }

    #[test]
    fn bearer_takes_priority_over_api_key() {
        let headers = vec![("Authorization", "Bearer abc"), ("X-API-Key", "key-1")];
        let credential = extract_credential(headers.into_iter(), None);
        assert_eq!(credential, Some(Credential::BearerToken("abc".to_string())));
    }

    #[test]
    fn falls_through_full_priority_chain() {
        let headers = vec![("X-Session-ID", "sid-1")];
        let credential = extract_credential(headers.into_iter(), None);
        assert_eq!(credential, Some(Credential::SessionHeader("sid-1".to_string())));
    }

    #[test]
    fn no_credential_present_returns_none() {
        let headers: Vec<(&str, &str)> = vec![];
        assert_eq!(extract_credential(headers.into_iter(), None), None);
    }
}
