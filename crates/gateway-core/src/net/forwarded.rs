//! Forwarding-header construction: RFC 7239 `Forwarded` or legacy
//! `X-Forwarded-*` (§4.4, §8 invariant on quoting).

/// One hop's worth of forwarding information.
#[derive(Debug, Clone)]
pub struct ForwardedHop {
    pub for_addr: Option<String>,
    pub proto: Option<String>,
    pub host: Option<String>,
}

pub struct ForwardedBuilder {
    use_rfc7239: bool,
}

impl ForwardedBuilder {
    pub fn new(use_rfc7239: bool) -> Self {
        ForwardedBuilder { use_rfc7239 }
    }

    /// Appends this hop to `existing` (the inbound `Forwarded` or
    /// `X-Forwarded-For` header value, if any) and returns the header
    /// name/value pairs to set on the outbound request.
    pub fn build(&self, hop: &ForwardedHop, existing_forwarded: Option<&str>, existing_xff: Option<&str>) -> Vec<(String, String)> {
        if self.use_rfc7239 {
            let element = rfc7239_element(hop);
            let value = match existing_forwarded {
                Some(prev) if !prev.is_empty() => format!("{prev}, {element}"),
                _ => element,
            };
            vec![("Forwarded".to_string(), value)]
        } else {
            let mut headers = Vec::new();
            if let Some(addr) = &hop.for_addr {
                let value = match existing_xff {
                    Some(prev) if !prev.is_empty() => format!("{prev}, {addr}"),
                    _ => addr.clone(),
                };
                headers.push(("X-Forwarded-For".to_string(), value));
            }
            if let Some(host) = &hop.host {
                headers.push(("X-Forwarded-Host".to_string(), host.clone()));
            }
            if let Some(proto) = &hop.proto {
                headers.push(("X-Forwarded-Proto".to_string(), proto.clone()));
            }
            headers
        }
    }
}

fn rfc7239_element(hop: &ForwardedHop) -> String {
    let mut parts = Vec::new();
    if let Some(addr) = &hop.for_addr {
        parts.push(format!("for={}", quote_if_needed(addr)));
    }
    if let Some(proto) = &hop.proto {
        parts.push(format!("proto={}", quote_if_needed(proto)));
    }
    if let Some(host) = &hop.host {
        parts.push(format!("host={}", quote_if_needed(host)));
    }
    parts.join(";")
}

/// RFC 7239 token characters that force quoting: `: [ ] ; ,` plus any space.
fn needs_quoting(value: &str) -> bool {
    value.chars().any(|c| matches!(c, ':' | '[' | ']' | ';' | ',' | ' '))
}

fn quote_if_needed(value: &str) -> String {
    if needs_quoting(value) {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc7239_quotes_ipv6_for_value() {
        let hop = ForwardedHop {
            for_addr: Some("[::1]:4711".to_string()),
            proto: Some("https".to_string()),
            host: Some("example.com".to_string()),
        };
        let builder = ForwardedBuilder::new(true);
        let headers = builder.build(&hop, None, None);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].0, "Forwarded");
        assert!(headers[0].1.contains("for=\"[::1]:4711\""));
        assert!(headers[0].1.contains("proto=https"));
    }

    #[test]
    fn rfc7239_appends_to_existing_header() {
        let hop = ForwardedHop {
            for_addr: Some("203.0.113.1".to_string()),
            proto: None,
            host: None,
        };
        let builder = ForwardedBuilder::new(true);
        let headers = builder.build(&hop, Some("for=192.0.2.1"), None);
        assert_eq!(headers[0].1, "for=192.0.2.1, for=203.0.113.1");
    }

    #[test]
    fn legacy_mode_emits_xff_and_friends() {
        let hop = ForwardedHop {
            for_addr: Some("203.0.113.1".to_string()),
            proto: Some("http".to_string()),
            host: Some("api.example.com".to_string()),
        };
        let builder = ForwardedBuilder::new(false);
        let headers = builder.build(&hop, None, Some("198.51.100.1"));
        assert!(headers.contains(&("X-Forwarded-For".to_string(), "198.51.100.1, 203.0.113.1".to_string())));
        assert!(headers.contains(&("X-Forwarded-Host".to_string(), "api.example.com".to_string())));
        assert!(headers.contains(&("X-Forwarded-Proto".to_string(), "http".to_string())));
    }
}
