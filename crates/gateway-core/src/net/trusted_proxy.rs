//! Trusted-proxy membership: decides whether to honor a peer's forwarding
//! headers (§2 component 3, §6 `trustedProxy.*`).

use ipnet::IpNet;
use std::net::IpAddr;

#[derive(Debug, Clone)]
pub struct TrustedProxyValidator {
    enabled: bool,
    entries: Vec<IpNet>,
}

impl TrustedProxyValidator {
    /// Parses the configured proxy list (IPs or CIDRs); entries that fail to
    /// parse are dropped with a warning rather than failing startup, since a
    /// single bad entry shouldn't take down the whole gateway.
    pub fn new(enabled: bool, proxies: &[String]) -> Self {
        let entries = proxies
            .iter()
            .filter_map(|raw| parse_entry(raw))
            .collect();
        TrustedProxyValidator { enabled, entries }
    }

    pub fn is_trusted(&self, peer: IpAddr) -> bool {
        self.enabled && self.entries.iter().any(|net| net.contains(&peer))
    }
}

fn parse_entry(raw: &str) -> Option<IpNet> {
    if let Ok(net) = raw.parse::<IpNet>() {
        return Some(net);
    }
    raw.parse::<IpAddr>().ok().map(IpNet::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_validator_trusts_nobody() {
        let v = TrustedProxyValidator::new(false, &["10.0.0.0/8".to_string()]);
        assert!(!v.is_trusted("10.1.2.3".parse().unwrap()));
    }

    #[test]
    fn cidr_and_literal_entries_both_work() {
        let v = TrustedProxyValidator::new(true, &["10.0.0.0/8".to_string(), "203.0.113.9".to_string()]);
        assert!(v.is_trusted("10.5.5.5".parse().unwrap()));
        assert!(v.is_trusted("203.0.113.9".parse().unwrap()));
        assert!(!v.is_trusted("203.0.113.10".parse().unwrap()));
    }

    #[test]
    fn invalid_entries_are_skipped_not_fatal() {
        let v = TrustedProxyValidator::new(true, &["not-an-ip".to_string(), "127.0.0.1".to_string()]);
        assert!(v.is_trusted("127.0.0.1".parse().unwrap()));
    }
}
