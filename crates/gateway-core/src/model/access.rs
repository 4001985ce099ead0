//! Access-control allowlists attached to a service or endpoint (§3 `AccessConfig`).

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// IP/CIDR, domain and subdomain allowlists for a PRIVATE service or endpoint.
///
/// Semantics (§3): if the owning resource is PRIVATE and any of these lists is
/// non-empty, the caller's source identifier must match at least one entry in
/// at least one populated list. An empty `AccessConfig` on a PRIVATE resource
/// denies everyone; a resource with no `AccessConfig` at all relies solely on
/// auth/visibility and is not access-list-restricted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub allowed_ips: Vec<String>,
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    #[serde(default)]
    pub allowed_subdomains: Vec<String>,
}

impl AccessConfig {
    pub fn is_empty(&self) -> bool {
        self.allowed_ips.is_empty() && self.allowed_domains.is_empty() && self.allowed_subdomains.is_empty()
    }

    /// Evaluates the allowlists against a caller's source IP and, if known, its
    /// reverse-resolved or Host-derived domain. Only the populated lists are
    /// consulted; a match in any one of them is sufficient.
    pub fn allows(&self, source_ip: Option<IpAddr>, source_domain: Option<&str>) -> bool {
        if self.is_empty() {
            return true;
        }

        if !self.allowed_ips.is_empty() {
            if let Some(ip) = source_ip {
                if self.allowed_ips.iter().any(|entry| ip_matches(entry, ip)) {
                    return true;
                }
            }
        }

        if let Some(domain) = source_domain {
            if self.allowed_domains.iter().any(|d| d.eq_ignore_ascii_case(domain)) {
                return true;
            }
            if self
                .allowed_subdomains
                .iter()
                .any(|suffix| domain_matches_subdomain(domain, suffix))
            {
                return true;
            }
        }

        false
    }
}

fn ip_matches(entry: &str, ip: IpAddr) -> bool {
    if let Ok(net) = entry.parse::<IpNet>() {
        return net.contains(&ip);
    }
    entry.parse::<IpAddr>().map(|literal| literal == ip).unwrap_or(false)
}

fn domain_matches_subdomain(domain: &str, suffix: &str) -> bool {
    let suffix = suffix.trim_start_matches('.');
    domain.eq_ignore_ascii_case(suffix) || domain.to_lowercase().ends_with(&format!(".{}", suffix.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_allows_everyone() {
        let cfg = AccessConfig::default();
        assert!(cfg.allows(None, None));
    }

    #[test]
    fn cidr_allowlist_matches() {
        let cfg = AccessConfig {
            allowed_ips: vec!["10.0.0.0/8".to_string()],
            ..Default::default()
        };
        assert!(cfg.allows(Some("10.1.2.3".parse().unwrap()), None));
        assert!(!cfg.allows(Some("192.0.2.10".parse().unwrap()), None));
    }

    #[test]
    fn literal_ip_matches() {
        let cfg = AccessConfig {
            allowed_ips: vec!["203.0.113.5".to_string()],
            ..Default::default()
        };
        assert!(cfg.allows(Some("203.0.113.5".parse().unwrap()), None));
        assert!(!cfg.allows(Some("203.0.113.6".parse().unwrap()), None));
    }

    #[test]
    fn subdomain_allowlist_matches_suffix() {
        let cfg = AccessConfig {
            allowed_subdomains: vec!["internal.example.com".to_string()],
            ..Default::default()
        };
        assert!(cfg.allows(None, Some("api.internal.example.com")));
        assert!(cfg.allows(None, Some("internal.example.com")));
        assert!(!cfg.allows(None, Some("example.com")));
    }

    #[test]
    fn non_empty_config_denies_when_no_list_matches() {
        let cfg = AccessConfig {
            allowed_ips: vec!["10.0.0.0/8".to_string()],
            ..Default::default()
        };
        assert!(!cfg.allows(None, None));
    }
}
