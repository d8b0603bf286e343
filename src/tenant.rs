//! Host name to board resolution.

use std::fmt;

use crate::models::Board;
use crate::store::{ContentStore, StoreResult};

/// How a request host identifies its board.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TenantKey {
    /// `{subdomain}.{base-domain}`
    Subdomain(String),
    /// Any other host, looked up in the custom domain mapping.
    Domain(String),
}

impl TenantKey {
    /// Classifies a `Host` header value. Ports and a trailing root dot are
    /// ignored; the bare base domain has no tenant.
    pub fn from_host(host: &str, base_domain: &str) -> Option<Self> {
        let host = normalize_host(host);
        if host.is_empty() {
            return None;
        }
        let base = normalize_host(base_domain);
        if !base.is_empty() {
            if host == base {
                return None;
            }
            if host.ends_with(&format!(".{base}")) {
                let label = host.split('.').next().unwrap_or_default();
                if label.is_empty() {
                    return None;
                }
                return Some(TenantKey::Subdomain(label.to_string()));
            }
        }
        Some(TenantKey::Domain(host))
    }

    /// Identifier the preferences document is keyed by.
    pub fn identifier(&self) -> &str {
        match self {
            TenantKey::Subdomain(value) | TenantKey::Domain(value) => value,
        }
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenantKey::Subdomain(name) => write!(f, "subdomain {name}"),
            TenantKey::Domain(name) => write!(f, "domain {name}"),
        }
    }
}

fn normalize_host(raw: &str) -> String {
    let raw = raw.trim();
    // Strip the port, leaving bracketed IPv6 literals alone.
    let without_port = match raw.rfind(':') {
        Some(idx) if !raw[idx..].contains(']') => &raw[..idx],
        _ => raw,
    };
    without_port.trim_end_matches('.').to_ascii_lowercase()
}

/// Looks up the board for a host; `Ok(None)` when no tenant matches.
pub async fn resolve_board(
    store: &dyn ContentStore,
    host: &str,
    base_domain: &str,
) -> StoreResult<Option<(TenantKey, Board)>> {
    let Some(key) = TenantKey::from_host(host, base_domain) else {
        return Ok(None);
    };
    Ok(store.board_by_key(&key).await?.map(|board| (key, board)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subdomain_hosts() {
        assert_eq!(
            TenantKey::from_host("acme.example.com", "example.com"),
            Some(TenantKey::Subdomain("acme".into()))
        );
        assert_eq!(
            TenantKey::from_host("Acme.Example.com:8080", "example.com"),
            Some(TenantKey::Subdomain("acme".into()))
        );
        assert_eq!(
            TenantKey::from_host("blog.acme.example.com", "example.com"),
            Some(TenantKey::Subdomain("blog".into()))
        );
    }

    #[test]
    fn custom_domains() {
        assert_eq!(
            TenantKey::from_host("www.acme.org.", "example.com"),
            Some(TenantKey::Domain("www.acme.org".into()))
        );
        // Suffix match must respect label boundaries.
        assert_eq!(
            TenantKey::from_host("notexample.com", "example.com"),
            Some(TenantKey::Domain("notexample.com".into()))
        );
    }

    #[test]
    fn base_domain_and_blank_hosts_have_no_tenant() {
        assert_eq!(TenantKey::from_host("example.com", "example.com"), None);
        assert_eq!(TenantKey::from_host("", "example.com"), None);
        assert_eq!(TenantKey::from_host(".example.com", "example.com"), None);
    }

    #[test]
    fn identifier_is_the_raw_name() {
        assert_eq!(TenantKey::Subdomain("acme".into()).identifier(), "acme");
        assert_eq!(TenantKey::Domain("acme.org".into()).identifier(), "acme.org");
    }
}
