//! Tenant resolution.
//!
//! Maps the request host (and, in demo mode, a tenant cookie) to a tenant
//! id. Resolution is strict: a host that does not map to a tenant is an
//! error, never a silent fallback to some default site.

use crate::AuthResult;
use crate::config::{TenancyConfig, TenancyMode};
use crate::cookie::cookie_value;
use crate::error::AuthError;
use async_trait::async_trait;
use ipnetwork::IpNetwork;
use std::net::IpAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tessera_core::TenantId;
use tracing::{debug, warn};

/// Seeds initial content for tenants generated in demo mode.
#[async_trait]
pub trait TenantProvisioner: Send + Sync {
    /// Called exactly once per generated tenant, before its cookie is issued.
    ///
    /// # Errors
    ///
    /// Returns an error if seeding fails; the tenant is still served,
    /// just empty.
    async fn provision(&self, tenant: &TenantId) -> AuthResult<()>;
}

/// Outcome of tenant resolution.
#[derive(Debug, Clone)]
pub struct TenantResolution {
    /// Resolved tenant, `None` in single-tenant mode.
    pub tenant: Option<TenantId>,
    /// `Set-Cookie` value for a tenant generated during this request.
    pub set_cookie: Option<String>,
}

impl TenantResolution {
    fn bare(tenant: Option<TenantId>) -> Self {
        Self {
            tenant,
            set_cookie: None,
        }
    }
}

/// Resolves the tenant for a request.
pub struct TenantResolver {
    config: TenancyConfig,
    provisioner: Option<Arc<dyn TenantProvisioner>>,
}

impl TenantResolver {
    pub fn new(config: TenancyConfig) -> Self {
        Self {
            config,
            provisioner: None,
        }
    }

    /// Attach the seeder invoked for tenants generated in demo mode.
    #[must_use]
    pub fn with_provisioner(mut self, provisioner: Arc<dyn TenantProvisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    /// Resolve the tenant for `host`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TenantNotFound`] when the host has no subdomain,
    /// the subdomain is reserved, or the label is not a valid tenant id.
    pub async fn resolve(
        &self,
        host: &str,
        cookie_header: Option<&str>,
    ) -> AuthResult<TenantResolution> {
        if self.config.mode == TenancyMode::Single {
            return Ok(TenantResolution::bare(None));
        }
        if self.config.demo {
            return self.resolve_demo(cookie_header).await;
        }

        let hostname = normalize_host(host);
        if is_local_host(&hostname) {
            return Ok(TenantResolution::bare(Some(self.default_tenant())));
        }
        if hostname.parse::<IpAddr>().is_ok() {
            // Public IP with no name: nothing to derive a tenant from.
            return Err(AuthError::tenant_not_found(host));
        }

        let label = subdomain_label(&hostname)
            .ok_or_else(|| AuthError::tenant_not_found(host))?;
        if self
            .config
            .reserved_subdomains
            .iter()
            .any(|reserved| reserved == label)
        {
            debug!(host, label, "reserved subdomain does not resolve to a tenant");
            return Err(AuthError::tenant_not_found(host));
        }

        let tenant =
            TenantId::new(label).map_err(|_| AuthError::tenant_not_found(host))?;
        Ok(TenantResolution::bare(Some(tenant)))
    }

    /// Demo mode: the tenant lives in a cookie, generated on first visit.
    async fn resolve_demo(&self, cookie_header: Option<&str>) -> AuthResult<TenantResolution> {
        if let Some(header) = cookie_header
            && let Some(value) = cookie_value(header, &self.config.tenant_cookie_name)
            && let Ok(tenant) = TenantId::new(value)
        {
            return Ok(TenantResolution::bare(Some(tenant)));
        }

        let tenant = generate_demo_tenant();
        if let Some(provisioner) = &self.provisioner
            && let Err(e) = provisioner.provision(&tenant).await
        {
            warn!(tenant = %tenant, error = %e, "demo tenant seed failed");
        }

        let set_cookie = build_tenant_cookie(
            &self.config.tenant_cookie_name,
            tenant.as_str(),
            self.config.tenant_cookie_ttl,
        );
        debug!(tenant = %tenant, "generated demo tenant");
        Ok(TenantResolution {
            tenant: Some(tenant),
            set_cookie: Some(set_cookie),
        })
    }

    fn default_tenant(&self) -> TenantId {
        TenantId::new(&self.config.default_tenant)
            .unwrap_or_else(|_| TenantId::default_tenant())
    }
}

/// Lowercase the host and strip any port or IPv6 brackets.
fn normalize_host(host: &str) -> String {
    let host = host.trim().to_ascii_lowercase();
    if let Some(rest) = host.strip_prefix('[') {
        // Bracketed IPv6 literal, possibly with a port after the bracket.
        if let Some((addr, _)) = rest.split_once(']') {
            return addr.to_string();
        }
    }
    // A single colon separates host from port; more than one means a raw
    // IPv6 literal.
    if host.matches(':').count() == 1
        && let Some((name, _port)) = host.split_once(':')
    {
        return name.trim_end_matches('.').to_string();
    }
    host.trim_end_matches('.').to_string()
}

fn is_local_host(hostname: &str) -> bool {
    if hostname == "localhost" {
        return true;
    }
    match hostname.parse::<IpAddr>() {
        Ok(addr) => addr.is_loopback() || is_private_address(addr),
        Err(_) => false,
    }
}

fn is_private_address(addr: IpAddr) -> bool {
    static PRIVATE_RANGES: OnceLock<Vec<IpNetwork>> = OnceLock::new();
    let ranges = PRIVATE_RANGES.get_or_init(|| {
        [
            "10.0.0.0/8",
            "172.16.0.0/12",
            "192.168.0.0/16",
            "169.254.0.0/16",
            "fc00::/7",
            "fe80::/10",
        ]
        .iter()
        .filter_map(|cidr| cidr.parse().ok())
        .collect()
    });
    ranges.iter().any(|range| range.contains(addr))
}

/// First label of a host that actually has a subdomain.
///
/// `acme.example.com` and `acme.localhost` yield `acme`; a bare apex like
/// `example.com` yields nothing.
fn subdomain_label(hostname: &str) -> Option<&str> {
    let labels: Vec<&str> = hostname.split('.').collect();
    let minimum = if labels.last() == Some(&"localhost") {
        2
    } else {
        3
    };
    if labels.len() < minimum {
        return None;
    }
    let first = labels[0];
    if first.is_empty() { None } else { Some(first) }
}

fn generate_demo_tenant() -> TenantId {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..10)
        .map(|_| ALPHABET[rand::Rng::gen_range(&mut rng, 0..ALPHABET.len())] as char)
        .collect();
    TenantId::new(format!("demo-{suffix}")).unwrap_or_else(|_| TenantId::default_tenant())
}

fn build_tenant_cookie(name: &str, value: &str, ttl: Duration) -> String {
    format!(
        "{}={}; Path=/; Max-Age={}; SameSite=Lax",
        name,
        value,
        ttl.as_secs()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TenancyConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn multi_config() -> TenancyConfig {
        TenancyConfig {
            mode: TenancyMode::Multi,
            ..TenancyConfig::default()
        }
    }

    fn demo_config() -> TenancyConfig {
        TenancyConfig {
            mode: TenancyMode::Multi,
            demo: true,
            ..TenancyConfig::default()
        }
    }

    struct CountingProvisioner {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TenantProvisioner for CountingProvisioner {
        async fn provision(&self, _tenant: &TenantId) -> AuthResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_single_mode_has_no_tenant() {
        let resolver = TenantResolver::new(TenancyConfig::default());
        let resolution = resolver.resolve("acme.example.com", None).await.unwrap();
        assert_eq!(resolution.tenant, None);
        assert!(resolution.set_cookie.is_none());
    }

    #[tokio::test]
    async fn test_local_hosts_map_to_default_tenant() {
        let resolver = TenantResolver::new(multi_config());
        for host in [
            "localhost",
            "localhost:2368",
            "127.0.0.1",
            "10.0.0.5:8080",
            "192.168.1.10",
            "[::1]:2368",
        ] {
            let resolution = resolver.resolve(host, None).await.unwrap();
            assert_eq!(
                resolution.tenant,
                Some(TenantId::default_tenant()),
                "host {host}"
            );
        }
    }

    #[tokio::test]
    async fn test_subdomain_resolves_to_tenant() {
        let resolver = TenantResolver::new(multi_config());
        let resolution = resolver
            .resolve("acme.example.com", None)
            .await
            .unwrap();
        assert_eq!(resolution.tenant, Some(TenantId::new("acme").unwrap()));

        let resolution = resolver.resolve("acme.localhost:2368", None).await.unwrap();
        assert_eq!(resolution.tenant, Some(TenantId::new("acme").unwrap()));
    }

    #[tokio::test]
    async fn test_host_lookup_is_case_insensitive() {
        let resolver = TenantResolver::new(multi_config());
        let resolution = resolver
            .resolve("ACME.Example.COM:443", None)
            .await
            .unwrap();
        assert_eq!(resolution.tenant, Some(TenantId::new("acme").unwrap()));
    }

    #[tokio::test]
    async fn test_reserved_subdomains_rejected() {
        let resolver = TenantResolver::new(multi_config());
        for host in ["www.example.com", "api.example.com", "cdn.example.com"] {
            let err = resolver.resolve(host, None).await.unwrap_err();
            assert!(matches!(err, AuthError::TenantNotFound { .. }), "host {host}");
        }
    }

    #[tokio::test]
    async fn test_apex_and_public_ip_rejected() {
        let resolver = TenantResolver::new(multi_config());
        assert!(resolver.resolve("example.com", None).await.is_err());
        assert!(resolver.resolve("203.0.113.10", None).await.is_err());
    }

    #[tokio::test]
    async fn test_demo_mode_generates_tenant_and_cookie() {
        let provisioner = Arc::new(CountingProvisioner {
            calls: AtomicUsize::new(0),
        });
        let resolver =
            TenantResolver::new(demo_config()).with_provisioner(provisioner.clone());

        let resolution = resolver.resolve("demo.example.com", None).await.unwrap();
        let tenant = resolution.tenant.unwrap();
        assert!(tenant.as_str().starts_with("demo-"));

        let cookie = resolution.set_cookie.unwrap();
        assert!(cookie.starts_with("tessera_tenant="));
        assert!(cookie.contains("Max-Age=1200"));
        assert_eq!(provisioner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_demo_mode_reuses_cookie_tenant() {
        let provisioner = Arc::new(CountingProvisioner {
            calls: AtomicUsize::new(0),
        });
        let resolver =
            TenantResolver::new(demo_config()).with_provisioner(provisioner.clone());

        let resolution = resolver
            .resolve("demo.example.com", Some("tessera_tenant=demo-abc123"))
            .await
            .unwrap();
        assert_eq!(
            resolution.tenant,
            Some(TenantId::new("demo-abc123").unwrap())
        );
        assert!(resolution.set_cookie.is_none());
        assert_eq!(provisioner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_demo_mode_replaces_invalid_cookie() {
        let resolver = TenantResolver::new(demo_config());
        let resolution = resolver
            .resolve("demo.example.com", Some("tessera_tenant=NOT!VALID"))
            .await
            .unwrap();
        assert!(resolution.set_cookie.is_some());
        assert_ne!(
            resolution.tenant.unwrap().as_str(),
            "NOT!VALID"
        );
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("Example.COM:443"), "example.com");
        assert_eq!(normalize_host("[::1]:8080"), "::1");
        assert_eq!(normalize_host("example.com."), "example.com");
        assert_eq!(normalize_host("fe80::1"), "fe80::1");
    }

    #[test]
    fn test_subdomain_label() {
        assert_eq!(subdomain_label("acme.example.com"), Some("acme"));
        assert_eq!(subdomain_label("a.b.c.example.com"), Some("a"));
        assert_eq!(subdomain_label("acme.localhost"), Some("acme"));
        assert_eq!(subdomain_label("example.com"), None);
        assert_eq!(subdomain_label("localhost"), None);
    }
}
