use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use pages_gateway::DnsVerifier;

/// Production `DnsVerifier`: looks up TXT records for a domain via the
/// system resolver configuration.
pub struct ResolverDnsVerifier {
    resolver: TokioAsyncResolver,
}

impl ResolverDnsVerifier {
    pub fn new() -> anyhow::Result<Self> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()?;
        Ok(Self { resolver })
    }
}

#[async_trait]
impl DnsVerifier for ResolverDnsVerifier {
    async fn txt_records(&self, domain: &str) -> Vec<String> {
        match self.resolver.txt_lookup(domain).await {
            Ok(lookup) => lookup.iter().map(|txt| txt.to_string()).collect(),
            Err(e) => {
                tracing::warn!(domain, error = %e, "DNS TXT lookup failed");
                Vec::new()
            }
        }
    }
}

/// Used when DNS verification is disabled, or when the system resolver
/// couldn't be constructed (the registry never calls into this unless
/// `enable_custom_domain_dns_verification` is set).
pub struct NoopDnsVerifier;

#[async_trait]
impl DnsVerifier for NoopDnsVerifier {
    async fn txt_records(&self, _domain: &str) -> Vec<String> {
        Vec::new()
    }
}
