use std::sync::Arc;

use async_trait::async_trait;
use pages_core::domain::{DomainBinding, forward_key, normalize_domain, reverse_key};
use pages_core::error::PagesError;
use pages_core::router_record::RouterRecord;
use pages_kv::KvPool;
use sha2::{Digest, Sha256};

/// DNS TXT lookup collaborator, injected so tests can fake resolution
/// rather than hitting a real resolver — the production implementation
/// (wired in `pages-server`) uses `hickory-resolver`.
#[async_trait]
pub trait DnsVerifier: Send + Sync {
    async fn txt_records(&self, domain: &str) -> Vec<String>;
}

/// `bovine-pages-verification=<sha256_hex(owner + "/" + repo)>` (§4.3, §8
/// invariant 2).
pub fn expected_txt_value(owner: &str, repo: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{owner}/{repo}").as_bytes());
    format!("bovine-pages-verification={:x}", hasher.finalize())
}

pub struct DomainRegistry {
    kv: Arc<KvPool>,
    dns: Arc<dyn DnsVerifier>,
    dns_verification_enabled: bool,
    router_enabled: bool,
    cert_resolver: String,
    root_key: String,
    router_ttl: u64,
}

impl DomainRegistry {
    pub fn new(
        kv: Arc<KvPool>,
        dns: Arc<dyn DnsVerifier>,
        dns_verification_enabled: bool,
        router_enabled: bool,
        cert_resolver: impl Into<String>,
        root_key: impl Into<String>,
        router_ttl: u64,
    ) -> Self {
        Self {
            kv,
            dns,
            dns_verification_enabled,
            router_enabled,
            cert_resolver: cert_resolver.into(),
            root_key: root_key.into(),
            router_ttl,
        }
    }

    /// Register `domain` for `(owner, repo, branch)`. Idempotent when
    /// re-registering the same binding (the activation trigger calls this
    /// on every qualifying request). A forward key already pointing at a
    /// *different* owner/repo/branch leaves the existing binding untouched
    /// and returns `Conflict` (§8 invariant 5 / scenario S3).
    pub async fn register(
        &self,
        domain: &str,
        owner: &str,
        repo: &str,
        branch: Option<String>,
    ) -> Result<(), PagesError> {
        let domain = normalize_domain(domain);

        if let Some(existing) = self.resolve(&domain).await? {
            if existing.owner != owner || existing.repo != repo || existing.branch != branch {
                return Err(PagesError::Conflict(domain));
            }
            // Idempotent re-activation: ensure the router record exists and stop.
            self.publish_router_record(&domain).await?;
            return Ok(());
        }

        if self.dns_verification_enabled {
            let expected = expected_txt_value(owner, repo);
            let records = self.dns.txt_records(&domain).await;
            if !records.iter().any(|r| r == &expected) {
                return Err(PagesError::DnsVerificationFailed { domain });
            }
        }

        let binding = DomainBinding::new(domain.clone(), owner, repo, branch.clone());
        let serialized = serde_json::to_vec(&binding).map_err(PagesError::Serde)?;

        let mut borrowed = self.borrow().await?;
        borrowed
            .connection()
            .set(&forward_key(&domain), &serialized, None)
            .await
            .map_err(|e| PagesError::DependencyDegraded(e.to_string()))?;
        borrowed
            .connection()
            .set(&reverse_key(owner, repo, branch.as_deref()), domain.as_bytes(), None)
            .await
            .map_err(|e| PagesError::DependencyDegraded(e.to_string()))?;
        borrowed.release().await;

        self.publish_router_record(&domain).await?;
        Ok(())
    }

    /// Cache-only lookup: never enumerates repositories, never calls the
    /// host API (§8 invariant 6). Not the durability-required call (only
    /// `register` is) — a KV outage degrades to "not found" rather than
    /// surfacing as a 5xx to the request this lookup is serving.
    pub async fn resolve(&self, domain: &str) -> Result<Option<DomainBinding>, PagesError> {
        let domain = normalize_domain(domain);
        match self.resolve_strict(&domain).await {
            Ok(binding) => Ok(binding),
            Err(PagesError::DependencyDegraded(reason)) => {
                tracing::warn!(domain = %domain, reason = %reason, "KV unreachable, degrading domain lookup to not-found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn resolve_strict(&self, domain: &str) -> Result<Option<DomainBinding>, PagesError> {
        let mut borrowed = self.borrow().await?;
        let raw = borrowed
            .connection()
            .get(&forward_key(domain))
            .await
            .map_err(|e| PagesError::DependencyDegraded(e.to_string()))?;
        borrowed.release().await;

        match raw {
            None => Ok(None),
            Some(bytes) => {
                let binding: DomainBinding =
                    serde_json::from_slice(&bytes).map_err(PagesError::Serde)?;
                Ok(Some(binding))
            }
        }
    }

    pub async fn release(&self, domain: &str) -> Result<(), PagesError> {
        let domain = normalize_domain(domain);
        let Some(binding) = self.resolve(&domain).await? else {
            return Ok(());
        };

        let mut borrowed = self.borrow().await?;
        borrowed
            .connection()
            .del(&forward_key(&domain))
            .await
            .map_err(|e| PagesError::DependencyDegraded(e.to_string()))?;
        borrowed
            .connection()
            .del(&reverse_key(&binding.owner, &binding.repo, binding.branch.as_deref()))
            .await
            .map_err(|e| PagesError::DependencyDegraded(e.to_string()))?;

        if self.router_enabled {
            let record = RouterRecord::new(
                RouterRecord::id_for_domain(&domain),
                &domain,
                &self.cert_resolver,
                self.router_ttl,
            );
            for (key, _) in record.entries(&self.root_key) {
                let _ = borrowed.connection().del(&key).await;
            }
        }
        borrowed.release().await;
        Ok(())
    }

    async fn publish_router_record(&self, domain: &str) -> Result<(), PagesError> {
        if !self.router_enabled {
            return Ok(());
        }
        let record = RouterRecord::new(
            RouterRecord::id_for_domain(domain),
            domain,
            &self.cert_resolver,
            self.router_ttl,
        );
        let mut borrowed = self.borrow().await?;
        for (key, value) in record.entries(&self.root_key) {
            let ttl = if self.router_ttl > 0 { Some(self.router_ttl) } else { None };
            borrowed
                .connection()
                .set(&key, value.as_bytes(), ttl)
                .await
                .map_err(|e| PagesError::DependencyDegraded(e.to_string()))?;
        }
        borrowed.release().await;
        Ok(())
    }

    async fn borrow(&self) -> Result<pages_kv::pool::Borrowed, PagesError> {
        self.kv
            .borrow()
            .await
            .map_err(|e| PagesError::DependencyDegraded(e.to_string()))
    }
}
