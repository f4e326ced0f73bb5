use serde::{Deserialize, Serialize};

/// A custom-domain → repository binding (§3). `branch: None` means the
/// default branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainBinding {
    pub domain: String,
    pub owner: String,
    pub repo: String,
    #[serde(default)]
    pub branch: Option<String>,
}

impl DomainBinding {
    pub fn new(
        domain: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        branch: Option<String>,
    ) -> Self {
        Self {
            domain: normalize_domain(&domain.into()),
            owner: owner.into(),
            repo: repo.into(),
            branch,
        }
    }

    pub fn forward_key(&self) -> String {
        forward_key(&self.domain)
    }

    pub fn reverse_key(&self) -> String {
        reverse_key(&self.owner, &self.repo, self.branch.as_deref())
    }
}

/// Normalise a domain to the lowercase, punycode-free form used as a KV key
/// component. Leading/trailing whitespace and a single trailing dot (the
/// DNS root label) are stripped.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

pub fn forward_key(domain: &str) -> String {
    format!("custom_domain:{}", normalize_domain(domain))
}

pub fn reverse_key(owner: &str, repo: &str, branch: Option<&str>) -> String {
    match branch {
        Some(b) if !b.is_empty() => format!("{owner}:{repo}:{b}"),
        _ => format!("{owner}:{repo}"),
    }
}
