use serde::{Deserialize, Serialize};

/// Parsed `.pages` file for a repository (§3, §6). Optional fields default
/// to "no restriction" — a repo with no `.pages` file at all is equivalent
/// to one with every field at its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RepoConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub custom_domain: Option<String>,

    #[serde(default)]
    pub enable_branches: Vec<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default, rename = "branchesPassword")]
    pub branches_password: Option<String>,

    #[serde(default)]
    pub directory_index: bool,
}

fn default_enabled() -> bool {
    true
}

impl RepoConfig {
    pub fn parse(yaml: &str) -> Result<Self, serde_yaml::Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    /// `password_hash`, named to match the data-model table (§3); the value
    /// stored in `.pages` is already the 64-hex SHA-256 digest, not a
    /// plaintext password.
    pub fn password_hash(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    pub fn branches_password_hash(&self) -> Option<&str> {
        self.branches_password.as_deref().filter(|p| !p.is_empty())
    }

    /// `enable_branches` is ignored when `custom_domain` is empty (§3
    /// invariant) — branch subdomains only make sense under a custom apex.
    pub fn effective_enable_branches(&self) -> &[String] {
        if self.custom_domain.as_deref().unwrap_or("").is_empty() {
            &[]
        } else {
            &self.enable_branches
        }
    }
}
