use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use serde::{Deserialize, Serialize};

use crate::error::PagesError;

/// Top-level configuration, covering the key table in §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagesConfig {
    pub pages_domain: String,

    pub forgejo_host: String,
    #[serde(default = "default_forgejo_token")]
    pub forgejo_token: String,

    #[serde(default = "default_error_pages_repo")]
    pub error_pages_repo: String,

    #[serde(default = "default_true")]
    pub enable_custom_domains: bool,
    #[serde(default)]
    pub enable_custom_domain_dns_verification: bool,

    pub redis_host: String,
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,
    #[serde(default)]
    pub redis_password: String,
    #[serde(default = "default_redis_pool_size")]
    pub redis_pool_size: usize,
    #[serde(default = "default_redis_max_connections")]
    pub redis_max_connections: usize,
    #[serde(default = "default_redis_conn_wait_timeout")]
    pub redis_conn_wait_timeout: u64,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,

    #[serde(default)]
    pub auth_secret_key: String,
    #[serde(default = "default_auth_cookie_duration")]
    pub auth_cookie_duration: u64,

    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    #[serde(default = "default_true")]
    pub traefik_redis_router_enabled: bool,
    #[serde(default = "default_cert_resolver")]
    pub traefik_redis_cert_resolver: String,
    #[serde(default = "default_root_key")]
    pub traefik_redis_root_key: String,
    #[serde(default)]
    pub traefik_redis_router_ttl: u64,
}

fn default_forgejo_token() -> String {
    String::new()
}
fn default_error_pages_repo() -> String {
    String::new()
}
fn default_true() -> bool {
    true
}
fn default_redis_port() -> u16 {
    6379
}
fn default_redis_pool_size() -> usize {
    10
}
fn default_redis_max_connections() -> usize {
    20
}
fn default_redis_conn_wait_timeout() -> u64 {
    5
}
fn default_cache_ttl() -> u64 {
    300
}
fn default_auth_cookie_duration() -> u64 {
    3600
}
fn default_max_redirects() -> usize {
    25
}
fn default_cert_resolver() -> String {
    "letsencrypt-http".to_string()
}
fn default_root_key() -> String {
    "traefik".to_string()
}

impl Default for PagesConfig {
    fn default() -> Self {
        Self {
            pages_domain: String::new(),
            forgejo_host: String::new(),
            forgejo_token: default_forgejo_token(),
            error_pages_repo: default_error_pages_repo(),
            enable_custom_domains: default_true(),
            enable_custom_domain_dns_verification: false,
            redis_host: String::new(),
            redis_port: default_redis_port(),
            redis_password: String::new(),
            redis_pool_size: default_redis_pool_size(),
            redis_max_connections: default_redis_max_connections(),
            redis_conn_wait_timeout: default_redis_conn_wait_timeout(),
            cache_ttl: default_cache_ttl(),
            auth_secret_key: String::new(),
            auth_cookie_duration: default_auth_cookie_duration(),
            max_redirects: default_max_redirects(),
            traefik_redis_router_enabled: default_true(),
            traefik_redis_cert_resolver: default_cert_resolver(),
            traefik_redis_root_key: default_root_key(),
            traefik_redis_router_ttl: 0,
        }
    }
}

impl PagesConfig {
    /// Load from an explicit path, or fall back to a handful of conventional
    /// locations, merging `PAGES_`-prefixed environment overrides on top.
    /// `PAGES_REDIS_POOL_SIZE` overrides `redis_pool_size`, etc; nested keys
    /// would split on `__` but this config has no nested structs.
    pub fn load(config_path: Option<&str>) -> Result<Self, PagesError> {
        let mut figment = Figment::new();

        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        } else {
            for candidate in ["pages.yaml", "/etc/bovine-pages/pages.yaml", "config/pages.yaml"] {
                if std::path::Path::new(candidate).exists() {
                    figment = figment.merge(Yaml::file(candidate));
                    break;
                }
            }
        }

        figment = figment.merge(Env::prefixed("PAGES_").split("__"));

        let config: PagesConfig = figment
            .extract()
            .map_err(|e| PagesError::Config(e.to_string()))?;

        if config.pages_domain.is_empty() {
            return Err(PagesError::Config("pages_domain must be set".to_string()));
        }
        if config.forgejo_host.is_empty() {
            return Err(PagesError::Config("forgejo_host must be set".to_string()));
        }

        Ok(config)
    }
}
