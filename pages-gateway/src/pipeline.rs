use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use pages_kv::Cache;

use crate::classify::canonicalise_path;
use crate::host_api::{HostApi, HostApiError};

pub const DEFAULT_BRANCH_KEY: &str = "";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn header_value(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

pub struct PipelineResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
    pub cache_status: CacheStatus,
}

impl PipelineResponse {
    /// Response headers common to every content-pipeline response (§4.6):
    /// `Server`, `X-Cache-Status`, `Content-Type`, and (on 200) a
    /// `Cache-Control` driven by the configured TTL.
    pub fn headers(&self, cache_ttl: Duration) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Server".to_string(), "bovine".to_string()),
            (
                "X-Cache-Status".to_string(),
                self.cache_status.header_value().to_string(),
            ),
            ("Content-Type".to_string(), self.content_type.clone()),
        ];
        if self.status == 200 {
            headers.push((
                "Cache-Control".to_string(),
                format!("public, max-age={}", cache_ttl.as_secs()),
            ));
        }
        headers
    }
}

pub struct ContentPipeline {
    cache: Arc<Cache>,
    host_api: Arc<dyn HostApi>,
    /// `(owner, repo)` of the configured error-pages source, if any.
    error_pages_repo: Option<(String, String)>,
    cache_ttl: Duration,
}

impl ContentPipeline {
    pub fn new(
        cache: Arc<Cache>,
        host_api: Arc<dyn HostApi>,
        error_pages_repo: Option<(String, String)>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            cache,
            host_api,
            error_pages_repo,
            cache_ttl,
        }
    }

    fn cache_key(owner: &str, repo: &str, branch: &str, path: &str) -> String {
        format!("{owner}:{repo}:{branch}:{path}")
    }

    /// Serve `raw_path` from `(owner, repo, branch)`. `branch` is
    /// `DEFAULT_BRANCH_KEY` (`""`) for the repository's default branch —
    /// the cache-key component is always an explicit empty string, never
    /// threaded as `Option::None` (resolved Open Question, see DESIGN.md).
    pub async fn serve(&self, owner: &str, repo: &str, branch: &str, raw_path: &str) -> PipelineResponse {
        let path = match canonicalise_path(raw_path) {
            Ok(p) => p,
            Err(_) => return self.not_found().await,
        };

        let key = Self::cache_key(owner, repo, branch, &path);
        if let Some((bytes, content_type)) = self.cache.get(&key).await {
            return PipelineResponse {
                status: 200,
                content_type,
                body: bytes,
                cache_status: CacheStatus::Hit,
            };
        }

        match self.host_api.fetch_content(owner, repo, &path, branch).await {
            Ok(base64_body) => {
                let Ok(decoded) = BASE64.decode(base64_body.trim()) else {
                    tracing::warn!(owner, repo, branch, path, "host returned invalid base64 content");
                    return self.upstream_failure().await;
                };
                let content_type = mime_guess::from_path(&path)
                    .first_raw()
                    .unwrap_or("application/octet-stream")
                    .to_string();

                self.cache
                    .set(&key, decoded.clone(), content_type.clone(), self.cache_ttl)
                    .await;

                PipelineResponse {
                    status: 200,
                    content_type,
                    body: decoded,
                    cache_status: CacheStatus::Miss,
                }
            }
            Err(HostApiError::NotFound) => self.not_found().await,
            Err(HostApiError::Upstream(e)) => {
                tracing::warn!(owner, repo, branch, path, error = %e, "host API upstream failure");
                self.upstream_failure().await
            }
        }
    }

    /// Public entry point for callers outside the pipeline (e.g. the
    /// request router) that need the same 404 fallback for a request kind
    /// the classifier rejected outright.
    pub async fn not_found_response(&self) -> PipelineResponse {
        self.not_found().await
    }

    async fn not_found(&self) -> PipelineResponse {
        if let Some(body) = self.fetch_error_page("404.html").await {
            return PipelineResponse {
                status: 404,
                content_type: "text/html".to_string(),
                body,
                cache_status: CacheStatus::Miss,
            };
        }
        PipelineResponse {
            status: 404,
            content_type: "text/plain".to_string(),
            body: b"404 Not Found".to_vec(),
            cache_status: CacheStatus::Miss,
        }
    }

    async fn upstream_failure(&self) -> PipelineResponse {
        if let Some(body) = self.fetch_error_page("502.html").await {
            return PipelineResponse {
                status: 502,
                content_type: "text/html".to_string(),
                body,
                cache_status: CacheStatus::Miss,
            };
        }
        PipelineResponse {
            status: 502,
            content_type: "text/plain".to_string(),
            body: b"502 Bad Gateway".to_vec(),
            cache_status: CacheStatus::Miss,
        }
    }

    async fn fetch_error_page(&self, file: &str) -> Option<Vec<u8>> {
        let (owner, repo) = self.error_pages_repo.as_ref()?;
        let base64_body = self
            .host_api
            .fetch_content(owner, repo, file, DEFAULT_BRANCH_KEY)
            .await
            .ok()?;
        BASE64.decode(base64_body.trim()).ok()
    }
}
