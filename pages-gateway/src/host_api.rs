use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

/// Default request deadline when no caller-supplied deadline is available
/// (§5 "implementation MAY use a default 10 s if the surrounding runtime
/// supplies none").
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum HostApiError {
    #[error("not found")]
    NotFound,
    #[error("upstream error: {0}")]
    Upstream(String),
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    content: String,
}

/// The Git host collaborator, treated as opaque per §1 (out of scope beyond
/// its URL shape). A trait so the classifier/pipeline/branch manager can be
/// exercised against a fake in tests rather than hardwiring a resolver.
#[async_trait]
pub trait HostApi: Send + Sync {
    /// Fetch `path` (repo-relative, e.g. `public/index.html`) at `branch`.
    /// Returns the still-base64-encoded content exactly as the host
    /// reports it (§4.6 decodes it one layer up, in the content pipeline).
    async fn fetch_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> Result<String, HostApiError>;

    /// Fetch a repo-root file (`.pages`, `.redirects`) rather than a
    /// `public/`-rooted content file. Still base64, same host contract.
    async fn fetch_root_file(
        &self,
        owner: &str,
        repo: &str,
        filename: &str,
        branch: &str,
    ) -> Result<String, HostApiError>;

    async fn branch_exists(&self, owner: &str, repo: &str, branch: &str) -> Result<bool, HostApiError>;
}

pub struct ForgejoHostApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl ForgejoHostApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("reqwest client builder should not fail with no custom TLS config");
        Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.token.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.token)
        }
    }

    async fn fetch(&self, owner: &str, repo: &str, repo_path: &str, branch: &str) -> Result<String, HostApiError> {
        let url = if branch.is_empty() {
            format!("{}/api/v1/repos/{}/{}/contents/{}", self.base_url, owner, repo, repo_path)
        } else {
            format!(
                "{}/api/v1/repos/{}/{}/contents/{}?ref={}",
                self.base_url, owner, repo, repo_path, branch
            )
        };
        let req = self.authorize(self.client.get(&url));
        let resp = req
            .send()
            .await
            .map_err(|e| HostApiError::Upstream(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(HostApiError::NotFound);
        }
        if !resp.status().is_success() {
            return Err(HostApiError::Upstream(format!(
                "host returned {}",
                resp.status()
            )));
        }

        let parsed: ContentsResponse = resp
            .json()
            .await
            .map_err(|e| HostApiError::Upstream(e.to_string()))?;
        Ok(parsed.content)
    }
}

#[async_trait]
impl HostApi for ForgejoHostApi {
    async fn fetch_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> Result<String, HostApiError> {
        self.fetch(owner, repo, &format!("public/{path}"), branch).await
    }

    async fn fetch_root_file(
        &self,
        owner: &str,
        repo: &str,
        filename: &str,
        branch: &str,
    ) -> Result<String, HostApiError> {
        self.fetch(owner, repo, filename, branch).await
    }

    async fn branch_exists(&self, owner: &str, repo: &str, branch: &str) -> Result<bool, HostApiError> {
        let url = format!(
            "{}/api/v1/repos/{}/{}/branches/{}",
            self.base_url, owner, repo, branch
        );
        let req = self.authorize(self.client.get(&url));
        let resp = req
            .send()
            .await
            .map_err(|e| HostApiError::Upstream(e.to_string()))?;

        match resp.status() {
            s if s == reqwest::StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            s => Err(HostApiError::Upstream(format!("host returned {s}"))),
        }
    }
}


#[cfg(test)]
pub(crate) use tests::FakeHostApi;
