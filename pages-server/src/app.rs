use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Host, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use dashmap::DashMap;
use serde_json::json;
use tower_http::trace::TraceLayer;

use pages_core::{parse_redirects, PagesConfig, PagesError, RepoConfig};
use pages_gateway::{
    classify, cookie_attributes, password_matches, register_branches, render_login_page, scope_for,
    sign_cookie, verify_cookie, ContentPipeline, DomainRegistry, HostApi, PasswordHashCache,
    PasswordHashSource, PasswordKind, RequestKind, DEFAULT_BRANCH_KEY,
};

pub struct AppState {
    pub config: Arc<PagesConfig>,
    pub registry: Arc<DomainRegistry>,
    pub pipeline: Arc<ContentPipeline>,
    pub host_api: Arc<dyn HostApi>,
    pub password_cache: Arc<PasswordHashCache>,
    /// In-process marker of repos that have already gone through the
    /// default-URL activation path (§4.5 kind 4), so a hot default-repo
    /// path doesn't re-fetch `.pages` on every request.
    activated: DashMap<(String, String), ()>,
}

impl AppState {
    pub fn new(
        config: Arc<PagesConfig>,
        registry: Arc<DomainRegistry>,
        pipeline: Arc<ContentPipeline>,
        host_api: Arc<dyn HostApi>,
    ) -> Self {
        let password_cache = Arc::new(PasswordHashCache::new(Arc::new(RepoConfigSource {
            host_api: host_api.clone(),
        })));
        Self {
            config,
            registry,
            pipeline,
            host_api,
            password_cache,
            activated: DashMap::new(),
        }
    }
}

/// Fetches `.pages` on demand and extracts the hash `PasswordHashCache`
/// asked for; the 60 s TTL above this is what actually bounds host calls.
struct RepoConfigSource {
    host_api: Arc<dyn HostApi>,
}

#[async_trait]
impl PasswordHashSource for RepoConfigSource {
    async fn password_hash(&self, owner: &str, repo: &str, kind: PasswordKind) -> Option<String> {
        let raw = self.host_api.fetch_root_file(owner, repo, ".pages", DEFAULT_BRANCH_KEY).await.ok()?;
        let decoded = BASE64.decode(raw.trim()).ok()?;
        let yaml = String::from_utf8(decoded).ok()?;
        let cfg = RepoConfig::parse(&yaml).ok()?;
        match kind {
            PasswordKind::Default => cfg.password_hash().map(str::to_string),
            PasswordKind::Branch => cfg.branches_password_hash().map(str::to_string),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", any(healthz))
        .route("/readyz", any(readyz))
        .fallback(any(handle))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> Response {
    (StatusCode::OK, axum::Json(json!({"status": "ok"}))).into_response()
}

async fn readyz(State(state): State<Arc<AppState>>) -> Response {
    match state.registry.resolve("readyz.invalid.internal").await {
        Ok(_) => (StatusCode::OK, axum::Json(json!({"status": "ready"}))).into_response(),
        Err(PagesError::DependencyDegraded(_)) => {
            (StatusCode::OK, axum::Json(json!({"status": "degraded", "kv": "unreachable"}))).into_response()
        }
        Err(_) => (StatusCode::OK, axum::Json(json!({"status": "ready"}))).into_response(),
    }
}

async fn handle(
    State(state): State<Arc<AppState>>,
    method: Method,
    Host(host): Host,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path();
    let kind = match classify(&state.registry, &state.config.pages_domain, &host, path).await {
        Ok(k) => k,
        Err(e) => return error_response(e),
    };

    match kind {
        RequestKind::AcmeChallenge { .. } => {
            (StatusCode::NOT_FOUND, "acme challenge not handled by this core").into_response()
        }
        RequestKind::Landing => serve_landing(&state).await,
        RequestKind::Profile { user, path } => {
            if let Some(resp) = auth_gate(&state, &user, ".profile", PasswordKind::Default, &method, &headers, &body, uri.path()).await {
                return resp;
            }
            content_response(state.pipeline.serve(&user, ".profile", DEFAULT_BRANCH_KEY, &path).await, cache_ttl(&state))
        }
        RequestKind::DefaultRepo { user, repo, path } => {
            maybe_activate(&state, &user, &repo).await;
            if let Some(resp) = auth_gate(&state, &user, &repo, PasswordKind::Default, &method, &headers, &body, uri.path()).await {
                return resp;
            }
            content_response(state.pipeline.serve(&user, &repo, DEFAULT_BRANCH_KEY, &path).await, cache_ttl(&state))
        }
        RequestKind::BranchSubdomain { owner, repo, branch, path } => {
            if let Some(resp) = auth_gate(&state, &owner, &repo, PasswordKind::Branch, &method, &headers, &body, uri.path()).await {
                return resp;
            }
            content_response(state.pipeline.serve(&owner, &repo, &branch, &path).await, cache_ttl(&state))
        }
        RequestKind::CustomApex { owner, repo, path } => {
            if let Some(resp) = redirect_response(&state, &owner, &repo, &path).await {
                return resp;
            }
            if let Some(resp) = auth_gate(&state, &owner, &repo, PasswordKind::Default, &method, &headers, &body, uri.path()).await {
                return resp;
            }
            content_response(state.pipeline.serve(&owner, &repo, DEFAULT_BRANCH_KEY, &path).await, cache_ttl(&state))
        }
        RequestKind::NotFound => content_response(state.pipeline.not_found_response().await, cache_ttl(&state)),
    }
}

async fn serve_landing(state: &AppState) -> Response {
    let Some((owner, repo)) = state.config.error_pages_repo.split_once('/') else {
        return error_response(PagesError::InvalidRequest("no landing page configured".to_string()));
    };
    content_response(state.pipeline.serve(owner, repo, DEFAULT_BRANCH_KEY, "/").await, cache_ttl(state))
}

/// Kind-4 activation (§4.5): on a default-URL hit for a repo this process
/// hasn't seen yet, read `.pages` and register its custom domain / branch
/// subdomains. Failures are logged and otherwise swallowed — the request
/// being served right now does not depend on activation succeeding.
async fn maybe_activate(state: &AppState, owner: &str, repo: &str) {
    let key = (owner.to_string(), repo.to_string());
    if state.activated.contains_key(&key) {
        return;
    }
    state.activated.insert(key, ());

    let Ok(raw) = state.host_api.fetch_root_file(owner, repo, ".pages", DEFAULT_BRANCH_KEY).await else {
        return;
    };
    let Ok(decoded) = BASE64.decode(raw.trim()) else {
        return;
    };
    let Ok(yaml) = String::from_utf8(decoded) else {
        return;
    };
    let Ok(cfg) = RepoConfig::parse(&yaml) else {
        return;
    };
    if !cfg.enabled {
        return;
    }
    let Some(domain) = cfg.custom_domain.as_deref().filter(|d| !d.is_empty()) else {
        return;
    };
    if !state.config.enable_custom_domains {
        return;
    }

    match state.registry.register(domain, owner, repo, None).await {
        Ok(()) => {
            register_branches(
                state.host_api.as_ref(),
                &state.registry,
                owner,
                repo,
                domain,
                cfg.effective_enable_branches(),
            )
            .await;
        }
        Err(e) => {
            tracing::warn!(owner, repo, domain, error = %e, "custom domain activation failed");
        }
    }
}

async fn redirect_response(state: &AppState, owner: &str, repo: &str, path: &str) -> Option<Response> {
    let raw = state.host_api.fetch_root_file(owner, repo, ".redirects", DEFAULT_BRANCH_KEY).await.ok()?;
    let decoded = BASE64.decode(raw.trim()).ok()?;
    let body = String::from_utf8(decoded).ok()?;
    let rules = parse_redirects(&body, state.config.max_redirects);
    let rule = rules.iter().find(|r| r.from == path)?;
    Some(
        Response::builder()
            .status(StatusCode::FOUND)
            .header("Location", rule.to.clone())
            .body(axum::body::Body::empty())
            .unwrap(),
    )
}

/// Returns `Some(response)` when the request should stop here (login
/// page, rejected password, or a freshly-issued-cookie redirect);
/// `None` means the caller should proceed to serve content.
async fn auth_gate(
    state: &AppState,
    owner: &str,
    repo: &str,
    kind: PasswordKind,
    method: &Method,
    headers: &HeaderMap,
    body: &Bytes,
    original_path: &str,
) -> Option<Response> {
    let stored_hash = state.password_cache.get(owner, repo, kind).await?;
    let scope = scope_for(owner, repo, kind);
    let secret = &state.config.auth_secret_key;
    let cookie_duration = state.config.auth_cookie_duration;
    let now = now_secs();

    if let Some(cookie_value) = cookie_value(headers, &scope) {
        if verify_cookie(&cookie_value, &scope, secret, now, cookie_duration) {
            return None;
        }
    }

    if *method == Method::POST {
        let form = parse_form(body);
        if let Some(submitted) = form.get("password") {
            if password_matches(submitted, &stored_hash) {
                let cookie = sign_cookie(&scope, secret, now);
                let set_cookie = format!("{scope}={cookie}; {}", cookie_attributes(cookie_duration));
                return Some(
                    Response::builder()
                        .status(StatusCode::FOUND)
                        .header("Location", original_path)
                        .header("Set-Cookie", set_cookie)
                        .body(axum::body::Body::empty())
                        .unwrap(),
                );
            }
            let page = render_login_page(&scope, Some("Incorrect password"));
            return Some((StatusCode::OK, axum::response::Html(page)).into_response());
        }
    }

    let page = render_login_page(&scope, None);
    Some((StatusCode::OK, axum::response::Html(page)).into_response())
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}

fn parse_form(body: &Bytes) -> std::collections::HashMap<String, String> {
    url::form_urlencoded::parse(body).into_owned().collect()
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

fn cache_ttl(state: &AppState) -> std::time::Duration {
    std::time::Duration::from_secs(state.config.cache_ttl)
}

fn content_response(resp: pages_gateway::PipelineResponse, cache_ttl: std::time::Duration) -> Response {
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let headers = resp.headers(cache_ttl);
    let mut builder = Response::builder().status(status);
    for (k, v) in headers {
        builder = builder.header(k, v);
    }
    builder.body(axum::body::Body::from(resp.body)).unwrap()
}

fn error_response(err: PagesError) -> Response {
    match err {
        PagesError::AuthRequired { login_page } | PagesError::AuthRejected { login_page } => {
            (StatusCode::OK, axum::response::Html(login_page)).into_response()
        }
        other => {
            let status = StatusCode::from_u16(other.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, axum::Json(serde_json::from_slice::<serde_json::Value>(&other.to_json_body()).unwrap())).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use pages_gateway::sha256_hex;
    use pages_kv::{Cache, KvPool};

    struct FakeHostApi {
        files: Mutex<HashMap<(String, String, String), String>>,
    }

    impl FakeHostApi {
        fn new() -> Self {
            Self {
                files: Mutex::new(HashMap::new()),
            }
        }

        fn with_root_file(self, owner: &str, repo: &str, filename: &str, base64_content: &str) -> Self {
            self.files.lock().unwrap().insert(
                (owner.to_string(), repo.to_string(), filename.to_string()),
                base64_content.to_string(),
            );
            self
        }

        fn with_content(self, owner: &str, repo: &str, path: &str, base64_content: &str) -> Self {
            self.files.lock().unwrap().insert(
                (owner.to_string(), repo.to_string(), format!("public/{path}")),
                base64_content.to_string(),
            );
            self
        }
    }

    #[async_trait]
    impl HostApi for FakeHostApi {
        async fn fetch_content(&self, owner: &str, repo: &str, path: &str, _branch: &str) -> Result<String, pages_gateway::HostApiError> {
            self.files
                .lock()
                .unwrap()
                .get(&(owner.to_string(), repo.to_string(), format!("public/{path}")))
                .cloned()
                .ok_or(pages_gateway::HostApiError::NotFound)
        }

        async fn fetch_root_file(&self, owner: &str, repo: &str, filename: &str, _branch: &str) -> Result<String, pages_gateway::HostApiError> {
            self.files
                .lock()
                .unwrap()
                .get(&(owner.to_string(), repo.to_string(), filename.to_string()))
                .cloned()
                .ok_or(pages_gateway::HostApiError::NotFound)
        }

        async fn branch_exists(&self, _owner: &str, _repo: &str, _branch: &str) -> Result<bool, pages_gateway::HostApiError> {
            Ok(false)
        }
    }

    /// Registry never gets touched by a `DefaultRepo`/`Profile` classification
    /// (those are resolved purely from host/path shape), so it's wired to an
    /// unreachable KV pool — the test fails loudly if that assumption breaks.
    fn unreachable_registry() -> Arc<DomainRegistry> {
        struct NoDns;
        #[async_trait]
        impl pages_gateway::DnsVerifier for NoDns {
            async fn txt_records(&self, _domain: &str) -> Vec<String> {
                vec![]
            }
        }
        let kv = Arc::new(KvPool::new("127.0.0.1", 1, "", 1, 0, Duration::from_millis(10)));
        Arc::new(DomainRegistry::new(kv, Arc::new(NoDns), false, false, "r", "traefik", 0))
    }

    fn test_state(host_api: Arc<dyn HostApi>) -> Arc<AppState> {
        let config = Arc::new(PagesConfig {
            pages_domain: "pages.example.com".to_string(),
            ..PagesConfig::default()
        });
        let cache = Arc::new(Cache::new(None));
        let pipeline = Arc::new(ContentPipeline::new(cache, host_api.clone(), None, Duration::from_secs(60)));
        Arc::new(AppState::new(config, unreachable_registry(), pipeline, host_api))
    }

    fn get(uri: &str, host: &str) -> (Method, Host, Uri, HeaderMap, Bytes) {
        (Method::GET, Host(host.to_string()), uri.parse().unwrap(), HeaderMap::new(), Bytes::new())
    }

    #[tokio::test]
    async fn default_repo_url_is_gated_when_pages_file_sets_a_password() {
        let password_hash = sha256_hex("secret");
        let pages_yaml = format!("password: \"{password_hash}\"\n");
        let host_api: Arc<dyn HostApi> = Arc::new(
            FakeHostApi::new()
                .with_root_file("alice", "site", ".pages", &BASE64.encode(pages_yaml))
                .with_content("alice", "site", "index.html", &BASE64.encode("hello")),
        );
        let state = test_state(host_api);
        let (method, host, uri, headers, body) = get("/site/index.html", "alice.pages.example.com");
        let resp = handle(State(state), method, host, uri, headers, body).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let rendered = String::from_utf8(body.to_vec()).unwrap();
        assert!(rendered.contains("password"), "expected a login page, got: {rendered}");
        assert!(!rendered.contains("hello"), "content must not be served without a valid cookie");
    }

    #[tokio::test]
    async fn default_repo_url_serves_content_directly_when_no_password_is_set() {
        let host_api: Arc<dyn HostApi> = Arc::new(
            FakeHostApi::new()
                .with_root_file("alice", "site", ".pages", &BASE64.encode(""))
                .with_content("alice", "site", "index.html", &BASE64.encode("hello")),
        );
        let state = test_state(host_api);
        let (method, host, uri, headers, body) = get("/site/index.html", "alice.pages.example.com");
        let resp = handle(State(state), method, host, uri, headers, body).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(String::from_utf8(body.to_vec()).unwrap(), "hello");
    }

    #[tokio::test]
    async fn profile_url_is_gated_when_pages_file_sets_a_password() {
        let password_hash = sha256_hex("secret");
        let pages_yaml = format!("password: \"{password_hash}\"\n");
        let host_api: Arc<dyn HostApi> = Arc::new(
            FakeHostApi::new()
                .with_root_file("alice", ".profile", ".pages", &BASE64.encode(pages_yaml))
                .with_content("alice", ".profile", "index.html", &BASE64.encode("profile page")),
        );
        let state = test_state(host_api);
        let (method, host, uri, headers, body) = get("/", "alice.pages.example.com");
        let resp = handle(State(state), method, host, uri, headers, body).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let rendered = String::from_utf8(body.to_vec()).unwrap();
        assert!(rendered.contains("password"), "expected a login page, got: {rendered}");
        assert!(!rendered.contains("profile page"), "content must not be served without a valid cookie");
    }
}
