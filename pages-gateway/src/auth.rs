use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Which password a request is being checked against (§4.7): the
/// default/profile/apex `password_hash`, or a branch subdomain's
/// `branches_password_hash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PasswordKind {
    Default,
    Branch,
}

pub fn scope_for(owner: &str, repo: &str, kind: PasswordKind) -> String {
    match kind {
        PasswordKind::Default => format!("pages_auth_{owner}_{repo}"),
        PasswordKind::Branch => format!("pages_branch_auth_{owner}_{repo}"),
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn sha256_hex(input: &str) -> String {
    to_hex(&Sha256::digest(input.as_bytes()))
}

fn compute_mac(scope: &str, secret: &str, ts: u64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts a key of any length");
    mac.update(format!("{scope}:{ts}").as_bytes());
    to_hex(&mac.finalize().into_bytes())
}

/// Sign a session cookie value for `scope` at time `now`. A missing secret
/// degrades to an unsigned `ts`-only cookie (§4.7: "permitted but
/// discouraged").
pub fn sign_cookie(scope: &str, secret: &str, now: u64) -> String {
    if secret.is_empty() {
        return now.to_string();
    }
    format!("{now}|{}", compute_mac(scope, secret, now))
}

/// Verify a cookie value against `scope`. Accepts iff the HMAC is
/// constant-time-equal AND `now - ts <= cookie_duration`; a `ts` in the
/// future is rejected outright (§8 invariant 3: no tampered `ts` is
/// accepted).
pub fn verify_cookie(cookie_value: &str, scope: &str, secret: &str, now: u64, cookie_duration: u64) -> bool {
    if secret.is_empty() {
        let Ok(ts) = cookie_value.parse::<u64>() else {
            return false;
        };
        return ts <= now && now - ts <= cookie_duration;
    }

    let Some((ts_str, mac_hex)) = cookie_value.split_once('|') else {
        return false;
    };
    let Ok(ts) = ts_str.parse::<u64>() else {
        return false;
    };
    if ts > now || now - ts > cookie_duration {
        return false;
    }

    let expected = compute_mac(scope, secret, ts);
    expected.as_bytes().ct_eq(mac_hex.as_bytes()).into()
}

/// Check a submitted password against a stored hash (§4.7: case-insensitive
/// on hex).
pub fn password_matches(submitted: &str, stored_hash: &str) -> bool {
    sha256_hex(submitted).eq_ignore_ascii_case(stored_hash)
}

pub fn cookie_attributes(cookie_duration: u64) -> String {
    format!("HttpOnly; Secure; SameSite=Strict; Path=/; Max-Age={cookie_duration}")
}

/// Minimal inline login page; re-rendered with an error message on a failed
/// `POST` (§4.7).
pub fn render_login_page(scope: &str, error: Option<&str>) -> String {
    let error_html = error
        .map(|e| format!("<p class=\"error\">{e}</p>"))
        .unwrap_or_default();
    format!(
        "<!doctype html><html><head><title>Protected site</title></head><body>\
         <h1>This site is password protected</h1>{error_html}\
         <form method=\"post\"><input type=\"password\" name=\"password\" autofocus>\
         <input type=\"hidden\" name=\"scope\" value=\"{scope}\">\
         <button type=\"submit\">Enter</button></form></body></html>"
    )
}

/// Supplies the currently-configured password hash for a repo, so the
/// cache below doesn't need to know how `.pages` is fetched or parsed.
#[async_trait]
pub trait PasswordHashSource: Send + Sync {
    async fn password_hash(&self, owner: &str, repo: &str, kind: PasswordKind) -> Option<String>;
}

/// 60 s TTL cache in front of a `PasswordHashSource`, to bound `.pages`
/// reads on hot paths (§4.7).
pub struct PasswordHashCache {
    source: std::sync::Arc<dyn PasswordHashSource>,
    ttl: Duration,
    entries: Mutex<HashMap<(String, String, PasswordKind), (Option<String>, Instant)>>,
}

impl PasswordHashCache {
    pub fn new(source: std::sync::Arc<dyn PasswordHashSource>) -> Self {
        Self::with_ttl(source, Duration::from_secs(60))
    }

    pub fn with_ttl(source: std::sync::Arc<dyn PasswordHashSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, owner: &str, repo: &str, kind: PasswordKind) -> Option<String> {
        let key = (owner.to_string(), repo.to_string(), kind);
        if let Some((hash, fetched_at)) = self.entries.lock().unwrap().get(&key) {
            if fetched_at.elapsed() < self.ttl {
                return hash.clone();
            }
        }

        let hash = self.source.password_hash(owner, repo, kind).await;
        self.entries
            .lock()
            .unwrap()
            .insert(key, (hash.clone(), Instant::now()));
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_strings_match_the_spec_format() {
        assert_eq!(scope_for("alice", "site", PasswordKind::Default), "pages_auth_alice_site");
        assert_eq!(scope_for("alice", "site", PasswordKind::Branch), "pages_branch_auth_alice_site");
    }

    #[test]
    fn signed_cookie_round_trips() {
        let cookie = sign_cookie("pages_auth_alice_site", "topsecret", 1_000);
        assert!(verify_cookie(&cookie, "pages_auth_alice_site", "topsecret", 1_100, 3600));
    }

    #[test]
    fn expired_cookie_is_rejected() {
        let cookie = sign_cookie("pages_auth_alice_site", "topsecret", 1_000);
        assert!(!verify_cookie(&cookie, "pages_auth_alice_site", "topsecret", 5_000, 3600));
    }

    #[test]
    fn wrong_scope_is_rejected_even_with_a_valid_signature() {
        let cookie = sign_cookie("pages_auth_alice_site", "topsecret", 1_000);
        assert!(!verify_cookie(&cookie, "pages_branch_auth_alice_site", "topsecret", 1_100, 3600));
    }

    #[test]
    fn tampered_timestamp_is_rejected() {
        let cookie = sign_cookie("pages_auth_alice_site", "topsecret", 1_000);
        let (_, mac) = cookie.split_once('|').unwrap();
        let tampered = format!("9999|{mac}");
        assert!(!verify_cookie(&tampered, "pages_auth_alice_site", "topsecret", 9999, 3600));
    }

    #[test]
    fn missing_secret_degrades_to_unsigned_cookie() {
        let cookie = sign_cookie("pages_auth_alice_site", "", 1_000);
        assert_eq!(cookie, "1000");
        assert!(verify_cookie(&cookie, "pages_auth_alice_site", "", 1_100, 3600));
    }

    #[test]
    fn password_match_is_case_insensitive_on_hex() {
        let hash = sha256_hex("s3cret");
        assert!(password_matches("s3cret", &hash.to_ascii_uppercase()));
        assert!(!password_matches("wrong", &hash));
    }

    #[tokio::test]
    async fn password_hash_cache_serves_fresh_entries_without_refetching() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        struct CountingSource {
            calls: AtomicUsize,
        }
        #[async_trait]
        impl PasswordHashSource for CountingSource {
            async fn password_hash(&self, _owner: &str, _repo: &str, _kind: PasswordKind) -> Option<String> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Some("abc123".to_string())
            }
        }

        let source = Arc::new(CountingSource { calls: AtomicUsize::new(0) });
        let cache = PasswordHashCache::new(source.clone());

        let first = cache.get("alice", "site", PasswordKind::Default).await;
        let second = cache.get("alice", "site", PasswordKind::Default).await;
        assert_eq!(first, Some("abc123".to_string()));
        assert_eq!(second, Some("abc123".to_string()));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn password_hash_cache_refetches_after_ttl_expiry() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        struct CountingSource {
            calls: AtomicUsize,
        }
        #[async_trait]
        impl PasswordHashSource for CountingSource {
            async fn password_hash(&self, _owner: &str, _repo: &str, _kind: PasswordKind) -> Option<String> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Some("abc123".to_string())
            }
        }

        let source = Arc::new(CountingSource { calls: AtomicUsize::new(0) });
        let cache = PasswordHashCache::with_ttl(source.clone(), Duration::from_millis(10));

        cache.get("alice", "site", PasswordKind::Default).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.get("alice", "site", PasswordKind::Default).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn scenario_s5_branch_password_flow() {
        let hash = sha256_hex("s3cret");
        assert!(password_matches("s3cret", &hash));
        let scope = scope_for("alice", "site", PasswordKind::Branch);
        assert_eq!(scope, "pages_branch_auth_alice_site");
        let cookie = sign_cookie(&scope, "server-secret", 1_000);
        assert!(verify_cookie(&cookie, &scope, "server-secret", 1_050, 3600));
        // same cookie under the default scope (apex) must not verify — scope mismatch.
        let default_scope = scope_for("alice", "site", PasswordKind::Default);
        assert!(!verify_cookie(&cookie, &default_scope, "server-secret", 1_050, 3600));
    }
}
