use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tokio::sync::Notify;

use crate::pool::KvPool;

/// In-process cache entry. `expires_at` is an absolute Unix timestamp
/// (seconds) so entries can be serialized to the KV store and repopulate
/// the local tier with the correct remaining TTL on a KV hit (§3, §4.2).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub expires_at: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now
    }

    fn remaining_ttl(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }

    /// Self-describing binary envelope stored as the KV value: an 8-byte
    /// big-endian expiry timestamp, a 2-byte big-endian content-type
    /// length, the content-type bytes, then the raw payload. Binary-safe
    /// payloads pass straight through untouched.
    fn encode(&self) -> Vec<u8> {
        let ct = self.content_type.as_bytes();
        let mut buf = Vec::with_capacity(8 + 2 + ct.len() + self.bytes.len());
        buf.extend_from_slice(&self.expires_at.to_be_bytes());
        buf.extend_from_slice(&(ct.len() as u16).to_be_bytes());
        buf.extend_from_slice(ct);
        buf.extend_from_slice(&self.bytes);
        buf
    }

    fn decode(raw: &[u8]) -> Option<Self> {
        if raw.len() < 10 {
            return None;
        }
        let expires_at = u64::from_be_bytes(raw[0..8].try_into().ok()?);
        let ct_len = u16::from_be_bytes(raw[8..10].try_into().ok()?) as usize;
        let ct_start = 10;
        let ct_end = ct_start.checked_add(ct_len)?;
        if raw.len() < ct_end {
            return None;
        }
        let content_type = std::str::from_utf8(&raw[ct_start..ct_end]).ok()?.to_string();
        let bytes = raw[ct_end..].to_vec();
        Some(Self {
            bytes,
            content_type,
            expires_at,
        })
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Two-tier content cache (§4.2): in-process map first, then the KV store,
/// then miss. A KV hit repopulates the in-process tier so subsequent
/// requests on this instance are served locally. `kv` is `None` when no KV
/// store is configured, or has been observed unreachable recently — the
/// cache then behaves as a pure in-process map (§9 "in-process fallback").
pub struct Cache {
    local: Arc<DashMap<String, CacheEntry>>,
    kv: Option<Arc<KvPool>>,
    shutdown: Arc<Notify>,
}

impl Cache {
    pub fn new(kv: Option<Arc<KvPool>>) -> Self {
        Self {
            local: Arc::new(DashMap::new()),
            kv,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<(Vec<u8>, String)> {
        let now = now_secs();

        if let Some(entry) = self.local.get(key) {
            if !entry.is_expired(now) {
                return Some((entry.bytes.clone(), entry.content_type.clone()));
            }
        }
        self.local.remove(key);

        let Some(pool) = &self.kv else {
            return None;
        };
        let mut borrowed = match pool.borrow().await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "KV borrow failed on cache get, falling back to miss");
                return None;
            }
        };
        let raw = match borrowed.connection().get(key).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "KV GET failed, falling back to miss");
                borrowed.release().await;
                return None;
            }
        };
        borrowed.release().await;

        let Some(raw) = raw else {
            return None;
        };
        let Some(entry) = CacheEntry::decode(&raw) else {
            tracing::warn!("KV cache value failed to decode, treating as miss");
            return None;
        };
        if entry.is_expired(now) {
            return None;
        }

        self.local.insert(
            key.to_string(),
            CacheEntry {
                bytes: entry.bytes.clone(),
                content_type: entry.content_type.clone(),
                expires_at: entry.expires_at,
            },
        );
        Some((entry.bytes, entry.content_type))
    }

    /// Write-through: always writes the in-process tier; best-effort writes
    /// the KV tier (failure is logged, never surfaced — §7 "KV and cache
    /// errors are always recovered locally").
    pub async fn set(&self, key: &str, bytes: Vec<u8>, content_type: String, ttl: Duration) {
        let expires_at = now_secs() + ttl.as_secs();
        let entry = CacheEntry {
            bytes,
            content_type,
            expires_at,
        };
        self.local.insert(key.to_string(), entry.clone());

        let Some(pool) = &self.kv else {
            return;
        };
        match pool.borrow().await {
            Ok(mut borrowed) => {
                let encoded = entry.encode();
                if let Err(e) = borrowed
                    .connection()
                    .setex(key, ttl.as_secs().max(1), &encoded)
                    .await
                {
                    tracing::warn!(error = %e, "KV SETEX failed on cache write-through");
                }
                borrowed.release().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "KV borrow failed on cache write-through");
            }
        }
    }

    pub async fn delete(&self, key: &str) {
        self.local.remove(key);
        let Some(pool) = &self.kv else {
            return;
        };
        if let Ok(mut borrowed) = pool.borrow().await {
            let _ = borrowed.connection().del(key).await;
            borrowed.release().await;
        }
    }

    /// Best-effort prefix flush — only the in-process tier supports true
    /// prefix scanning; the KV tier has no `SCAN` in this minimal command
    /// set, so a KV-backed deployment only gets eventual expiry there (§4.2
    /// "may be unimplemented on the KV path").
    pub fn flush_prefix(&self, prefix: &str) {
        self.local.retain(|k, _| !k.starts_with(prefix));
    }

    /// Spawn the periodic janitor that sweeps expired in-process entries,
    /// bounded to roughly `ttl/10` per §4.2, structured as a `select!`
    /// between the sweep interval and an external shutdown signal so the
    /// task can be stopped cleanly.
    pub fn spawn_janitor(self: &Arc<Self>, ttl: Duration) -> tokio::task::JoinHandle<()> {
        let local = self.local.clone();
        let shutdown = self.shutdown.clone();
        let interval_secs = (ttl.as_secs() / 10).max(1);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let now = now_secs();
                        local.retain(|_, entry| !entry.is_expired(now));
                    }
                    _ = shutdown.notified() => {
                        break;
                    }
                }
            }
        })
    }

    pub fn stop_janitor(&self) {
        self.shutdown.notify_waiters();
    }

    pub fn local_len(&self) -> usize {
        self.local.len()
    }
}
