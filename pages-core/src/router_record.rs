/// A Traefik-style KV router record (§6), one per registered domain or
/// branch subdomain. Rendered as a flat list of `(key, value)` pairs under
/// `<root>/http/routers/<id>/*` — the fronting proxy polls this namespace to
/// discover virtual hosts and request a TLS certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterRecord {
    pub id: String,
    pub domain: String,
    pub cert_resolver: String,
    /// Seconds; `0` means persistent (no TTL set on the KV keys).
    pub ttl: u64,
}

impl RouterRecord {
    pub fn new(id: impl Into<String>, domain: impl Into<String>, cert_resolver: impl Into<String>, ttl: u64) -> Self {
        Self {
            id: id.into(),
            domain: domain.into(),
            cert_resolver: cert_resolver.into(),
            ttl,
        }
    }

    /// Build a deterministic router id from a domain: router ids must be
    /// valid path segments, so dots become dashes.
    pub fn id_for_domain(domain: &str) -> String {
        domain.replace('.', "-")
    }

    /// Render the record as the flat KV entries Traefik's Redis provider
    /// expects, prefixed by `root` (the configured `traefik_redis_root_key`).
    pub fn entries(&self, root: &str) -> Vec<(String, String)> {
        let base = format!("{root}/http/routers/{id}", id = self.id);
        vec![
            (format!("{base}/rule"), format!("Host(\"{}\")", self.domain)),
            (format!("{base}/entryPoints/0"), "websecure".to_string()),
            (format!("{base}/middlewares/0"), "pages-server".to_string()),
            (format!("{base}/service"), "noop@internal".to_string()),
            (
                format!("{base}/tls/certResolver"),
                self.cert_resolver.clone(),
            ),
        ]
    }

    /// KV key prefix covering every key this record writes — used by the
    /// Registry to delete the whole record in one `flush_prefix`/`del` pass.
    pub fn key_prefix(&self, root: &str) -> String {
        format!("{root}/http/routers/{}", self.id)
    }
}
