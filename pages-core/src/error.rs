use thiserror::Error;

/// Unified error type for the pages core.
///
/// Variants map 1:1 onto the error taxonomy: each carries enough context to
/// render a response and to decide whether the failure is client-visible or
/// purely internal (logged, never shown).
#[derive(Error, Debug)]
pub enum PagesError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Protected target, no valid session cookie. Carries the rendered login
    /// page body so the HTTP layer can respond without a second dispatch.
    #[error("auth required")]
    AuthRequired { login_page: String },

    /// Protected target, wrong password submitted on the login form.
    #[error("auth rejected")]
    AuthRejected { login_page: String },

    /// Domain already owned by a different repo. Never surfaced to the
    /// requester directly; callers translate this into whatever response
    /// the call site needs (activation failures are silent, explicit
    /// registration calls may report it).
    #[error("domain conflict: {0}")]
    Conflict(String),

    #[error("DNS verification failed for {domain}")]
    DnsVerificationFailed { domain: String },

    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    /// KV store unreachable or pool exhausted. Internal only — callers must
    /// have already fallen back to local state before this variant is ever
    /// surfaced to a response layer; this is the logging path.
    #[error("dependency degraded: {0}")]
    DependencyDegraded(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl PagesError {
    /// Map to HTTP status code per §7's taxonomy. Internal-only kinds still
    /// get a status here (used for logging context and for
    /// tests asserting non-client-facing handling), but callers of
    /// `Conflict` and `DependencyDegraded` are expected to intercept them
    /// before they become a response.
    pub fn status_code(&self) -> u16 {
        match self {
            PagesError::InvalidRequest(_) => 400,
            PagesError::NotFound(_) => 404,
            PagesError::AuthRequired { .. } => 200,
            PagesError::AuthRejected { .. } => 200,
            PagesError::Conflict(_) => 409,
            PagesError::DnsVerificationFailed { .. } => 400,
            PagesError::UpstreamFailure(_) => 502,
            PagesError::DependencyDegraded(_) => 503,
            PagesError::Config(_) => 500,
            PagesError::Io(_) => 500,
            PagesError::Serde(_) => 500,
        }
    }

    /// JSON error body for the kinds that render as a plain JSON error
    /// (`AuthRequired`/`AuthRejected` carry their own HTML body instead and
    /// should never reach this method in practice).
    pub fn to_json_body(&self) -> Vec<u8> {
        let body = serde_json::json!({"error": self.to_string(), "status": self.status_code()});
        serde_json::to_vec(&body).expect("serde_json::Value always serializes")
    }

    pub fn is_client_facing(&self) -> bool {
        !matches!(
            self,
            PagesError::Conflict(_) | PagesError::DependencyDegraded(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(PagesError::InvalidRequest("x".into()).status_code(), 400);
        assert_eq!(PagesError::NotFound("x".into()).status_code(), 404);
        assert_eq!(
            PagesError::AuthRequired {
                login_page: String::new()
            }
            .status_code(),
            200
        );
        assert_eq!(PagesError::Conflict("x".into()).status_code(), 409);
        assert_eq!(
            PagesError::DnsVerificationFailed {
                domain: "x".into()
            }
            .status_code(),
            400
        );
        assert_eq!(PagesError::UpstreamFailure("x".into()).status_code(), 502);
        assert_eq!(
            PagesError::DependencyDegraded("x".into()).status_code(),
            503
        );
    }

    #[test]
    fn json_body_is_valid_json() {
        let err = PagesError::NotFound("alice/site".into());
        let body = err.to_json_body();
        let parsed: serde_json::Value =
            serde_json::from_slice(&body).expect("to_json_body must produce valid JSON");
        assert_eq!(parsed["status"], 404);
        assert!(parsed["error"].as_str().unwrap().contains("alice/site"));
    }

    #[test]
    fn internal_only_kinds_are_not_client_facing() {
        assert!(!PagesError::Conflict("d".into()).is_client_facing());
        assert!(!PagesError::DependencyDegraded("kv down".into()).is_client_facing());
        assert!(PagesError::NotFound("x".into()).is_client_facing());
    }
}
