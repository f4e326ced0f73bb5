use pages_core::error::PagesError;

use crate::registry::DomainRegistry;

const ACME_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// One of the six request kinds from §4.5, in resolution order. `NotFound`
/// stands for "anything else" (kind 7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    AcmeChallenge { path: String },
    Landing,
    Profile { user: String, path: String },
    DefaultRepo { user: String, repo: String, path: String },
    BranchSubdomain { owner: String, repo: String, branch: String, path: String },
    CustomApex { owner: String, repo: String, path: String },
    NotFound,
}

/// Classify a request by `Host` and path. Kinds 1-4 are resolved purely
/// from host/path shape; kinds 5-6 require a Domain Registry lookup and are
/// distinguished only by whether the resolved binding names a branch
/// (§4.5: "the registry key is unique per full domain; no heuristic
/// matching").
pub async fn classify(
    registry: &DomainRegistry,
    pages_domain: &str,
    host: &str,
    path: &str,
) -> Result<RequestKind, PagesError> {
    if let Some(rest) = path.strip_prefix(ACME_CHALLENGE_PREFIX) {
        return Ok(RequestKind::AcmeChallenge {
            path: rest.to_string(),
        });
    }

    let host = host.to_ascii_lowercase();
    let pages_domain = pages_domain.to_ascii_lowercase();

    if host == pages_domain {
        return Ok(RequestKind::Landing);
    }

    if let Some(user) = host.strip_suffix(&format!(".{pages_domain}")) {
        if !user.is_empty() && !user.contains('.') {
            if path.is_empty() || path == "/" {
                return Ok(RequestKind::Profile {
                    user: user.to_string(),
                    path: path.to_string(),
                });
            }
            let trimmed = path.trim_start_matches('/');
            if let Some((repo, rest)) = trimmed.split_once('/') {
                return Ok(RequestKind::DefaultRepo {
                    user: user.to_string(),
                    repo: repo.to_string(),
                    path: format!("/{rest}"),
                });
            }
            if !trimmed.is_empty() {
                return Ok(RequestKind::DefaultRepo {
                    user: user.to_string(),
                    repo: trimmed.to_string(),
                    path: "/".to_string(),
                });
            }
        }
    }

    match registry.resolve(&host).await? {
        Some(binding) => match binding.branch {
            Some(branch) => Ok(RequestKind::BranchSubdomain {
                owner: binding.owner,
                repo: binding.repo,
                branch,
                path: path.to_string(),
            }),
            None => Ok(RequestKind::CustomApex {
                owner: binding.owner,
                repo: binding.repo,
                path: path.to_string(),
            }),
        },
        None => Ok(RequestKind::NotFound),
    }
}

/// Canonicalise a request path into a `public/`-relative path (§4.5):
/// empty path becomes `/`; a trailing `/` gets `index.html` appended;
/// `.`/`..` segments are resolved; any path that would escape the `public/`
/// root is rejected.
pub fn canonicalise_path(path: &str) -> Result<String, PagesError> {
    let path = if path.is_empty() { "/" } else { path };
    let with_index = if path.ends_with('/') {
        format!("{path}index.html")
    } else {
        path.to_string()
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in with_index.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                if segments.pop().is_none() {
                    return Err(PagesError::InvalidRequest(
                        "path escapes public/ root".to_string(),
                    ));
                }
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Ok("index.html".to_string());
    }
    Ok(segments.join("/"))
}
