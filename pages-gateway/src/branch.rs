use std::collections::HashSet;

use pages_core::error::PagesError;

use crate::host_api::HostApi;
use crate::registry::DomainRegistry;

/// Sanitise a branch name into a DNS label (§4.4): lowercase; replace `/`,
/// `_`, `.` with `-`; strip anything outside `[a-z0-9-]`; collapse runs of
/// `-`; trim leading/trailing `-`; truncate to 63 chars. An empty result is
/// rejected.
pub fn sanitise_branch(branch: &str) -> Result<String, PagesError> {
    let lowered = branch.to_ascii_lowercase();
    let replaced: String = lowered
        .chars()
        .map(|c| if matches!(c, '/' | '_' | '.') { '-' } else { c })
        .collect();
    let stripped: String = replaced
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect();

    let mut collapsed = String::with_capacity(stripped.len());
    let mut prev_dash = false;
    for c in stripped.chars() {
        if c == '-' {
            if !prev_dash {
                collapsed.push(c);
            }
            prev_dash = true;
        } else {
            collapsed.push(c);
            prev_dash = false;
        }
    }

    let trimmed = collapsed.trim_matches('-');
    let truncated: String = trimmed.chars().take(63).collect();
    let truncated = truncated.trim_end_matches('-').to_string();

    if truncated.is_empty() {
        return Err(PagesError::InvalidRequest(format!(
            "UnsanitisableBranchName: {branch}"
        )));
    }
    Ok(truncated)
}

/// Register branch subdomains for a repo that has just been (re-)activated
/// on its custom domain (§4.4). Returns the labels that were successfully
/// bound; branches that fail existence checks or collide are skipped with a
/// warning, never aborting the whole registration.
pub async fn register_branches(
    host_api: &dyn HostApi,
    registry: &DomainRegistry,
    owner: &str,
    repo: &str,
    custom_domain: &str,
    enable_branches: &[String],
) -> Vec<String> {
    let mut seen_labels: HashSet<String> = HashSet::new();
    let mut bound = Vec::new();

    for branch in enable_branches {
        match host_api.branch_exists(owner, repo, branch).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(owner, repo, branch, "branch does not exist on host, skipping");
                continue;
            }
            Err(e) => {
                tracing::warn!(owner, repo, branch, error = %e, "branch existence check failed, skipping");
                continue;
            }
        }

        let label = match sanitise_branch(branch) {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(owner, repo, branch, error = %e, "branch name unsanitisable, skipping");
                continue;
            }
        };

        if !seen_labels.insert(label.clone()) {
            tracing::warn!(owner, repo, branch, label, "branch label collides with another branch of the same repo, skipping");
            continue;
        }

        let subdomain = format!("{label}.{custom_domain}");
        match registry
            .register(&subdomain, owner, repo, Some(branch.clone()))
            .await
        {
            Ok(()) => bound.push(label),
            Err(PagesError::Conflict(_)) => {
                tracing::error!(owner, repo, branch, subdomain, "branch subdomain owned by a different repo, skipping");
            }
            Err(e) => {
                tracing::error!(owner, repo, branch, subdomain, error = %e, "branch subdomain registration failed, skipping");
            }
        }
    }

    bound
}
