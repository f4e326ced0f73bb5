/// One parsed rule from a `.redirects` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectRule {
    pub from: String,
    pub to: String,
}

/// Parse a `.redirects` file (§6): one `FROM:TO` rule per line, blank lines
/// and `#`-prefixed comments ignored, capped at `max_redirects`. Rules past
/// the cap are dropped, not an error — redirects only apply on custom
/// domains and a misconfigured repo should still serve, just with a
/// truncated rule set.
pub fn parse_redirects(body: &str, max_redirects: usize) -> Vec<RedirectRule> {
    let mut rules = Vec::new();
    for line in body.lines() {
        if rules.len() >= max_redirects {
            break;
        }
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((from, to)) = line.split_once(':') else {
            continue;
        };
        let from = from.trim();
        let to = to.trim();
        if from.is_empty() || to.is_empty() {
            continue;
        }
        rules.push(RedirectRule {
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    rules
}
