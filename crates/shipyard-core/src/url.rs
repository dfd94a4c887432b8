use regex::Regex;
use std::sync::OnceLock;

/// Hosts the fallback parser recognizes as repository locations.
pub const KNOWN_HOSTS: &[&str] = &["github.com", "gitlab.com", "bitbucket.org"];

/// Normalize a repository location into a clonable URL.
///
/// Adds `https://` when there is no scheme and the value is not an scp-style
/// `git@host:path`, strips a trailing `/`, appends `.git` when absent.
/// Applying it twice gives the same result as applying it once.
pub fn normalize_repo_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut url = if trimmed.contains("://") || trimmed.starts_with("git@") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    while url.ends_with('/') {
        url.pop();
    }
    if !url.ends_with(".git") {
        url.push_str(".git");
    }
    url
}

fn host_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        KNOWN_HOSTS
            .iter()
            .filter_map(|host| {
                let escaped = regex::escape(host);
                Regex::new(&format!(r"{escaped}[/:]([^/]+)/([^/]+?)(?:\.git)?/?$")).ok()
            })
            .collect()
    })
}

/// Short, filesystem-safe name for a repository: `owner-repo` on known hosts,
/// otherwise the last path segment without `.git`.
pub fn repo_hint(url: &str) -> String {
    let url = url.trim();
    let raw = host_patterns()
        .iter()
        .find_map(|re| {
            re.captures(url)
                .map(|caps| format!("{}-{}", &caps[1], &caps[2]))
        })
        .unwrap_or_else(|| {
            let last = url
                .trim_end_matches('/')
                .rsplit(['/', ':'])
                .next()
                .unwrap_or_default();
            last.trim_end_matches(".git").to_string()
        });

    let sanitized: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.trim_matches('.').to_string();
    if sanitized.is_empty() {
        "repo".to_string()
    } else {
        sanitized
    }
}

/// True if the token mentions one of the known repository hosts.
pub fn mentions_known_host(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    KNOWN_HOSTS.iter().any(|host| lower.contains(host))
}
