use regex::Regex;
use shipyard_core::types::dedup_preserving_order;
use std::sync::OnceLock;

/// Upper bound on failure detail carried in an outcome.
pub const MAX_DETAIL_BYTES: usize = 2000;

/// `<kind>[.<group>]/<name> <verb>` as printed by kubectl, e.g.
/// `deployment.apps/web configured` or `service/my-svc created`.
fn resource_line() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([a-zA-Z0-9.\-/]+)\s+(created|configured|unchanged|deleted)").ok()
    })
    .as_ref()
}

/// Resource identifiers mentioned in kubectl output, first-seen order, no duplicates.
pub fn extract_resource_ids(output: &str) -> Vec<String> {
    let Some(re) = resource_line() else {
        return Vec::new();
    };
    dedup_preserving_order(
        re.captures_iter(output)
            .map(|caps| caps[1].to_string())
            .filter(|id| id.contains('/')),
    )
}

/// Hide credentials that may surface in tool output.
pub fn mask_secrets(text: &str) -> String {
    let patterns = [
        (r"sk-[a-zA-Z0-9]{20,}", "[MASKED]"),
        (r"Bearer\s+[a-zA-Z0-9._\-]+", "Bearer [MASKED]"),
        (
            r"(?i)(client-key-data|client-certificate-data|token|password)(:\s*)\S+",
            "$1$2[MASKED]",
        ),
        (
            r"(?i)(password|secret|token|key|api_key|apikey)=[^\s&]+",
            "$1=[MASKED]",
        ),
    ];

    let mut result = text.to_string();
    for (pattern, replacement) in patterns {
        if let Ok(re) = Regex::new(pattern) {
            result = re.replace_all(&result, replacement).into_owned();
        }
    }
    result
}

/// Cut `text` to at most `max` bytes on a char boundary, marking the cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
