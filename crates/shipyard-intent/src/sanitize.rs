use regex::Regex;
use std::sync::OnceLock;

fn fence() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?i)```(?:json)?").ok()).as_ref()
}

/// Reduce a model reply to the JSON object it is supposed to contain.
///
/// Strips markdown fences, trims, and keeps the span from the first `{` to
/// the last `}`. Without a well-ordered brace pair the trimmed text is
/// returned and decoding will fail downstream.
pub fn sanitize_response(raw: &str) -> String {
    let unfenced = match fence() {
        Some(re) => re.replace_all(raw, "").into_owned(),
        None => raw.to_string(),
    };
    let trimmed = unfenced.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => trimmed[start..=end].to_string(),
        _ => trimmed.to_string(),
    }
}
