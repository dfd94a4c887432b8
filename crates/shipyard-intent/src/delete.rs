use shipyard_core::types::dedup_preserving_order;
use shipyard_core::PipelineError;

use crate::backend::{ChatRequest, TextBackend};

const DELETE_KEYWORDS: &[&str] = &["삭제", "delete", "제거", "remove", "없애"];

const DELETE_PROMPT: &str = r#"You are a Kubernetes expert. The user wants to DELETE resources.
Parse the user's delete request and identify the exact resources to delete.

Rules:
1. Return ONLY resource names in the format "resourceType/resourceName"
2. Put each resource on its own line
3. Examples:
   - "nginx-service 서비스 삭제" -> "service/nginx-service"
   - "nginx-deployment 삭제" -> "deployment/nginx-deployment"
   - "delete nginx-service and nginx-deployment" -> "service/nginx-service\ndeployment/nginx-deployment"
4. Do NOT generate YAML, only return resource identifiers to delete"#;

/// Whether the instruction asks for deletion. Checked before intent parsing.
pub fn is_delete_instruction(text: &str) -> bool {
    let lower = text.to_lowercase();
    DELETE_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Ask the backend which resources the instruction names.
///
/// Backend failure is a [`PipelineError::Backend`]: there is no rule-based
/// fallback for resource identification.
pub async fn request_delete_targets(
    backend: &dyn TextBackend,
    instruction: &str,
) -> Result<Vec<String>, PipelineError> {
    let request = ChatRequest::new(
        DELETE_PROMPT,
        format!("Parse this delete request: {instruction}"),
    )
    .temperature(0.1)
    .max_tokens(512);
    let reply = backend
        .complete(request)
        .await
        .map_err(|e| PipelineError::Backend(e.to_string()))?;
    let targets = parse_delete_targets(&reply);
    tracing::info!(?targets, "delete targets identified");
    Ok(targets)
}

/// One `kind/name` per line. Bullets, numbering, quotes and backticks are
/// stripped; lines without a `/` are dropped; duplicates keep first position.
pub fn parse_delete_targets(reply: &str) -> Vec<String> {
    let candidates = reply.lines().filter_map(|line| {
        let line = line
            .trim()
            .trim_start_matches(|c: char| c == '-' || c == '*' || c == '•' || c.is_whitespace())
            .trim_start_matches(|c: char| c.is_ascii_digit())
            .trim_start_matches(['.', ')'])
            .trim()
            .trim_matches(|c: char| c == '`' || c == '"' || c == '\'')
            .trim();
        if line.starts_with("```") || line.is_empty() {
            return None;
        }
        let (kind, name) = line.split_once('/')?;
        let valid = |s: &str| {
            !s.is_empty()
                && s.chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
        };
        (valid(kind) && valid(name)).then(|| line.to_string())
    });
    dedup_preserving_order(candidates)
}
