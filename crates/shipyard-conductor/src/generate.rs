use serde::Deserialize;
use shipyard_core::{Action, ArtifactSummary, PipelineError};
use std::fmt::Write;

pub(crate) const GENERATE_PROMPT: &str = "You are a Kubernetes expert. Generate valid Kubernetes YAML based on user requirements.
Rules:
1. Always return valid YAML format
2. Use appropriate Kubernetes API versions
3. Include necessary metadata (name, namespace if needed)
4. Add helpful labels and annotations
5. Only return the YAML content, no explanations";

pub(crate) fn answer_prompt(context: &str) -> String {
    format!(
        "You are a Kubernetes expert assistant. Answer questions about Kubernetes clearly and concisely.\n\
         Current cluster context: {context}\n\
         Provide practical, actionable advice with examples when helpful."
    )
}

const ANALYZE_APPLY_PROMPT: &str = "You are a Kubernetes expert. Analyze the provided YAML files and provide:
1. Summary of what will be created/applied
2. Potential issues or warnings
3. Recommended namespace if not specified
4. Dependencies between resources
5. Estimated resource requirements

Be concise but thorough in your analysis.";

const ANALYZE_SHOW_PROMPT: &str = "You are a Kubernetes expert. Analyze the provided YAML files and provide:
1. Overview of the Kubernetes resources
2. Architecture explanation
3. Purpose and functionality of each component
4. Best practices assessment
5. Suggestions for improvement

Be educational and helpful in your explanation.";

/// Files listed in an analysis request; the rest are only counted.
const ANALYZE_MAX_FILES: usize = 5;
/// Lines of the first file quoted in an analysis request.
const ANALYZE_PREVIEW_LINES: usize = 10;

pub(crate) fn analyze_prompt(action: Action) -> &'static str {
    match action {
        Action::Apply => ANALYZE_APPLY_PROMPT,
        _ => ANALYZE_SHOW_PROMPT,
    }
}

/// Compact listing of the fetched manifests sent to the model: path and
/// size of the first few files plus a short preview of the first one.
pub fn analysis_summary(artifacts: &[ArtifactSummary]) -> String {
    let mut out = String::from("Kubernetes manifests found:\n");
    for (i, artifact) in artifacts.iter().enumerate() {
        if i >= ANALYZE_MAX_FILES {
            let _ = writeln!(out, "... and {} more files", artifacts.len() - ANALYZE_MAX_FILES);
            break;
        }
        let _ = writeln!(out, "- {} ({} bytes)", artifact.path, artifact.size);
        if i == 0 && !artifact.content.is_empty() {
            out.push_str("  Preview:\n");
            let mut lines = artifact.content.lines();
            for line in lines.by_ref().take(ANALYZE_PREVIEW_LINES) {
                let _ = writeln!(out, "  {line}");
            }
            if lines.next().is_some() {
                out.push_str("  ...\n");
            }
        }
    }
    out
}

/// Strip markdown fences and any prose before the first `apiVersion:` or
/// `kind:` line. Text without such a line is returned trimmed.
pub fn clean_yaml_content(raw: &str) -> String {
    let unfenced: Vec<&str> = raw
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect();
    let start = unfenced.iter().position(|line| {
        let t = line.trim_start();
        t.starts_with("apiVersion:") || t.starts_with("kind:")
    });
    match start {
        Some(i) => unfenced[i..].join("\n").trim().to_string(),
        None => unfenced.join("\n").trim().to_string(),
    }
}

/// Every document must parse as YAML and at least one must be a mapping.
pub fn validate_manifest(content: &str) -> Result<(), PipelineError> {
    let mut mappings = 0usize;
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| PipelineError::InvalidManifest(e.to_string()))?;
        if value.is_mapping() {
            mappings += 1;
        }
    }
    if mappings == 0 {
        return Err(PipelineError::InvalidManifest(
            "no YAML mapping in generated content".into(),
        ));
    }
    Ok(())
}
