use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::classify::is_candidate;
use crate::error::PipelineError;
use crate::url::normalize_repo_url;

// ── Intent ──

/// What to do with the manifests found in a repository.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Apply,
    #[default]
    Show,
    Delete,
}

impl Action {
    /// Map a free-form verb onto an action, accepting the synonyms models tend to emit.
    pub fn from_verb(verb: &str) -> Option<Self> {
        match verb.trim().to_ascii_lowercase().as_str() {
            "apply" | "deploy" | "create" => Some(Action::Apply),
            "show" | "list" | "display" => Some(Action::Show),
            "delete" | "remove" => Some(Action::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Apply => "apply",
            Action::Show => "show",
            Action::Delete => "delete",
        }
    }

    /// Control-plane verb for mutating actions. `Show` never reaches the cluster.
    pub fn kubectl_verb(&self) -> Option<&'static str> {
        match self {
            Action::Apply => Some("apply"),
            Action::Delete => Some("delete"),
            Action::Show => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParseSource {
    Model,
    Fallback,
}

/// Unvalidated intent fields, as produced by either parsing strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentDraft {
    pub repository_url: String,
    pub branch: Option<String>,
    pub filename: Option<String>,
    pub action: Action,
    pub namespace: Option<String>,
    pub dry_run: bool,
    pub confidence: f64,
    pub parse_source: ParseSource,
}

/// Structured decision extracted from a free-text instruction.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Intent {
    pub repository_url: String,
    pub branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub dry_run: bool,
    pub confidence: f64,
    pub parse_source: ParseSource,
}

impl Intent {
    /// Validate and normalize a draft. An empty repository URL is terminal:
    /// the pipeline never guesses a repository.
    pub fn finish(draft: IntentDraft, primary_branch: &str) -> Result<Self, PipelineError> {
        let url = draft.repository_url.trim();
        if url.is_empty() {
            return Err(PipelineError::AmbiguousIntent(
                "no repository URL could be resolved from the instruction".into(),
            ));
        }
        let branch = non_empty(draft.branch).unwrap_or_else(|| primary_branch.to_string());
        Ok(Self {
            repository_url: normalize_repo_url(url),
            branch,
            filename: non_empty(draft.filename),
            action: draft.action,
            namespace: non_empty(draft.namespace),
            dry_run: draft.dry_run,
            confidence: draft.confidence.clamp(0.0, 1.0),
            parse_source: draft.parse_source,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// ── Artifact ──

/// A candidate configuration document discovered in a workspace.
///
/// The absolute path points inside a disposable workspace and is only valid
/// while that workspace lives; it is deliberately not serializable.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub relative_path: String,
    absolute_path: Option<PathBuf>,
    pub content: String,
    pub size: u64,
    pub is_target_kind: bool,
}

impl Artifact {
    /// Build an artifact from a file read out of a workspace. Classified once, here.
    pub fn from_file(
        relative_path: String,
        absolute_path: PathBuf,
        content: String,
        size: u64,
    ) -> Self {
        let is_target_kind = is_candidate(&content);
        Self {
            relative_path,
            absolute_path: Some(absolute_path),
            content,
            size,
            is_target_kind,
        }
    }

    /// An artifact that never lived on disk, e.g. a generated manifest.
    pub fn synthetic(name: &str, content: String) -> Self {
        let is_target_kind = is_candidate(&content);
        Self {
            relative_path: name.to_string(),
            absolute_path: None,
            size: content.len() as u64,
            content,
            is_target_kind,
        }
    }

    pub fn absolute_path(&self) -> Option<&Path> {
        self.absolute_path.as_deref()
    }

    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            path: self.relative_path.clone(),
            content: self.content.clone(),
            size: self.size,
            is_target_kind: self.is_target_kind,
        }
    }
}

/// Serializable view of an artifact, safe to hand out past the pipeline boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactSummary {
    pub path: String,
    pub content: String,
    pub size: u64,
    pub is_target_kind: bool,
}

// ── Outcome ──

/// Result of one mutation attempt against the cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Outcome {
    pub artifact_path: String,
    pub succeeded: bool,
    pub raw_output: String,
    pub resource_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl Outcome {
    pub fn success(
        artifact_path: impl Into<String>,
        raw_output: String,
        resource_ids: Vec<String>,
    ) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            succeeded: true,
            raw_output,
            resource_ids: dedup_preserving_order(resource_ids),
            error_detail: None,
        }
    }

    pub fn failure(artifact_path: impl Into<String>, raw_output: String, detail: String) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            succeeded: false,
            raw_output,
            resource_ids: Vec::new(),
            error_detail: Some(detail),
        }
    }
}

// ── AggregateResult ──

/// Partial-failure-tolerant summary across all artifacts of one request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregateResult {
    pub total_artifacts: usize,
    pub succeeded_count: usize,
    pub failed_count: usize,
    pub per_artifact: Vec<Outcome>,
    pub distinct_resource_ids: Vec<String>,
    pub dry_run: bool,
    pub timestamp: String,
}

impl AggregateResult {
    /// Aggregate outcomes, keeping their order. Identifiers come from
    /// successful outcomes only, deduplicated in first-seen order.
    pub fn from_outcomes(per_artifact: Vec<Outcome>, dry_run: bool) -> Self {
        let succeeded_count = per_artifact.iter().filter(|o| o.succeeded).count();
        let distinct_resource_ids = dedup_preserving_order(
            per_artifact
                .iter()
                .filter(|o| o.succeeded)
                .flat_map(|o| o.resource_ids.iter().cloned()),
        );
        Self {
            total_artifacts: per_artifact.len(),
            succeeded_count,
            failed_count: per_artifact.len() - succeeded_count,
            per_artifact,
            distinct_resource_ids,
            dry_run,
            timestamp: crate::now_rfc3339(),
        }
    }

    pub fn empty(dry_run: bool) -> Self {
        Self::from_outcomes(Vec::new(), dry_run)
    }
}

/// Remove duplicates while keeping the first occurrence of each item.
pub fn dedup_preserving_order<I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
