use serde::Deserialize;
use shipyard_core::{Action, Intent, IntentDraft, ParseSource, PipelineError};
use std::sync::Arc;

use crate::backend::{ChatRequest, TextBackend};
use crate::fallback::fallback_parse;
use crate::sanitize::sanitize_response;

const SYSTEM_PROMPT: &str = r#"You are a Git repository parser for Kubernetes operations.
Parse the user's request and extract Git repository information.

IMPORTANT: Return ONLY a valid JSON object, no markdown formatting, no code blocks, no explanations.

Required JSON format:
{
  "repoUrl": "https://github.com/user/repo.git",
  "branch": "main",
  "filename": "deployment.yaml",
  "action": "apply",
  "dryRun": false,
  "namespace": "",
  "confidence": 0.95
}

Rules:
1. repoUrl: add https:// if missing, add .git if missing
2. branch: "main" if not specified
3. filename: the specific file if one is mentioned, otherwise empty string
4. action: "apply" for 적용/배포/생성/apply/deploy/create, "show" for 보기/표시/조회/show/list
5. dryRun: true if dry-run/테스트/시뮬레이션/test is mentioned
6. namespace: the Kubernetes namespace if specified, otherwise empty string
7. confidence: 0.0-1.0 based on parsing certainty"#;

/// Confidence assumed when the model omits the field.
const DEFAULT_MODEL_CONFIDENCE: f64 = 0.8;

/// JSON shape requested from the model. camelCase and snake_case names are both accepted.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawIntent {
    #[serde(alias = "repoUrl", alias = "repositoryUrl", alias = "repository_url")]
    repo_url: Option<String>,
    branch: Option<String>,
    #[serde(alias = "fileName", alias = "file")]
    filename: Option<String>,
    action: Option<String>,
    namespace: Option<String>,
    #[serde(alias = "dryRun")]
    dry_run: Option<bool>,
    confidence: Option<f64>,
}

/// Outcome of intent resolution. Both variants carry a complete [`Intent`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedIntent {
    /// The model answered with a decodable object.
    Parsed(Intent),
    /// The rule-based fallback produced the intent; `reason` says why.
    Degraded { intent: Intent, reason: String },
}

impl ParsedIntent {
    pub fn intent(&self) -> &Intent {
        match self {
            ParsedIntent::Parsed(intent) => intent,
            ParsedIntent::Degraded { intent, .. } => intent,
        }
    }

    pub fn into_intent(self) -> Intent {
        match self {
            ParsedIntent::Parsed(intent) => intent,
            ParsedIntent::Degraded { intent, .. } => intent,
        }
    }

    pub fn degradation(&self) -> Option<&str> {
        match self {
            ParsedIntent::Parsed(_) => None,
            ParsedIntent::Degraded { reason, .. } => Some(reason),
        }
    }
}

/// Turns free text into an [`Intent`], model first, keyword fallback second.
#[derive(Clone)]
pub struct IntentParser {
    backend: Arc<dyn TextBackend>,
    primary_branch: String,
    default_action: Action,
}

impl IntentParser {
    pub fn new(backend: Arc<dyn TextBackend>) -> Self {
        Self {
            backend,
            primary_branch: "main".into(),
            default_action: Action::Show,
        }
    }

    pub fn with_primary_branch(mut self, branch: &str) -> Self {
        self.primary_branch = branch.to_string();
        self
    }

    pub fn with_default_action(mut self, action: Action) -> Self {
        self.default_action = action;
        self
    }

    pub fn primary_branch(&self) -> &str {
        &self.primary_branch
    }

    pub fn backend(&self) -> &Arc<dyn TextBackend> {
        &self.backend
    }

    /// Resolve `instruction` to an intent.
    ///
    /// Fails only with [`PipelineError::AmbiguousIntent`], when neither
    /// strategy finds a repository.
    pub async fn parse(&self, instruction: &str) -> Result<ParsedIntent, PipelineError> {
        match self.model_draft(instruction).await {
            Ok(draft) => {
                let intent = Intent::finish(draft, &self.primary_branch)?;
                tracing::info!(
                    url = %intent.repository_url,
                    action = intent.action.as_str(),
                    "intent parsed"
                );
                Ok(ParsedIntent::Parsed(intent))
            }
            Err(reason) => {
                tracing::warn!(%reason, "model parse degraded, using keyword fallback");
                let draft = fallback_parse(instruction, self.default_action);
                let intent = Intent::finish(draft, &self.primary_branch)?;
                Ok(ParsedIntent::Degraded { intent, reason })
            }
        }
    }

    async fn model_draft(&self, instruction: &str) -> Result<IntentDraft, String> {
        let request = ChatRequest::new(SYSTEM_PROMPT, instruction)
            .temperature(0.1)
            .max_tokens(200);
        let reply = self
            .backend
            .complete(request)
            .await
            .map_err(|e| e.to_string())?;
        tracing::debug!(raw = %reply, "model intent reply");

        let cleaned = sanitize_response(&reply);
        let raw: RawIntent = serde_json::from_str(&cleaned)
            .map_err(|e| format!("model reply is not an intent object: {e}"))?;
        self.draft_from_raw(raw)
    }

    fn draft_from_raw(&self, raw: RawIntent) -> Result<IntentDraft, String> {
        let repository_url = raw.repo_url.unwrap_or_default();
        if repository_url.trim().is_empty() {
            return Err("model reply has no repository URL".into());
        }
        let action = raw
            .action
            .as_deref()
            .and_then(Action::from_verb)
            .unwrap_or(self.default_action);
        Ok(IntentDraft {
            repository_url,
            branch: raw.branch,
            filename: raw.filename,
            action,
            namespace: raw.namespace,
            dry_run: raw.dry_run.unwrap_or(false),
            confidence: raw.confidence.unwrap_or(DEFAULT_MODEL_CONFIDENCE),
            parse_source: ParseSource::Model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, ScriptedBackend};

    fn parser(replies: Vec<Result<String, BackendError>>) -> (IntentParser, Arc<ScriptedBackend>) {
        let backend = Arc::new(ScriptedBackend::new(replies));
        (IntentParser::new(backend.clone()), backend)
    }

    #[tokio::test]
    async fn fenced_json_is_parsed() {
        let reply = "```json\n{\"repoUrl\":\"github.com/org/repo\",\"filename\":\"\",\
                     \"action\":\"apply\",\"dryRun\":true}\n```";
        let (parser, backend) = parser(vec![Ok(reply.into())]);
        let parsed = parser.parse("apply everything from org/repo").await.unwrap();

        let ParsedIntent::Parsed(intent) = parsed else {
            panic!("expected model parse");
        };
        assert_eq!(intent.repository_url, "https://github.com/org/repo.git");
        assert_eq!(intent.branch, "main");
        assert_eq!(intent.filename, None);
        assert_eq!(intent.action, Action::Apply);
        assert!(intent.dry_run);
        assert_eq!(intent.parse_source, ParseSource::Model);

        let sent = backend.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].max_tokens, 200);
    }

    #[tokio::test]
    async fn snake_case_and_synonym_action() {
        let reply = r#"{"repository_url":"https://gitlab.com/a/b.git","branch":"dev",
            "action":"deploy","namespace":"prod","dry_run":false,"confidence":3.0}"#;
        let (parser, _) = parser(vec![Ok(reply.into())]);
        let intent = parser.parse("x").await.unwrap().into_intent();
        assert_eq!(intent.repository_url, "https://gitlab.com/a/b.git");
        assert_eq!(intent.branch, "dev");
        assert_eq!(intent.action, Action::Apply);
        assert_eq!(intent.namespace.as_deref(), Some("prod"));
        assert_eq!(intent.confidence, 1.0);
    }

    #[tokio::test]
    async fn unknown_action_uses_default() {
        let reply = r#"{"repoUrl":"github.com/o/r","action":"explode"}"#;
        let (parser, _) = parser(vec![Ok(reply.into())]);
        let parser = parser.with_default_action(Action::Apply);
        let intent = parser.parse("x").await.unwrap().into_intent();
        assert_eq!(intent.action, Action::Apply);
    }

    #[tokio::test]
    async fn backend_down_degrades_to_fallback() {
        let (parser, _) = parser(vec![]);
        let parsed = parser
            .parse("github.com/org/repo 의 app.yaml 적용해줘")
            .await
            .unwrap();
        let reason = parsed.degradation().map(str::to_string);
        let intent = parsed.into_intent();
        assert!(reason.unwrap().contains("unreachable"));
        assert_eq!(intent.repository_url, "https://github.com/org/repo.git");
        assert_eq!(intent.filename.as_deref(), Some("app.yaml"));
        assert_eq!(intent.action, Action::Apply);
        assert!(!intent.dry_run);
        assert_eq!(intent.parse_source, ParseSource::Fallback);
        assert!(intent.confidence <= 0.7);
    }

    #[tokio::test]
    async fn prose_reply_degrades() {
        let (parser, _) = parser(vec![Ok("I'm not sure what you mean.".into())]);
        let parsed = parser.parse("show github.com/o/r").await.unwrap();
        assert!(matches!(parsed, ParsedIntent::Degraded { .. }));
        assert_eq!(parsed.intent().action, Action::Show);
    }

    #[tokio::test]
    async fn empty_model_url_falls_back_to_text() {
        let reply = r#"{"repoUrl":"","action":"apply"}"#;
        let (parser, _) = parser(vec![Ok(reply.into())]);
        let parsed = parser.parse("deploy bitbucket.org/team/svc").await.unwrap();
        assert!(parsed.degradation().is_some());
        assert_eq!(parsed.intent().repository_url, "https://bitbucket.org/team/svc.git");
    }

    #[tokio::test]
    async fn no_repository_anywhere_is_ambiguous() {
        let (parser, _) = parser(vec![Ok(r#"{"repoUrl":""}"#.into())]);
        let err = parser.parse("deploy my app please").await.unwrap_err();
        assert!(matches!(err, PipelineError::AmbiguousIntent(_)));
    }
}
