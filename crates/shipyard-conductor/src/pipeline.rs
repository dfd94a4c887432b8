use serde::{Deserialize, Serialize};
use shipyard_core::deadline::with_deadline;
use shipyard_core::url::normalize_repo_url;
use shipyard_core::{
    Action, AggregateResult, Artifact, ArtifactSummary, Intent, PipelineError, ShipyardConfig,
};
use shipyard_exec::{ExecRequest, Executor, KubectlExecutor};
use shipyard_intent::{
    is_delete_instruction, mentions_dry_run, request_delete_targets, ChatRequest, HttpBackend,
    IntentParser, TextBackend,
};
use shipyard_store::{ArtifactStore, Workspace};
use std::sync::Arc;
use std::time::Duration;

use crate::generate::{
    analysis_summary, analyze_prompt, answer_prompt, clean_yaml_content, validate_manifest,
    GENERATE_PROMPT,
};
use crate::state::{transition, RunState, Stage, StageRecord};

const GENERATED_NAME: &str = "generated.yaml";
const UNKNOWN_CONTEXT: &str = "unknown";

// ── Requests / reports ──

/// Retrieve manifests without involving the language model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    pub repo_url: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

/// Retrieve and apply manifests without involving the language model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub repo_url: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

/// Everything a caller learns about one completed request.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    /// Why the keyword fallback was used, when it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_degraded: Option<String>,
    pub artifacts: Vec<ArtifactSummary>,
    /// Absent for fetch-only runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AggregateResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_manifest: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub delete_targets: Vec<String>,
    pub stages: Vec<StageRecord>,
}

impl RunReport {
    fn new(run: RunState) -> Self {
        Self {
            intent: None,
            parse_degraded: None,
            artifacts: Vec::new(),
            result: None,
            generated_manifest: None,
            delete_targets: Vec::new(),
            stages: run.history,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    pub answer: String,
    pub context: String,
    pub answered_at: String,
}

/// Manifest generated from a description, not executed.
#[derive(Debug, Clone, Serialize)]
pub struct Generated {
    pub prompt: String,
    pub manifest: String,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Validation {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub checked_at: String,
}

/// Fetch a repository and have the model review its manifests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub repo_url: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    /// `apply` asks for a pre-deployment review, anything else for an explanation.
    #[serde(default)]
    pub action: Action,
}

#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub action: Action,
    pub artifacts: Vec<ArtifactSummary>,
    pub analysis: String,
    pub stages: Vec<StageRecord>,
    pub analyzed_at: String,
}

/// What to do with retrieved artifacts.
enum Disposition {
    List,
    Execute(ExecRequest),
}

// ── Pipeline ──

/// Coordinates parsing, retrieval, execution and aggregation for one request
/// at a time per call. Cheap to clone; shared by the CLI and HTTP adapter.
#[derive(Clone)]
pub struct Pipeline {
    parser: IntentParser,
    store: ArtifactStore,
    executor: Arc<dyn Executor>,
    context_deadline: Duration,
}

impl Pipeline {
    pub fn new(parser: IntentParser, store: ArtifactStore, executor: Arc<dyn Executor>) -> Self {
        Self {
            parser,
            store,
            executor,
            context_deadline: Duration::from_secs(3),
        }
    }

    /// Production wiring: HTTP backend, git-backed store, kubectl executor.
    pub fn from_config(cfg: &ShipyardConfig) -> Self {
        let backend: Arc<dyn TextBackend> = Arc::new(HttpBackend::from_config(cfg));
        let parser = IntentParser::new(backend)
            .with_primary_branch(&cfg.primary_branch)
            .with_default_action(cfg.default_action);
        let executor: Arc<dyn Executor> = Arc::new(KubectlExecutor::from_config(cfg));
        Self::new(parser, ArtifactStore::from_config(cfg), executor)
            .with_context_deadline(cfg.context_deadline())
    }

    pub fn with_context_deadline(mut self, deadline: Duration) -> Self {
        self.context_deadline = deadline;
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    fn backend(&self) -> &dyn TextBackend {
        self.parser.backend().as_ref()
    }

    // ── Natural-language entry point ──

    /// Free-text instruction to aggregate result.
    ///
    /// Deletion instructions take the delete path; everything else is parsed
    /// into an [`Intent`] and driven through fetch and execution.
    pub async fn run(&self, instruction: &str) -> Result<RunReport, PipelineError> {
        if is_delete_instruction(instruction) {
            return self
                .delete_from_instruction(instruction, None, mentions_dry_run(instruction))
                .await;
        }

        let mut run = RunState::new();
        advance(&mut run, Stage::ParsingIntent);
        let parsed = match self.parser.parse(instruction).await {
            Ok(p) => p,
            Err(e) => return Err(abort(&mut run, e)),
        };
        let parse_degraded = parsed.degradation().map(str::to_string);
        let intent = parsed.into_intent();

        let disposition = match intent.action {
            Action::Show => Disposition::List,
            action => Disposition::Execute(
                ExecRequest::new(action)
                    .namespace(intent.namespace.clone())
                    .dry_run(intent.dry_run),
            ),
        };
        let (artifacts, result) = self
            .ingest(
                &mut run,
                &intent.repository_url,
                &intent.branch,
                intent.filename.as_deref(),
                disposition,
            )
            .await?;

        let mut report = RunReport::new(run);
        report.intent = Some(intent);
        report.parse_degraded = parse_degraded;
        report.artifacts = artifacts;
        report.result = result;
        Ok(report)
    }

    // ── Direct operations ──

    /// Fetch-only: list the manifests of a repository.
    pub async fn fetch(&self, request: FetchRequest) -> Result<RunReport, PipelineError> {
        let url = require_url(&request.repo_url)?;
        let branch = self.branch_or_primary(request.branch.as_deref());
        let mut run = RunState::new();
        let (artifacts, _) = self
            .ingest(
                &mut run,
                &url,
                &branch,
                request.filename.as_deref(),
                Disposition::List,
            )
            .await?;
        let mut report = RunReport::new(run);
        report.artifacts = artifacts;
        Ok(report)
    }

    /// Fetch and apply every manifest (or the named one) of a repository.
    pub async fn fetch_and_apply(
        &self,
        request: ApplyRequest,
    ) -> Result<RunReport, PipelineError> {
        let url = require_url(&request.repo_url)?;
        let branch = self.branch_or_primary(request.branch.as_deref());
        let exec = ExecRequest::new(Action::Apply)
            .namespace(request.namespace)
            .dry_run(request.dry_run);
        let mut run = RunState::new();
        let (artifacts, result) = self
            .ingest(
                &mut run,
                &url,
                &branch,
                request.filename.as_deref(),
                Disposition::Execute(exec),
            )
            .await?;
        let mut report = RunReport::new(run);
        report.artifacts = artifacts;
        report.result = result;
        Ok(report)
    }

    /// Ask the model which resources the instruction names, then delete each
    /// one independently.
    pub async fn delete_from_instruction(
        &self,
        instruction: &str,
        namespace: Option<String>,
        dry_run: bool,
    ) -> Result<RunReport, PipelineError> {
        let mut run = RunState::new();
        advance(&mut run, Stage::ParsingIntent);
        let targets = match request_delete_targets(self.backend(), instruction).await {
            Ok(t) => t,
            Err(e) => return Err(abort(&mut run, e)),
        };

        advance(&mut run, Stage::ExecutingArtifacts);
        let exec = ExecRequest::new(Action::Delete)
            .namespace(namespace)
            .dry_run(dry_run);
        let mut outcomes = Vec::with_capacity(targets.len());
        for target in &targets {
            outcomes.push(self.executor.delete_resource(target, &exec).await);
        }

        advance(&mut run, Stage::Aggregating);
        let result = AggregateResult::from_outcomes(outcomes, dry_run);
        log_result("delete", &result);
        advance(&mut run, Stage::Done);

        let mut report = RunReport::new(run);
        report.delete_targets = targets;
        report.result = Some(result);
        Ok(report)
    }

    /// Generate a manifest from a description and apply it. Deletion
    /// instructions are routed to [`Pipeline::delete_from_instruction`].
    pub async fn generate_and_apply(
        &self,
        prompt: &str,
        namespace: Option<String>,
        dry_run: bool,
    ) -> Result<RunReport, PipelineError> {
        if is_delete_instruction(prompt) {
            return self.delete_from_instruction(prompt, namespace, dry_run).await;
        }

        let mut run = RunState::new();
        advance(&mut run, Stage::ParsingIntent);
        let manifest = match self.generate_manifest(prompt).await {
            Ok(m) => m,
            Err(e) => return Err(abort(&mut run, e)),
        };
        let artifact = Artifact::synthetic(GENERATED_NAME, manifest.clone());

        advance(&mut run, Stage::ExecutingArtifacts);
        let exec = ExecRequest::new(Action::Apply)
            .namespace(namespace)
            .dry_run(dry_run);
        let outcome = self.executor.execute(&artifact, &exec).await;

        advance(&mut run, Stage::Aggregating);
        let result = AggregateResult::from_outcomes(vec![outcome], dry_run);
        log_result("generate", &result);
        advance(&mut run, Stage::Done);

        let mut report = RunReport::new(run);
        report.artifacts = vec![artifact.summary()];
        report.generated_manifest = Some(manifest);
        report.result = Some(result);
        Ok(report)
    }

    /// Generate a manifest from a description without applying it.
    pub async fn generate(&self, prompt: &str) -> Result<Generated, PipelineError> {
        let manifest = self.generate_manifest(prompt).await?;
        tracing::info!(bytes = manifest.len(), "manifest generated");
        Ok(Generated {
            prompt: prompt.to_string(),
            manifest,
            generated_at: shipyard_core::now_rfc3339(),
        })
    }

    /// Check that `content` is YAML holding at least one mapping. An invalid
    /// document is a negative result, not an error.
    pub fn validate(&self, content: &str) -> Validation {
        let error_detail = validate_manifest(content).err().map(|e| e.to_string());
        Validation {
            is_valid: error_detail.is_none(),
            error_detail,
            checked_at: shipyard_core::now_rfc3339(),
        }
    }

    /// Fetch a repository's manifests and ask the model to review them.
    pub async fn analyze(&self, request: AnalyzeRequest) -> Result<Analysis, PipelineError> {
        let url = require_url(&request.repo_url)?;
        let branch = self.branch_or_primary(request.branch.as_deref());
        let mut run = RunState::new();
        let (artifacts, _) = self
            .ingest(
                &mut run,
                &url,
                &branch,
                request.filename.as_deref(),
                Disposition::List,
            )
            .await?;
        if artifacts.is_empty() {
            let detail = format!("no manifests to analyze in {url}");
            return Err(PipelineError::NotFound(detail));
        }

        let chat = ChatRequest::new(analyze_prompt(request.action), analysis_summary(&artifacts))
            .temperature(0.3)
            .max_tokens(1000);
        let analysis = self
            .backend()
            .complete(chat)
            .await
            .map_err(|e| PipelineError::Backend(e.to_string()))?;
        tracing::info!(
            files = artifacts.len(),
            action = request.action.as_str(),
            "manifests analyzed"
        );
        Ok(Analysis {
            action: request.action,
            artifacts,
            analysis,
            stages: run.history,
            analyzed_at: shipyard_core::now_rfc3339(),
        })
    }

    async fn generate_manifest(&self, prompt: &str) -> Result<String, PipelineError> {
        let user = format!("Create Kubernetes YAML: {prompt}");
        let request = ChatRequest::new(GENERATE_PROMPT, user)
            .temperature(0.1)
            .max_tokens(2048);
        let raw = self
            .backend()
            .complete(request)
            .await
            .map_err(|e| PipelineError::Backend(e.to_string()))?;
        let manifest = clean_yaml_content(&raw);
        validate_manifest(&manifest)?;
        Ok(manifest)
    }

    /// Answer a question, with the current cluster context in the prompt.
    /// The context lookup is bounded; past the deadline it reads `unknown`.
    pub async fn answer(&self, question: &str) -> Result<Answer, PipelineError> {
        let lookup = async {
            match self.executor.current_context().await {
                Ok(ctx) if !ctx.is_empty() => ctx,
                Ok(_) => UNKNOWN_CONTEXT.to_string(),
                Err(e) => {
                    tracing::warn!(error = %e, "cluster context lookup failed");
                    UNKNOWN_CONTEXT.to_string()
                }
            }
        };
        let context =
            with_deadline(lookup, self.context_deadline, UNKNOWN_CONTEXT.to_string()).await;

        let request = ChatRequest::new(answer_prompt(&context), question)
            .temperature(0.3)
            .max_tokens(800);
        let answer = self
            .backend()
            .complete(request)
            .await
            .map_err(|e| PipelineError::Backend(e.to_string()))?;
        Ok(Answer {
            question: question.to_string(),
            answer,
            context,
            answered_at: shipyard_core::now_rfc3339(),
        })
    }

    /// Remove every workspace under the store root.
    pub fn purge(&self) -> Result<(), PipelineError> {
        self.store.purge_all()
    }

    // ── Shared fetch → execute → aggregate ──

    async fn ingest(
        &self,
        run: &mut RunState,
        url: &str,
        branch: &str,
        filename: Option<&str>,
        disposition: Disposition,
    ) -> Result<(Vec<ArtifactSummary>, Option<AggregateResult>), PipelineError> {
        advance(run, Stage::FetchingArtifacts);
        let mut ws = match self.store.fetch(url, branch).await {
            Ok(ws) => ws,
            Err(e) => return Err(abort(run, e)),
        };
        let artifacts = match self.select(&ws, filename) {
            Ok(a) => a,
            Err(e) => return Err(abort(run, e)),
        };
        let summaries = artifacts.iter().map(Artifact::summary).collect();

        let result = match disposition {
            Disposition::List => {
                advance(run, Stage::Aggregating);
                None
            }
            Disposition::Execute(exec) => {
                advance(run, Stage::ExecutingArtifacts);
                let mut outcomes = Vec::with_capacity(artifacts.len());
                for artifact in &artifacts {
                    outcomes.push(self.executor.execute(artifact, &exec).await);
                }
                advance(run, Stage::Aggregating);
                let result = AggregateResult::from_outcomes(outcomes, exec.dry_run);
                log_result(exec.action.as_str(), &result);
                Some(result)
            }
        };

        self.store.release(&mut ws);
        advance(run, Stage::Done);
        Ok((summaries, result))
    }

    fn select(
        &self,
        ws: &Workspace,
        filename: Option<&str>,
    ) -> Result<Vec<Artifact>, PipelineError> {
        match filename {
            Some(name) => Ok(vec![self.store.locate(ws, name)?]),
            None => Ok(self.store.discover(ws)),
        }
    }

    fn branch_or_primary(&self, branch: Option<&str>) -> String {
        branch
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.parser.primary_branch().to_string())
    }
}

fn require_url(raw: &str) -> Result<String, PipelineError> {
    if raw.trim().is_empty() {
        return Err(PipelineError::AmbiguousIntent("repository URL is required".into()));
    }
    Ok(normalize_repo_url(raw))
}

fn advance(run: &mut RunState, to: Stage) {
    let from = run.stage;
    if let Err(e) = transition(run, from, to, None) {
        tracing::error!(error = %e, "pipeline stage bookkeeping");
    }
}

fn abort(run: &mut RunState, err: PipelineError) -> PipelineError {
    let from = run.stage;
    if let Err(e) = transition(run, from, Stage::Aborted, Some(err.to_string())) {
        tracing::error!(error = %e, "pipeline stage bookkeeping");
    }
    tracing::warn!(stage = ?from, error = %err, "request aborted");
    err
}

fn log_result(operation: &str, result: &AggregateResult) {
    tracing::info!(
        operation,
        total = result.total_artifacts,
        succeeded = result.succeeded_count,
        failed = result.failed_count,
        dry_run = result.dry_run,
        "request aggregated"
    );
}
