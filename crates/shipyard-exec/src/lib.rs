pub mod output;

pub use output::{extract_resource_ids, mask_secrets};

use output::{truncate, MAX_DETAIL_BYTES};
use shipyard_core::types::dedup_preserving_order;
use shipyard_core::{Action, Artifact, Outcome, PipelineError, ShipyardConfig};
use std::collections::HashMap;
use std::io::Write;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::process::Command;

/// Per-request execution parameters shared by every artifact of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecRequest {
    pub action: Action,
    pub namespace: Option<String>,
    pub dry_run: bool,
}

impl ExecRequest {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            namespace: None,
            dry_run: false,
        }
    }

    pub fn namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace.filter(|n| !n.trim().is_empty());
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Cluster mutation interface.
///
/// `execute` and `delete_resource` never fail: every problem is reported as a
/// failed [`Outcome`] so one bad artifact cannot abort the others.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, artifact: &Artifact, request: &ExecRequest) -> Outcome;

    async fn delete_resource(&self, resource_id: &str, request: &ExecRequest) -> Outcome;

    async fn current_context(&self) -> Result<String, PipelineError>;
}

// ── kubectl ──

/// [`Executor`] backed by the `kubectl` binary.
#[derive(Debug, Clone)]
pub struct KubectlExecutor {
    kubectl_bin: String,
    timeout: Duration,
}

impl KubectlExecutor {
    pub fn new(kubectl_bin: &str, timeout: Duration) -> Self {
        Self {
            kubectl_bin: kubectl_bin.to_string(),
            timeout,
        }
    }

    pub fn from_config(cfg: &ShipyardConfig) -> Self {
        Self::new(&cfg.kubectl_bin, cfg.exec_timeout())
    }

    /// Run kubectl with `args`, returning `(succeeded, combined output, detail)`.
    async fn run(&self, args: &[String]) -> (bool, String, Option<String>) {
        tracing::debug!(kubectl = %self.kubectl_bin, ?args, "running");
        let child = Command::new(&self.kubectl_bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                if output.status.success() {
                    (true, combined, None)
                } else {
                    let masked = truncate(&mask_secrets(&combined), MAX_DETAIL_BYTES);
                    let detail = format!(
                        "exit {}: {}",
                        output.status.code().unwrap_or(-1),
                        masked.trim()
                    );
                    (false, masked, Some(detail))
                }
            }
            Ok(Err(e)) => (false, String::new(), Some(format!("spawn error: {e}"))),
            Err(_) => (
                false,
                String::new(),
                Some(format!(
                    "kubectl timed out after {}s",
                    self.timeout.as_secs_f32()
                )),
            ),
        }
    }

    fn scope_args(args: &mut Vec<String>, request: &ExecRequest) {
        if let Some(ns) = &request.namespace {
            args.extend(["-n".to_string(), ns.clone()]);
        }
        if request.dry_run {
            args.push("--dry-run=client".into());
        }
    }
}

#[async_trait::async_trait]
impl Executor for KubectlExecutor {
    async fn execute(&self, artifact: &Artifact, request: &ExecRequest) -> Outcome {
        let path = artifact.relative_path.clone();
        let Some(verb) = request.action.kubectl_verb() else {
            return Outcome::failure(path, String::new(), "show does not reach the cluster".into());
        };

        // Removed when dropped at the end of this call, whatever the result.
        let file = tempfile::Builder::new()
            .prefix(&format!("shipyard-{verb}-"))
            .suffix(".yaml")
            .tempfile()
            .and_then(|mut f| {
                f.write_all(artifact.content.as_bytes())?;
                f.flush()?;
                Ok(f)
            });
        let file = match file {
            Ok(f) => f,
            Err(e) => {
                return Outcome::failure(path, String::new(), format!("temp file error: {e}"))
            }
        };

        let mut args = vec![
            verb.to_string(),
            "-f".to_string(),
            file.path().to_string_lossy().into_owned(),
        ];
        Self::scope_args(&mut args, request);
        if request.action == Action::Delete {
            args.push("--ignore-not-found=true".into());
        }

        let (ok, raw, detail) = self.run(&args).await;
        if ok {
            let ids = extract_resource_ids(&raw);
            tracing::info!(
                artifact = %path,
                verb,
                ?ids,
                dry_run = request.dry_run,
                "artifact executed"
            );
            Outcome::success(path, raw, ids)
        } else {
            let detail = detail.unwrap_or_default();
            tracing::warn!(artifact = %path, verb, %detail, "artifact failed");
            Outcome::failure(path, raw, detail)
        }
    }

    async fn delete_resource(&self, resource_id: &str, request: &ExecRequest) -> Outcome {
        let mut args = vec!["delete".to_string(), resource_id.to_string()];
        let scoped = ExecRequest {
            namespace: request
                .namespace
                .clone()
                .filter(|ns| ns != "default"),
            ..request.clone()
        };
        Self::scope_args(&mut args, &scoped);

        let (ok, raw, detail) = self.run(&args).await;
        if ok {
            tracing::info!(resource = resource_id, dry_run = request.dry_run, "resource deleted");
            // kubectl reports `kind "name" deleted`, so the requested id leads.
            let ids = dedup_preserving_order(
                std::iter::once(resource_id.to_string()).chain(extract_resource_ids(&raw)),
            );
            Outcome::success(resource_id, raw, ids)
        } else {
            let detail = detail.unwrap_or_default();
            tracing::warn!(resource = resource_id, %detail, "delete failed");
            Outcome::failure(resource_id, raw, detail)
        }
    }

    async fn current_context(&self) -> Result<String, PipelineError> {
        let args = ["config".to_string(), "current-context".to_string()];
        match self.run(&args).await {
            (true, raw, _) => Ok(raw.trim().to_string()),
            (false, _, detail) => Err(PipelineError::Io(std::io::Error::other(
                detail.unwrap_or_else(|| "kubectl config current-context failed".into()),
            ))),
        }
    }
}

// ── Recording executor ──

/// Records calls and answers from a script instead of touching a cluster (for testing).
pub struct RecordingExecutor {
    context: String,
    failing: Vec<String>,
    ids: HashMap<String, Vec<String>>,
    calls: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn new(context: &str) -> Self {
        Self {
            context: context.to_string(),
            failing: Vec::new(),
            ids: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail any artifact path or resource id equal to `target`.
    pub fn fail_on(mut self, target: &str) -> Self {
        self.failing.push(target.to_string());
        self
    }

    /// Report `ids` when `target` succeeds.
    pub fn with_ids(mut self, target: &str, ids: &[&str]) -> Self {
        self.ids
            .insert(target.to_string(), ids.iter().map(|s| s.to_string()).collect());
        self
    }

    /// `"<verb> <target>"` per call, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn answer(&self, verb: &str, target: &str) -> Outcome {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(format!("{verb} {target}"));
        }
        if self.failing.iter().any(|f| f == target) {
            return Outcome::failure(target, "error: boom".into(), "exit 1: error: boom".into());
        }
        let ids = self.ids.get(target).cloned().unwrap_or_default();
        let raw = ids
            .iter()
            .map(|id| format!("{id} {verb}d"))
            .collect::<Vec<_>>()
            .join("\n");
        Outcome::success(target, raw, ids)
    }
}

#[async_trait::async_trait]
impl Executor for RecordingExecutor {
    async fn execute(&self, artifact: &Artifact, request: &ExecRequest) -> Outcome {
        let verb = request.action.kubectl_verb().unwrap_or("show");
        self.answer(verb, &artifact.relative_path)
    }

    async fn delete_resource(&self, resource_id: &str, _request: &ExecRequest) -> Outcome {
        let mut outcome = self.answer("delete", resource_id);
        if outcome.succeeded && outcome.resource_ids.is_empty() {
            outcome.resource_ids = vec![resource_id.to_string()];
        }
        outcome
    }

    async fn current_context(&self) -> Result<String, PipelineError> {
        Ok(self.context.clone())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    const SERVICE: &str = "apiVersion: v1\nkind: Service\nmetadata:\n  name: my-svc\n";

    /// Write an executable stand-in for kubectl that logs its argv to `calls.log`.
    fn fake_kubectl(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("kubectl");
        let log = dir.join("calls.log");
        let script = format!("#!/bin/sh\necho \"$@\" >> '{}'\n{body}\n", log.display());
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn calls(dir: &Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn executor(bin: &Path, timeout: Duration) -> KubectlExecutor {
        KubectlExecutor::new(&bin.to_string_lossy(), timeout)
    }

    #[tokio::test]
    async fn apply_success_extracts_ids() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_kubectl(dir.path(), "echo 'service/my-svc created'");
        let exec = executor(&bin, Duration::from_secs(10));
        let artifact = Artifact::synthetic("svc.yaml", SERVICE.into());
        let req = ExecRequest::new(Action::Apply)
            .namespace(Some("prod".into()))
            .dry_run(true);

        let outcome = exec.execute(&artifact, &req).await;
        assert!(outcome.succeeded, "{outcome:?}");
        assert_eq!(outcome.resource_ids, vec!["service/my-svc"]);

        let logged = calls(dir.path());
        assert_eq!(logged.len(), 1);
        let argv: Vec<&str> = logged[0].split(' ').collect();
        assert_eq!(argv[0], "apply");
        assert_eq!(argv[1], "-f");
        assert!(argv[2].contains("shipyard-apply-") && argv[2].ends_with(".yaml"));
        assert_eq!(&argv[3..], ["-n", "prod", "--dry-run=client"]);
        // temp file is gone after the call
        assert!(!Path::new(argv[2]).exists());
    }

    #[tokio::test]
    async fn delete_manifest_ignores_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_kubectl(dir.path(), "echo 'service \"my-svc\" deleted'");
        let exec = executor(&bin, Duration::from_secs(10));
        let artifact = Artifact::synthetic("svc.yaml", SERVICE.into());
        let outcome = exec.execute(&artifact, &ExecRequest::new(Action::Delete)).await;
        assert!(outcome.succeeded);
        assert!(calls(dir.path())[0].ends_with("--ignore-not-found=true"));
    }

    #[tokio::test]
    async fn non_zero_exit_is_failed_outcome_with_masked_detail() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_kubectl(
            dir.path(),
            "echo 'error: unauthorized token=s3cr3t' >&2\nexit 1",
        );
        let exec = executor(&bin, Duration::from_secs(10));
        let artifact = Artifact::synthetic("svc.yaml", SERVICE.into());
        let outcome = exec.execute(&artifact, &ExecRequest::new(Action::Apply)).await;
        assert!(!outcome.succeeded);
        let detail = outcome.error_detail.unwrap();
        assert!(detail.starts_with("exit 1:"), "{detail}");
        assert!(!detail.contains("s3cr3t"));
        assert!(outcome.resource_ids.is_empty());
    }

    #[tokio::test]
    async fn timeout_is_failed_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_kubectl(dir.path(), "sleep 10");
        let exec = executor(&bin, Duration::from_millis(300));
        let artifact = Artifact::synthetic("svc.yaml", SERVICE.into());
        let outcome = exec.execute(&artifact, &ExecRequest::new(Action::Apply)).await;
        assert!(!outcome.succeeded);
        assert!(outcome.error_detail.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&dir.path().join("nope"), Duration::from_secs(1));
        let artifact = Artifact::synthetic("svc.yaml", SERVICE.into());
        let outcome = exec.execute(&artifact, &ExecRequest::new(Action::Apply)).await;
        assert!(outcome.error_detail.unwrap().starts_with("spawn error"));
    }

    #[tokio::test]
    async fn show_never_runs_kubectl() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_kubectl(dir.path(), "true");
        let exec = executor(&bin, Duration::from_secs(1));
        let artifact = Artifact::synthetic("svc.yaml", SERVICE.into());
        let outcome = exec.execute(&artifact, &ExecRequest::new(Action::Show)).await;
        assert!(!outcome.succeeded);
        assert!(calls(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn delete_resource_skips_default_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_kubectl(dir.path(), "echo 'service \"a\" deleted'");
        let exec = executor(&bin, Duration::from_secs(10));

        let req = ExecRequest::new(Action::Delete).namespace(Some("default".into()));
        let outcome = exec.delete_resource("service/a", &req).await;
        assert!(outcome.succeeded);
        assert_eq!(outcome.resource_ids, vec!["service/a"]);

        let req = ExecRequest::new(Action::Delete)
            .namespace(Some("prod".into()))
            .dry_run(true);
        exec.delete_resource("deployment/b", &req).await;

        assert_eq!(
            calls(dir.path()),
            vec![
                "delete service/a",
                "delete deployment/b -n prod --dry-run=client"
            ]
        );
    }

    #[tokio::test]
    async fn delete_resource_records_requested_id() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_kubectl(dir.path(), "echo 'service \"nginx-service\" deleted'");
        let exec = executor(&bin, Duration::from_secs(10));

        let req = ExecRequest::new(Action::Delete);
        let outcome = exec.delete_resource("service/nginx-service", &req).await;
        assert!(outcome.succeeded);
        assert_eq!(outcome.resource_ids, vec!["service/nginx-service"]);
    }

    #[tokio::test]
    async fn failed_delete_reports_no_ids() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_kubectl(
            dir.path(),
            "echo 'Error from server (NotFound): services \"x\" not found' >&2; exit 1",
        );
        let exec = executor(&bin, Duration::from_secs(10));

        let outcome = exec
            .delete_resource("service/x", &ExecRequest::new(Action::Delete))
            .await;
        assert!(!outcome.succeeded);
        assert!(outcome.resource_ids.is_empty());
        assert!(outcome.error_detail.unwrap().contains("NotFound"));
    }

    #[tokio::test]
    async fn current_context_trims_output() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_kubectl(dir.path(), "echo 'kind-dev'");
        let exec = executor(&bin, Duration::from_secs(10));
        assert_eq!(exec.current_context().await.unwrap(), "kind-dev");
    }

    #[tokio::test]
    async fn recording_executor_scripts_outcomes() {
        let exec = RecordingExecutor::new("ctx")
            .fail_on("b.yaml")
            .with_ids("a.yaml", &["service/x"]);
        let req = ExecRequest::new(Action::Apply);
        let a = exec.execute(&Artifact::synthetic("a.yaml", String::new()), &req).await;
        let b = exec.execute(&Artifact::synthetic("b.yaml", String::new()), &req).await;
        assert!(a.succeeded && !b.succeeded);
        assert_eq!(a.resource_ids, vec!["service/x"]);
        assert_eq!(exec.calls(), vec!["apply a.yaml", "apply b.yaml"]);
    }
}
