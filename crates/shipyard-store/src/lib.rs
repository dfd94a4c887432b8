mod workspace;

pub use workspace::{StoreRoot, Workspace};

use shipyard_core::classify::is_manifest_file;
use shipyard_core::url::repo_hint;
use shipyard_core::{Artifact, PipelineError, ShipyardConfig};
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use walkdir::{DirEntry, WalkDir};

/// Retrieves repositories into disposable workspaces and reads manifests out of them.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: StoreRoot,
    git_bin: String,
    primary_branch: String,
    clone_timeout: Duration,
}

impl ArtifactStore {
    pub fn new(root: StoreRoot) -> Self {
        Self {
            root,
            git_bin: "git".into(),
            primary_branch: "main".into(),
            clone_timeout: Duration::from_secs(300),
        }
    }

    pub fn from_config(cfg: &ShipyardConfig) -> Self {
        Self::new(StoreRoot::new(cfg.work_root()))
            .with_git_bin(&cfg.git_bin)
            .with_primary_branch(&cfg.primary_branch)
            .with_clone_timeout(cfg.clone_timeout())
    }

    pub fn with_git_bin(mut self, git_bin: &str) -> Self {
        self.git_bin = git_bin.to_string();
        self
    }

    pub fn with_primary_branch(mut self, branch: &str) -> Self {
        self.primary_branch = branch.to_string();
        self
    }

    pub fn with_clone_timeout(mut self, timeout: Duration) -> Self {
        self.clone_timeout = timeout;
        self
    }

    pub fn root(&self) -> &StoreRoot {
        &self.root
    }

    // ── Fetch ──

    /// Shallow single-branch clone of `url` into a fresh workspace.
    ///
    /// For the primary branch (and `master`) no `--branch` is passed, so the
    /// remote's default branch is cloned.
    pub async fn fetch(&self, url: &str, branch: &str) -> Result<Workspace, PipelineError> {
        let mut ws = self.root.reserve(&repo_hint(url)).map_err(|e| {
            PipelineError::Retrieval(format!(
                "cannot prepare workspace under {}: {e}",
                self.root.path().display()
            ))
        })?;

        let mut args: Vec<&str> = vec!["clone", "--depth", "1", "--single-branch"];
        if !self.is_default_branch(branch) {
            args.extend(["--branch", branch]);
        }
        args.push(url);
        tracing::debug!(git = %self.git_bin, ?args, dest = %ws.path().display(), "cloning");

        let child = Command::new(&self.git_bin)
            .args(&args)
            .arg(ws.path())
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.clone_timeout, child).await {
            Ok(Ok(output)) if output.status.success() => {
                tracing::info!(url, branch, workspace = %ws.name(), "repository fetched");
                Ok(ws)
            }
            Ok(Ok(output)) => {
                ws.release();
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(PipelineError::Retrieval(stderr.trim().to_string()))
            }
            Ok(Err(e)) => {
                ws.release();
                Err(PipelineError::Retrieval(format!(
                    "cannot run {}: {e}",
                    self.git_bin
                )))
            }
            Err(_) => {
                ws.release();
                Err(PipelineError::Retrieval(format!(
                    "clone of {url} timed out after {}s",
                    self.clone_timeout.as_secs()
                )))
            }
        }
    }

    fn is_default_branch(&self, branch: &str) -> bool {
        let branch = branch.trim();
        branch.is_empty() || branch == self.primary_branch || branch == "master"
    }

    // ── Discover / Locate ──

    /// All target-kind manifests in the workspace, in sorted path order.
    pub fn discover(&self, ws: &Workspace) -> Vec<Artifact> {
        let artifacts: Vec<Artifact> = manifest_files(ws.path())
            .filter(|a| a.is_target_kind)
            .collect();
        tracing::info!(workspace = %ws.name(), count = artifacts.len(), "manifests discovered");
        artifacts
    }

    /// First file whose name matches `filename` case-insensitively, whatever
    /// its extension. Returned even if it is not a target kind; a match that
    /// cannot be read is an error, not a miss.
    pub fn locate(&self, ws: &Workspace, filename: &str) -> Result<Artifact, PipelineError> {
        let wanted = Path::new(filename.trim())
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let hit = files(ws.path())
            .find(|e| e.file_name().to_string_lossy().to_lowercase() == wanted)
            .ok_or_else(|| {
                PipelineError::NotFound(format!("{filename} not found in repository"))
            })?;
        Ok(read_artifact(ws.path(), &hit)?)
    }

    // ── Release / Purge ──

    pub fn release(&self, ws: &mut Workspace) {
        ws.release();
    }

    /// Remove every workspace under the root, including ones still in use.
    pub fn purge_all(&self) -> Result<(), PipelineError> {
        self.root.purge()?;
        tracing::info!(root = %self.root.path().display(), "workspace root purged");
        Ok(())
    }
}

/// Regular files under `dir`, skipping `.git`, in sorted order.
fn files(dir: &Path) -> impl Iterator<Item = DirEntry> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
}

/// Readable `*.yaml`/`*.yml` files under `dir`.
fn manifest_files(dir: &Path) -> impl Iterator<Item = Artifact> + '_ {
    files(dir)
        .filter(|e| is_manifest_file(e.path()))
        .filter_map(move |e| match read_artifact(dir, &e) {
            Ok(artifact) => Some(artifact),
            Err(err) => {
                tracing::warn!(
                    path = %e.path().display(),
                    error = %err,
                    "skipping unreadable file"
                );
                None
            }
        })
}

fn read_artifact(dir: &Path, entry: &DirEntry) -> io::Result<Artifact> {
    let content = std::fs::read_to_string(entry.path())?;
    let relative = entry
        .path()
        .strip_prefix(dir)
        .unwrap_or(entry.path())
        .to_string_lossy()
        .replace('\\', "/");
    let size = entry
        .metadata()
        .map(|m| m.len())
        .unwrap_or(content.len() as u64);
    Ok(Artifact::from_file(
        relative,
        entry.path().to_path_buf(),
        content,
        size,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const DEPLOYMENT: &str = "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n";
    const SERVICE: &str = "apiVersion: v1\nkind: Service\nmetadata:\n  name: web\n";
    const WIDGET: &str = "apiVersion: example.com/v1\nkind: Widget\nmetadata:\n  name: w\n";

    fn git(dir: &Path, args: &[&str]) -> bool {
        std::process::Command::new("git")
            .args(["-c", "user.email=test@test.com", "-c", "user.name=test"])
            .args(args)
            .current_dir(dir)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Local origin repository with a `main` and a `feature` branch.
    /// `None` when git is unavailable.
    fn origin(dir: &Path) -> Option<String> {
        if !git(dir, &["init", "-q"]) {
            return None;
        }
        git(dir, &["checkout", "-q", "-b", "main"]);
        std::fs::create_dir_all(dir.join("k8s/nested")).ok()?;
        std::fs::write(dir.join("k8s/deployment.yaml"), DEPLOYMENT).ok()?;
        std::fs::write(dir.join("k8s/nested/Service.YML"), SERVICE).ok()?;
        std::fs::write(dir.join("widget.yaml"), WIDGET).ok()?;
        std::fs::write(dir.join("README.md"), "# demo").ok()?;
        git(dir, &["add", "."]);
        if !git(dir, &["commit", "-q", "-m", "init"]) {
            return None;
        }
        git(dir, &["checkout", "-q", "-b", "feature"]);
        std::fs::write(dir.join("feature.yaml"), SERVICE).ok()?;
        git(dir, &["add", "."]);
        git(dir, &["commit", "-q", "-m", "feature"]);
        git(dir, &["checkout", "-q", "main"]);
        Some(format!("file://{}", dir.display()))
    }

    fn store(root: PathBuf) -> ArtifactStore {
        ArtifactStore::new(StoreRoot::new(root)).with_clone_timeout(Duration::from_secs(60))
    }

    #[tokio::test]
    async fn fetch_discover_release() {
        let src = tempfile::tempdir().unwrap();
        let Some(url) = origin(src.path()) else {
            return;
        };
        let work = tempfile::tempdir().unwrap();
        let store = store(work.path().join("repos"));

        let mut ws = store.fetch(&url, "main").await.unwrap();
        assert!(ws.path().join("k8s/deployment.yaml").exists());
        assert!(!ws.path().join("feature.yaml").exists());

        let found = store.discover(&ws);
        let paths: Vec<&str> = found.iter().map(|a| a.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["k8s/deployment.yaml", "k8s/nested/Service.YML"]);
        assert!(found.iter().all(|a| a.is_target_kind));
        assert_eq!(found[0].size, DEPLOYMENT.len() as u64);

        let path = ws.path().to_path_buf();
        store.release(&mut ws);
        assert!(!path.exists());
        store.release(&mut ws);
    }

    #[tokio::test]
    async fn fetch_named_branch() {
        let src = tempfile::tempdir().unwrap();
        let Some(url) = origin(src.path()) else {
            return;
        };
        let work = tempfile::tempdir().unwrap();
        let store = store(work.path().to_path_buf());

        let ws = store.fetch(&url, "feature").await.unwrap();
        assert!(ws.path().join("feature.yaml").exists());
    }

    #[tokio::test]
    async fn missing_branch_is_retrieval_error() {
        let src = tempfile::tempdir().unwrap();
        let Some(url) = origin(src.path()) else {
            return;
        };
        let work = tempfile::tempdir().unwrap();
        let root = work.path().join("repos");
        let store = store(root.clone());

        let err = store.fetch(&url, "nope").await.unwrap_err();
        match err {
            PipelineError::Retrieval(msg) => assert!(msg.contains("nope"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
        let leftovers = std::fs::read_dir(&root).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn unreachable_repository_is_retrieval_error() {
        let work = tempfile::tempdir().unwrap();
        let store = store(work.path().to_path_buf());
        let missing = format!("file://{}/does-not-exist.git", work.path().display());
        let err = store.fetch(&missing, "main").await.unwrap_err();
        assert!(matches!(err, PipelineError::Retrieval(_)));
    }

    #[tokio::test]
    async fn locate_is_case_insensitive_and_ignores_kind() {
        let src = tempfile::tempdir().unwrap();
        let Some(url) = origin(src.path()) else {
            return;
        };
        let work = tempfile::tempdir().unwrap();
        let store = store(work.path().to_path_buf());
        let ws = store.fetch(&url, "main").await.unwrap();

        let svc = store.locate(&ws, "service.yml").unwrap();
        assert_eq!(svc.relative_path, "k8s/nested/Service.YML");

        let widget = store.locate(&ws, "widget.yaml").unwrap();
        assert!(!widget.is_target_kind);

        let readme = store.locate(&ws, "readme.md").unwrap();
        assert_eq!(readme.relative_path, "README.md");
        assert!(!readme.is_target_kind);

        let err = store.locate(&ws, "missing.yaml").unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[test]
    fn unreadable_match_is_io_error() {
        let work = tempfile::tempdir().unwrap();
        let store = store(work.path().join("repos"));
        let ws = store.root().reserve("local").unwrap();
        std::fs::write(ws.path().join("bad.yaml"), [0xff, 0xfe, 0x00]).unwrap();
        std::fs::write(ws.path().join("good.yaml"), SERVICE).unwrap();

        let err = store.locate(&ws, "bad.yaml").unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)), "{err:?}");

        let found: Vec<_> = store.discover(&ws).into_iter().map(|a| a.relative_path).collect();
        assert_eq!(found, vec!["good.yaml"]);
    }

    #[test]
    fn discover_skips_git_dir_and_non_yaml() {
        let work = tempfile::tempdir().unwrap();
        let store = store(work.path().join("repos"));
        let ws = store.root().reserve("local").unwrap();
        std::fs::create_dir_all(ws.path().join(".git")).unwrap();
        std::fs::write(ws.path().join(".git/config.yaml"), SERVICE).unwrap();
        std::fs::write(ws.path().join("b.yaml"), SERVICE).unwrap();
        std::fs::write(ws.path().join("a.yml"), DEPLOYMENT).unwrap();
        std::fs::write(ws.path().join("c.json"), SERVICE).unwrap();

        let found = store.discover(&ws);
        let paths: Vec<&str> = found.iter().map(|a| a.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["a.yml", "b.yaml"]);
    }

    #[test]
    fn default_branch_detection() {
        let store = ArtifactStore::new(StoreRoot::system_default()).with_primary_branch("trunk");
        assert!(store.is_default_branch("trunk"));
        assert!(store.is_default_branch("master"));
        assert!(store.is_default_branch(""));
        assert!(!store.is_default_branch("main"));
        assert!(!store.is_default_branch("feature"));
    }

    #[test]
    fn purge_all_twice() {
        let work = tempfile::tempdir().unwrap();
        let store = store(work.path().join("repos"));
        let _ws = store.root().reserve("x").unwrap();
        store.purge_all().unwrap();
        assert!(!work.path().join("repos").exists());
        store.purge_all().unwrap();
    }
}
