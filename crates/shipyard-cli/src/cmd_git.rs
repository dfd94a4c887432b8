use shipyard_conductor::{AnalyzeRequest, ApplyRequest, FetchRequest, Pipeline};
use shipyard_core::{Action, ShipyardConfig};

use crate::cmd_run::finish;

pub struct ApplyArgs {
    pub repo_url: String,
    pub branch: Option<String>,
    pub file: Option<String>,
    pub namespace: Option<String>,
    pub dry_run: bool,
}

pub fn fetch(
    config: &ShipyardConfig,
    repo_url: String,
    branch: Option<String>,
    file: Option<String>,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(config);
    let request = FetchRequest {
        repo_url,
        branch,
        filename: file,
    };
    let report = tokio::runtime::Runtime::new()?.block_on(pipeline.fetch(request))?;
    finish(&report)
}

pub fn apply(config: &ShipyardConfig, args: ApplyArgs) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(config);
    let request = ApplyRequest {
        repo_url: args.repo_url,
        branch: args.branch,
        filename: args.file,
        namespace: args.namespace,
        dry_run: args.dry_run,
    };
    let report = tokio::runtime::Runtime::new()?.block_on(pipeline.fetch_and_apply(request))?;
    finish(&report)
}

pub fn analyze(
    config: &ShipyardConfig,
    repo_url: String,
    branch: Option<String>,
    file: Option<String>,
    apply: bool,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(config);
    let request = AnalyzeRequest {
        repo_url,
        branch,
        filename: file,
        action: if apply { Action::Apply } else { Action::Show },
    };
    let analysis = tokio::runtime::Runtime::new()?.block_on(pipeline.analyze(request))?;
    for artifact in &analysis.artifacts {
        eprintln!("- {} ({} bytes)", artifact.path, artifact.size);
    }
    println!("{}", analysis.analysis);
    Ok(())
}

pub fn purge(config: &ShipyardConfig) -> anyhow::Result<()> {
    Pipeline::from_config(config).purge()?;
    println!("Removed workspaces under {}", config.work_root().display());
    Ok(())
}
