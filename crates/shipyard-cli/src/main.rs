mod cmd_ai;
mod cmd_config;
mod cmd_git;
mod cmd_run;
mod cmd_serve;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use shipyard_core::ShipyardConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "shipyard",
    version,
    about = "Apply Kubernetes manifests from git repositories with plain-language instructions"
)]
struct Cli {
    /// Config file (default: <config dir>/shipyard/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Debug logging for shipyard crates
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interpret an instruction and carry it out (show, apply or delete)
    Run {
        /// Free-text instruction, e.g. "apply deployment.yaml from github.com/org/repo"
        instruction: String,
    },
    /// Clone a repository and list its manifests
    Fetch {
        /// Repository URL (scheme and .git are added when missing)
        repo_url: String,
        #[arg(long)]
        branch: Option<String>,
        /// Only this file (matched case-insensitively by name)
        #[arg(long)]
        file: Option<String>,
    },
    /// Clone a repository and apply its manifests
    Apply {
        repo_url: String,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        file: Option<String>,
        #[arg(short, long)]
        namespace: Option<String>,
        /// Pass --dry-run=client to kubectl
        #[arg(long)]
        dry_run: bool,
    },
    /// Clone a repository and have the model review its manifests
    Analyze {
        repo_url: String,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        file: Option<String>,
        /// Review as a pre-deployment check instead of an explanation
        #[arg(long)]
        apply: bool,
    },
    /// Generate a manifest from a description; prints it unless --apply
    Generate {
        prompt: String,
        /// Apply the generated manifest
        #[arg(long)]
        apply: bool,
        #[arg(short, long, requires = "apply")]
        namespace: Option<String>,
        #[arg(long, requires = "apply")]
        dry_run: bool,
    },
    /// Check that a file holds valid YAML manifests
    Validate { path: PathBuf },
    /// Ask a Kubernetes question; the current cluster context is included
    Ask { question: String },
    /// Remove every workspace under the work root
    Purge,
    /// Start the HTTP API server
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Check that the text-generation backend is reachable
    CheckBackend,
    /// Print the effective configuration as JSON
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = load_config(cli.config.as_deref())?;

    match cli.cmd {
        Command::Run { instruction } => cmd_run::execute(&config, &instruction),
        Command::Fetch {
            repo_url,
            branch,
            file,
        } => cmd_git::fetch(&config, repo_url, branch, file),
        Command::Apply {
            repo_url,
            branch,
            file,
            namespace,
            dry_run,
        } => cmd_git::apply(
            &config,
            cmd_git::ApplyArgs {
                repo_url,
                branch,
                file,
                namespace,
                dry_run,
            },
        ),
        Command::Analyze {
            repo_url,
            branch,
            file,
            apply,
        } => cmd_git::analyze(&config, repo_url, branch, file, apply),
        Command::Generate {
            prompt,
            apply: false,
            ..
        } => cmd_ai::generate(&config, &prompt),
        Command::Generate {
            prompt,
            namespace,
            dry_run,
            ..
        } => cmd_ai::generate_and_apply(&config, &prompt, namespace, dry_run),
        Command::Validate { path } => cmd_ai::validate(&config, &path),
        Command::Ask { question } => cmd_ai::ask(&config, &question),
        Command::Purge => cmd_git::purge(&config),
        Command::Serve { bind, port } => cmd_serve::execute(&config, &bind, port),
        Command::CheckBackend => cmd_ai::check_backend(&config),
        Command::Config => cmd_config::execute(&config),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("shipyard=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shipyard=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ShipyardConfig> {
    let config = ShipyardConfig::load(path).context("loading configuration")?;
    tracing::debug!(
        backend = %config.backend_url,
        model = %config.model,
        work_root = %config.work_root().display(),
        "configuration loaded"
    );
    Ok(config)
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_flags_parse() {
        let cli = Cli::try_parse_from([
            "shipyard",
            "apply",
            "github.com/org/repo",
            "--file",
            "app.yaml",
            "-n",
            "prod",
            "--dry-run",
        ])
        .unwrap();
        let Command::Apply {
            repo_url,
            file,
            namespace,
            dry_run,
            branch,
        } = cli.cmd
        else {
            panic!("expected apply");
        };
        assert_eq!(repo_url, "github.com/org/repo");
        assert_eq!(file.as_deref(), Some("app.yaml"));
        assert_eq!(namespace.as_deref(), Some("prod"));
        assert!(dry_run);
        assert_eq!(branch, None);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "shipyard",
            "run",
            "show github.com/o/r",
            "--verbose",
            "--config",
            "/tmp/shipyard.json",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/shipyard.json")));
        assert!(matches!(cli.cmd, Command::Run { .. }));
    }

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["shipyard", "serve"]).unwrap();
        let Command::Serve { bind, port } = cli.cmd else {
            panic!("expected serve");
        };
        assert_eq!(bind, "127.0.0.1");
        assert_eq!(port, 8080);
    }

    #[test]
    fn generate_apply_flags() {
        let cli = Cli::try_parse_from(["shipyard", "generate", "a pod", "--apply", "--dry-run"])
            .unwrap();
        let Command::Generate { apply, dry_run, .. } = cli.cmd else {
            panic!("expected generate");
        };
        assert!(apply && dry_run);

        // namespace and dry-run only make sense when applying
        assert!(Cli::try_parse_from(["shipyard", "generate", "a pod", "--dry-run"]).is_err());
    }

    #[test]
    fn analyze_and_validate_parse() {
        let cli =
            Cli::try_parse_from(["shipyard", "analyze", "github.com/o/r", "--apply"]).unwrap();
        assert!(matches!(cli.cmd, Command::Analyze { apply: true, .. }));

        let cli = Cli::try_parse_from(["shipyard", "validate", "pod.yaml"]).unwrap();
        let Command::Validate { path } = cli.cmd else {
            panic!("expected validate");
        };
        assert_eq!(path, PathBuf::from("pod.yaml"));
    }

    #[test]
    fn run_requires_instruction() {
        assert!(Cli::try_parse_from(["shipyard", "run"]).is_err());
    }

    #[test]
    fn malformed_config_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_config(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("loading configuration"));
    }
}
