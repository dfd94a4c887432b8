use anyhow::Context;
use std::path::Path;

use shipyard_conductor::Pipeline;
use shipyard_core::ShipyardConfig;
use shipyard_intent::HttpBackend;

use crate::cmd_run::finish;

pub fn generate(config: &ShipyardConfig, prompt: &str) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(config);
    let generated = tokio::runtime::Runtime::new()?.block_on(pipeline.generate(prompt))?;
    println!("{}", generated.manifest);
    Ok(())
}

pub fn generate_and_apply(
    config: &ShipyardConfig,
    prompt: &str,
    namespace: Option<String>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(config);
    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(pipeline.generate_and_apply(prompt, namespace, dry_run))?;
    finish(&report)
}

pub fn validate(config: &ShipyardConfig, path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let validation = Pipeline::from_config(config).validate(&content);
    crate::print_json(&validation)?;
    if let Some(detail) = validation.error_detail {
        anyhow::bail!("{} is not valid: {detail}", path.display());
    }
    Ok(())
}

pub fn ask(config: &ShipyardConfig, question: &str) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(config);
    let answer = tokio::runtime::Runtime::new()?.block_on(pipeline.answer(question))?;
    println!("{}", answer.answer);
    eprintln!("(cluster context: {})", answer.context);
    Ok(())
}

pub fn check_backend(config: &ShipyardConfig) -> anyhow::Result<()> {
    let backend = HttpBackend::from_config(config);
    let models = tokio::runtime::Runtime::new()?
        .block_on(backend.check_connection())
        .with_context(|| format!("backend at {} is not usable", backend.base_url()))?;
    println!("Backend reachable at {}", backend.base_url());
    if models.iter().any(|m| m == backend.model()) {
        println!("Model {} is available", backend.model());
    } else {
        println!(
            "Model {} not listed (available: {})",
            backend.model(),
            models.join(", ")
        );
    }
    Ok(())
}
