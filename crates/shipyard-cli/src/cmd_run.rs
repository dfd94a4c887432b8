use shipyard_conductor::{Pipeline, RunReport};
use shipyard_core::ShipyardConfig;

pub fn execute(config: &ShipyardConfig, instruction: &str) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(config);
    let report = tokio::runtime::Runtime::new()?.block_on(pipeline.run(instruction))?;
    finish(&report)
}

/// Print the report; a run with failed artifacts exits non-zero.
pub(crate) fn finish(report: &RunReport) -> anyhow::Result<()> {
    crate::print_json(report)?;
    if let Some(result) = &report.result {
        if result.failed_count > 0 {
            anyhow::bail!(
                "{} of {} artifacts failed",
                result.failed_count,
                result.total_artifacts
            );
        }
    }
    Ok(())
}
