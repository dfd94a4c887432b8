use shipyard_core::ShipyardConfig;

/// Print the effective configuration: file values, defaults and
/// `SHIPYARD_*` overrides merged.
pub fn execute(config: &ShipyardConfig) -> anyhow::Result<()> {
    let mut value = serde_json::to_value(config)?;
    if config.work_root.is_none() {
        value["work_root"] = config.work_root().display().to_string().into();
    }
    crate::print_json(&value)
}
