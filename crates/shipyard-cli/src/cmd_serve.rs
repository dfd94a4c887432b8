use shipyard_conductor::Pipeline;
use shipyard_core::ShipyardConfig;
use shipyard_serve::ServeConfig;

pub fn execute(config: &ShipyardConfig, bind: &str, port: u16) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(config);
    let serve_config = ServeConfig {
        bind: bind.to_string(),
        port,
    };
    tokio::runtime::Runtime::new()?.block_on(shipyard_serve::serve(pipeline, serve_config))
}
