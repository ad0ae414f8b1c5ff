use std::time::Duration;

use anyhow::{Context, Result};
use open_energy_dispatch::config::Config;
use open_energy_dispatch::optimizer::Dispatcher;
use open_energy_dispatch::scenario::HouseholdScenario;
use open_energy_dispatch::telemetry::init_tracing;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = Config::load()?;
    let scenario = HouseholdScenario::from_config(&cfg);
    let demand = vec![cfg.demand.constant_kw; scenario.horizon()];

    let dispatcher = Dispatcher::with_backend(cfg.solver.backend)
        .with_time_limit(Duration::from_secs(cfg.solver.time_limit_seconds));

    info!(
        solver = dispatcher.solver_name(),
        horizon = scenario.horizon(),
        "starting household dispatch"
    );

    let model = scenario
        .build(&demand)
        .context("building household dispatch model")?;
    let results = dispatcher
        .dispatch_async(model)
        .await
        .context("solving household dispatch")?;

    info!(total_cost = results.total_cost(), "dispatch complete");
    println!("{}", serde_json::to_string_pretty(&results)?);

    Ok(())
}
