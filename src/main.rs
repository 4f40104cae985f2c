use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use energy_network_optimizer::config::Config;
use energy_network_optimizer::controller::{
    self, CycleScheduler, FileStateProvider, Optimizer,
};
use energy_network_optimizer::telemetry::{self, init_tracing};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let path = std::env::var("EON_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config/default.toml"));
    let cfg = Config::load(&path)?;

    info!(
        config = %path.display(),
        elements = cfg.elements.len(),
        connections = cfg.connections.len(),
        solver = %cfg.optimizer.solver,
        "starting energy network optimizer"
    );

    let state = Arc::new(FileStateProvider::new(cfg.optimizer.state_file.clone()));
    let optimizer = Arc::new(Optimizer::new(cfg)?);
    let scheduler = Arc::new(CycleScheduler::new(optimizer, state));

    controller::spawn_optimizer_tasks(scheduler, telemetry::shutdown_signal()).await?;

    warn!("shutdown complete");
    Ok(())
}
