//! Periodic cycle trigger.
//!
//! Each tick loads the live state, runs one cycle and writes the published
//! solution to the configured output file. Cycles never overlap: a tick that
//! falls due while the previous cycle still runs is delayed.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::controller::state::StateProvider;
use crate::controller::Optimizer;
use crate::optimizer::Solution;

/// Counters for the cycle task.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskStatus {
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub run_count: u64,
    pub success_count: u64,
    pub error_count: u64,
}

pub struct CycleScheduler {
    optimizer: Arc<Optimizer>,
    state: Arc<dyn StateProvider>,
    status: RwLock<TaskStatus>,
}

impl CycleScheduler {
    pub fn new(optimizer: Arc<Optimizer>, state: Arc<dyn StateProvider>) -> Self {
        Self {
            optimizer,
            state,
            status: RwLock::new(TaskStatus::default()),
        }
    }

    pub fn optimizer(&self) -> &Arc<Optimizer> {
        &self.optimizer
    }

    /// Trigger period from `optimizer.reoptimize_every_minutes`.
    pub fn interval(&self) -> Duration {
        let minutes = self.optimizer.config().optimizer.reoptimize_every_minutes;
        Duration::from_secs(minutes.max(1) * 60)
    }

    pub async fn status(&self) -> TaskStatus {
        self.status.read().await.clone()
    }

    /// Runs a cycle every `every` until `shutdown` completes. The first
    /// cycle starts immediately.
    pub async fn run_loop<F>(&self, every: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(every_secs = every.as_secs(), "cycle loop started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    // Errors are already recorded in the task status.
                    let _ = self.run_once().await;
                }
            }
        }
        info!("cycle loop stopped");
    }

    /// One triggered cycle: load state, optimize, write the output file.
    pub async fn run_once(&self) -> Result<Arc<Solution>> {
        let now = Utc::now();
        {
            let mut status = self.status.write().await;
            status.last_run = Some(now);
            status.run_count += 1;
        }

        match self.cycle().await {
            Ok(solution) => {
                let mut status = self.status.write().await;
                status.last_success = Some(now);
                status.success_count += 1;
                status.last_error = None;
                Ok(solution)
            }
            Err(e) => {
                let mut status = self.status.write().await;
                status.error_count += 1;
                status.last_error = Some(format!("{e:#}"));
                Err(e)
            }
        }
    }

    async fn cycle(&self) -> Result<Arc<Solution>> {
        let state = self.state.load().await.map_err(|e| {
            warn!(error = %e, "loading live state failed");
            e
        })?;
        let solution = self.optimizer.run_cycle(&state).await?;

        let output = self.optimizer.config().optimizer.output_file.clone();
        if let Err(e) = write_solution(&output, &solution).await {
            error!(error = %e, path = %output.display(), "writing solution failed");
            return Err(e);
        }
        Ok(solution)
    }
}

/// Writes `solution` as pretty JSON, replacing the file atomically.
pub async fn write_solution(path: &Path, solution: &Solution) -> Result<()> {
    let json = serde_json::to_vec_pretty(solution).context("serializing solution")?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))?;
    Ok(())
}
