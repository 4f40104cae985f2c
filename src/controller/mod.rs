pub mod scheduler;
pub mod state;

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::error::{NetworkError, NetworkStatus};
use crate::forecast::sources::LiveState;
use crate::optimizer::{
    compile, extract, CycleReport, GoodLpBackend, Solution, SolveRecord, SolverBackend,
};
use crate::power_flow::{ElementRegistry, Network};

pub use scheduler::{CycleScheduler, TaskStatus};
pub use state::{FileStateProvider, StateProvider, StaticState};

/// Owns one network configuration and runs its optimization cycles.
///
/// At most one cycle is in flight; a trigger arriving while another cycle
/// runs waits for it to finish. Replacing the configuration cancels the
/// running cycle. The published solution only ever changes on success.
pub struct Optimizer {
    config: parking_lot::RwLock<Arc<Config>>,
    registry: ElementRegistry,
    backend: Option<Arc<dyn SolverBackend>>,
    cycle: Mutex<()>,
    cancel: parking_lot::Mutex<CancellationToken>,
    solution: Arc<RwLock<Option<Arc<Solution>>>>,
    record: parking_lot::RwLock<Option<SolveRecord>>,
}

impl Optimizer {
    pub fn new(config: Config) -> Result<Self, NetworkError> {
        config.check()?;
        Ok(Self {
            config: parking_lot::RwLock::new(Arc::new(config)),
            registry: ElementRegistry::standard(),
            backend: None,
            cycle: Mutex::new(()),
            cancel: parking_lot::Mutex::new(CancellationToken::new()),
            solution: Arc::new(RwLock::new(None)),
            record: parking_lot::RwLock::new(None),
        })
    }

    /// Replaces the element constructors.
    pub fn with_registry(mut self, registry: ElementRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Uses `backend` instead of the one named by `optimizer.solver`.
    pub fn with_backend(mut self, backend: Arc<dyn SolverBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn config(&self) -> Arc<Config> {
        self.config.read().clone()
    }

    /// Validates and installs a new configuration, abandoning the cycle in
    /// flight. The published solution is kept until the next success.
    ///
    /// The swap and the cancellation happen under the token lock, so a cycle
    /// either reads the new configuration or holds the token being cancelled.
    pub fn update_config(&self, config: Config) -> Result<(), NetworkError> {
        config.check()?;
        let current = self.cancel.lock();
        *self.config.write() = Arc::new(config);
        current.cancel();
        drop(current);
        info!("configuration updated");
        Ok(())
    }

    /// Last successfully published solution.
    pub async fn latest(&self) -> Option<Arc<Solution>> {
        self.solution.read().await.clone()
    }

    /// Handle to the published solution for readers that outlive `self`.
    pub fn published(&self) -> Arc<RwLock<Option<Arc<Solution>>>> {
        self.solution.clone()
    }

    /// Record of the most recent finished cycle.
    pub fn last_record(&self) -> Option<SolveRecord> {
        self.record.read().clone()
    }

    pub fn status(&self) -> NetworkStatus {
        self.record
            .read()
            .as_ref()
            .map(|r| r.status)
            .unwrap_or(NetworkStatus::Pending)
    }

    pub async fn run_cycle(&self, state: &LiveState) -> Result<Arc<Solution>, NetworkError> {
        self.run_cycle_at(state, Utc::now()).await
    }

    /// Runs one cycle with `now` as the reference instant for the horizon
    /// and for reading live values.
    pub async fn run_cycle_at(
        &self,
        state: &LiveState,
        now: DateTime<Utc>,
    ) -> Result<Arc<Solution>, NetworkError> {
        let _guard = self.cycle.lock().await;

        let token = CancellationToken::new();
        let config = {
            let mut current = self.cancel.lock();
            *current = token.clone();
            self.config()
        };

        let span = info_span!("cycle", %now);
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(NetworkError::Cancelled),
            result = self.execute(&config, state, now).instrument(span) => result,
        };

        match result.map(|report| (report.record.clone(), report.into_result())) {
            Ok((record, Ok(solution))) => {
                let solution = Arc::new(solution);
                *self.solution.write().await = Some(solution.clone());
                info!(
                    id = %solution.id,
                    total_cost = solution.total_cost,
                    solve_ms = record.solve_duration_ms,
                    "solution published"
                );
                *self.record.write() = Some(record);
                Ok(solution)
            }
            Ok((record, Err(err))) => {
                warn!(status = %record.status, error = %err, "cycle produced no solution");
                *self.record.write() = Some(record);
                Err(err)
            }
            Err(err) => {
                if err.retryable() {
                    warn!(error = %err, "cycle failed, will retry next cycle");
                } else {
                    error!(error = %err, "cycle failed");
                }
                *self.record.write() = Some(SolveRecord::from_error(&err));
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        config: &Config,
        state: &LiveState,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, NetworkError> {
        let network = Network::build(config, &self.registry, state, now)?;
        let compiled = compile(&network)?;
        let backend: Arc<dyn SolverBackend> = match &self.backend {
            Some(backend) => backend.clone(),
            None => Arc::new(GoodLpBackend::new(network.solver())),
        };
        debug!(solver = backend.name(), "solving");

        let timeout = config.optimizer.timeout();
        let started = Instant::now();
        let handle = tokio::task::spawn_blocking(move || {
            let outcome = backend.solve(&compiled.model);
            (compiled, outcome)
        });
        let (compiled, outcome) = match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(done)) => done,
            Ok(Err(e)) => return Err(NetworkError::Solver(format!("solver task failed: {e}"))),
            Err(_) => {
                let message = format!("solver timed out after {}s", timeout.as_secs());
                return Ok(CycleReport {
                    record: SolveRecord::failed(
                        NetworkStatus::SolverError,
                        started.elapsed(),
                        message,
                    ),
                    solution: None,
                });
            }
        };

        extract(&network, &compiled, &outcome)
    }
}

/// Spawns the periodic cycle loop, stopping on `shutdown`.
pub fn spawn_optimizer_tasks<F>(
    scheduler: Arc<CycleScheduler>,
    shutdown: F,
) -> tokio::task::JoinHandle<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let every = scheduler.interval();
        scheduler.run_loop(every, shutdown).await;
    })
}
