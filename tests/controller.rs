//! Cycle lifecycle: publishing, failure isolation, cancellation, serialization.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use energy_network_optimizer::config::{Config, ElementConfig, TierConfig};
use energy_network_optimizer::controller::Optimizer;
use energy_network_optimizer::domain::{
    BatteryConfig, ConnectionConfig, ConstantLoadConfig, CostDecay, GridConfig, NodeConfig,
};
use energy_network_optimizer::forecast::sources::{LiveState, ValueSource};
use energy_network_optimizer::optimizer::{LinearModel, SolveOutcome, SolverBackend};
use energy_network_optimizer::{NetworkError, NetworkStatus};

/// Returns an all-zero assignment after sleeping, tracking overlap.
struct SlowBackend {
    delay: Duration,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl SlowBackend {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }
}

impl SolverBackend for SlowBackend {
    fn name(&self) -> &str {
        "slow"
    }

    fn solve(&self, model: &LinearModel) -> SolveOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.active.fetch_sub(1, Ordering::SeqCst);
        SolveOutcome::optimal(vec![0.0; model.variable_count()], self.delay)
    }
}

fn grid_and_load() -> Config {
    let mut config = Config::default();
    config.optimizer.tiers = vec![TierConfig {
        count: 2,
        duration_minutes: 60,
    }];
    config.elements = vec![
        ElementConfig::Grid(GridConfig {
            name: "grid".into(),
            import_price: ValueSource::from(0.30),
            export_price: ValueSource::from(0.05),
            import_limit_kw: None,
            export_limit_kw: None,
        }),
        ElementConfig::Node(NodeConfig { name: "bus".into() }),
        ElementConfig::ConstantLoad(ConstantLoadConfig {
            name: "load".into(),
            power_kw: 2.0,
        }),
    ];
    config.connections = vec![
        ConnectionConfig::new("grid", "bus").bidirectional(),
        ConnectionConfig::new("bus", "load"),
    ];
    config
}

fn with_stuck_battery(mut config: Config) -> Config {
    config.elements.push(ElementConfig::Battery(BatteryConfig {
        name: "battery".into(),
        capacity_kwh: 10.0,
        soc: ValueSource::from(50.0),
        min_soc_percent: 60.0,
        max_soc_percent: 100.0,
        efficiency: 1.0,
        max_charge_kw: Some(0.0),
        max_discharge_kw: Some(5.0),
        charge_cost: 0.0,
        discharge_cost: 0.0,
        charge_cost_decay: CostDecay::Constant,
    }));
    config
        .connections
        .push(ConnectionConfig::new("battery", "bus").bidirectional());
    config
}

async fn wait_for_calls(backend: &SlowBackend, calls: usize) {
    while backend.calls.load(Ordering::SeqCst) < calls {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn failed_cycle_keeps_previous_solution() {
    let optimizer = Optimizer::new(grid_and_load()).unwrap();
    let state = LiveState::new();

    let first = optimizer.run_cycle(&state).await.unwrap();
    assert!((first.total_cost - 1.20).abs() < 1e-6);

    optimizer
        .update_config(with_stuck_battery(grid_and_load()))
        .unwrap();
    let err = optimizer.run_cycle(&state).await.unwrap_err();

    assert!(matches!(err, NetworkError::Infeasible));
    assert_eq!(optimizer.status(), NetworkStatus::Infeasible);
    assert_eq!(optimizer.latest().await.unwrap().id, first.id);
    assert!(optimizer.last_record().unwrap().message.is_some());

    optimizer.update_config(grid_and_load()).unwrap();
    let third = optimizer.run_cycle(&state).await.unwrap();
    assert_ne!(third.id, first.id);
    assert_eq!(optimizer.latest().await.unwrap().id, third.id);
    assert_eq!(optimizer.status(), NetworkStatus::Optimal);
}

#[tokio::test]
async fn config_update_cancels_cycle_in_flight() {
    let backend = SlowBackend::new(Duration::from_millis(300));
    let optimizer = Arc::new(
        Optimizer::new(grid_and_load())
            .unwrap()
            .with_backend(backend.clone()),
    );

    let first = optimizer.run_cycle(&LiveState::new()).await.unwrap();

    let running = {
        let optimizer = optimizer.clone();
        tokio::spawn(async move { optimizer.run_cycle(&LiveState::new()).await })
    };
    wait_for_calls(&backend, 2).await;
    optimizer.update_config(grid_and_load()).unwrap();

    let result = running.await.unwrap();
    assert!(matches!(result, Err(NetworkError::Cancelled)));
    assert_eq!(optimizer.latest().await.unwrap().id, first.id);
    assert_eq!(optimizer.status(), NetworkStatus::Pending);
}

#[tokio::test]
async fn overlapping_triggers_run_one_after_another() {
    let backend = SlowBackend::new(Duration::from_millis(100));
    let optimizer = Optimizer::new(grid_and_load())
        .unwrap()
        .with_backend(backend.clone());
    let state = LiveState::new();

    let (a, b) = tokio::join!(optimizer.run_cycle(&state), optimizer.run_cycle(&state));

    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.id, b.id);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    assert_eq!(backend.max_active.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn slow_solver_times_out() {
    let backend = SlowBackend::new(Duration::from_millis(1500));
    let mut config = grid_and_load();
    config.optimizer.timeout_seconds = 1;
    let optimizer = Optimizer::new(config).unwrap().with_backend(backend);

    let err = optimizer.run_cycle(&LiveState::new()).await.unwrap_err();

    assert!(matches!(err, NetworkError::Solver(ref m) if m.contains("timed out")));
    assert!(err.retryable());
    assert_eq!(optimizer.status(), NetworkStatus::SolverError);
    assert!(optimizer.latest().await.is_none());
    let record = optimizer.last_record().unwrap();
    assert!(record.solve_duration_ms >= 1000, "{record:?}");
}

#[tokio::test]
async fn queued_cycle_solves_the_replacement_config() {
    let backend = SlowBackend::new(Duration::from_millis(300));
    let optimizer = Arc::new(
        Optimizer::new(grid_and_load())
            .unwrap()
            .with_backend(backend.clone()),
    );

    let running = {
        let optimizer = optimizer.clone();
        tokio::spawn(async move { optimizer.run_cycle(&LiveState::new()).await })
    };
    wait_for_calls(&backend, 1).await;
    let queued = {
        let optimizer = optimizer.clone();
        tokio::spawn(async move { optimizer.run_cycle(&LiveState::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut replacement = grid_and_load();
    replacement.optimizer.tiers = vec![TierConfig {
        count: 3,
        duration_minutes: 30,
    }];
    optimizer.update_config(replacement).unwrap();

    assert!(matches!(running.await.unwrap(), Err(NetworkError::Cancelled)));
    let solution = queued.await.unwrap().unwrap();
    assert_eq!(solution.periods, 3);
    assert_eq!(optimizer.latest().await.unwrap().id, solution.id);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
}
