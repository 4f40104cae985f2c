use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Duration;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::{
    BatteryConfig, ConnectionConfig, ConstantLoadConfig, ElementKind, ForecastLoadConfig,
    GridConfig, HorizonSpec, InverterConfig, NodeConfig, PhotovoltaicsConfig, TierSpec,
};
use crate::error::NetworkError;
use crate::optimizer::solver::SolverKind;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub elements: Vec<ElementConfig>,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct OptimizerConfig {
    #[serde(default = "default_tiers")]
    #[validate(length(min = 1))]
    pub tiers: Vec<TierConfig>,
    #[serde(default = "default_solver")]
    pub solver: String,
    #[serde(default = "default_timeout")]
    #[validate(range(min = 1))]
    pub timeout_seconds: u64,
    /// Floor the horizon start onto the first tier's grid. Off by default,
    /// so the horizon starts at the cycle's `now`.
    #[serde(default)]
    pub align_start: bool,
    #[serde(default = "default_reoptimize")]
    #[validate(range(min = 1))]
    pub reoptimize_every_minutes: u64,
    /// Live sensor state read at the start of every cycle.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    /// Where the published solution is written.
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,
    /// Readings older than this are treated as missing.
    #[validate(range(min = 1))]
    pub max_state_age_minutes: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct TierConfig {
    #[validate(range(min = 1))]
    pub count: u32,
    #[validate(range(min = 1))]
    pub duration_minutes: i64,
}

fn default_tiers() -> Vec<TierConfig> {
    [(5, 1), (11, 5), (46, 30), (48, 60)]
        .into_iter()
        .map(|(count, duration_minutes)| TierConfig {
            count,
            duration_minutes,
        })
        .collect()
}

fn default_solver() -> String {
    SolverKind::default().to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_reoptimize() -> u64 {
    5
}

fn default_state_file() -> PathBuf {
    PathBuf::from("state.json")
}

fn default_output_file() -> PathBuf {
    PathBuf::from("solution.json")
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
            solver: default_solver(),
            timeout_seconds: default_timeout(),
            align_start: false,
            reoptimize_every_minutes: default_reoptimize(),
            state_file: default_state_file(),
            output_file: default_output_file(),
            max_state_age_minutes: None,
        }
    }
}

impl OptimizerConfig {
    pub fn horizon(&self) -> Result<HorizonSpec, NetworkError> {
        let tiers = self
            .tiers
            .iter()
            .map(|tier| TierSpec::minutes(tier.count, tier.duration_minutes))
            .collect::<Result<Vec<_>, _>>()?;
        HorizonSpec::new(tiers)
    }

    pub fn solver_kind(&self) -> Result<SolverKind, NetworkError> {
        let kind = SolverKind::from_str(&self.solver).map_err(|_| {
            NetworkError::configuration(format!("unknown solver `{}`", self.solver))
        })?;
        if !kind.is_available() {
            return Err(NetworkError::configuration(format!(
                "solver `{kind}` is not compiled into this build"
            )));
        }
        Ok(kind)
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds)
    }

    pub fn max_state_age(&self) -> Option<Duration> {
        self.max_state_age_minutes.map(Duration::minutes)
    }
}

/// One declared element, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementConfig {
    Battery(BatteryConfig),
    Grid(GridConfig),
    Photovoltaics(PhotovoltaicsConfig),
    ConstantLoad(ConstantLoadConfig),
    ForecastLoad(ForecastLoadConfig),
    Node(NodeConfig),
    Inverter(InverterConfig),
    Connection(ConnectionConfig),
}

impl ElementConfig {
    pub fn kind(&self) -> ElementKind {
        match self {
            ElementConfig::Battery(_) => ElementKind::Battery,
            ElementConfig::Grid(_) => ElementKind::Grid,
            ElementConfig::Photovoltaics(_) => ElementKind::Photovoltaics,
            ElementConfig::ConstantLoad(_) => ElementKind::ConstantLoad,
            ElementConfig::ForecastLoad(_) => ElementKind::ForecastLoad,
            ElementConfig::Node(_) => ElementKind::Node,
            ElementConfig::Inverter(_) => ElementKind::Inverter,
            ElementConfig::Connection(_) => ElementKind::Connection,
        }
    }

    pub fn name(&self) -> String {
        match self {
            ElementConfig::Battery(c) => c.name.clone(),
            ElementConfig::Grid(c) => c.name.clone(),
            ElementConfig::Photovoltaics(c) => c.name.clone(),
            ElementConfig::ConstantLoad(c) => c.name.clone(),
            ElementConfig::ForecastLoad(c) => c.name.clone(),
            ElementConfig::Node(c) => c.name.clone(),
            ElementConfig::Inverter(c) => c.name.clone(),
            ElementConfig::Connection(c) => c.resolved_name(),
        }
    }
}

impl Validate for ElementConfig {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        match self {
            ElementConfig::Battery(c) => c.validate(),
            ElementConfig::Grid(c) => c.validate(),
            ElementConfig::Photovoltaics(c) => c.validate(),
            ElementConfig::ConstantLoad(c) => c.validate(),
            ElementConfig::ForecastLoad(c) => c.validate(),
            ElementConfig::Node(c) => c.validate(),
            ElementConfig::Inverter(c) => c.validate(),
            ElementConfig::Connection(c) => c.validate(),
        }
    }
}

impl Config {
    /// Reads `path` and applies `EON__`-prefixed environment overrides
    /// (`EON__OPTIMIZER__SOLVER=highs`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("EON__").split("__"));
        let config: Config = figment
            .extract()
            .with_context(|| format!("reading configuration from {}", path.display()))?;
        config.check()?;
        Ok(config)
    }

    /// Field-level validation plus the cross-field rules the types cannot
    /// express. Graph structure is checked when the network is built.
    pub fn check(&self) -> Result<(), NetworkError> {
        self.optimizer
            .validate()
            .map_err(|e| NetworkError::configuration(format!("optimizer: {e}")))?;
        for tier in &self.optimizer.tiers {
            tier.validate()
                .map_err(|e| NetworkError::configuration(format!("optimizer.tiers: {e}")))?;
        }
        self.optimizer.horizon()?;
        self.optimizer.solver_kind()?;

        let mut names = HashSet::new();
        for element in self.declarations() {
            let name = element.name();
            element
                .validate()
                .map_err(|e| NetworkError::configuration(format!("element `{name}`: {e}")))?;
            if !names.insert(name.clone()) {
                return Err(NetworkError::configuration(format!(
                    "duplicate element name `{name}`"
                )));
            }
        }
        Ok(())
    }

    /// Elements followed by connections, in declared order.
    pub fn declarations(&self) -> Vec<ElementConfig> {
        self.elements
            .iter()
            .cloned()
            .chain(
                self.connections
                    .iter()
                    .cloned()
                    .map(ElementConfig::Connection),
            )
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::sources::ValueSource;
    use figment::Jail;

    const SAMPLE: &str = r#"
        [optimizer]
        solver = "microlp"
        tiers = [{ count = 4, duration_minutes = 15 }, { count = 6, duration_minutes = 60 }]

        [[elements]]
        kind = "grid"
        name = "grid"
        import_price = "sensor.import_price"
        export_price = 0.05

        [[elements]]
        kind = "battery"
        name = "battery"
        capacity_kwh = 10
        soc = "sensor.battery_soc"
        max_charge_kw = 5.0

        [[elements]]
        kind = "node"
        name = "bus"

        [[connections]]
        source = "grid"
        target = "bus"
        bidirectional = true
    "#;

    #[test]
    fn test_load_with_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file("network.toml", SAMPLE)?;
            jail.set_env("EON__OPTIMIZER__TIMEOUT_SECONDS", "7");

            let config = Config::load("network.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.optimizer.timeout_seconds, 7);
            assert_eq!(config.optimizer.horizon().unwrap().period_count(), 10);
            assert_eq!(config.elements.len(), 3);

            let ElementConfig::Battery(battery) = &config.elements[1] else {
                panic!("expected battery");
            };
            assert_eq!(battery.capacity_kwh, 10.0);
            assert_eq!(battery.max_soc_percent, 100.0);
            assert_eq!(battery.soc, ValueSource::Sensor("sensor.battery_soc".into()));

            let declarations = config.declarations();
            assert_eq!(declarations.len(), 4);
            assert_eq!(declarations[3].name(), "grid->bus");
            assert_eq!(declarations[3].kind(), ElementKind::Connection);
            Ok(())
        });
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.optimizer.solver, "microlp");
        assert_eq!(config.optimizer.horizon().unwrap().period_count(), 110);
        assert!(!config.optimizer.align_start);
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_rejects_unknown_solver() {
        let mut config = Config::default();
        config.optimizer.solver = "cplex".into();
        assert!(matches!(config.check(), Err(NetworkError::Configuration(_))));
    }

    #[test]
    fn test_rejects_decreasing_tiers() {
        let mut config = Config::default();
        config.optimizer.tiers = vec![
            TierConfig { count: 2, duration_minutes: 30 },
            TierConfig { count: 2, duration_minutes: 5 },
        ];
        assert!(config.check().is_err());
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let mut config = Config::default();
        config.elements = vec![
            ElementConfig::Node(NodeConfig { name: "bus".into() }),
            ElementConfig::Node(NodeConfig { name: "bus".into() }),
        ];
        let err = config.check().unwrap_err();
        assert!(err.to_string().contains("duplicate element name `bus`"));
    }

    #[test]
    fn test_rejects_out_of_range_fields() {
        let mut config = Config::default();
        config.elements = vec![ElementConfig::ConstantLoad(ConstantLoadConfig {
            name: "load".into(),
            power_kw: -1.0,
        })];
        assert!(config.check().is_err());
    }
}
