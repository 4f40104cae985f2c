use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::element::{values_of, ElementModel, ElementReport, Terminal};
use crate::domain::period::Periods;
use crate::error::NetworkError;
use crate::forecast::sources::ValueSource;
use crate::optimizer::model::{Constraint, CostTerm, LinearExpr, LinearModel, VarId};
use crate::power_flow::registry::BuildContext;

fn default_max_soc() -> f64 {
    100.0
}

fn default_efficiency() -> f64 {
    0.99
}

/// How the charge cost coefficient changes across the horizon.
///
/// A decaying charge cost makes otherwise equal-priced periods cheaper to
/// charge in early, which keeps the schedule stable between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum CostDecay {
    #[default]
    Constant,
    /// Scales from 1.0 at the horizon start to `final_factor` at its end.
    /// Zero or negative values are allowed.
    Linear { final_factor: f64 },
    /// Halves every `half_life_hours`.
    Exponential { half_life_hours: f64 },
}

impl CostDecay {
    pub fn factor(&self, offset_hours: f64, horizon_hours: f64) -> f64 {
        match *self {
            CostDecay::Constant => 1.0,
            CostDecay::Linear { final_factor } => {
                if horizon_hours <= 0.0 {
                    return 1.0;
                }
                1.0 + (final_factor - 1.0) * offset_hours / horizon_hours
            }
            CostDecay::Exponential { half_life_hours } => {
                if half_life_hours <= 0.0 {
                    return 1.0;
                }
                0.5_f64.powf(offset_hours / half_life_hours)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct BatteryConfig {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(range(exclusive_min = 0.0))]
    pub capacity_kwh: f64,
    /// Current state of charge in percent; usually a sensor.
    pub soc: ValueSource,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 100.0))]
    pub min_soc_percent: f64,
    #[serde(default = "default_max_soc")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub max_soc_percent: f64,
    /// One-way efficiency, applied once when charging and once when
    /// discharging.
    #[serde(default = "default_efficiency")]
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub efficiency: f64,
    #[validate(range(min = 0.0))]
    pub max_charge_kw: Option<f64>,
    #[validate(range(min = 0.0))]
    pub max_discharge_kw: Option<f64>,
    /// Cost per kWh drawn into the battery.
    #[serde(default)]
    pub charge_cost: f64,
    /// Cost per kWh delivered by the battery.
    #[serde(default)]
    pub discharge_cost: f64,
    #[serde(default)]
    pub charge_cost_decay: CostDecay,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Battery {
    name: String,
    capacity_kwh: f64,
    initial_soc_percent: f64,
    min_soc_percent: f64,
    max_soc_percent: f64,
    efficiency: f64,
    max_charge_kw: Option<f64>,
    max_discharge_kw: Option<f64>,
    charge_cost: f64,
    discharge_cost: f64,
    charge_cost_decay: CostDecay,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatteryVariables {
    pub charge: Vec<VarId>,
    pub discharge: Vec<VarId>,
    /// Stored energy at every period boundary.
    pub energy: Vec<VarId>,
}

impl Battery {
    pub fn from_config(
        config: &BatteryConfig,
        ctx: &BuildContext<'_>,
    ) -> Result<Self, NetworkError> {
        if config.min_soc_percent > config.max_soc_percent {
            return Err(NetworkError::configuration(format!(
                "battery `{}`: min_soc_percent {} exceeds max_soc_percent {}",
                config.name, config.min_soc_percent, config.max_soc_percent
            )));
        }
        let soc = ctx.current(&config.name, &config.soc)?;
        if !(0.0..=100.0).contains(&soc) {
            return Err(NetworkError::data(
                &config.name,
                format!("state of charge {soc}% outside 0..=100"),
            ));
        }

        Ok(Self {
            name: config.name.clone(),
            capacity_kwh: config.capacity_kwh,
            initial_soc_percent: soc,
            min_soc_percent: config.min_soc_percent,
            max_soc_percent: config.max_soc_percent,
            efficiency: config.efficiency,
            max_charge_kw: config.max_charge_kw,
            max_discharge_kw: config.max_discharge_kw,
            charge_cost: config.charge_cost,
            discharge_cost: config.discharge_cost,
            charge_cost_decay: config.charge_cost_decay,
        })
    }

    pub fn capacity_kwh(&self) -> f64 {
        self.capacity_kwh
    }

    pub fn initial_energy_kwh(&self) -> f64 {
        self.capacity_kwh * self.initial_soc_percent / 100.0
    }

    fn net_production(&self, t: usize, vars: &BatteryVariables) -> LinearExpr {
        LinearExpr::from(vars.discharge[t]) - vars.charge[t]
    }
}

impl ElementModel for Battery {
    type Variables = BatteryVariables;

    fn name(&self) -> &str {
        &self.name
    }

    fn allocate_variables(&self, periods: &Periods, model: &mut LinearModel) -> BatteryVariables {
        let n = periods.len();
        let charge_max = self.max_charge_kw.unwrap_or(f64::INFINITY);
        let discharge_max = self.max_discharge_kw.unwrap_or(f64::INFINITY);
        let lower = self.capacity_kwh * self.min_soc_percent / 100.0;
        let upper = self.capacity_kwh * self.max_soc_percent / 100.0;

        let charge = model.add_series(&format!("{}.charge", self.name), n, |_| (0.0, charge_max));
        let discharge =
            model.add_series(&format!("{}.discharge", self.name), n, |_| (0.0, discharge_max));
        // The initial boundary is pinned by an equality instead of bounds so
        // that a reading outside the band still yields a model.
        let energy = model.add_series(&format!("{}.energy", self.name), n + 1, |i| {
            if i == 0 {
                (f64::NEG_INFINITY, f64::INFINITY)
            } else {
                (lower, upper)
            }
        });

        BatteryVariables {
            charge,
            discharge,
            energy,
        }
    }

    fn emit_constraints(
        &self,
        periods: &Periods,
        vars: &BatteryVariables,
        terminal: &Terminal,
    ) -> Vec<Constraint> {
        let eta = self.efficiency;
        let mut constraints = Vec::with_capacity(2 * periods.len() + 1);

        constraints.push(Constraint::eq(
            format!("{}.initial_energy", self.name),
            vars.energy[0],
            self.initial_energy_kwh(),
        ));

        for (t, period) in periods.iter().enumerate() {
            let dt = period.hours();
            let stored = LinearExpr::from(vars.energy[t + 1]) - vars.energy[t];
            let exchanged = (eta * dt) * vars.charge[t] - (dt / eta) * vars.discharge[t];
            constraints.push(Constraint::eq(
                format!("{}.dynamics[{t}]", self.name),
                stored,
                exchanged,
            ));
        }

        constraints.extend(terminal.balance(&self.name, periods.len(), |t| {
            self.net_production(t, vars)
        }));
        constraints
    }

    fn emit_cost_terms(&self, periods: &Periods, vars: &BatteryVariables) -> Vec<CostTerm> {
        if self.charge_cost == 0.0 && self.discharge_cost == 0.0 {
            return Vec::new();
        }
        let horizon = crate::domain::period::hours(periods.total_duration());
        periods
            .iter()
            .enumerate()
            .map(|(t, period)| {
                let dt = period.hours();
                let decay = self
                    .charge_cost_decay
                    .factor(periods.offset_hours(t), horizon);
                CostTerm::new(
                    t,
                    (self.charge_cost * decay * dt) * vars.charge[t]
                        + (self.discharge_cost * dt) * vars.discharge[t],
                )
            })
            .collect()
    }

    fn report(
        &self,
        _periods: &Periods,
        vars: &BatteryVariables,
        _terminal: &Terminal,
        values: &[f64],
    ) -> ElementReport {
        let charge = values_of(&vars.charge, values);
        let discharge = values_of(&vars.discharge, values);
        let energy = values_of(&vars.energy, values);
        let soc = energy
            .iter()
            .map(|e| e / self.capacity_kwh * 100.0)
            .collect();
        let power = discharge
            .iter()
            .zip(&charge)
            .map(|(d, c)| d - c)
            .collect();

        ElementReport {
            power,
            energy: Some(energy),
            soc: Some(soc),
            series: vec![("charge", charge), ("discharge", discharge)],
        }
    }
}
