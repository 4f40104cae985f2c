use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::connection::FlowVariables;
use crate::domain::element::{values_of, ElementModel, ElementReport, Link, Terminal};
use crate::domain::period::Periods;
use crate::error::NetworkError;
use crate::optimizer::model::{Constraint, LinearExpr, LinearModel};

fn default_true() -> bool {
    true
}

fn unity() -> f64 {
    1.0
}

/// Converter between a DC node (`source`) and an AC node (`target`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct InverterConfig {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub source: String,
    #[validate(length(min = 1))]
    pub target: String,
    /// Rated power in kW, measured on the sending side.
    #[validate(range(exclusive_min = 0.0))]
    pub max_power_kw: f64,
    /// DC to AC conversion efficiency.
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub efficiency: f64,
    /// AC to DC conversion efficiency.
    #[serde(default = "unity")]
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub reverse_efficiency: f64,
    #[serde(default = "default_true")]
    pub bidirectional: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Inverter {
    name: String,
    source: String,
    target: String,
    max_power_kw: f64,
    efficiency: f64,
    reverse_efficiency: f64,
    bidirectional: bool,
}

impl Inverter {
    pub fn from_config(config: &InverterConfig) -> Result<Self, NetworkError> {
        if config.source == config.target {
            return Err(NetworkError::configuration(format!(
                "inverter `{}` connects `{}` to itself",
                config.name, config.source
            )));
        }
        Ok(Self {
            name: config.name.clone(),
            source: config.source.clone(),
            target: config.target.clone(),
            max_power_kw: config.max_power_kw,
            efficiency: config.efficiency,
            reverse_efficiency: config.reverse_efficiency,
            bidirectional: config.bidirectional,
        })
    }
}

impl ElementModel for Inverter {
    type Variables = FlowVariables;

    fn name(&self) -> &str {
        &self.name
    }

    fn allocate_variables(&self, periods: &Periods, model: &mut LinearModel) -> FlowVariables {
        FlowVariables::allocate(
            model,
            &self.name,
            periods.len(),
            (0.0, self.max_power_kw),
            self.bidirectional.then_some(self.max_power_kw),
        )
    }

    fn emit_constraints(&self, _: &Periods, _: &FlowVariables, _: &Terminal) -> Vec<Constraint> {
        Vec::new()
    }

    fn report(
        &self,
        periods: &Periods,
        vars: &FlowVariables,
        _terminal: &Terminal,
        values: &[f64],
    ) -> ElementReport {
        let delivered = (0..periods.len())
            .map(|t| self.inflow_at_target(t, vars).evaluate(values))
            .collect();
        let mut series = vec![("forward", values_of(&vars.forward, values))];
        if let Some(reverse) = &vars.reverse {
            series.push(("reverse", values_of(reverse, values)));
        }
        series.push(("delivered", delivered));

        ElementReport {
            power: vars.net_values(values),
            series,
            ..Default::default()
        }
    }
}

impl Link for Inverter {
    fn source(&self) -> &str {
        &self.source
    }

    fn target(&self) -> &str {
        &self.target
    }

    /// DC side: sends `f`, receives `η_r·r`.
    fn outflow_at_source(&self, period: usize, vars: &FlowVariables) -> LinearExpr {
        let mut expr = LinearExpr::from(vars.forward[period]);
        if let Some(reverse) = &vars.reverse {
            expr -= self.reverse_efficiency * reverse[period];
        }
        expr
    }

    /// AC side: receives `η·f`, sends `r`.
    fn inflow_at_target(&self, period: usize, vars: &FlowVariables) -> LinearExpr {
        let mut expr = self.efficiency * vars.forward[period];
        if let Some(reverse) = &vars.reverse {
            expr -= reverse[period];
        }
        expr
    }
}
