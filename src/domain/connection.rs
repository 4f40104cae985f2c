use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::element::{values_of, ElementModel, ElementReport, Link, Terminal};
use crate::domain::period::Periods;
use crate::error::NetworkError;
use crate::optimizer::model::{Constraint, CostTerm, LinearExpr, LinearModel, VarId};

/// A link between two declared endpoints.
///
/// `min_power_kw` / `max_power_kw` bound the signed flow measured from
/// source to target. A bidirectional link may carry negative flow down to
/// `min_power_kw`, which defaults to `-max_power_kw`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ConnectionConfig {
    /// Defaults to `"{source}->{target}"`.
    #[serde(default)]
    pub name: String,
    #[validate(length(min = 1))]
    pub source: String,
    #[validate(length(min = 1))]
    pub target: String,
    pub min_power_kw: Option<f64>,
    #[validate(range(min = 0.0))]
    pub max_power_kw: Option<f64>,
    /// Cost per kWh transferred in either direction.
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub cost: f64,
    #[serde(default)]
    pub bidirectional: bool,
}

impl ConnectionConfig {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            source: source.into(),
            target: target.into(),
            min_power_kw: None,
            max_power_kw: None,
            cost: 0.0,
            bidirectional: false,
        }
    }

    pub fn bidirectional(mut self) -> Self {
        self.bidirectional = true;
        self
    }

    pub fn max_power(mut self, kw: f64) -> Self {
        self.max_power_kw = Some(kw);
        self
    }

    pub fn resolved_name(&self) -> String {
        if self.name.is_empty() {
            format!("{}->{}", self.source, self.target)
        } else {
            self.name.clone()
        }
    }
}

/// Flow variables of a link. `reverse` exists only for bidirectional links.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowVariables {
    pub forward: Vec<VarId>,
    pub reverse: Option<Vec<VarId>>,
}

impl FlowVariables {
    pub fn allocate(
        model: &mut LinearModel,
        name: &str,
        periods: usize,
        forward: (f64, f64),
        reverse: Option<f64>,
    ) -> Self {
        Self {
            forward: model.add_series(&format!("{name}.forward"), periods, |_| forward),
            reverse: reverse
                .map(|max| model.add_series(&format!("{name}.reverse"), periods, |_| (0.0, max))),
        }
    }

    /// Forward plus reverse flow in `period`.
    pub fn magnitude(&self, period: usize) -> LinearExpr {
        let mut expr = LinearExpr::from(self.forward[period]);
        if let Some(reverse) = &self.reverse {
            expr += reverse[period];
        }
        expr
    }

    /// Solved `forward − reverse` per period.
    pub fn net_values(&self, values: &[f64]) -> Vec<f64> {
        let forward = values_of(&self.forward, values);
        match &self.reverse {
            Some(reverse) => forward
                .iter()
                .zip(values_of(reverse, values))
                .map(|(f, r)| f - r)
                .collect(),
            None => forward,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    name: String,
    source: String,
    target: String,
    forward_bounds: (f64, f64),
    reverse_max: Option<f64>,
    cost: f64,
}

impl Connection {
    pub fn from_config(config: &ConnectionConfig) -> Result<Self, NetworkError> {
        let name = config.resolved_name();
        let max = config.max_power_kw.unwrap_or(f64::INFINITY);

        let (forward_bounds, reverse_max) = if config.bidirectional {
            let min = config.min_power_kw.unwrap_or(-max);
            if min > 0.0 {
                return Err(NetworkError::configuration(format!(
                    "bidirectional connection `{name}` has positive min_power_kw {min}"
                )));
            }
            ((0.0, max), Some(-min))
        } else {
            let min = config.min_power_kw.unwrap_or(0.0);
            if min < 0.0 {
                return Err(NetworkError::configuration(format!(
                    "connection `{name}` has negative min_power_kw {min} but is not bidirectional"
                )));
            }
            if min > max {
                return Err(NetworkError::configuration(format!(
                    "connection `{name}`: min_power_kw {min} exceeds max_power_kw {max}"
                )));
            }
            ((min, max), None)
        };

        Ok(Self {
            name,
            source: config.source.clone(),
            target: config.target.clone(),
            forward_bounds,
            reverse_max,
            cost: config.cost,
        })
    }

    pub fn is_bidirectional(&self) -> bool {
        self.reverse_max.is_some()
    }

    fn net_flow(&self, period: usize, vars: &FlowVariables) -> LinearExpr {
        let mut expr = LinearExpr::from(vars.forward[period]);
        if let Some(reverse) = &vars.reverse {
            expr -= reverse[period];
        }
        expr
    }
}

impl ElementModel for Connection {
    type Variables = FlowVariables;

    fn name(&self) -> &str {
        &self.name
    }

    fn allocate_variables(&self, periods: &Periods, model: &mut LinearModel) -> FlowVariables {
        FlowVariables::allocate(
            model,
            &self.name,
            periods.len(),
            self.forward_bounds,
            self.reverse_max,
        )
    }

    /// Bounds carry every limit; flow enters the balance of its endpoints.
    fn emit_constraints(&self, _: &Periods, _: &FlowVariables, _: &Terminal) -> Vec<Constraint> {
        Vec::new()
    }

    fn emit_cost_terms(&self, periods: &Periods, vars: &FlowVariables) -> Vec<CostTerm> {
        if self.cost == 0.0 {
            return Vec::new();
        }
        periods
            .iter()
            .enumerate()
            .map(|(t, period)| CostTerm::new(t, vars.magnitude(t) * (self.cost * period.hours())))
            .collect()
    }

    fn report(
        &self,
        _periods: &Periods,
        vars: &FlowVariables,
        _terminal: &Terminal,
        values: &[f64],
    ) -> ElementReport {
        ElementReport {
            power: vars.net_values(values),
            ..Default::default()
        }
    }
}

impl Link for Connection {
    fn source(&self) -> &str {
        &self.source
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn outflow_at_source(&self, period: usize, vars: &FlowVariables) -> LinearExpr {
        self.net_flow(period, vars)
    }

    fn inflow_at_target(&self, period: usize, vars: &FlowVariables) -> LinearExpr {
        self.net_flow(period, vars)
    }
}
