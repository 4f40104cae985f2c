//! Fixed, non-dispatchable consumption.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::element::{ElementModel, ElementReport, Terminal};
use crate::domain::period::Periods;
use crate::error::NetworkError;
use crate::forecast::resample::SeriesKind;
use crate::forecast::sources::ValueSource;
use crate::optimizer::model::{Constraint, LinearExpr, LinearModel};
use crate::power_flow::registry::BuildContext;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ConstantLoadConfig {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(range(min = 0.0))]
    pub power_kw: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ForecastLoadConfig {
    #[validate(length(min = 1))]
    pub name: String,
    /// Expected consumption in kW, or an energy meter when `series_kind`
    /// is `energy`.
    pub forecast: ValueSource,
    #[serde(default = "default_kind")]
    pub series_kind: SeriesKind,
}

fn default_kind() -> SeriesKind {
    SeriesKind::Power
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantLoad {
    name: String,
    power_kw: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastLoad {
    name: String,
    power_kw: Vec<f64>,
}

impl ConstantLoad {
    pub fn new(name: impl Into<String>, power_kw: f64) -> Self {
        Self {
            name: name.into(),
            power_kw,
        }
    }

    pub fn from_config(config: &ConstantLoadConfig) -> Self {
        Self::new(&config.name, config.power_kw)
    }
}

impl ForecastLoad {
    pub fn from_config(
        config: &ForecastLoadConfig,
        ctx: &BuildContext<'_>,
    ) -> Result<Self, NetworkError> {
        let power_kw = ctx.series(&config.name, &config.forecast, config.series_kind)?;
        if let Some(t) = power_kw.iter().position(|kw| !kw.is_finite()) {
            return Err(NetworkError::data(
                &config.name,
                format!("non-finite load in period {t}"),
            ));
        }
        Ok(Self {
            name: config.name.clone(),
            power_kw,
        })
    }

    pub fn power_kw(&self) -> &[f64] {
        &self.power_kw
    }
}

fn load_report(periods: usize, consumption: impl Fn(usize) -> f64) -> ElementReport {
    ElementReport {
        power: (0..periods).map(|t| -consumption(t)).collect(),
        ..Default::default()
    }
}

impl ElementModel for ConstantLoad {
    type Variables = ();

    fn name(&self) -> &str {
        &self.name
    }

    fn allocate_variables(&self, _periods: &Periods, _model: &mut LinearModel) {}

    fn emit_constraints(
        &self,
        periods: &Periods,
        _vars: &(),
        terminal: &Terminal,
    ) -> Vec<Constraint> {
        terminal.balance(&self.name, periods.len(), |_| LinearExpr::constant(-self.power_kw))
    }

    fn report(
        &self,
        periods: &Periods,
        _vars: &(),
        _terminal: &Terminal,
        _values: &[f64],
    ) -> ElementReport {
        load_report(periods.len(), |_| self.power_kw)
    }
}

impl ElementModel for ForecastLoad {
    type Variables = ();

    fn name(&self) -> &str {
        &self.name
    }

    fn allocate_variables(&self, _periods: &Periods, _model: &mut LinearModel) {}

    fn emit_constraints(
        &self,
        periods: &Periods,
        _vars: &(),
        terminal: &Terminal,
    ) -> Vec<Constraint> {
        terminal.balance(&self.name, periods.len(), |t| {
            LinearExpr::constant(-self.power_kw[t])
        })
    }

    fn report(
        &self,
        periods: &Periods,
        _vars: &(),
        _terminal: &Terminal,
        _values: &[f64],
    ) -> ElementReport {
        load_report(periods.len(), |t| self.power_kw[t])
    }
}
