use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::element::{values_of, ElementModel, ElementReport, Terminal};
use crate::domain::period::Periods;
use crate::error::NetworkError;
use crate::forecast::resample::SeriesKind;
use crate::forecast::sources::ValueSource;
use crate::optimizer::model::{Constraint, CostTerm, LinearExpr, LinearModel, VarId};
use crate::power_flow::registry::BuildContext;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PhotovoltaicsConfig {
    #[validate(length(min = 1))]
    pub name: String,
    /// Expected generation in kW.
    pub forecast: ValueSource,
    /// Whether the optimizer may produce less than the forecast.
    #[serde(default)]
    pub curtailment: bool,
    /// Price per kWh produced, usually absent.
    #[serde(default)]
    pub production_price: Option<ValueSource>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Photovoltaics {
    name: String,
    forecast: Vec<f64>,
    curtailment: bool,
    production_price: Option<Vec<f64>>,
}

impl Photovoltaics {
    pub fn from_config(
        config: &PhotovoltaicsConfig,
        ctx: &BuildContext<'_>,
    ) -> Result<Self, NetworkError> {
        let forecast = ctx
            .series(&config.name, &config.forecast, SeriesKind::Power)?
            .into_iter()
            .map(|kw| kw.max(0.0))
            .collect();
        let production_price = config
            .production_price
            .as_ref()
            .map(|source| ctx.series(&config.name, source, SeriesKind::Price))
            .transpose()?;

        Ok(Self {
            name: config.name.clone(),
            forecast,
            curtailment: config.curtailment,
            production_price,
        })
    }

    pub fn forecast(&self) -> &[f64] {
        &self.forecast
    }
}

impl ElementModel for Photovoltaics {
    type Variables = Vec<VarId>;

    fn name(&self) -> &str {
        &self.name
    }

    fn allocate_variables(&self, periods: &Periods, model: &mut LinearModel) -> Vec<VarId> {
        model.add_series(&format!("{}.generation", self.name), periods.len(), |t| {
            (0.0, self.forecast[t])
        })
    }

    fn emit_constraints(
        &self,
        periods: &Periods,
        vars: &Vec<VarId>,
        terminal: &Terminal,
    ) -> Vec<Constraint> {
        let mut constraints = Vec::new();
        if !self.curtailment {
            constraints.extend(vars.iter().enumerate().map(|(t, var)| {
                Constraint::eq(
                    format!("{}.uncurtailed[{t}]", self.name),
                    *var,
                    self.forecast[t],
                )
            }));
        }
        constraints.extend(terminal.balance(&self.name, periods.len(), |t| {
            LinearExpr::from(vars[t])
        }));
        constraints
    }

    fn emit_cost_terms(&self, periods: &Periods, vars: &Vec<VarId>) -> Vec<CostTerm> {
        let Some(price) = &self.production_price else {
            return Vec::new();
        };
        periods
            .iter()
            .enumerate()
            .map(|(t, period)| CostTerm::new(t, (price[t] * period.hours()) * vars[t]))
            .collect()
    }

    fn report(
        &self,
        _periods: &Periods,
        vars: &Vec<VarId>,
        _terminal: &Terminal,
        values: &[f64],
    ) -> ElementReport {
        ElementReport {
            power: values_of(vars, values),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::period::{HorizonSpec, TierSpec};
    use crate::domain::series::TimeSeries;
    use crate::forecast::sources::{LiveState, SensorReading};
    use crate::optimizer::model::Relation;
    use chrono::{Duration, TimeZone, Utc};

    fn build(curtailment: bool) -> (Photovoltaics, Periods) {
        let start = Utc.with_ymd_and_hms(2025, 7, 1, 10, 0, 0).unwrap();
        let periods = HorizonSpec::new(vec![TierSpec::minutes(3, 60).unwrap()])
            .unwrap()
            .build(start);
        let forecast = TimeSeries::zip(
            (0..3).map(|h| start + Duration::hours(h)),
            [4.0, 5.5, -0.1],
        );
        let state = LiveState::new().with("sensor.solar", SensorReading::forecast(forecast));
        let ctx = BuildContext::new(&periods, &state, start);
        let pv = Photovoltaics::from_config(
            &PhotovoltaicsConfig {
                name: "roof".into(),
                forecast: ValueSource::from("sensor.solar"),
                curtailment,
                production_price: None,
            },
            &ctx,
        )
        .unwrap();
        (pv, periods)
    }

    #[test]
    fn test_uncurtailed_generation_is_fixed_by_equality() {
        let (pv, periods) = build(false);
        assert_eq!(pv.forecast(), &[4.0, 5.5, 0.0]);

        let mut model = LinearModel::new();
        let vars = pv.allocate_variables(&periods, &mut model);
        let constraints = pv.emit_constraints(&periods, &vars, &Terminal::new(3));
        let fixed: Vec<_> = constraints
            .iter()
            .filter(|c| c.name.starts_with("roof.uncurtailed"))
            .collect();

        assert_eq!(fixed.len(), 3);
        for (t, c) in fixed.iter().enumerate() {
            assert_eq!(c.relation, Relation::Equal);
            assert_eq!(c.expr.constant_part(), -pv.forecast()[t]);
        }
    }

    #[test]
    fn test_curtailable_generation_is_only_bounded() {
        let (pv, periods) = build(true);
        let mut model = LinearModel::new();
        let vars = pv.allocate_variables(&periods, &mut model);
        let constraints = pv.emit_constraints(&periods, &vars, &Terminal::new(3));

        assert!(constraints.iter().all(|c| !c.name.contains("uncurtailed")));
        assert_eq!(model.variable(vars[1]).unwrap().upper, 5.5);
        assert!(pv.emit_cost_terms(&periods, &vars).is_empty());
    }
}
