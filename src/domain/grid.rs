use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::element::{values_of, ElementModel, ElementReport, Terminal};
use crate::domain::period::Periods;
use crate::error::NetworkError;
use crate::forecast::resample::SeriesKind;
use crate::forecast::sources::ValueSource;
use crate::optimizer::model::{Constraint, CostTerm, LinearExpr, LinearModel, VarId};
use crate::power_flow::registry::BuildContext;

fn no_price() -> ValueSource {
    ValueSource::Constant(0.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct GridConfig {
    #[validate(length(min = 1))]
    pub name: String,
    /// Price paid per imported kWh.
    pub import_price: ValueSource,
    /// Price received per exported kWh.
    #[serde(default = "no_price")]
    pub export_price: ValueSource,
    #[validate(range(min = 0.0))]
    pub import_limit_kw: Option<f64>,
    #[validate(range(min = 0.0))]
    pub export_limit_kw: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    name: String,
    import_price: Vec<f64>,
    export_price: Vec<f64>,
    import_limit_kw: Option<f64>,
    export_limit_kw: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridVariables {
    pub import: Vec<VarId>,
    pub export: Vec<VarId>,
}

impl Grid {
    pub fn from_config(config: &GridConfig, ctx: &BuildContext<'_>) -> Result<Self, NetworkError> {
        let import_price = ctx.series(&config.name, &config.import_price, SeriesKind::Price)?;
        let export_price = ctx.series(&config.name, &config.export_price, SeriesKind::Price)?;

        // Unlimited import and export with a selling price above the buying
        // price lets the solver loop power through the grid forever.
        if config.import_limit_kw.is_none() && config.export_limit_kw.is_none() {
            if let Some(t) = import_price
                .iter()
                .zip(&export_price)
                .position(|(buy, sell)| sell > buy)
            {
                tracing::warn!(
                    grid = %config.name,
                    period = t,
                    "export price exceeds import price on an unlimited grid; model will be unbounded"
                );
            }
        }

        Ok(Self {
            name: config.name.clone(),
            import_price,
            export_price,
            import_limit_kw: config.import_limit_kw,
            export_limit_kw: config.export_limit_kw,
        })
    }

    pub fn import_price(&self) -> &[f64] {
        &self.import_price
    }

    pub fn export_price(&self) -> &[f64] {
        &self.export_price
    }
}

impl ElementModel for Grid {
    type Variables = GridVariables;

    fn name(&self) -> &str {
        &self.name
    }

    fn allocate_variables(&self, periods: &Periods, model: &mut LinearModel) -> GridVariables {
        let n = periods.len();
        let import_max = self.import_limit_kw.unwrap_or(f64::INFINITY);
        let export_max = self.export_limit_kw.unwrap_or(f64::INFINITY);
        GridVariables {
            import: model.add_series(&format!("{}.import", self.name), n, |_| (0.0, import_max)),
            export: model.add_series(&format!("{}.export", self.name), n, |_| (0.0, export_max)),
        }
    }

    fn emit_constraints(
        &self,
        periods: &Periods,
        vars: &GridVariables,
        terminal: &Terminal,
    ) -> Vec<Constraint> {
        terminal.balance(&self.name, periods.len(), |t| {
            LinearExpr::from(vars.import[t]) - vars.export[t]
        })
    }

    fn emit_cost_terms(&self, periods: &Periods, vars: &GridVariables) -> Vec<CostTerm> {
        periods
            .iter()
            .enumerate()
            .map(|(t, period)| {
                let dt = period.hours();
                CostTerm::new(
                    t,
                    (self.import_price[t] * dt) * vars.import[t]
                        - (self.export_price[t] * dt) * vars.export[t],
                )
            })
            .collect()
    }

    fn report(
        &self,
        _periods: &Periods,
        vars: &GridVariables,
        _terminal: &Terminal,
        values: &[f64],
    ) -> ElementReport {
        let import = values_of(&vars.import, values);
        let export = values_of(&vars.export, values);
        let power = import.iter().zip(&export).map(|(i, e)| i - e).collect();
        ElementReport {
            power,
            series: vec![("import", import), ("export", export)],
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
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_prices_and_limits() {
        let start = Utc.with_ymd_and_hms(2025, 1, 15, 6, 0, 0).unwrap();
        let periods = HorizonSpec::new(vec![
            TierSpec::minutes(2, 30).unwrap(),
            TierSpec::minutes(1, 60).unwrap(),
        ])
        .unwrap()
        .build(start);
        let state = LiveState::new().with(
            "sensor.nordpool",
            SensorReading::forecast(TimeSeries::from_pairs([
                (start, 0.20),
                (start + Duration::minutes(60), 0.40),
            ])),
        );
        let ctx = BuildContext::new(&periods, &state, start);
        let grid = Grid::from_config(
            &GridConfig {
                name: "grid".into(),
                import_price: ValueSource::from("sensor.nordpool"),
                export_price: ValueSource::from(0.05),
                import_limit_kw: Some(17.0),
                export_limit_kw: None,
            },
            &ctx,
        )
        .unwrap();
        assert_eq!(grid.import_price(), &[0.20, 0.20, 0.40]);

        let mut model = LinearModel::new();
        let vars = grid.allocate_variables(&periods, &mut model);
        assert_eq!(model.variable(vars.import[0]).unwrap().upper, 17.0);
        assert!(model.variable(vars.export[0]).unwrap().upper.is_infinite());

        let terms = grid.emit_cost_terms(&periods, &vars);
        assert!((terms[0].expr.coefficient(vars.import[0]) - 0.10).abs() < 1e-12);
        assert!((terms[0].expr.coefficient(vars.export[0]) + 0.025).abs() < 1e-12);
        assert!((terms[2].expr.coefficient(vars.import[2]) - 0.40).abs() < 1e-12);
    }

    #[test]
    fn test_missing_price_sensor_is_data_error() {
        let start = Utc.with_ymd_and_hms(2025, 1, 15, 6, 0, 0).unwrap();
        let periods = HorizonSpec::new(vec![TierSpec::minutes(2, 30).unwrap()])
            .unwrap()
            .build(start);
        let state = LiveState::new();
        let ctx = BuildContext::new(&periods, &state, start);
        let err = Grid::from_config(
            &GridConfig {
                name: "grid".into(),
                import_price: ValueSource::from("sensor.nordpool"),
                export_price: ValueSource::from(0.0),
                import_limit_kw: None,
                export_limit_kw: None,
            },
            &ctx,
        )
        .unwrap_err();
        assert!(
            matches!(err, NetworkError::DataInsufficiency { element, .. } if element == "grid")
        );
    }
}
