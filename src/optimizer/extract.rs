//! Reads solved values back into timestamped per-element series.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{ElementKind, TimeSeries};
use crate::error::{NetworkError, NetworkStatus};
use crate::optimizer::compiler::CompiledNetwork;
use crate::optimizer::solver::{SolveOutcome, SolveStatus};
use crate::power_flow::Network;

/// Results of one element over the horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementResult {
    pub kind: ElementKind,
    /// kW keyed by period start.
    pub power: TimeSeries,
    /// kWh keyed by period boundary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<TimeSeries>,
    /// Percent of capacity keyed by period boundary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soc: Option<TimeSeries>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub series: BTreeMap<String, TimeSeries>,
    /// Sum of this element's cost terms.
    pub cost: f64,
}

/// Published result of a successful cycle. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: NetworkStatus,
    pub total_cost: f64,
    pub solve_duration_ms: u64,
    pub periods: usize,
    pub elements: BTreeMap<String, ElementResult>,
}

impl Solution {
    pub fn element(&self, name: &str) -> Option<&ElementResult> {
        self.elements.get(name)
    }
}

/// Status record kept for every cycle, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveRecord {
    pub status: NetworkStatus,
    pub finished_at: DateTime<Utc>,
    pub solve_duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SolveRecord {
    pub fn from_error(error: &NetworkError) -> Self {
        Self {
            status: error.status(),
            finished_at: Utc::now(),
            solve_duration_ms: 0,
            message: Some(error.to_string()),
        }
    }

    /// A cycle that ended without a solution after running for `elapsed`.
    pub fn failed(status: NetworkStatus, elapsed: Duration, message: impl Into<String>) -> Self {
        Self {
            status,
            finished_at: Utc::now(),
            solve_duration_ms: elapsed.as_millis() as u64,
            message: Some(message.into()),
        }
    }
}

/// What a cycle hands back: always a record, a solution only when optimal.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub record: SolveRecord,
    pub solution: Option<Solution>,
}

impl CycleReport {
    /// The solution, or the error describing why there is none.
    pub fn into_result(self) -> Result<Solution, NetworkError> {
        match self.solution {
            Some(solution) => Ok(solution),
            None => Err(match self.record.status {
                NetworkStatus::Infeasible => NetworkError::Infeasible,
                NetworkStatus::Unbounded => {
                    NetworkError::Unbounded(self.record.message.unwrap_or_default())
                }
                _ => NetworkError::Solver(self.record.message.unwrap_or_default()),
            }),
        }
    }
}

pub fn extract(
    network: &Network,
    compiled: &CompiledNetwork,
    outcome: &SolveOutcome,
) -> Result<CycleReport, NetworkError> {
    let solve_duration_ms = outcome.duration.as_millis() as u64;
    let record = SolveRecord {
        status: outcome.status.into(),
        finished_at: Utc::now(),
        solve_duration_ms,
        message: outcome.message.clone(),
    };

    let values = match (outcome.status, &outcome.values) {
        (SolveStatus::Optimal, Some(values)) => values,
        _ => {
            return Ok(CycleReport {
                record,
                solution: None,
            })
        }
    };
    if values.len() != compiled.model.variable_count() {
        return Err(NetworkError::Internal(format!(
            "solver returned {} values for {} variables",
            values.len(),
            compiled.model.variable_count()
        )));
    }

    let periods = network.periods();
    let starts: Vec<_> = periods.iter().map(|p| p.start).collect();
    let boundaries = periods.boundaries();

    let mut elements = BTreeMap::new();
    for (i, element) in network.elements().iter().enumerate() {
        let report = element.report(
            periods,
            &compiled.variables[i],
            &compiled.terminals[i],
            values,
        )?;
        let result = ElementResult {
            kind: element.kind(),
            power: TimeSeries::zip(starts.iter().copied(), report.power),
            energy: report
                .energy
                .map(|e| TimeSeries::zip(boundaries.iter().copied(), e)),
            soc: report
                .soc
                .map(|s| TimeSeries::zip(boundaries.iter().copied(), s)),
            series: report
                .series
                .into_iter()
                .map(|(key, v)| (key.to_string(), TimeSeries::zip(starts.iter().copied(), v)))
                .collect(),
            cost: compiled.element_cost(i, values),
        };
        elements.insert(element.name().to_string(), result);
    }

    let solution = Solution {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        status: NetworkStatus::Optimal,
        total_cost: compiled.model.objective().evaluate(values),
        solve_duration_ms,
        periods: periods.len(),
        elements,
    };
    Ok(CycleReport {
        record,
        solution: Some(solution),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ElementConfig, TierConfig};
    use crate::domain::{BatteryConfig, ConnectionConfig, CostDecay, NodeConfig};
    use crate::forecast::sources::{LiveState, ValueSource};
    use crate::optimizer::compiler::compile;
    use crate::power_flow::ElementRegistry;
    use chrono::TimeZone;
    use std::time::Duration;

    fn battery_network() -> Network {
        let mut config = Config::default();
        config.optimizer.tiers = vec![TierConfig {
            count: 2,
            duration_minutes: 60,
        }];
        config.elements = vec![
            ElementConfig::Battery(BatteryConfig {
                name: "battery".into(),
                capacity_kwh: 10.0,
                soc: ValueSource::from(50.0),
                min_soc_percent: 0.0,
                max_soc_percent: 100.0,
                efficiency: 1.0,
                max_charge_kw: Some(5.0),
                max_discharge_kw: Some(5.0),
                charge_cost: 0.0,
                discharge_cost: 0.0,
                charge_cost_decay: CostDecay::Constant,
            }),
            ElementConfig::Node(NodeConfig { name: "bus".into() }),
        ];
        config.connections = vec![ConnectionConfig::new("battery", "bus").bidirectional()];
        Network::build(
            &config,
            &ElementRegistry::standard(),
            &LiveState::new(),
            Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_non_optimal_outcome_has_no_solution() {
        let network = battery_network();
        let compiled = compile(&network).unwrap();
        let outcome =
            SolveOutcome::failed(SolveStatus::Infeasible, "no", Duration::from_millis(12));

        let report = extract(&network, &compiled, &outcome).unwrap();
        assert!(report.solution.is_none());
        assert_eq!(report.record.status, NetworkStatus::Infeasible);
        assert_eq!(report.record.solve_duration_ms, 12);
        assert!(matches!(report.into_result(), Err(NetworkError::Infeasible)));
    }

    #[test]
    fn test_battery_series_are_keyed_by_boundaries() {
        let network = battery_network();
        let compiled = compile(&network).unwrap();
        // charge, discharge, energy[0..=2], link forward, link reverse
        let values = vec![0.0, 0.0, 2.0, 3.0, 5.0, 3.0, 0.0, 2.0, 3.0, 0.0, 0.0];
        assert_eq!(values.len(), compiled.model.variable_count());
        let outcome = SolveOutcome::optimal(values, Duration::from_millis(3));

        let solution = extract(&network, &compiled, &outcome)
            .unwrap()
            .into_result()
            .unwrap();
        let battery = solution.element("battery").unwrap();
        assert_eq!(battery.kind, ElementKind::Battery);
        assert_eq!(battery.power.len(), 2);
        assert_eq!(battery.soc.as_ref().unwrap().len(), 3);
        assert_eq!(
            battery.soc.as_ref().unwrap().values().collect::<Vec<_>>(),
            vec![50.0, 30.0, 0.0]
        );
        assert_eq!(
            battery.series["discharge"].values().collect::<Vec<_>>(),
            vec![2.0, 3.0]
        );
        assert_eq!(battery.power.values().collect::<Vec<_>>(), vec![2.0, 3.0]);
        let bus = solution.element("bus").unwrap();
        assert_eq!(bus.power.values().collect::<Vec<_>>(), vec![2.0, 3.0]);
        assert_eq!(solution.elements.len(), 3);
        assert_eq!(solution.status, NetworkStatus::Optimal);
    }

    #[test]
    fn test_value_count_mismatch_is_internal_error() {
        let network = battery_network();
        let compiled = compile(&network).unwrap();
        let outcome = SolveOutcome::optimal(vec![0.0], Duration::ZERO);
        assert!(matches!(
            extract(&network, &compiled, &outcome),
            Err(NetworkError::Internal(_))
        ));
    }
}
