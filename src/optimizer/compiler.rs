//! Turns a [`Network`] into one flat [`LinearModel`].

use tracing::debug;

use crate::domain::{Terminal, VariableSet};
use crate::error::NetworkError;
use crate::optimizer::model::{CostTerm, LinearExpr, LinearModel};
use crate::power_flow::Network;

/// The compiled model plus the bookkeeping needed to read results back.
#[derive(Debug, Clone)]
pub struct CompiledNetwork {
    pub model: LinearModel,
    /// Variables of each element, by declaration index.
    pub variables: Vec<VariableSet>,
    /// Link flows meeting each element, by declaration index.
    pub terminals: Vec<Terminal>,
    /// Cost terms of each element, by declaration index.
    pub cost_terms: Vec<Vec<CostTerm>>,
}

impl CompiledNetwork {
    /// Cost attributed to one element for a solved assignment.
    pub fn element_cost(&self, declaration: usize, values: &[f64]) -> f64 {
        self.cost_terms
            .get(declaration)
            .map(|terms| terms.iter().map(|t| t.expr.evaluate(values)).sum())
            .unwrap_or(0.0)
    }
}

pub fn compile(network: &Network) -> Result<CompiledNetwork, NetworkError> {
    let periods = network.periods();
    let n = periods.len();
    let elements = network.elements();
    let graph = network.graph();
    let mut model = LinearModel::new();

    let variables: Vec<VariableSet> = elements
        .iter()
        .map(|element| element.allocate(periods, &mut model))
        .collect();

    let mut terminals: Vec<Terminal> = (0..elements.len()).map(|_| Terminal::new(n)).collect();
    for link in graph.links() {
        for t in 0..n {
            let (outflow, inflow) = elements[link.link]
                .link_flows(t, &variables[link.link])?
                .ok_or_else(|| {
                    NetworkError::Internal(format!(
                        "`{}` is an edge but not a link",
                        elements[link.link].name()
                    ))
                })?;
            terminals[link.source].add_outflow(t, outflow);
            terminals[link.target].add_inflow(t, inflow);
        }
    }

    let mut cost_terms = Vec::with_capacity(elements.len());
    for (i, element) in elements.iter().enumerate() {
        model.extend_constraints(element.constraints(periods, &variables[i], &terminals[i])?);
        let terms = element.cost_terms(periods, &variables[i])?;
        for term in &terms {
            model.add_to_objective(term.expr.clone());
        }
        cost_terms.push(terms);
    }

    debug!(
        variables = model.variable_count(),
        constraints = model.constraint_count(),
        cost_terms = cost_terms.iter().map(Vec::len).sum::<usize>(),
        "model compiled"
    );
    Ok(CompiledNetwork {
        model,
        variables,
        terminals,
        cost_terms,
    })
}

/// Σ of every cost term, equal to the model objective.
pub fn total_cost(cost_terms: &[Vec<CostTerm>]) -> LinearExpr {
    cost_terms
        .iter()
        .flatten()
        .map(|term| term.expr.clone())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ElementConfig};
    use crate::domain::{ConnectionConfig, ConstantLoadConfig, GridConfig, NodeConfig};
    use crate::forecast::sources::{LiveState, ValueSource};
    use crate::optimizer::model::Relation;
    use crate::power_flow::ElementRegistry;
    use chrono::{TimeZone, Utc};

    fn grid_and_load() -> Network {
        let mut config = Config::default();
        config.optimizer.tiers = vec![crate::config::TierConfig {
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
        Network::build(
            &config,
            &ElementRegistry::standard(),
            &LiveState::new(),
            Utc.with_ymd_and_hms(2025, 4, 1, 8, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_compiled_shape() {
        let compiled = compile(&grid_and_load()).unwrap();
        // grid import/export (4) + bidirectional link (4) + directed link (2)
        assert_eq!(compiled.model.variable_count(), 10);
        // one balance per terminal element and period
        assert_eq!(compiled.model.constraint_count(), 6);
        assert!(compiled
            .model
            .constraints()
            .iter()
            .all(|c| c.relation == Relation::Equal));
        assert_eq!(compiled.variables.len(), 5);
    }

    #[test]
    fn test_objective_is_sum_of_cost_terms() {
        let compiled = compile(&grid_and_load()).unwrap();
        let total = total_cost(&compiled.cost_terms);
        let values: Vec<f64> = (0..compiled.model.variable_count())
            .map(|i| i as f64 + 0.5)
            .collect();
        let objective = compiled.model.objective().evaluate(&values);
        assert!((total.evaluate(&values) - objective).abs() < 1e-9);
        assert!((compiled.element_cost(0, &values) - total.evaluate(&values)).abs() < 1e-9);
    }

    #[test]
    fn test_feasible_assignment_satisfies_every_constraint() {
        let compiled = compile(&grid_and_load()).unwrap();
        let mut values = vec![0.0; compiled.model.variable_count()];
        for (value, def) in values.iter_mut().zip(compiled.model.variables()) {
            if def.name.starts_with("grid.import") || def.name.contains(".forward[") {
                *value = 2.0;
            }
        }
        for c in compiled.model.constraints() {
            assert!(c.violation(&values).abs() < 1e-9, "{} violated", c.name);
        }
    }
}
