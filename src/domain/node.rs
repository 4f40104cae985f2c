use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::element::{ElementModel, ElementReport, Terminal};
use crate::domain::period::Periods;
use crate::optimizer::model::{Constraint, LinearExpr, LinearModel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NodeConfig {
    #[validate(length(min = 1))]
    pub name: String,
}

/// Junction enforcing conservation of power between its links.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    name: String,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ElementModel for Node {
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
        terminal.balance(&self.name, periods.len(), |_| LinearExpr::zero())
    }

    fn report(
        &self,
        periods: &Periods,
        _vars: &(),
        terminal: &Terminal,
        values: &[f64],
    ) -> ElementReport {
        ElementReport {
            power: (0..periods.len())
                .map(|t| terminal.inflow(t).evaluate(values))
                .collect(),
            ..Default::default()
        }
    }
}
