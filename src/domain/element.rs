//! Element contribution protocol and the closed element sum type.
//!
//! Every element owns its decision variables and writes constraints and cost
//! terms against them. Terminal elements (everything but links) additionally
//! see a [`Terminal`]: the flow expressions of all links attached to them.
//! Links expose the flow they take out of their source and put into their
//! target, which is how the compiler builds those terminals.

use crate::domain::battery::{Battery, BatteryVariables};
use crate::domain::connection::{Connection, FlowVariables};
use crate::domain::grid::{Grid, GridVariables};
use crate::domain::inverter::Inverter;
use crate::domain::load::{ConstantLoad, ForecastLoad};
use crate::domain::node::Node;
use crate::domain::period::Periods;
use crate::domain::photovoltaics::Photovoltaics;
use crate::domain::types::ElementKind;
use crate::error::NetworkError;
use crate::optimizer::model::{Constraint, CostTerm, LinearExpr, LinearModel, VarId};

/// Link flow expressions meeting one element endpoint, per period.
#[derive(Debug, Clone, Default)]
pub struct Terminal {
    inflow: Vec<LinearExpr>,
    outflow: Vec<LinearExpr>,
}

impl Terminal {
    pub fn new(periods: usize) -> Self {
        Self {
            inflow: vec![LinearExpr::zero(); periods],
            outflow: vec![LinearExpr::zero(); periods],
        }
    }

    pub fn add_inflow(&mut self, period: usize, expr: LinearExpr) {
        if let Some(slot) = self.inflow.get_mut(period) {
            *slot += expr;
        }
    }

    pub fn add_outflow(&mut self, period: usize, expr: LinearExpr) {
        if let Some(slot) = self.outflow.get_mut(period) {
            *slot += expr;
        }
    }

    pub fn inflow(&self, period: usize) -> LinearExpr {
        self.inflow.get(period).cloned().unwrap_or_default()
    }

    pub fn outflow(&self, period: usize) -> LinearExpr {
        self.outflow.get(period).cloned().unwrap_or_default()
    }

    /// One `net_production + Σin − Σout == 0` equality per period.
    pub fn balance(
        &self,
        element: &str,
        periods: usize,
        net_production: impl Fn(usize) -> LinearExpr,
    ) -> Vec<Constraint> {
        (0..periods)
            .map(|t| {
                Constraint::eq(
                    format!("{element}.balance[{t}]"),
                    net_production(t) + self.inflow(t) - self.outflow(t),
                    0.0,
                )
            })
            .collect()
    }
}

/// Solved values of one element, before timestamps are attached.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementReport {
    /// Per period. Net production for terminal elements, net transfer for
    /// links, throughput for nodes.
    pub power: Vec<f64>,
    /// Per boundary (n+1 points).
    pub energy: Option<Vec<f64>>,
    /// Per boundary, percent of capacity.
    pub soc: Option<Vec<f64>>,
    /// Additional per-period series such as `charge` or `import`.
    pub series: Vec<(&'static str, Vec<f64>)>,
}

/// Solved values of `vars`.
pub fn values_of(vars: &[VarId], values: &[f64]) -> Vec<f64> {
    vars.iter()
        .map(|v| values.get(v.index()).copied().unwrap_or(0.0))
        .collect()
}

/// Uniform contribution protocol implemented by every element variant.
pub trait ElementModel {
    type Variables;

    fn name(&self) -> &str;

    fn allocate_variables(&self, periods: &Periods, model: &mut LinearModel) -> Self::Variables;

    fn emit_constraints(
        &self,
        periods: &Periods,
        vars: &Self::Variables,
        terminal: &Terminal,
    ) -> Vec<Constraint>;

    fn emit_cost_terms(&self, _periods: &Periods, _vars: &Self::Variables) -> Vec<CostTerm> {
        Vec::new()
    }

    fn report(
        &self,
        periods: &Periods,
        vars: &Self::Variables,
        terminal: &Terminal,
        values: &[f64],
    ) -> ElementReport;
}

/// Elements that move power between two named endpoints.
pub trait Link: ElementModel {
    fn source(&self) -> &str;

    fn target(&self) -> &str;

    /// Power leaving the source endpoint in `period`.
    fn outflow_at_source(&self, period: usize, vars: &Self::Variables) -> LinearExpr;

    /// Power arriving at the target endpoint in `period`.
    fn inflow_at_target(&self, period: usize, vars: &Self::Variables) -> LinearExpr;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Battery(Battery),
    Grid(Grid),
    Photovoltaics(Photovoltaics),
    ConstantLoad(ConstantLoad),
    ForecastLoad(ForecastLoad),
    Node(Node),
    Connection(Connection),
    Inverter(Inverter),
}

/// Variables allocated for one element, tagged by variant.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableSet {
    None,
    Battery(BatteryVariables),
    Grid(GridVariables),
    Photovoltaics(Vec<VarId>),
    Flow(FlowVariables),
}

/// Pairs an element with its own variable set and evaluates `$body` with the
/// concrete types bound. A mismatched pair is an internal error.
macro_rules! with_variables {
    ($element:expr, $vars:expr, |$e:ident, $v:ident| $body:expr) => {
        match ($element, $vars) {
            (Element::Battery($e), VariableSet::Battery($v)) => Ok($body),
            (Element::Grid($e), VariableSet::Grid($v)) => Ok($body),
            (Element::Photovoltaics($e), VariableSet::Photovoltaics($v)) => Ok($body),
            (Element::ConstantLoad($e), VariableSet::None) => {
                let $v = &();
                Ok($body)
            }
            (Element::ForecastLoad($e), VariableSet::None) => {
                let $v = &();
                Ok($body)
            }
            (Element::Node($e), VariableSet::None) => {
                let $v = &();
                Ok($body)
            }
            (Element::Connection($e), VariableSet::Flow($v)) => Ok($body),
            (Element::Inverter($e), VariableSet::Flow($v)) => Ok($body),
            (element, _) => Err(NetworkError::Internal(format!(
                "variable set does not belong to `{}`",
                element.name()
            ))),
        }
    };
}

impl Element {
    pub fn name(&self) -> &str {
        match self {
            Element::Battery(e) => e.name(),
            Element::Grid(e) => e.name(),
            Element::Photovoltaics(e) => e.name(),
            Element::ConstantLoad(e) => e.name(),
            Element::ForecastLoad(e) => e.name(),
            Element::Node(e) => e.name(),
            Element::Connection(e) => e.name(),
            Element::Inverter(e) => e.name(),
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            Element::Battery(_) => ElementKind::Battery,
            Element::Grid(_) => ElementKind::Grid,
            Element::Photovoltaics(_) => ElementKind::Photovoltaics,
            Element::ConstantLoad(_) => ElementKind::ConstantLoad,
            Element::ForecastLoad(_) => ElementKind::ForecastLoad,
            Element::Node(_) => ElementKind::Node,
            Element::Connection(_) => ElementKind::Connection,
            Element::Inverter(_) => ElementKind::Inverter,
        }
    }

    /// `(source, target)` for links.
    pub fn endpoints(&self) -> Option<(&str, &str)> {
        match self {
            Element::Connection(c) => Some((c.source(), c.target())),
            Element::Inverter(i) => Some((i.source(), i.target())),
            _ => None,
        }
    }

    /// Battery capacity, used to express energy as state of charge.
    pub fn capacity_kwh(&self) -> Option<f64> {
        match self {
            Element::Battery(b) => Some(b.capacity_kwh()),
            _ => None,
        }
    }

    pub fn allocate(&self, periods: &Periods, model: &mut LinearModel) -> VariableSet {
        match self {
            Element::Battery(e) => VariableSet::Battery(e.allocate_variables(periods, model)),
            Element::Grid(e) => VariableSet::Grid(e.allocate_variables(periods, model)),
            Element::Photovoltaics(e) => {
                VariableSet::Photovoltaics(e.allocate_variables(periods, model))
            }
            Element::ConstantLoad(e) => {
                e.allocate_variables(periods, model);
                VariableSet::None
            }
            Element::ForecastLoad(e) => {
                e.allocate_variables(periods, model);
                VariableSet::None
            }
            Element::Node(e) => {
                e.allocate_variables(periods, model);
                VariableSet::None
            }
            Element::Connection(e) => VariableSet::Flow(e.allocate_variables(periods, model)),
            Element::Inverter(e) => VariableSet::Flow(e.allocate_variables(periods, model)),
        }
    }

    pub fn constraints(
        &self,
        periods: &Periods,
        vars: &VariableSet,
        terminal: &Terminal,
    ) -> Result<Vec<Constraint>, NetworkError> {
        with_variables!(self, vars, |e, v| e.emit_constraints(periods, v, terminal))
    }

    pub fn cost_terms(
        &self,
        periods: &Periods,
        vars: &VariableSet,
    ) -> Result<Vec<CostTerm>, NetworkError> {
        with_variables!(self, vars, |e, v| e.emit_cost_terms(periods, v))
    }

    pub fn report(
        &self,
        periods: &Periods,
        vars: &VariableSet,
        terminal: &Terminal,
        values: &[f64],
    ) -> Result<ElementReport, NetworkError> {
        with_variables!(self, vars, |e, v| e.report(periods, v, terminal, values))
    }

    /// `(outflow at source, inflow at target)` of a link in `period`.
    pub fn link_flows(
        &self,
        period: usize,
        vars: &VariableSet,
    ) -> Result<Option<(LinearExpr, LinearExpr)>, NetworkError> {
        match (self, vars) {
            (Element::Connection(c), VariableSet::Flow(v)) => Ok(Some((
                c.outflow_at_source(period, v),
                c.inflow_at_target(period, v),
            ))),
            (Element::Inverter(i), VariableSet::Flow(v)) => Ok(Some((
                i.outflow_at_source(period, v),
                i.inflow_at_target(period, v),
            ))),
            (Element::Connection(_) | Element::Inverter(_), _) => Err(NetworkError::Internal(
                format!("link `{}` has no flow variables", self.name()),
            )),
            _ => Ok(None),
        }
    }
}
