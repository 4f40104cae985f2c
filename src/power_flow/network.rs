use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::Config;
use crate::domain::{Element, Periods};
use crate::error::NetworkError;
use crate::forecast::sources::LiveState;
use crate::optimizer::solver::SolverKind;
use crate::power_flow::graph::NetworkGraph;
use crate::power_flow::registry::{BuildContext, ElementRegistry};

/// Root aggregate of one optimization cycle.
///
/// Built from configuration and live state, then consumed by the compiler
/// and the result extractor. `elements[i]` is the element declared at
/// position `i` of the graph.
#[derive(Debug, Clone)]
pub struct Network {
    periods: Periods,
    solver: SolverKind,
    graph: NetworkGraph,
    elements: Vec<Element>,
}

impl Network {
    /// Validates the configuration and topology, resolves every input
    /// against `state` and instantiates the elements.
    ///
    /// Configuration problems are reported before any live data is read.
    pub fn build(
        config: &Config,
        registry: &ElementRegistry,
        state: &LiveState,
        now: DateTime<Utc>,
    ) -> Result<Self, NetworkError> {
        config.check()?;
        let horizon = config.optimizer.horizon()?;
        let solver = config.optimizer.solver_kind()?;
        let declarations = config.declarations();
        let graph = NetworkGraph::try_new(&declarations)?;

        let start = if config.optimizer.align_start {
            horizon.aligned_start(now)
        } else {
            now
        };
        let periods = horizon.build(start);

        let ctx = BuildContext::new(&periods, state, now)
            .with_max_state_age(config.optimizer.max_state_age());
        let elements = declarations
            .iter()
            .map(|declaration| registry.build(declaration, &ctx))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            elements = elements.len(),
            periods = periods.len(),
            %start,
            %solver,
            "network built"
        );
        Ok(Self {
            periods,
            solver,
            graph,
            elements,
        })
    }

    /// Assembles a network from already constructed parts.
    pub fn from_parts(
        periods: Periods,
        solver: SolverKind,
        graph: NetworkGraph,
        elements: Vec<Element>,
    ) -> Result<Self, NetworkError> {
        if graph.len() != elements.len() {
            return Err(NetworkError::Internal(format!(
                "graph has {} declarations but {} elements were built",
                graph.len(),
                elements.len()
            )));
        }
        if let Some(i) = (0..elements.len()).find(|&i| graph.name(i) != elements[i].name()) {
            return Err(NetworkError::Internal(format!(
                "declaration `{}` does not match element `{}`",
                graph.name(i),
                elements[i].name()
            )));
        }
        Ok(Self {
            periods,
            solver,
            graph,
            elements,
        })
    }

    pub fn periods(&self) -> &Periods {
        &self.periods
    }

    pub fn solver(&self) -> SolverKind {
        self.solver
    }

    pub fn graph(&self) -> &NetworkGraph {
        &self.graph
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn element(&self, name: &str) -> Option<&Element> {
        self.graph.position(name).map(|i| &self.elements[i])
    }
}
