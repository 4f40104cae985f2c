//! LP construction, solving and result extraction.

pub mod compiler;
pub mod extract;
pub mod model;
pub mod solver;

pub use compiler::{compile, CompiledNetwork};
pub use extract::{extract, CycleReport, ElementResult, Solution, SolveRecord};
pub use model::{Constraint, CostTerm, LinearExpr, LinearModel, Relation, VarId};
pub use solver::{GoodLpBackend, SolveOutcome, SolveStatus, SolverBackend, SolverKind};

use crate::error::NetworkError;
use crate::power_flow::Network;

/// Compiles, solves and extracts one network synchronously.
pub fn optimize(
    network: &Network,
    backend: &dyn SolverBackend,
) -> Result<CycleReport, NetworkError> {
    let compiled = compile(network)?;
    let outcome = backend.solve(&compiled.model);
    extract(network, &compiled, &outcome)
}
