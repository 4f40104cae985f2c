//! LP backends behind a uniform interface.
//!
//! Each [`LinearModel`] is translated into a `good_lp` problem for the
//! selected backend. Backend outcomes are normalized into [`SolveStatus`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use good_lp::{
    constraint, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel,
    Variable,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{NetworkError, NetworkStatus};
use crate::optimizer::model::{LinearExpr, LinearModel, Relation};

/// Backend identifier as written in configuration.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SolverKind {
    /// Pure Rust simplex, always available.
    #[default]
    Microlp,
    /// Interior point, `clarabel` cargo feature.
    Clarabel,
    /// HiGHS, `highs` cargo feature.
    Highs,
}

impl SolverKind {
    pub fn is_available(self) -> bool {
        match self {
            SolverKind::Microlp => true,
            SolverKind::Clarabel => cfg!(feature = "clarabel"),
            SolverKind::Highs => cfg!(feature = "highs"),
        }
    }
}

/// Normalized result of one solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    SolverError,
}

impl From<SolveStatus> for NetworkStatus {
    fn from(status: SolveStatus) -> Self {
        match status {
            SolveStatus::Optimal => NetworkStatus::Optimal,
            SolveStatus::Infeasible => NetworkStatus::Infeasible,
            SolveStatus::Unbounded => NetworkStatus::Unbounded,
            SolveStatus::SolverError => NetworkStatus::SolverError,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    /// Value of every model variable, indexed by `VarId`. Only when optimal.
    pub values: Option<Vec<f64>>,
    pub duration: Duration,
    pub message: Option<String>,
}

impl SolveOutcome {
    pub fn optimal(values: Vec<f64>, duration: Duration) -> Self {
        Self {
            status: SolveStatus::Optimal,
            values: Some(values),
            duration,
            message: None,
        }
    }

    pub fn failed(status: SolveStatus, message: impl Into<String>, duration: Duration) -> Self {
        Self {
            status,
            values: None,
            duration,
            message: Some(message.into()),
        }
    }

    /// The non-optimal outcomes as errors.
    pub fn error(&self) -> Option<NetworkError> {
        let message = self.message.clone().unwrap_or_default();
        match self.status {
            SolveStatus::Optimal => None,
            SolveStatus::Infeasible => Some(NetworkError::Infeasible),
            SolveStatus::Unbounded => Some(NetworkError::Unbounded(message)),
            SolveStatus::SolverError => Some(NetworkError::Solver(message)),
        }
    }
}

/// Anything that can take a model and return status plus variable values.
pub trait SolverBackend: Send + Sync {
    fn name(&self) -> &str;

    fn solve(&self, model: &LinearModel) -> SolveOutcome;
}

/// `good_lp` backed solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoodLpBackend {
    kind: SolverKind,
    name: &'static str,
}

impl GoodLpBackend {
    pub fn new(kind: SolverKind) -> Self {
        let name = match kind {
            SolverKind::Microlp => "microlp",
            SolverKind::Clarabel => "clarabel",
            SolverKind::Highs => "highs",
        };
        Self { kind, name }
    }

    pub fn kind(&self) -> SolverKind {
        self.kind
    }

    fn dispatch(&self, model: &LinearModel) -> Result<Vec<f64>, ResolutionError> {
        match self.kind {
            SolverKind::Microlp => solve_with(good_lp::microlp, model),
            #[cfg(feature = "clarabel")]
            SolverKind::Clarabel => solve_with(good_lp::clarabel, model),
            #[cfg(feature = "highs")]
            SolverKind::Highs => solve_with(good_lp::highs, model),
            #[allow(unreachable_patterns)]
            other => Err(ResolutionError::Str(format!(
                "solver `{other}` is not compiled into this build"
            ))),
        }
    }
}

impl SolverBackend for GoodLpBackend {
    fn name(&self) -> &str {
        self.name
    }

    fn solve(&self, model: &LinearModel) -> SolveOutcome {
        let started = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| self.dispatch(model)));
        let elapsed = started.elapsed();

        let outcome = match result {
            Ok(Ok(values)) if values.iter().all(|v| v.is_finite()) => {
                SolveOutcome::optimal(values, elapsed)
            }
            Ok(Ok(_)) => SolveOutcome::failed(
                SolveStatus::SolverError,
                "solver returned non-finite values",
                elapsed,
            ),
            Ok(Err(ResolutionError::Infeasible)) => {
                SolveOutcome::failed(SolveStatus::Infeasible, "no feasible schedule", elapsed)
            }
            Ok(Err(ResolutionError::Unbounded)) => SolveOutcome::failed(
                SolveStatus::Unbounded,
                "objective is unbounded below",
                elapsed,
            ),
            Ok(Err(e)) => SolveOutcome::failed(SolveStatus::SolverError, e.to_string(), elapsed),
            Err(_) => {
                warn!(solver = self.name, "solver panicked");
                SolveOutcome::failed(SolveStatus::SolverError, "solver crashed", elapsed)
            }
        };
        debug!(
            solver = self.name,
            status = %outcome.status,
            duration_ms = elapsed.as_millis() as u64,
            "solve finished"
        );
        outcome
    }
}

fn to_expression(expr: &LinearExpr, handles: &[Variable]) -> Expression {
    let mut out = Expression::from(expr.constant_part());
    for (var, coef) in expr.terms() {
        out += *coef * handles[var.index()];
    }
    out
}

/// Translates `model` for backend `solver` and returns the value of every
/// variable in model order.
fn solve_with<S>(solver: S, model: &LinearModel) -> Result<Vec<f64>, ResolutionError>
where
    S: good_lp::Solver,
    S::Model: SolverModel<Error = ResolutionError>,
{
    let mut vars = ProblemVariables::new();
    let handles: Vec<Variable> = model
        .variables()
        .iter()
        .map(|def| {
            let mut definition = variable().name(def.name.clone());
            if def.lower.is_finite() {
                definition = definition.min(def.lower);
            }
            if def.upper.is_finite() {
                definition = definition.max(def.upper);
            }
            vars.add(definition)
        })
        .collect();

    let objective = to_expression(model.objective(), &handles);
    let mut problem = vars.minimise(objective).using(solver);
    for c in model.constraints() {
        let expr = to_expression(&c.expr, &handles);
        problem = problem.with(match c.relation {
            Relation::Equal => constraint!(expr == 0.0),
            Relation::LessOrEqual => constraint!(expr <= 0.0),
            Relation::GreaterOrEqual => constraint!(expr >= 0.0),
        });
    }

    let solution = problem.solve()?;
    Ok(handles.iter().map(|v| solution.value(*v)).collect())
}
