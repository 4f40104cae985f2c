//! Solver-agnostic linear program.
//!
//! Elements write into a [`LinearModel`] through the element protocol; the
//! solver adapter translates it into a concrete backend problem. Keeping the
//! intermediate form ours makes the compiled model inspectable in tests
//! without running a solver.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// Handle of a decision variable inside one [`LinearModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDef {
    pub name: String,
    /// `f64::NEG_INFINITY` when unbounded below.
    pub lower: f64,
    /// `f64::INFINITY` when unbounded above.
    pub upper: f64,
}

/// Affine expression `Σ coef·var + constant`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    terms: Vec<(VarId, f64)>,
    constant: f64,
}

impl LinearExpr {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn constant(value: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    pub fn term(var: VarId, coef: f64) -> Self {
        Self {
            terms: vec![(var, coef)],
            constant: 0.0,
        }
    }

    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    pub fn constant_part(&self) -> f64 {
        self.constant
    }

    pub fn is_constant(&self) -> bool {
        self.terms.iter().all(|(_, c)| *c == 0.0)
    }

    pub fn add_term(&mut self, var: VarId, coef: f64) {
        self.terms.push((var, coef));
    }

    /// Coefficient of `var`, summing duplicate terms.
    pub fn coefficient(&self, var: VarId) -> f64 {
        self.terms
            .iter()
            .filter(|(v, _)| *v == var)
            .map(|(_, c)| c)
            .sum()
    }

    /// Value of the expression for a full assignment indexed by [`VarId`].
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(var, coef)| coef * values.get(var.0).copied().unwrap_or(0.0))
            .sum::<f64>()
            + self.constant
    }
}

impl From<VarId> for LinearExpr {
    fn from(var: VarId) -> Self {
        Self::term(var, 1.0)
    }
}

impl From<f64> for LinearExpr {
    fn from(value: f64) -> Self {
        Self::constant(value)
    }
}

impl<T: Into<LinearExpr>> Add<T> for LinearExpr {
    type Output = LinearExpr;
    fn add(mut self, rhs: T) -> Self::Output {
        self += rhs;
        self
    }
}

impl<T: Into<LinearExpr>> AddAssign<T> for LinearExpr {
    fn add_assign(&mut self, rhs: T) {
        let rhs = rhs.into();
        self.terms.extend(rhs.terms);
        self.constant += rhs.constant;
    }
}

impl<T: Into<LinearExpr>> Sub<T> for LinearExpr {
    type Output = LinearExpr;
    fn sub(mut self, rhs: T) -> Self::Output {
        self -= rhs;
        self
    }
}

impl<T: Into<LinearExpr>> SubAssign<T> for LinearExpr {
    fn sub_assign(&mut self, rhs: T) {
        *self += -rhs.into();
    }
}

impl Neg for LinearExpr {
    type Output = LinearExpr;
    fn neg(self) -> Self::Output {
        self * -1.0
    }
}

impl Mul<f64> for LinearExpr {
    type Output = LinearExpr;
    fn mul(mut self, rhs: f64) -> Self::Output {
        for (_, coef) in &mut self.terms {
            *coef *= rhs;
        }
        self.constant *= rhs;
        self
    }
}

impl Mul<VarId> for f64 {
    type Output = LinearExpr;
    fn mul(self, rhs: VarId) -> Self::Output {
        LinearExpr::term(rhs, self)
    }
}

impl Sum for LinearExpr {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(LinearExpr::zero(), |acc, e| acc + e)
    }
}

/// Relation of a constraint expression to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Equal,
    LessOrEqual,
    GreaterOrEqual,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::Equal => write!(f, "=="),
            Relation::LessOrEqual => write!(f, "<="),
            Relation::GreaterOrEqual => write!(f, ">="),
        }
    }
}

/// `expr <relation> 0`, stored in normalized form.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub expr: LinearExpr,
    pub relation: Relation,
}

impl Constraint {
    pub fn eq(
        name: impl Into<String>,
        lhs: impl Into<LinearExpr>,
        rhs: impl Into<LinearExpr>,
    ) -> Self {
        Self::new(name, lhs, rhs, Relation::Equal)
    }

    pub fn leq(
        name: impl Into<String>,
        lhs: impl Into<LinearExpr>,
        rhs: impl Into<LinearExpr>,
    ) -> Self {
        Self::new(name, lhs, rhs, Relation::LessOrEqual)
    }

    pub fn geq(
        name: impl Into<String>,
        lhs: impl Into<LinearExpr>,
        rhs: impl Into<LinearExpr>,
    ) -> Self {
        Self::new(name, lhs, rhs, Relation::GreaterOrEqual)
    }

    fn new(
        name: impl Into<String>,
        lhs: impl Into<LinearExpr>,
        rhs: impl Into<LinearExpr>,
        relation: Relation,
    ) -> Self {
        Self {
            name: name.into(),
            expr: lhs.into() - rhs.into(),
            relation,
        }
    }

    /// Signed violation for an assignment; zero when satisfied.
    pub fn violation(&self, values: &[f64]) -> f64 {
        let lhs = self.expr.evaluate(values);
        match self.relation {
            Relation::Equal => lhs,
            Relation::LessOrEqual => lhs.max(0.0),
            Relation::GreaterOrEqual => lhs.min(0.0),
        }
    }
}

/// One contribution to the objective, attributed to a period.
#[derive(Debug, Clone, PartialEq)]
pub struct CostTerm {
    pub period: usize,
    pub expr: LinearExpr,
}

impl CostTerm {
    pub fn new(period: usize, expr: impl Into<LinearExpr>) -> Self {
        Self {
            period,
            expr: expr.into(),
        }
    }
}

/// Variables, bounds, constraints and a minimization objective.
#[derive(Debug, Clone, Default)]
pub struct LinearModel {
    variables: Vec<VariableDef>,
    constraints: Vec<Constraint>,
    objective: LinearExpr,
}

impl LinearModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(&mut self, name: impl Into<String>, lower: f64, upper: f64) -> VarId {
        let id = VarId(self.variables.len());
        self.variables.push(VariableDef {
            name: name.into(),
            lower,
            upper,
        });
        id
    }

    /// Allocates one variable per index in `0..count`, named `prefix[i]`.
    pub fn add_series(
        &mut self,
        prefix: &str,
        count: usize,
        mut bounds: impl FnMut(usize) -> (f64, f64),
    ) -> Vec<VarId> {
        (0..count)
            .map(|i| {
                let (lower, upper) = bounds(i);
                self.add_variable(format!("{prefix}[{i}]"), lower, upper)
            })
            .collect()
    }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    pub fn extend_constraints(&mut self, constraints: impl IntoIterator<Item = Constraint>) {
        self.constraints.extend(constraints);
    }

    pub fn add_to_objective(&mut self, expr: impl Into<LinearExpr>) {
        self.objective += expr.into();
    }

    pub fn variables(&self) -> &[VariableDef] {
        &self.variables
    }

    pub fn variable(&self, var: VarId) -> Option<&VariableDef> {
        self.variables.get(var.0)
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &LinearExpr {
        &self.objective
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_arithmetic() {
        let mut model = LinearModel::new();
        let x = model.add_variable("x", 0.0, 10.0);
        let y = model.add_variable("y", 0.0, f64::INFINITY);

        let expr = 2.0 * x + LinearExpr::from(y) * 3.0 - 1.5;
        assert_eq!(expr.coefficient(x), 2.0);
        assert_eq!(expr.coefficient(y), 3.0);
        assert_eq!(expr.constant_part(), -1.5);
        assert_eq!(expr.evaluate(&[1.0, 2.0]), 6.5);
    }

    #[test]
    fn test_constraint_normalization() {
        let mut model = LinearModel::new();
        let x = model.add_variable("x", f64::NEG_INFINITY, f64::INFINITY);

        let c = Constraint::leq("cap", x, 4.0);
        assert_eq!(c.relation, Relation::LessOrEqual);
        assert_eq!(c.violation(&[3.0]), 0.0);
        assert_eq!(c.violation(&[6.0]), 2.0);

        let e = Constraint::eq("fix", x, 4.0);
        assert_eq!(e.violation(&[4.0]), 0.0);
    }

    #[test]
    fn test_series_naming() {
        let mut model = LinearModel::new();
        let vars = model.add_series("grid.import", 3, |i| (0.0, i as f64));
        assert_eq!(vars.len(), 3);
        assert_eq!(model.variable(vars[2]).unwrap().name, "grid.import[2]");
        assert_eq!(model.variable(vars[2]).unwrap().upper, 2.0);
    }

    #[test]
    fn test_sum_of_expressions() {
        let mut model = LinearModel::new();
        let vars = model.add_series("v", 3, |_| (0.0, 1.0));
        let total: LinearExpr = vars.iter().map(|v| LinearExpr::from(*v)).sum();
        assert_eq!(total.evaluate(&[1.0, 2.0, 3.0]), 6.0);
    }
}
