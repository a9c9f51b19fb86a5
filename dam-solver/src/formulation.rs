mod expr;
mod lp;

pub use expr::{LinExpr, VarId};

/// The domain of a decision variable
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Domain {
    /// Any real value within the bounds
    Continuous,
    /// Zero or one
    Binary,
    /// Any integer within the bounds
    Integer,
}

/// The direction of optimization
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sense {
    /// Maximise the objective
    Maximise,
    /// Minimise the objective
    Minimise,
}

/// The comparison of a row against its right-hand side
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cmp {
    /// lhs <= rhs
    Le,
    /// lhs >= rhs
    Ge,
    /// lhs == rhs
    Eq,
}

/// A decision variable and its mutable state.
///
/// Besides its declared bounds, a variable carries a value (the last incumbent,
/// or the value it was fixed to) and a fixed flag. Fixing pins the variable to
/// its value without touching the declared bounds, so releasing it restores
/// the declared domain while keeping the value around as a warm start.
#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    name: String,
    domain: Domain,
    lower: f64,
    upper: f64,
    fixed: bool,
    value: Option<f64>,
}

impl Variable {
    /// The unique name of the variable
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The domain of the variable
    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Whether the variable is binary or integer
    pub fn is_discrete(&self) -> bool {
        self.domain != Domain::Continuous
    }

    /// The declared bounds
    pub fn declared_bounds(&self) -> (f64, f64) {
        (self.lower, self.upper)
    }

    /// The bounds a solver must honour: the fixed value when fixed, the declared bounds otherwise
    pub fn bounds(&self) -> (f64, f64) {
        match (self.fixed, self.value) {
            (true, Some(value)) => (value, value),
            _ => (self.lower, self.upper),
        }
    }

    /// Whether the variable is pinned to its value
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// The current value, if any
    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

/// A named linear row `terms cmp rhs`.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    /// The unique name of the row
    pub name: String,
    /// The merged variable terms
    pub terms: Vec<(VarId, f64)>,
    /// The comparison
    pub cmp: Cmp,
    /// The right-hand side
    pub rhs: f64,
}

impl Row {
    /// How far the row is violated for the given values, zero when satisfied
    pub fn violation(&self, values: &[f64]) -> f64 {
        let lhs: f64 = self
            .terms
            .iter()
            .map(|(var, coefficient)| coefficient * values.get(var.index()).copied().unwrap_or(0.0))
            .sum();
        match self.cmp {
            Cmp::Le => (lhs - self.rhs).max(0.0),
            Cmp::Ge => (self.rhs - lhs).max(0.0),
            Cmp::Eq => (lhs - self.rhs).abs(),
        }
    }
}

/// A solver-independent mixed-integer linear program.
///
/// Market models build a formulation once and then drive it through the solve
/// phases by fixing and releasing variables. Backends translate it into the
/// representation of their engine on every solve and report back an
/// incumbent, which is loaded into the variable values.
#[derive(Clone, Debug)]
pub struct Formulation {
    name: String,
    sense: Sense,
    objective: LinExpr,
    variables: Vec<Variable>,
    rows: Vec<Row>,
    solved: bool,
}

impl Formulation {
    /// An empty formulation
    pub fn new(name: impl Into<String>, sense: Sense) -> Self {
        Self {
            name: name.into(),
            sense,
            objective: LinExpr::new(),
            variables: Vec::new(),
            rows: Vec::new(),
            solved: false,
        }
    }

    /// The name of the formulation
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The optimization direction
    pub fn sense(&self) -> Sense {
        self.sense
    }

    /// Declare a variable
    pub fn add_variable(
        &mut self,
        name: impl Into<String>,
        domain: Domain,
        lower: f64,
        upper: f64,
    ) -> VarId {
        let (lower, upper) = match domain {
            Domain::Binary => (lower.max(0.0), upper.min(1.0)),
            _ => (lower, upper),
        };
        self.variables.push(Variable {
            name: name.into(),
            domain,
            lower,
            upper,
            fixed: false,
            value: None,
        });
        VarId(self.variables.len() - 1)
    }

    /// Declare a continuous variable
    pub fn continuous(&mut self, name: impl Into<String>, lower: f64, upper: f64) -> VarId {
        self.add_variable(name, Domain::Continuous, lower, upper)
    }

    /// Declare a non-negative continuous variable
    pub fn nonneg(&mut self, name: impl Into<String>) -> VarId {
        self.continuous(name, 0.0, f64::INFINITY)
    }

    /// Declare a free continuous variable
    pub fn free(&mut self, name: impl Into<String>) -> VarId {
        self.continuous(name, f64::NEG_INFINITY, f64::INFINITY)
    }

    /// Declare a binary variable
    pub fn binary(&mut self, name: impl Into<String>) -> VarId {
        self.add_variable(name, Domain::Binary, 0.0, 1.0)
    }

    /// Add the row `lhs cmp rhs`, moving all variables left and all constants right
    pub fn constrain(
        &mut self,
        name: impl Into<String>,
        lhs: impl Into<LinExpr>,
        cmp: Cmp,
        rhs: impl Into<LinExpr>,
    ) {
        let expr = lhs.into() - rhs.into();
        self.rows.push(Row {
            name: name.into(),
            terms: expr.merged(),
            cmp,
            rhs: 0.0 - expr.constant(),
        });
    }

    /// Add the row `lhs <= rhs`
    pub fn le(&mut self, name: impl Into<String>, lhs: impl Into<LinExpr>, rhs: impl Into<LinExpr>) {
        self.constrain(name, lhs, Cmp::Le, rhs)
    }

    /// Add the row `lhs >= rhs`
    pub fn ge(&mut self, name: impl Into<String>, lhs: impl Into<LinExpr>, rhs: impl Into<LinExpr>) {
        self.constrain(name, lhs, Cmp::Ge, rhs)
    }

    /// Add the row `lhs == rhs`
    pub fn eq(&mut self, name: impl Into<String>, lhs: impl Into<LinExpr>, rhs: impl Into<LinExpr>) {
        self.constrain(name, lhs, Cmp::Eq, rhs)
    }

    /// Replace the objective
    pub fn set_objective(&mut self, objective: impl Into<LinExpr>) {
        self.objective = objective.into();
    }

    /// The objective
    pub fn objective(&self) -> &LinExpr {
        &self.objective
    }

    /// All variables, indexed by [`VarId::index`]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// One variable
    pub fn variable(&self, var: VarId) -> &Variable {
        &self.variables[var.0]
    }

    /// All rows, in insertion order
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Pin a variable to a value
    pub fn fix(&mut self, var: VarId, value: f64) {
        let variable = &mut self.variables[var.0];
        variable.value = Some(value);
        variable.fixed = true;
    }

    /// Undo [`Formulation::fix`], keeping the value as a warm start
    pub fn release(&mut self, var: VarId) {
        self.variables[var.0].fixed = false;
    }

    /// Whether a variable is currently fixed
    pub fn is_fixed(&self, var: VarId) -> bool {
        self.variables[var.0].fixed
    }

    /// The number of discrete variables a solver still has to decide
    pub fn free_discrete(&self) -> usize {
        self.variables
            .iter()
            .filter(|v| v.is_discrete() && !v.fixed)
            .count()
    }

    /// Store an incumbent: one value per variable
    pub fn load(&mut self, values: &[f64]) {
        for (variable, &value) in self.variables.iter_mut().zip(values) {
            variable.value = Some(value);
        }
        self.solved = true;
    }

    /// Whether an incumbent has been loaded
    pub fn has_solution(&self) -> bool {
        self.solved
    }

    /// The current values of all variables, zero where unknown
    pub fn values(&self) -> Vec<f64> {
        self.variables
            .iter()
            .map(|v| v.value.unwrap_or(0.0))
            .collect()
    }

    /// The current value of one variable, zero when unknown
    pub fn value(&self, var: VarId) -> f64 {
        self.variables[var.0].value.unwrap_or(0.0)
    }

    /// An expression evaluated at the current values
    pub fn evaluate(&self, expr: &LinExpr) -> f64 {
        expr.evaluate(&self.values())
    }

    /// The objective evaluated at the given values
    pub fn objective_at(&self, values: &[f64]) -> f64 {
        self.objective.evaluate(values)
    }

    /// The largest row violation at the current values
    pub fn max_violation(&self) -> f64 {
        let values = self.values();
        self.rows
            .iter()
            .map(|row| row.violation(&values))
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_move_to_the_right() {
        let mut f = Formulation::new("t", Sense::Maximise);
        let x = f.nonneg("x");
        let y = f.nonneg("y");
        f.le("r", 2.0 * x + 3.0, 1.0 * y - 4.0);

        let row = &f.rows()[0];
        assert_eq!(row.terms, vec![(x, 2.0), (y, -1.0)]);
        assert_eq!(row.rhs, -7.0);
        assert_eq!(row.cmp, Cmp::Le);
    }

    #[test]
    fn fixing_overrides_bounds_until_released() {
        let mut f = Formulation::new("t", Sense::Maximise);
        let b = f.binary("b");
        let c = f.continuous("c", -1.0, 1.0);
        assert_eq!(f.free_discrete(), 1);

        f.fix(b, 1.0);
        f.fix(c, 0.5);
        assert_eq!(f.variable(b).bounds(), (1.0, 1.0));
        assert_eq!(f.variable(c).bounds(), (0.5, 0.5));
        assert_eq!(f.free_discrete(), 0);

        f.release(b);
        assert_eq!(f.variable(b).bounds(), (0.0, 1.0));
        assert_eq!(f.value(b), 1.0);
        assert_eq!(f.free_discrete(), 1);
    }

    #[test]
    fn violations_are_measured_at_loaded_values() {
        let mut f = Formulation::new("t", Sense::Minimise);
        let x = f.free("x");
        f.eq("e", x, 3.0);
        f.ge("g", x, 5.0);
        f.load(&[4.0]);
        assert!(f.has_solution());
        assert_eq!(f.max_violation(), 1.0);
    }
}
