use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// A handle to a variable of a [`super::Formulation`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) usize);

impl VarId {
    /// The position of the variable within its formulation
    pub fn index(self) -> usize {
        self.0
    }
}

/// An affine expression over the variables of a formulation.
///
/// Terms are kept as pushed; duplicates are merged only when the expression is
/// turned into a row or an objective.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinExpr {
    terms: Vec<(VarId, f64)>,
    constant: f64,
}

impl LinExpr {
    /// The zero expression
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `coefficient * var`
    pub fn add_term(&mut self, coefficient: f64, var: VarId) -> &mut Self {
        self.terms.push((var, coefficient));
        self
    }

    /// Append a constant
    pub fn add_constant(&mut self, value: f64) -> &mut Self {
        self.constant += value;
        self
    }

    /// The raw terms, possibly with repeated variables
    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    /// The constant part
    pub fn constant(&self) -> f64 {
        self.constant
    }

    /// The terms with repeated variables merged and zero coefficients dropped,
    /// ordered by variable
    pub fn merged(&self) -> Vec<(VarId, f64)> {
        let mut terms = self.terms.clone();
        terms.sort_by_key(|(var, _)| *var);
        let mut merged: Vec<(VarId, f64)> = Vec::with_capacity(terms.len());
        for (var, coefficient) in terms {
            match merged.last_mut() {
                Some((last, sum)) if *last == var => *sum += coefficient,
                _ => merged.push((var, coefficient)),
            }
        }
        merged.retain(|(_, coefficient)| *coefficient != 0.0);
        merged
    }

    /// The value of the expression for the given variable values
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(var, coefficient)| coefficient * values.get(var.0).copied().unwrap_or(0.0))
            .sum::<f64>()
            + self.constant
    }

    fn scale(mut self, factor: f64) -> Self {
        for (_, coefficient) in self.terms.iter_mut() {
            *coefficient *= factor;
        }
        self.constant *= factor;
        self
    }
}

impl From<VarId> for LinExpr {
    fn from(value: VarId) -> Self {
        Self {
            terms: vec![(value, 1.0)],
            constant: 0.0,
        }
    }
}

impl From<f64> for LinExpr {
    fn from(value: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }
}

impl<T: Into<LinExpr>> AddAssign<T> for LinExpr {
    fn add_assign(&mut self, rhs: T) {
        let rhs = rhs.into();
        self.terms.extend(rhs.terms);
        self.constant += rhs.constant;
    }
}

impl<T: Into<LinExpr>> SubAssign<T> for LinExpr {
    fn sub_assign(&mut self, rhs: T) {
        *self += rhs.into().scale(-1.0);
    }
}

impl<T: Into<LinExpr>> Add<T> for LinExpr {
    type Output = LinExpr;

    fn add(mut self, rhs: T) -> Self::Output {
        self += rhs;
        self
    }
}

impl<T: Into<LinExpr>> Sub<T> for LinExpr {
    type Output = LinExpr;

    fn sub(mut self, rhs: T) -> Self::Output {
        self -= rhs;
        self
    }
}

impl<T: Into<LinExpr>> Add<T> for VarId {
    type Output = LinExpr;

    fn add(self, rhs: T) -> Self::Output {
        LinExpr::from(self) + rhs
    }
}

impl<T: Into<LinExpr>> Sub<T> for VarId {
    type Output = LinExpr;

    fn sub(self, rhs: T) -> Self::Output {
        LinExpr::from(self) - rhs
    }
}

impl Neg for LinExpr {
    type Output = LinExpr;

    fn neg(self) -> Self::Output {
        self.scale(-1.0)
    }
}

impl Neg for VarId {
    type Output = LinExpr;

    fn neg(self) -> Self::Output {
        LinExpr::from(self).scale(-1.0)
    }
}

impl Mul<f64> for LinExpr {
    type Output = LinExpr;

    fn mul(self, rhs: f64) -> Self::Output {
        self.scale(rhs)
    }
}

impl Mul<LinExpr> for f64 {
    type Output = LinExpr;

    fn mul(self, rhs: LinExpr) -> Self::Output {
        rhs.scale(self)
    }
}

impl Mul<VarId> for f64 {
    type Output = LinExpr;

    fn mul(self, rhs: VarId) -> Self::Output {
        LinExpr {
            terms: vec![(rhs, self)],
            constant: 0.0,
        }
    }
}

impl std::iter::Sum for LinExpr {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(LinExpr::new(), |acc, expr| acc + expr)
    }
}
