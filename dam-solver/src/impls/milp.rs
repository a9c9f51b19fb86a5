use crate::formulation::{Cmp, Domain, Formulation, Sense};
use crate::{Backend, BackendError, Incumbent, SolveOutcome, SolveSettings, Termination};
use good_lp::{
    Constraint, Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable,
    constraint, variable,
};
use std::time::Instant;

/// The engines `good_lp` is compiled with
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Engine {
    /// The pure-Rust branch-and-bound solver
    #[cfg(feature = "microlp")]
    MicroLp,
    /// The HiGHS solver
    #[cfg(feature = "highs")]
    Highs,
}

impl Default for Engine {
    #[cfg(feature = "highs")]
    fn default() -> Self {
        Engine::Highs
    }

    #[cfg(not(feature = "highs"))]
    fn default() -> Self {
        Engine::MicroLp
    }
}

/// Solves formulations in-process.
///
/// Every call translates the formulation afresh: fixed variables become
/// variables with equal bounds, and a cutoff becomes one extra row on the
/// objective. `microlp` solves to proven optimality and ignores the gap,
/// time limit and tolerances; HiGHS receives all of them as options.
#[derive(Clone, Copy, Debug, Default)]
pub struct MilpSolver(Engine);

impl MilpSolver {
    /// A solver for the given engine
    pub fn new(engine: Engine) -> Self {
        Self(engine)
    }

    /// The engine in use
    pub fn engine(&self) -> Engine {
        self.0
    }
}

struct Translation {
    vars: ProblemVariables,
    handles: Vec<Variable>,
    objective: Expression,
    constraints: Vec<Constraint>,
}

fn translate(formulation: &Formulation, settings: &SolveSettings) -> Translation {
    let mut vars = ProblemVariables::new();
    let handles: Vec<Variable> = formulation
        .variables()
        .iter()
        .map(|v| {
            let (lower, upper) = v.bounds();
            let mut definition = variable().name(v.name());
            if lower.is_finite() {
                definition = definition.min(lower);
            }
            if upper.is_finite() {
                definition = definition.max(upper);
            }
            if v.domain() != Domain::Continuous {
                definition = definition.integer();
            }
            vars.add(definition)
        })
        .collect();

    let expression = |terms: &[(crate::formulation::VarId, f64)]| {
        let mut expr = Expression::from(0.0);
        for &(var, coefficient) in terms {
            expr += coefficient * handles[var.index()];
        }
        expr
    };

    let mut objective = expression(&formulation.objective().merged());
    objective += formulation.objective().constant();

    let mut constraints: Vec<Constraint> = formulation
        .rows()
        .iter()
        .map(|row| {
            let lhs = expression(&row.terms);
            let rhs = row.rhs;
            match row.cmp {
                Cmp::Le => constraint!(lhs <= rhs),
                Cmp::Ge => constraint!(lhs >= rhs),
                Cmp::Eq => constraint!(lhs == rhs),
            }
        })
        .collect();

    if let Some(cutoff) = settings.cutoff {
        let lhs = objective.clone();
        constraints.push(match formulation.sense() {
            Sense::Maximise => constraint!(lhs >= cutoff),
            Sense::Minimise => constraint!(lhs <= cutoff),
        });
    }

    Translation {
        vars,
        handles,
        objective,
        constraints,
    }
}

fn finish<M>(
    mut model: M,
    constraints: Vec<Constraint>,
    handles: &[Variable],
) -> Result<Result<Vec<f64>, Termination>, BackendError>
where
    M: SolverModel<Error = ResolutionError>,
{
    for c in constraints {
        model = model.with(c);
    }
    match model.solve() {
        Ok(solution) => Ok(Ok(handles.iter().map(|&h| solution.value(h)).collect())),
        Err(ResolutionError::Infeasible) => Ok(Err(Termination::Infeasible)),
        Err(ResolutionError::Unbounded) => Ok(Err(Termination::Unbounded)),
        Err(other) => Err(BackendError::Engine(other.to_string())),
    }
}

impl Backend for MilpSolver {
    fn name(&self) -> &str {
        match self.0 {
            #[cfg(feature = "microlp")]
            Engine::MicroLp => "microlp",
            #[cfg(feature = "highs")]
            Engine::Highs => "highs",
        }
    }

    fn solve(
        &self,
        formulation: &Formulation,
        settings: &SolveSettings,
    ) -> Result<SolveOutcome, BackendError> {
        let Translation {
            vars,
            handles,
            objective,
            constraints,
        } = translate(formulation, settings);

        let unsolved = match formulation.sense() {
            Sense::Maximise => vars.maximise(objective),
            Sense::Minimise => vars.minimise(objective),
        };

        let start = Instant::now();
        let (result, proven) = match self.0 {
            #[cfg(feature = "microlp")]
            Engine::MicroLp => {
                let model = unsolved.using(good_lp::solvers::microlp::microlp);
                (finish(model, constraints, &handles)?, true)
            }
            #[cfg(feature = "highs")]
            Engine::Highs => {
                let model = unsolved
                    .using(good_lp::solvers::highs::highs)
                    .set_verbose(settings.verbose)
                    .set_time_limit(settings.time_limit.as_secs_f64())
                    .set_option("mip_rel_gap", settings.mip_gap)
                    .set_option("primal_feasibility_tolerance", settings.feasibility_tolerance)
                    .set_option("mip_feasibility_tolerance", settings.feasibility_tolerance)
                    .set_option("dual_feasibility_tolerance", settings.optimality_tolerance);
                (finish(model, constraints, &handles)?, false)
            }
        };
        let elapsed = start.elapsed();

        match result {
            Ok(mut values) => {
                for (value, v) in values.iter_mut().zip(formulation.variables()) {
                    if v.is_discrete() {
                        *value = value.round();
                    }
                }
                let objective = formulation.objective_at(&values);
                Ok(SolveOutcome {
                    termination: if proven {
                        Termination::Optimal
                    } else {
                        Termination::Feasible
                    },
                    incumbent: Some(Incumbent { values, objective }),
                    bound: proven.then_some(objective),
                    elapsed,
                })
            }
            Err(termination) => Ok(SolveOutcome::without_incumbent(termination, elapsed)),
        }
    }
}
