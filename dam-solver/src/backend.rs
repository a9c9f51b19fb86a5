use crate::formulation::Formulation;
use std::path::PathBuf;
use std::time::Duration;

/// Options shared by every solve of a run.
///
/// These are the user-facing knobs; each phase of a strategy derives its own
/// [`SolveSettings`] from them.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct SolverOptions {
    /// Wall-clock limit handed to the engine for each solve
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub time_limit: Duration,
    /// Relative optimality gap of final solves
    pub mip_gap: f64,
    /// Relative optimality gap of the windowed heuristic solve
    pub heuristic_gap: f64,
    /// Primal feasibility tolerance
    pub feasibility_tolerance: f64,
    /// Dual optimality tolerance
    pub optimality_tolerance: f64,
    /// Feasibility tolerance used when retrying an infeasible solve
    pub relaxed_tolerance: f64,
    /// Forward the engine log to stdout
    pub verbose: bool,
    /// Where formulations are written when a solve yields no incumbent
    pub export_dir: PathBuf,
    /// URL of the remote solve service
    pub endpoint: Option<String>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(600),
            mip_gap: 1e-4,
            heuristic_gap: 1e-2,
            feasibility_tolerance: 1e-9,
            optimality_tolerance: 1e-9,
            relaxed_tolerance: 1e-6,
            verbose: false,
            export_dir: PathBuf::from("."),
            endpoint: None,
        }
    }
}

/// The parameters of a single engine call
#[derive(Clone, Debug, PartialEq)]
pub struct SolveSettings {
    /// Wall-clock limit
    pub time_limit: Duration,
    /// Relative optimality gap
    pub mip_gap: f64,
    /// Primal feasibility tolerance
    pub feasibility_tolerance: f64,
    /// Dual optimality tolerance
    pub optimality_tolerance: f64,
    /// Only accept solutions at least this good
    pub cutoff: Option<f64>,
    /// Forward the engine log to stdout
    pub verbose: bool,
}

impl From<&SolverOptions> for SolveSettings {
    fn from(options: &SolverOptions) -> Self {
        Self {
            time_limit: options.time_limit,
            mip_gap: options.mip_gap,
            feasibility_tolerance: options.feasibility_tolerance,
            optimality_tolerance: options.optimality_tolerance,
            cutoff: None,
            verbose: options.verbose,
        }
    }
}

/// How an engine call ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum Termination {
    /// Proven optimal within the requested gap
    Optimal,
    /// An incumbent exists but optimality was not proven
    Feasible,
    /// The formulation has no feasible point
    Infeasible,
    /// The objective is unbounded
    Unbounded,
    /// The engine stopped without an incumbent
    NoSolution,
}

/// A feasible point reported by an engine
#[derive(Clone, Debug, PartialEq)]
pub struct Incumbent {
    /// One value per variable, indexed like [`Formulation::variables`]
    pub values: Vec<f64>,
    /// The objective at `values`
    pub objective: f64,
}

/// The result of one engine call
#[derive(Clone, Debug, PartialEq)]
pub struct SolveOutcome {
    /// How the call ended
    pub termination: Termination,
    /// The best point found, if any
    pub incumbent: Option<Incumbent>,
    /// The best proven objective bound, when the engine reports one
    pub bound: Option<f64>,
    /// Time spent in the engine
    pub elapsed: Duration,
}

impl SolveOutcome {
    /// An outcome without a point
    pub fn without_incumbent(termination: Termination, elapsed: Duration) -> Self {
        Self {
            termination,
            incumbent: None,
            bound: None,
            elapsed,
        }
    }

    /// The absolute gap between incumbent and bound
    pub fn absolute_gap(&self) -> Option<f64> {
        match (&self.incumbent, self.bound) {
            (Some(incumbent), Some(bound)) => Some((bound - incumbent.objective).abs()),
            _ => None,
        }
    }
}

/// The Backend trait is the seam between market models and optimization engines.
///
/// A backend receives a complete [`Formulation`], including the current fixings
/// and values of its variables (which it may use as a warm start), and reports
/// how the solve terminated together with the best point found. Backends never
/// mutate the formulation; loading an incumbent is left to the caller.
pub trait Backend {
    /// A short name for logging
    fn name(&self) -> &str;

    /// Solve the formulation with the given settings
    fn solve(
        &self,
        formulation: &Formulation,
        settings: &SolveSettings,
    ) -> Result<SolveOutcome, BackendError>;
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn solve(
        &self,
        formulation: &Formulation,
        settings: &SolveSettings,
    ) -> Result<SolveOutcome, BackendError> {
        (**self).solve(formulation, settings)
    }
}

/// Errors raised by a backend, as opposed to a solve that merely found no point
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The engine failed for a reason other than infeasibility
    #[error("engine failure: {0}")]
    Engine(String),
    /// The remote service could not be reached or answered with an error status
    #[cfg(feature = "remote")]
    #[error("remote transport: {0}")]
    Transport(#[from] reqwest::Error),
    /// The remote service answered with something we cannot interpret
    #[error("remote protocol: {0}")]
    Protocol(String),
    /// The backend is not available in this build
    #[error("backend not configured: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_needs_both_ends() {
        let mut outcome = SolveOutcome {
            termination: Termination::Feasible,
            incumbent: Some(Incumbent {
                values: vec![1.0],
                objective: 90.0,
            }),
            bound: None,
            elapsed: Duration::ZERO,
        };
        assert_eq!(outcome.absolute_gap(), None);
        outcome.bound = Some(100.0);
        assert_eq!(outcome.absolute_gap(), Some(10.0));
    }

    #[test]
    fn settings_start_without_cutoff() {
        let options = SolverOptions {
            mip_gap: 0.5,
            ..Default::default()
        };
        let settings = SolveSettings::from(&options);
        assert_eq!(settings.mip_gap, 0.5);
        assert_eq!(settings.cutoff, None);
        assert_eq!(settings.time_limit, Duration::from_secs(600));
    }
}
