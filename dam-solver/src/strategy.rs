use crate::formulation::Formulation;
use crate::market::{Market, MarketBase, MarketModel, ModelError, PunMarket, PunMode};
use crate::{Backend, BackendError, SolveOutcome, SolveSettings, SolverOptions, Termination};
use dam_core::models::{DayId, DayOutcome, Map, Period};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{Level, event};

// The phase-2 objective is loosened by this relative amount before serving as a cutoff
const CUTOFF_SLACK: f64 = 1e-7;

/// How a trading day is solved
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum Strategy {
    /// One solve, retried once with a relaxed feasibility tolerance if infeasible
    #[default]
    Simple,
    /// As simple, on the remote solve service
    External,
    /// Relaxed estimate, windowed heuristic, then a warm-started full solve
    Advanced,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simple" => Ok(Strategy::Simple),
            "external" => Ok(Strategy::External),
            "advanced" => Ok(Strategy::Advanced),
            other => Err(format!("unknown strategy `{other}`")),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Strategy::Simple => "simple",
            Strategy::External => "external",
            Strategy::Advanced => "advanced",
        };
        f.write_str(name)
    }
}

/// Clears trading days with a local backend and, optionally, a remote one.
pub struct Clearing {
    backend: Box<dyn Backend>,
    remote: Option<Box<dyn Backend>>,
    options: SolverOptions,
}

impl Clearing {
    /// A clearing driven by `backend`
    pub fn new(backend: impl Backend + 'static, options: SolverOptions) -> Self {
        Self {
            backend: Box::new(backend),
            remote: None,
            options,
        }
    }

    /// Add the backend used by [`Strategy::External`]
    pub fn with_remote(mut self, remote: impl Backend + 'static) -> Self {
        self.remote = Some(Box::new(remote));
        self
    }

    /// The solver options
    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    /// Build the model of a day and solve it with the given strategy
    pub fn clear(&self, base: MarketBase, strategy: Strategy) -> Result<DayOutcome, ClearingError> {
        let day = base.day();
        match strategy {
            Strategy::Simple => {
                let mut market = Market::build(base)?;
                let outcome = self.simple_solve(&mut market, self.backend.as_ref())?;
                self.finish(&mut market, &outcome, outcome.elapsed)
            }
            Strategy::External => {
                let remote = self.remote.as_deref().ok_or_else(|| {
                    BackendError::Unavailable("no remote solve service configured".into())
                })?;
                let mut market = Market::build(base)?;
                let outcome = self.simple_solve(&mut market, remote)?;
                self.finish(&mut market, &outcome, outcome.elapsed)
            }
            Strategy::Advanced if !base.has_pun_orders() => {
                event!(
                    Level::INFO,
                    %day,
                    "no national-price orders, clearing with the simple strategy"
                );
                self.clear(base, Strategy::Simple)
            }
            Strategy::Advanced => {
                let relaxed = base.clone();
                let mut market = PunMarket::build(base, PunMode::Full)?;
                self.advanced_solve(&mut market, relaxed)
            }
        }
    }

    /// Solve once; if the formulation is infeasible, retry with the relaxed
    /// feasibility tolerance. The configured tolerance applies again to the
    /// next call.
    pub fn simple_solve(
        &self,
        market: &mut dyn MarketModel,
        backend: &dyn Backend,
    ) -> Result<SolveOutcome, ClearingError> {
        let mut settings = SolveSettings::from(&self.options);
        let outcome = market.solve(backend, &settings)?;
        if outcome.termination != Termination::Infeasible {
            return Ok(outcome);
        }

        event!(
            Level::WARN,
            day = %market.base().day(),
            backend = backend.name(),
            tolerance = self.options.relaxed_tolerance,
            "infeasible, retrying with a relaxed feasibility tolerance"
        );
        settings.feasibility_tolerance = self.options.relaxed_tolerance;
        let retry = market.solve(backend, &settings)?;
        Ok(SolveOutcome {
            elapsed: outcome.elapsed + retry.elapsed,
            ..retry
        })
    }

    /// Solve in three phases, reusing one model throughout.
    ///
    /// 1. The relaxed model built from `relaxed` estimates the national price.
    /// 2. Bids outside the estimate plus or minus the window margin are fixed,
    ///    and the reduced model is solved to the heuristic gap.
    /// 3. All fixings are released and the model is solved to the final gap,
    ///    starting from the phase-2 values and cut off at their objective.
    ///    If this finds nothing, the phase-2 incumbent is kept.
    pub fn advanced_solve(
        &self,
        market: &mut PunMarket,
        relaxed: MarketBase,
    ) -> Result<DayOutcome, ClearingError> {
        let day = market.base().day();
        let backend = self.backend.as_ref();
        let margin = market.base().config().window_margin;

        event!(Level::INFO, %day, "phase 1 of 3: relaxed national price");
        let mut estimate = PunMarket::build(relaxed, PunMode::Relaxed)?;
        let phase1 = self.simple_solve(&mut estimate, backend)?;
        let mut elapsed = phase1.elapsed;
        let windows: Option<Map<Period, (f64, f64)>> = if phase1.incumbent.is_some() {
            let outcome = estimate.extract()?;
            Some(
                outcome
                    .pun_prices
                    .iter()
                    .map(|(&t, &price)| (t, (price - margin, price + margin)))
                    .collect(),
            )
        } else {
            event!(
                Level::WARN,
                %day,
                termination = ?phase1.termination,
                "relaxed model unsolved, skipping the windowed phase"
            );
            None
        };

        let mut heuristic = None;
        if let Some(windows) = windows.as_ref() {
            event!(Level::INFO, %day, ?windows, "phase 2 of 3: estimated price window");
            market.fix_window(Some(windows));
            let settings = SolveSettings {
                mip_gap: self.options.heuristic_gap,
                ..SolveSettings::from(&self.options)
            };
            let phase2 = market.solve(backend, &settings)?;
            elapsed += phase2.elapsed;
            match phase2.incumbent {
                Some(incumbent) => {
                    event!(
                        Level::INFO,
                        %day,
                        objective = incumbent.objective,
                        seconds = elapsed.as_secs_f64(),
                        "heuristic incumbent found"
                    );
                    heuristic = Some(incumbent);
                }
                None => event!(Level::INFO, %day, "no heuristic incumbent"),
            }
        }

        event!(Level::INFO, %day, "phase 3 of 3: proving optimality");
        market.fix_window(None);
        let settings = SolveSettings {
            cutoff: heuristic.as_ref().map(|incumbent| {
                incumbent.objective - CUTOFF_SLACK * (1.0 + incumbent.objective.abs())
            }),
            ..SolveSettings::from(&self.options)
        };
        let phase3 = market.solve(backend, &settings)?;
        elapsed += phase3.elapsed;

        let outcome = match heuristic {
            Some(incumbent) if phase3.incumbent.is_none() => {
                event!(
                    Level::WARN,
                    %day,
                    termination = ?phase3.termination,
                    objective = incumbent.objective,
                    "final phase found no solution, keeping the heuristic incumbent"
                );
                market.formulation_mut().load(&incumbent.values);
                SolveOutcome {
                    termination: Termination::Feasible,
                    incumbent: Some(incumbent),
                    ..phase3
                }
            }
            _ => phase3,
        };
        self.finish(market, &outcome, elapsed)
    }

    fn finish(
        &self,
        market: &mut dyn MarketModel,
        outcome: &SolveOutcome,
        elapsed: Duration,
    ) -> Result<DayOutcome, ClearingError> {
        let day = market.base().day();
        if outcome.incumbent.is_none() {
            let path = self.export(market.formulation(), day)?;
            return Err(ClearingError::NoIncumbent {
                day,
                termination: outcome.termination,
                path,
            });
        }

        let mut result = market.extract()?;
        result.solve_seconds = elapsed.as_secs_f64();
        result.absolute_gap = outcome.absolute_gap();
        event!(
            Level::INFO,
            %day,
            welfare = result.welfare,
            seconds = result.solve_seconds,
            binaries = result.binaries,
            "day cleared"
        );
        Ok(result)
    }

    /// Write a formulation to `day_N.lp` in the export directory
    pub fn export(&self, formulation: &Formulation, day: DayId) -> Result<PathBuf, ClearingError> {
        std::fs::create_dir_all(&self.options.export_dir)?;
        let path = self.options.export_dir.join(format!("day_{day}.lp"));
        let mut file = BufWriter::new(File::create(&path)?);
        formulation.write_lp(&mut file)?;
        event!(Level::INFO, %day, path = %path.display(), "formulation exported");
        Ok(path)
    }
}

/// Errors that abort the clearing of one day
#[derive(Debug, thiserror::Error)]
pub enum ClearingError {
    /// The model could not be built or read
    #[error(transparent)]
    Model(#[from] ModelError),
    /// The backend failed
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// A formulation could not be exported
    #[error("export failed: {0}")]
    Io(#[from] std::io::Error),
    /// The final solve produced no incumbent
    #[error("no solution for day {day} ({termination:?}), formulation written to {}", path.display())]
    NoIncumbent {
        /// The trading day
        day: DayId,
        /// How the final solve ended
        termination: Termination,
        /// Where the formulation was written
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategies_parse_case_insensitively() {
        assert_eq!("Advanced".parse::<Strategy>(), Ok(Strategy::Advanced));
        assert_eq!("simple".parse::<Strategy>(), Ok(Strategy::Simple));
        assert!("fast".parse::<Strategy>().is_err());
        assert_eq!(Strategy::External.to_string(), "external");
    }
}
