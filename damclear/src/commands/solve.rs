use dam_core::models::{DayId, DayOutcome, MarketConfig};
use dam_solver::io::RawDataset;
use dam_solver::{Clearing, MilpSolver, SolverOptions, Strategy};
use tracing::{Level, event};

/// A clearing over the local engine, plus the remote service when one is configured
pub fn clearing(options: &SolverOptions) -> anyhow::Result<Clearing> {
    let clearing = Clearing::new(MilpSolver::default(), options.clone());
    with_remote(clearing, options)
}

#[cfg(feature = "remote")]
fn with_remote(clearing: Clearing, options: &SolverOptions) -> anyhow::Result<Clearing> {
    match options.endpoint.as_deref() {
        Some(endpoint) => {
            let remote = dam_solver::RemoteSolver::new(endpoint, options.time_limit)?;
            Ok(clearing.with_remote(remote))
        }
        None => Ok(clearing),
    }
}

#[cfg(not(feature = "remote"))]
fn with_remote(clearing: Clearing, _options: &SolverOptions) -> anyhow::Result<Clearing> {
    Ok(clearing)
}

/// Clear the given days in order.
///
/// A day that fails is logged and skipped; it contributes no outcome.
pub fn solve(
    dataset: &RawDataset,
    days: &[DayId],
    market: &MarketConfig,
    strategy: Strategy,
    clearing: &Clearing,
) -> Vec<DayOutcome> {
    let mut outcomes = Vec::with_capacity(days.len());
    for &day in days {
        event!(Level::INFO, %day, %strategy, "clearing day");
        match clear_day(dataset, day, market, strategy, clearing) {
            Ok(outcome) => outcomes.push(outcome),
            Err(error) => event!(Level::ERROR, %day, error = %error, "day failed, continuing"),
        }
    }
    outcomes
}

/// Clear one day. Infeasibility is retried inside the clearing, so a failure
/// here is final for the day.
fn clear_day(
    dataset: &RawDataset,
    day: DayId,
    market: &MarketConfig,
    strategy: Strategy,
    clearing: &Clearing,
) -> anyhow::Result<DayOutcome> {
    let base = dataset.day(day, market)?;
    Ok(clearing.clear(base, strategy)?)
}
