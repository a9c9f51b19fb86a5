use dam_core::models::{DayId, MarketConfig};
use dam_solver::io::RawDataset;
use dam_solver::market::{Market, MarketModel as _};
use std::io::Write;

/// Build the formulation of a day, as the simple strategy would solve it, and
/// write it in LP format
pub fn export<W: Write>(
    dataset: &RawDataset,
    day: DayId,
    config: &MarketConfig,
    buffer: &mut W,
) -> anyhow::Result<()> {
    let market = Market::build(dataset.day(day, config)?)?;
    market.formulation().write_lp(buffer)?;
    Ok(())
}
