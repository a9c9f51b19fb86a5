use super::IOArgs;
use clap::Subcommand;
use dam_solver::Strategy;

pub mod export;
pub mod solve;

#[derive(Subcommand)]
pub enum Commands {
    /// Clear the days of a dataset and report their outcomes
    Solve {
        #[command(flatten)]
        io: IOArgs,

        /// How each day is solved: simple, external or advanced
        #[arg(short, long, default_value = "simple", value_parser = clap::value_parser!(Strategy))]
        strategy: Strategy,

        /// Clear only this day (all days if omitted)
        #[arg(short, long)]
        day: Option<u32>,
    },

    /// Build the model of one day and export it in LP format
    Export {
        #[command(flatten)]
        io: IOArgs,

        /// The day to export
        #[arg(short, long)]
        day: u32,
    },
}
