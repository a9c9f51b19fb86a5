use clap::Parser;
use dam_core::models::DayId;
use std::path::PathBuf;

mod io;
pub use io::*;

mod commands;
pub use commands::*;

mod config;
pub use config::AppConfig;

// The top-level arguments: the configuration file and the subcommand to execute
#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct BaseArgs {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "DAMCLEAR_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl BaseArgs {
    pub fn evaluate(self) -> anyhow::Result<()> {
        let AppConfig { market, solver } = AppConfig::load(self.config.as_deref())?;

        match self.command {
            Commands::Solve { io, strategy, day } => {
                let dataset = io.dataset()?;
                let days = match day {
                    Some(day) => vec![DayId(day)],
                    None => dataset.days(),
                };
                let clearing = solve::clearing(&solver)?;
                let outcomes = solve::solve(&dataset, &days, &market, strategy, &clearing);
                let output = io.write()?;
                serde_json::to_writer_pretty(output, &outcomes)?;
            }
            Commands::Export { io, day } => {
                let dataset = io.dataset()?;
                let mut output = io.write()?;
                export::export(&dataset, DayId(day), &market, &mut output)?;
            }
        }

        Ok(())
    }
}
