//! Application configuration management.
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then environment variables.

use dam_core::models::MarketConfig;
use dam_solver::SolverOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The configuration of a run, one section per concern
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct AppConfig {
    /// Market rules applied to every day (tolerances, toggles, price cap, ...)
    #[serde(default)]
    pub market: MarketConfig,

    /// Solver limits, tolerances, the remote endpoint and the export directory
    #[serde(default)]
    pub solver: SolverOptions,
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest priority)
    /// 2. The given config file
    /// 3. Default values (lowest priority)
    ///
    /// Environment variables are mapped using the pattern
    /// `DAMCLEAR_<SECTION>__<KEY>` to `<section>.<key>`:
    ///
    /// ```bash
    /// export DAMCLEAR_SOLVER__TIME_LIMIT="10m"
    /// export DAMCLEAR_MARKET__APPLY_MIC=false
    /// ```
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        config = config.add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            if path.exists() {
                config = config.add_source(config::File::from(path))
            } else {
                return Err(anyhow::anyhow!(
                    "Config file {} does not exist",
                    path.display()
                ));
            }
        }

        config = config.add_source(
            config::Environment::with_prefix("DAMCLEAR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let built_config = config.build()?;
        built_config.try_deserialize().map_err(Into::into)
    }
}
