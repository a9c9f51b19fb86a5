#![warn(missing_docs)]
//! Mixed-integer formulations and solve strategies for clearing a day-ahead
//! electricity market.
//!
//! A [`market::MarketBase`] collects the zones, connections and orders of one
//! trading day. From it a market model is built, either the complex-order
//! formulation or the national-price one, and handed to a [`Clearing`] that
//! drives one of the [`Strategy`] variants against a [`Backend`].

/**
 * These are the building blocks of the optimization problems: variables,
 * linear expressions, constraints and the LP file writer.
 */
pub mod formulation;

/**
 * This is the seam between the formulations and the engines that solve them.
 */
mod backend;
pub use backend::*;

/**
 * These are implementations of the backend.
 */
mod impls;
pub use impls::*;

#[cfg(any(feature = "microlp", feature = "highs"))]
pub use impls::milp::{Engine, MilpSolver};

#[cfg(feature = "remote")]
pub use impls::remote::RemoteSolver;

/**
 * These are the market models built from the orders of a day.
 */
pub mod market;

/**
 * These are the strategies that drive the models to a cleared day.
 */
mod strategy;
pub use strategy::*;

/// Reading market data from its tabular JSON form
#[cfg(feature = "io")]
pub mod io;
