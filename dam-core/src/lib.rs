#![warn(missing_docs)]
//! Domain models for clearing a day-ahead electricity market.
//!
//! A trading day is described by its zones, the connections between them, and
//! the orders submitted by market participants. Orders come in several shapes
//! (step curves, block bids, complex orders, and national-price demand) but all
//! of them reduce to entries of an [`models::OrdersBook`], which is what the
//! optimization models in `dam-solver` are built from.

/// Core domain models for a single trading day.
///
/// The models in this module are primarily data structures with minimal
/// business logic: validation on construction, decomposition of orders into
/// book entries, and the post-solve state of the book.
pub mod models;
