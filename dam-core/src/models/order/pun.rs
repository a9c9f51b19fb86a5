use crate::models::{Period, PunId, ZoneId};

/// A demand bid settled at the single national price (PUN).
///
/// The volume is an unsigned quantity of demand.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PunOrder {
    /// The order identifier
    pub id: PunId,
    /// The zone the demand is located in
    pub zone: ZoneId,
    /// The period of the bid
    pub period: Period,
    /// The merit-order rank, lower is served first among equal prices
    pub merit_order: u32,
    /// The demanded quantity
    pub volume: f64,
    /// The limit price
    pub price: f64,
}
