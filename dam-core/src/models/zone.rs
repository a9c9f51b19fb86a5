use super::ZoneId;

/// A bidding zone of the day-ahead market.
///
/// Zones are immutable once a trading day is loaded.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Zone {
    /// The zone identifier
    pub id: ZoneId,
    /// A human-readable name
    pub name: String,
    /// The lowest admissible clearing price
    pub min_price: f64,
    /// The highest admissible clearing price
    pub max_price: f64,
}

impl Zone {
    /// Whether the price lies within the admissible range of this zone
    pub fn admits(&self, price: f64) -> bool {
        self.min_price <= price && price <= self.max_price
    }
}
