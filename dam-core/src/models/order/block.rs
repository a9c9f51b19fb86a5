use crate::models::{BlockId, Map, Period, ZoneId};

/// A multi-period bid accepted as one unit.
///
/// Every period is accepted at the same ratio, which is either zero or at
/// least `min_ratio`. Volumes are signed like step bids.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockBid {
    /// The block identifier
    pub id: BlockId,
    /// The zone of the block
    pub zone: ZoneId,
    /// The single limit price of the whole profile
    pub price: f64,
    /// The minimum acceptance ratio once accepted
    pub min_ratio: f64,
    /// The signed volume profile
    pub volumes: Map<Period, f64>,
}

impl BlockBid {
    /// The signed volume summed over all periods
    pub fn total_volume(&self) -> f64 {
        self.volumes.values().sum()
    }

    /// The unsigned volume summed over all periods
    pub fn absolute_volume(&self) -> f64 {
        self.volumes.values().map(|v| v.abs()).sum()
    }
}
