//! Pairings of national-price bids of one period.
//!
//! Each function returns the pairs of handles a family of rows is generated
//! for. Bids priced at the cap must be filtered out by the caller.

use dam_core::models::{BidId, PunOrder};

/// Consecutive bids by merit rank: the first of each pair is served no later
/// than the second
pub fn merit_chain(bids: &[(BidId, &PunOrder)]) -> Vec<(BidId, BidId)> {
    let mut sorted = bids.to_vec();
    sorted.sort_by_key(|(_, order)| order.merit_order);
    sorted.windows(2).map(|pair| (pair[0].0, pair[1].0)).collect()
}

/// For each bid, the lowest-priced bid of the next higher price level.
///
/// A bid can only be at the money when that bid is in the money and itself
/// is not.
pub fn price_chain(bids: &[(BidId, &PunOrder)]) -> Vec<(BidId, BidId)> {
    let mut sorted = bids.to_vec();
    sorted.sort_by(|a, b| b.1.price.total_cmp(&a.1.price));

    let mut pairs = Vec::new();
    let mut previous: Option<BidId> = None;
    let mut level_start = 0;
    while level_start < sorted.len() {
        let price = sorted[level_start].1.price;
        let level_end = sorted[level_start..]
            .iter()
            .position(|(_, order)| order.price != price)
            .map_or(sorted.len(), |offset| level_start + offset);
        let level = &sorted[level_start..level_end];

        if let Some(previous) = previous {
            pairs.extend(level.iter().map(|&(id, _)| (previous, id)));
        }
        previous = level.last().map(|&(id, _)| id);
        level_start = level_end;
    }
    pairs
}

/// Pairs of equally priced bids `(h, k)` where `h` has the better merit rank
pub fn ties<'a>(bids: &[(BidId, &'a PunOrder)]) -> Vec<((BidId, &'a PunOrder), (BidId, &'a PunOrder))> {
    let mut pairs = Vec::new();
    for &h in bids.iter() {
        for &k in bids.iter() {
            if h.1.merit_order < k.1.merit_order && h.1.price == k.1.price {
                pairs.push((h, k));
            }
        }
    }
    pairs
}
