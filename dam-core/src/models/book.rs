use super::{Entry, Map, Order, Period, Set, Side, StepBid, ZoneId};
use std::collections::BTreeSet;

/// A stable handle to an entry of the [`OrdersBook`].
///
/// Handles are assigned in submission order, starting at zero.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct BidId(pub usize);

impl std::fmt::Display for BidId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The flat collection of all book entries of one trading day.
///
/// Besides the entries, the book tracks the distinct periods and zones it has
/// seen, which become the index sets of the optimization models. After a solve
/// it also holds the matched volumes and clearing prices by zone and period.
#[derive(Clone, Debug, Default)]
pub struct OrdersBook {
    entries: Vec<Entry>,
    periods: BTreeSet<Period>,
    zones: Set<ZoneId>,
    cleared: Option<Cleared>,
}

#[derive(Clone, Debug, Default)]
struct Cleared {
    supply: Map<ZoneId, Map<Period, f64>>,
    demand: Map<ZoneId, Map<Period, f64>>,
    prices: Map<ZoneId, Map<Period, f64>>,
    pun: Map<Period, f64>,
}

impl OrdersBook {
    /// An empty book
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit an order, returning the handles of the entries it decomposed into.
    ///
    /// An order without any entries (for example a curve made of a single point)
    /// leaves the book untouched and yields no handles.
    pub fn submit(&mut self, order: &Order) -> Vec<BidId> {
        order
            .decompose()
            .into_iter()
            .map(|entry| self.push(entry))
            .collect()
    }

    fn push(&mut self, entry: Entry) -> BidId {
        let id = BidId(self.entries.len());
        self.periods.extend(entry.periods());
        self.zones.insert(entry.zone());
        self.entries.push(entry);
        id
    }

    /// The number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been submitted
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry behind a handle
    pub fn get(&self, id: BidId) -> Option<&Entry> {
        self.entries.get(id.0)
    }

    /// The step bid behind a handle, if the handle refers to one
    pub fn step(&self, id: BidId) -> Option<&StepBid> {
        match self.entries.get(id.0) {
            Some(Entry::Step(bid)) => Some(bid),
            _ => None,
        }
    }

    /// All entries with their handles, in submission order
    pub fn iter(&self) -> impl Iterator<Item = (BidId, &Entry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (BidId(index), entry))
    }

    /// The distinct periods seen, ascending
    pub fn periods(&self) -> &BTreeSet<Period> {
        &self.periods
    }

    /// The distinct zones seen, in order of first appearance
    pub fn zones(&self) -> &Set<ZoneId> {
        &self.zones
    }

    /// Record the matched supply and demand volumes of a zone and period.
    ///
    /// Demand is recorded as a positive quantity.
    pub fn record_volumes(&mut self, zone: ZoneId, period: Period, supply: f64, demand: f64) {
        let cleared = self.cleared.get_or_insert_with(Cleared::default);
        cleared
            .supply
            .entry(zone)
            .or_default()
            .insert(period, supply);
        cleared
            .demand
            .entry(zone)
            .or_default()
            .insert(period, demand);
    }

    /// Record the clearing price of a zone and period
    pub fn record_price(&mut self, zone: ZoneId, period: Period, price: f64) {
        let cleared = self.cleared.get_or_insert_with(Cleared::default);
        cleared.prices.entry(zone).or_default().insert(period, price);
    }

    /// Record the national price of a period
    pub fn record_pun_price(&mut self, period: Period, price: f64) {
        let cleared = self.cleared.get_or_insert_with(Cleared::default);
        cleared.pun.insert(period, price);
    }

    /// Whether a solve has populated the book
    pub fn is_cleared(&self) -> bool {
        self.cleared.is_some()
    }

    /// The matched volumes of one side in a zone, by period
    pub fn volumes(&self, side: Side, zone: ZoneId) -> Result<&Map<Period, f64>, BookError> {
        let cleared = self.cleared.as_ref().ok_or(BookError::NotCleared)?;
        let volumes = match side {
            Side::Supply => &cleared.supply,
            Side::Demand => &cleared.demand,
        };
        volumes.get(&zone).ok_or(BookError::UnknownZone(zone))
    }

    /// The clearing prices of a zone, by period
    pub fn prices(&self, zone: ZoneId) -> Result<&Map<Period, f64>, BookError> {
        let cleared = self.cleared.as_ref().ok_or(BookError::NotCleared)?;
        cleared.prices.get(&zone).ok_or(BookError::UnknownZone(zone))
    }

    /// The national prices, by period
    pub fn pun_prices(&self) -> Result<&Map<Period, f64>, BookError> {
        let cleared = self.cleared.as_ref().ok_or(BookError::NotCleared)?;
        Ok(&cleared.pun)
    }

    /// The national price of one period
    pub fn pun_price_step(&self, period: Period) -> Result<f64, BookError> {
        self.pun_prices()?
            .get(&period)
            .copied()
            .ok_or(BookError::UnknownPeriod(period))
    }
}

/// Errors raised when reading post-solve state from the book
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BookError {
    /// No solve has populated the book yet
    #[error("the book has not been cleared")]
    NotCleared,
    /// Nothing was recorded for the zone
    #[error("no cleared values for zone {0}")]
    UnknownZone(ZoneId),
    /// Nothing was recorded for the period
    #[error("no cleared values for period {0}")]
    UnknownPeriod(Period),
}
