use crate::formulation::Formulation;
use crate::{Backend, BackendError, SolveOutcome, SolveSettings};
use dam_core::models::{
    BidId, BlockBid, BookError, ComplexId, ComplexOrder, Connection, DayId, DayOutcome, Entry,
    Map, MarketConfig, Order, OrdersBook, Period, PunId, PunOrder, Side, StepBid, Zone, ZoneId,
};

mod complex;
pub use complex::ComplexMarket;

mod pun;
pub use pun::{PUN_ZONE, PunMarket, PunMode};

/// The data of one trading day, before any formulation is built.
///
/// Submitting orders fills the book and sorts the returned bid handles into
/// the sets the market models are built from: plain step bids, the sub-bids
/// of each complex order, block bids and national-price bids.
#[derive(Clone, Debug)]
pub struct MarketBase {
    day: DayId,
    zones: Vec<Zone>,
    connections: Vec<Connection>,
    config: MarketConfig,
    book: OrdersBook,
    steps: Vec<BidId>,
    complex: Map<ComplexId, ComplexEntry>,
    blocks: Vec<BidId>,
    pun: Vec<BidId>,
}

/// A complex order together with its sub-bids and their scheduled-stop flags
#[derive(Clone, Debug)]
pub(crate) struct ComplexEntry {
    pub order: ComplexOrder,
    pub bids: Vec<(BidId, bool)>,
}

impl MarketBase {
    /// An empty day
    pub fn new(
        day: DayId,
        zones: Vec<Zone>,
        connections: Vec<Connection>,
        config: MarketConfig,
    ) -> Self {
        Self {
            day,
            zones,
            connections,
            config,
            book: OrdersBook::new(),
            steps: Vec::new(),
            complex: Map::default(),
            blocks: Vec::new(),
            pun: Vec::new(),
        }
    }

    /// Submit an order to the book, returning the handles of its atomic bids
    pub fn submit(&mut self, order: Order) -> Result<Vec<BidId>, ModelError> {
        let zone = order.zone();
        if !self.zones.iter().any(|z| z.id == zone) {
            return Err(ModelError::UnknownZone(zone));
        }
        match &order {
            Order::Pun(pun) if pun.volume.is_nan() || pun.volume <= 0.0 => {
                return Err(ModelError::EmptyPunOrder(pun.id));
            }
            _ => {}
        }

        let ids = self.book.submit(&order);
        if ids.is_empty() {
            return Ok(ids);
        }
        match order {
            Order::Single(_) | Order::Curve(_) => self.steps.extend(ids.iter().copied()),
            Order::Block(_) => self.blocks.extend(ids.iter().copied()),
            Order::Pun(_) => self.pun.extend(ids.iter().copied()),
            Order::Complex(order) => {
                let bids = ids
                    .iter()
                    .copied()
                    .zip(order.bids_with_stop().map(|(_, stop)| stop))
                    .collect();
                self.complex.insert(order.id, ComplexEntry { order, bids });
            }
        }
        Ok(ids)
    }

    /// The trading day
    pub fn day(&self) -> DayId {
        self.day
    }

    /// The zones of the day
    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// The inter-zone connections of the day
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// The market configuration
    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// The orders book
    pub fn book(&self) -> &OrdersBook {
        &self.book
    }

    /// The (min, max) admissible price
    pub fn price_cap(&self) -> (f64, f64) {
        self.config.price_cap(&self.zones)
    }

    /// The periods seen in the book, ascending
    pub fn periods(&self) -> Vec<Period> {
        self.book.periods().iter().copied().collect()
    }

    /// Whether any complex order was submitted
    pub fn has_complex_orders(&self) -> bool {
        !self.complex.is_empty()
    }

    /// Whether any national-price order was submitted
    pub fn has_pun_orders(&self) -> bool {
        !self.pun.is_empty()
    }

    /// The complex orders, in submission order
    pub fn complex_orders(&self) -> impl Iterator<Item = &ComplexOrder> {
        self.complex.values().map(|entry| &entry.order)
    }

    pub(crate) fn steps(&self) -> &[BidId] {
        &self.steps
    }

    pub(crate) fn complex(&self) -> &Map<ComplexId, ComplexEntry> {
        &self.complex
    }

    pub(crate) fn blocks(&self) -> &[BidId] {
        &self.blocks
    }

    pub(crate) fn pun(&self) -> &[BidId] {
        &self.pun
    }

    pub(crate) fn book_mut(&mut self) -> &mut OrdersBook {
        &mut self.book
    }

    /// The step bid behind a handle
    pub(crate) fn step(&self, id: BidId) -> Result<&StepBid, ModelError> {
        self.book.step(id).ok_or(ModelError::UnknownBid(id))
    }

    pub(crate) fn block(&self, id: BidId) -> Result<&BlockBid, ModelError> {
        match self.book.get(id) {
            Some(Entry::Block(block)) => Ok(block),
            _ => Err(ModelError::UnknownBid(id)),
        }
    }

    pub(crate) fn pun_order(&self, id: BidId) -> Result<&PunOrder, ModelError> {
        match self.book.get(id) {
            Some(Entry::Pun(order)) => Ok(order),
            _ => Err(ModelError::UnknownBid(id)),
        }
    }

    /// Store matched volumes and prices in the book
    pub(crate) fn record(&mut self, outcome: &DayOutcome) {
        for zone in outcome.zones.iter() {
            let book = self.book_mut();
            book.record_volumes(zone.zone, zone.period, zone.supply, zone.demand);
            book.record_price(zone.zone, zone.period, zone.price);
        }
        for (&period, &price) in outcome.pun_prices.iter() {
            self.book.record_pun_price(period, price);
        }
    }
}

/// Matched supply and demand accumulated per zone and period during extraction
#[derive(Default)]
pub(crate) struct Matched(Map<(ZoneId, Period), (f64, f64)>);

impl Matched {
    pub fn add(&mut self, zone: ZoneId, period: Period, volume: f64) {
        let entry = self.0.entry((zone, period)).or_default();
        match Side::of(volume) {
            Side::Supply => entry.0 += volume,
            Side::Demand => entry.1 -= volume,
        }
    }

    pub fn get(&self, zone: ZoneId, period: Period) -> (f64, f64) {
        self.0.get(&(zone, period)).copied().unwrap_or_default()
    }
}

/// The contract shared by the market formulations.
///
/// A model is built once per trading day from a [`MarketBase`], solved any
/// number of times (possibly with variables fixed in between), and finally
/// asked to extract its outcome, which also records the cleared state in the
/// book.
pub trait MarketModel {
    /// The day data the model was built from
    fn base(&self) -> &MarketBase;

    /// The formulation
    fn formulation(&self) -> &Formulation;

    /// The formulation, for fixing and loading values
    fn formulation_mut(&mut self) -> &mut Formulation;

    /// Read the loaded solution into an outcome and record it in the book
    fn extract(&mut self) -> Result<DayOutcome, ModelError>;

    /// Solve with a backend, loading the incumbent when there is one
    fn solve(
        &mut self,
        backend: &dyn Backend,
        settings: &SolveSettings,
    ) -> Result<SolveOutcome, BackendError> {
        let outcome = backend.solve(self.formulation(), settings)?;
        if let Some(incumbent) = outcome.incumbent.as_ref() {
            self.formulation_mut().load(&incumbent.values);
        }
        Ok(outcome)
    }
}

/// A built market model of either variant
#[derive(Clone, Debug)]
pub enum Market {
    /// A day with complex orders, or with neither complex nor national-price orders
    Complex(ComplexMarket),
    /// A day with national-price orders
    Pun(PunMarket),
}

impl Market {
    /// Build the formulation matching the orders of the day
    pub fn build(base: MarketBase) -> Result<Self, ModelError> {
        if base.has_pun_orders() {
            Ok(Market::Pun(PunMarket::build(base, PunMode::Full)?))
        } else {
            Ok(Market::Complex(ComplexMarket::build(base)?))
        }
    }

    fn model(&self) -> &dyn MarketModel {
        match self {
            Market::Complex(market) => market,
            Market::Pun(market) => market,
        }
    }

    fn model_mut(&mut self) -> &mut dyn MarketModel {
        match self {
            Market::Complex(market) => market,
            Market::Pun(market) => market,
        }
    }
}

impl MarketModel for Market {
    fn base(&self) -> &MarketBase {
        self.model().base()
    }

    fn formulation(&self) -> &Formulation {
        self.model().formulation()
    }

    fn formulation_mut(&mut self) -> &mut Formulation {
        self.model_mut().formulation_mut()
    }

    fn extract(&mut self) -> Result<DayOutcome, ModelError> {
        self.model_mut().extract()
    }
}

/// Errors raised while building a model or reading its solution
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// An order refers to a zone that is not part of the day
    #[error("zone {0} is not part of the day")]
    UnknownZone(ZoneId),
    /// A national-price order demands no positive volume
    #[error("national-price order {0} has no positive volume")]
    EmptyPunOrder(PunId),
    /// A handle does not refer to a bid of the expected kind
    #[error("bid {0} is not of the expected kind")]
    UnknownBid(BidId),
    /// The model cannot represent the orders of the day
    #[error("the {model} model does not support {what}")]
    Unsupported {
        /// The model variant
        model: &'static str,
        /// The offending orders
        what: &'static str,
    },
    /// Extraction was requested before a solution was loaded
    #[error("no solution has been loaded")]
    NotSolved,
    /// The book rejected an operation
    #[error(transparent)]
    Book(#[from] BookError),
}
