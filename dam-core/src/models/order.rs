mod block;
mod complex;
mod curve;
mod pun;

pub use block::BlockBid;
pub use complex::ComplexOrder;
pub use curve::{CurveError, StepCurve, StepCurveDto};
pub use pun::PunOrder;

use super::{Period, ZoneId};

/// Whether an order sells (supply) or buys (demand) energy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "UPPERCASE")
)]
pub enum Side {
    /// Positive volumes
    Supply,
    /// Negative volumes
    Demand,
}

impl Side {
    /// The sign applied to positive quantities of this side
    pub fn sign(self) -> f64 {
        match self {
            Side::Supply => 1.0,
            Side::Demand => -1.0,
        }
    }

    /// The side implied by the sign of a volume
    pub fn of(volume: f64) -> Self {
        if volume < 0.0 { Side::Demand } else { Side::Supply }
    }
}

/// The irreducible single-period obligation of the book.
///
/// Volume is signed: positive for supply, negative for demand.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StepBid {
    /// The zone the bid is located in
    pub zone: ZoneId,
    /// The period the bid applies to
    pub period: Period,
    /// The signed volume
    pub volume: f64,
    /// The limit price
    pub price: f64,
}

impl StepBid {
    /// The side of the bid, according to the sign of its volume
    pub fn side(&self) -> Side {
        Side::of(self.volume)
    }
}

/// An entry of the orders book.
///
/// Step bids are the atomic decomposition of curves and complex orders. Block
/// bids and PUN orders are never split further: the former are accepted as a
/// unit, the latter carry their own merit-order bookkeeping.
#[derive(Clone, Debug, PartialEq)]
pub enum Entry {
    /// A plain single-period bid
    Step(StepBid),
    /// A multi-period block bid
    Block(BlockBid),
    /// A national-price demand bid
    Pun(PunOrder),
}

impl Entry {
    /// The zone of the entry
    pub fn zone(&self) -> ZoneId {
        match self {
            Entry::Step(bid) => bid.zone,
            Entry::Block(block) => block.zone,
            Entry::Pun(pun) => pun.zone,
        }
    }

    /// The periods spanned by the entry
    pub fn periods(&self) -> Vec<Period> {
        match self {
            Entry::Step(bid) => vec![bid.period],
            Entry::Block(block) => block.volumes.keys().copied().collect(),
            Entry::Pun(pun) => vec![pun.period],
        }
    }
}

/// Any order a participant can submit for a trading day.
#[derive(Clone, Debug, PartialEq)]
pub enum Order {
    /// A single-period bid
    Single(StepBid),
    /// A single-period step curve
    Curve(StepCurve),
    /// A block bid
    Block(BlockBid),
    /// A complex order spanning several periods
    Complex(ComplexOrder),
    /// A national-price demand order
    Pun(PunOrder),
}

impl Order {
    /// The zone the order is located in
    pub fn zone(&self) -> ZoneId {
        match self {
            Order::Single(bid) => bid.zone,
            Order::Curve(curve) => curve.zone(),
            Order::Block(block) => block.zone,
            Order::Complex(complex) => complex.zone,
            Order::Pun(pun) => pun.zone,
        }
    }

    /// Decompose the order into the entries it contributes to the book
    pub fn decompose(&self) -> Vec<Entry> {
        match self {
            Order::Single(bid) => vec![Entry::Step(bid.clone())],
            Order::Curve(curve) => curve.bids().map(Entry::Step).collect(),
            Order::Block(block) => vec![Entry::Block(block.clone())],
            Order::Complex(complex) => complex.bids().map(Entry::Step).collect(),
            Order::Pun(pun) => vec![Entry::Pun(pun.clone())],
        }
    }
}

impl From<StepCurve> for Order {
    fn from(value: StepCurve) -> Self {
        Order::Curve(value)
    }
}

impl From<BlockBid> for Order {
    fn from(value: BlockBid) -> Self {
        Order::Block(value)
    }
}

impl From<ComplexOrder> for Order {
    fn from(value: ComplexOrder) -> Self {
        Order::Complex(value)
    }
}

impl From<PunOrder> for Order {
    fn from(value: PunOrder) -> Self {
        Order::Pun(value)
    }
}
