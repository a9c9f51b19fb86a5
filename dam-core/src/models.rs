mod book;
mod config;
mod connection;
mod ids;
mod order;
mod outcome;
mod zone;

pub use book::{BidId, BookError, OrdersBook};
pub use config::{MarketConfig, SplitMode};
pub use connection::Connection;
pub use ids::{BlockId, ComplexId, ConnectionId, CurveId, DayId, PunId, ZoneId};
pub use order::{
    BlockBid, ComplexOrder, CurveError, Entry, Order, PunOrder, Side, StepBid, StepCurve,
    StepCurveDto,
};
pub use outcome::{
    BlockOutcome, ComplexOutcome, ConnectionOutcome, DayOutcome, PunOutcome, ZoneOutcome,
};
pub use zone::Zone;

/// Trading periods are numbered from 1 within a day.
pub type Period = u32;

// We use non-std collections here for their ordering semantics and performance
/// An insertion-ordered hash map with a fast, deterministic hasher.
pub type Map<K, V> = indexmap::IndexMap<K, V, rustc_hash::FxBuildHasher>;
/// An insertion-ordered hash set with a fast, deterministic hasher.
pub type Set<T> = indexmap::IndexSet<T, rustc_hash::FxBuildHasher>;
