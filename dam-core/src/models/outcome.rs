use super::{BlockId, ComplexId, ConnectionId, DayId, Map, Period, PunId, ZoneId};

/// The full result record of one cleared trading day.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DayOutcome {
    /// The trading day
    pub day: DayId,
    /// The objective value of the clearing problem
    pub welfare: f64,
    /// Accumulated time spent in the solver, in seconds
    pub solve_seconds: f64,
    /// The number of free discrete variables of the final solve
    pub binaries: usize,
    /// Whether any dispatch rationing was activated
    pub expansion: bool,
    /// The absolute optimality gap, when the engine reports one
    pub absolute_gap: Option<f64>,
    /// Prices and matched volumes by zone and period
    pub zones: Vec<ZoneOutcome>,
    /// Flows and congestion by connection and period
    pub connections: Vec<ConnectionOutcome>,
    /// Block bid results
    pub blocks: Vec<BlockOutcome>,
    /// Complex order results
    pub complex: Vec<ComplexOutcome>,
    /// Rejected complex orders that were viable at the clearing prices, by ascending variable term
    pub paradoxically_rejected: Vec<ComplexId>,
    /// National-price bid results
    pub pun: Vec<PunOutcome>,
    /// The national price, by period
    pub pun_prices: Map<Period, f64>,
}

impl DayOutcome {
    /// The clearing price of a zone in a period
    pub fn price(&self, zone: ZoneId, period: Period) -> Option<f64> {
        self.zones
            .iter()
            .find(|z| z.zone == zone && z.period == period)
            .map(|z| z.price)
    }

    /// The result of a complex order
    pub fn complex_order(&self, id: ComplexId) -> Option<&ComplexOutcome> {
        self.complex.iter().find(|c| c.order == id)
    }
}

/// Clearing price and matched volumes of a zone in a period.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ZoneOutcome {
    /// The zone
    pub zone: ZoneId,
    /// The zone name
    pub name: String,
    /// The period
    pub period: Period,
    /// The clearing price
    pub price: f64,
    /// The matched supply
    pub supply: f64,
    /// The matched demand, as a positive quantity
    pub demand: f64,
}

/// Flow and congestion of a connection in a period.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectionOutcome {
    /// The connection
    pub connection: ConnectionId,
    /// The period
    pub period: Period,
    /// Flow from `from` to `to`
    pub flow_up: f64,
    /// Flow from `to` to `from`
    pub flow_down: f64,
    /// Shadow price of the capacity from `from` to `to`
    pub congestion_up: f64,
    /// Shadow price of the capacity from `to` to `from`
    pub congestion_down: f64,
}

/// Acceptance and surplus of a block bid.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockOutcome {
    /// The block
    pub block: BlockId,
    /// The accepted ratio
    pub acceptance: f64,
    /// The surplus at the clearing prices
    pub surplus: f64,
}

/// Acceptance, surplus, and volumes of a complex order.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComplexOutcome {
    /// The order
    pub order: ComplexId,
    /// The value of the acceptance indicator
    pub acceptance: f64,
    /// The surplus of the order
    pub surplus: f64,
    /// The accepted volume, by period
    pub volumes: Map<Period, f64>,
    /// Rejected, yet viable at the clearing prices
    pub paradoxically_rejected: bool,
}

/// Accepted fraction of a national-price bid.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PunOutcome {
    /// The order
    pub order: PunId,
    /// The period
    pub period: Period,
    /// The accepted fraction of its volume
    pub acceptance: f64,
}
