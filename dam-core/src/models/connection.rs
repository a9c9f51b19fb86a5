use super::{ConnectionId, Map, Period, ZoneId};

/// A transmission line between two zones.
///
/// Capacities are given per period and per direction: `capacity_up` bounds the
/// flow from `from` to `to`, `capacity_down` the flow in the opposite direction.
/// A period without an entry has zero capacity.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Connection {
    /// The connection identifier
    pub id: ConnectionId,
    /// The zone the "up" direction leaves
    pub from: ZoneId,
    /// The zone the "up" direction enters
    pub to: ZoneId,
    /// The capacity from `from` to `to`, by period
    pub capacity_up: Map<Period, f64>,
    /// The capacity from `to` to `from`, by period
    pub capacity_down: Map<Period, f64>,
}

impl Connection {
    /// The capacity leaving `zone` over this connection in `period`, if `zone` is an endpoint
    pub fn capacity_from(&self, zone: ZoneId, period: Period) -> Option<f64> {
        if zone == self.from {
            Some(self.capacity_up.get(&period).copied().unwrap_or(0.0))
        } else if zone == self.to {
            Some(self.capacity_down.get(&period).copied().unwrap_or(0.0))
        } else {
            None
        }
    }

    /// Whether this connection joins the two zones, in either orientation
    pub fn joins(&self, a: ZoneId, b: ZoneId) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }

    /// +1 if `zone` is the origin, -1 if it is the destination, 0 otherwise
    pub fn orientation(&self, zone: ZoneId) -> f64 {
        if zone == self.from {
            1.0
        } else if zone == self.to {
            -1.0
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> Connection {
        Connection {
            id: ConnectionId(7),
            from: ZoneId(1),
            to: ZoneId(2),
            capacity_up: [(1, 100.0), (2, 50.0)].into_iter().collect(),
            capacity_down: [(1, 30.0)].into_iter().collect(),
        }
    }

    #[test]
    fn capacity_is_directional() {
        let line = line();
        assert_eq!(line.capacity_from(ZoneId(1), 1), Some(100.0));
        assert_eq!(line.capacity_from(ZoneId(2), 1), Some(30.0));
        assert_eq!(line.capacity_from(ZoneId(2), 2), Some(0.0));
        assert_eq!(line.capacity_from(ZoneId(3), 1), None);
    }

    #[test]
    fn orientation_and_joins() {
        let line = line();
        assert!(line.joins(ZoneId(2), ZoneId(1)));
        assert!(!line.joins(ZoneId(2), ZoneId(3)));
        assert_eq!(line.orientation(ZoneId(1)), 1.0);
        assert_eq!(line.orientation(ZoneId(2)), -1.0);
        assert_eq!(line.orientation(ZoneId(9)), 0.0);
    }
}
