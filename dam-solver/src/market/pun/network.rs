use dam_core::models::{Connection, Map, Period, ZoneId};

/// The most intermediate zones a rationing path may cross
pub const MAX_INTERMEDIATES: usize = 4;

/// Directional zone-to-zone capacities, with parallel connections aggregated
#[derive(Clone, Debug, Default)]
pub struct Network {
    capacity: Map<(ZoneId, ZoneId, Period), f64>,
}

impl Network {
    pub fn new(connections: &[Connection]) -> Self {
        let mut capacity: Map<(ZoneId, ZoneId, Period), f64> = Map::default();
        for connection in connections {
            for (&period, &cap) in connection.capacity_up.iter() {
                *capacity
                    .entry((connection.from, connection.to, period))
                    .or_default() += cap;
            }
            for (&period, &cap) in connection.capacity_down.iter() {
                *capacity
                    .entry((connection.to, connection.from, period))
                    .or_default() += cap;
            }
        }
        Self { capacity }
    }

    /// The total capacity from `from` to `to` in `period`
    pub fn capacity(&self, from: ZoneId, to: ZoneId, period: Period) -> f64 {
        self.capacity
            .get(&(from, to, period))
            .copied()
            .unwrap_or(0.0)
    }

    /// Whether flow is possible between the zones in at least one direction
    pub fn connected(&self, a: ZoneId, b: ZoneId, period: Period) -> bool {
        self.capacity(a, b, period) > 0.0 || self.capacity(b, a, period) > 0.0
    }

    /// The simple paths from `from` to `to` crossing between one and
    /// [`MAX_INTERMEDIATES`] distinct zones of `via`.
    ///
    /// A path is admissible when every hop has positive capacity in the
    /// direction of travel, or every hop has positive capacity against it.
    /// Paths are returned with both endpoints, each exactly once.
    pub fn paths(
        &self,
        from: ZoneId,
        to: ZoneId,
        period: Period,
        via: &[ZoneId],
    ) -> Vec<Vec<ZoneId>> {
        let candidates: Vec<ZoneId> = via
            .iter()
            .copied()
            .filter(|&z| z != from && z != to)
            .collect();

        let mut paths = Vec::new();
        let mut path = vec![from];
        self.extend(&mut path, to, period, &candidates, &mut paths);
        paths
    }

    fn extend(
        &self,
        path: &mut Vec<ZoneId>,
        to: ZoneId,
        period: Period,
        candidates: &[ZoneId],
        paths: &mut Vec<Vec<ZoneId>>,
    ) {
        let intermediates = path.len() - 1;
        if intermediates > 0 {
            path.push(to);
            if self.admissible(path, period) {
                paths.push(path.clone());
            }
            path.pop();
        }
        if intermediates == MAX_INTERMEDIATES {
            return;
        }
        for &zone in candidates {
            if path.contains(&zone) {
                continue;
            }
            path.push(zone);
            self.extend(path, to, period, candidates, paths);
            path.pop();
        }
    }

    fn admissible(&self, path: &[ZoneId], period: Period) -> bool {
        let forward = path
            .windows(2)
            .all(|hop| self.capacity(hop[0], hop[1], period) > 0.0);
        let backward = path
            .windows(2)
            .all(|hop| self.capacity(hop[1], hop[0], period) > 0.0);
        forward || backward
    }
}
