use super::{Side, StepBid, StepCurve};
use crate::models::{ComplexId, Map, Period, ZoneId};

/// A multi-period order with economic and technical conditions.
///
/// A complex order holds one step curve per period. Its sub-bids share a
/// single acceptance indicator, and acceptance is conditioned on:
/// - a minimum income covering `fixed_term + variable_term * volume`,
/// - ramp limits on the period-to-period change of its accepted volume,
/// - a scheduled stop: during the first `scheduled_stop_periods` periods the
///   first step of each curve remains available even if the order is rejected.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComplexOrder {
    /// The order identifier
    pub id: ComplexId,
    /// The zone of the order
    pub zone: ZoneId,
    /// Supply or demand
    pub side: Side,
    /// The step curve of each period
    pub curves: Map<Period, StepCurve>,
    /// Fixed cost term of the minimum income condition
    pub fixed_term: f64,
    /// Variable cost term of the minimum income condition
    pub variable_term: f64,
    /// Maximum increase of accepted volume between consecutive periods
    pub ramp_up: Option<f64>,
    /// Maximum decrease of accepted volume between consecutive periods
    pub ramp_down: Option<f64>,
    /// Number of leading periods covered by the scheduled stop
    pub scheduled_stop_periods: u32,
}

impl ComplexOrder {
    /// The periods with a curve, in ascending order
    pub fn periods(&self) -> Vec<Period> {
        let mut periods: Vec<Period> = self.curves.keys().copied().collect();
        periods.sort_unstable();
        periods
    }

    /// Whether a minimum income condition applies at all
    pub fn has_income_condition(&self) -> bool {
        self.fixed_term != 0.0 || self.variable_term != 0.0
    }

    /// The sub-bids of the order, in period then curve order
    pub fn bids(&self) -> impl Iterator<Item = StepBid> + '_ {
        self.bids_with_stop().map(|(bid, _)| bid)
    }

    /// The sub-bids of the order, each flagged when it is the first step of a
    /// curve within the scheduled-stop window
    pub fn bids_with_stop(&self) -> impl Iterator<Item = (StepBid, bool)> + '_ {
        self.periods().into_iter().flat_map(move |period| {
            let stop = period <= self.scheduled_stop_periods;
            self.curves[&period]
                .bids()
                .enumerate()
                .map(move |(position, bid)| (bid, stop && position == 0))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(stop: u32) -> ComplexOrder {
        let curves = (1..=3)
            .rev()
            .map(|period| {
                let curve = StepCurve::new(
                    ZoneId(4),
                    period,
                    Side::Supply,
                    vec![(0.0, 10.0), (5.0, 20.0), (15.0, 30.0)],
                )
                .expect("valid curve");
                (period, curve)
            })
            .collect();
        ComplexOrder {
            id: ComplexId(1),
            zone: ZoneId(4),
            side: Side::Supply,
            curves,
            fixed_term: 0.0,
            variable_term: 0.0,
            ramp_up: None,
            ramp_down: Some(5.0),
            scheduled_stop_periods: stop,
        }
    }

    #[test]
    fn bids_are_period_ordered() {
        let periods: Vec<Period> = order(0).bids().map(|bid| bid.period).collect();
        assert_eq!(periods, vec![1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn stop_flags_only_the_first_steps_in_window() {
        let flags: Vec<bool> = order(2).bids_with_stop().map(|(_, stop)| stop).collect();
        assert_eq!(flags, vec![true, false, true, false, false, false]);
    }

    #[test]
    fn income_condition() {
        let mut order = order(0);
        assert!(!order.has_income_condition());
        order.variable_term = 3.0;
        assert!(order.has_income_condition());
    }
}
