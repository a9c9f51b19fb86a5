use approx::assert_abs_diff_eq;
use dam_core::models::{
    Connection, ConnectionId, DayId, DayOutcome, MarketConfig, Order, PunId, PunOrder, SplitMode,
    StepBid, Zone, ZoneId,
};
use dam_solver::market::{MarketBase, MarketModel, PunMarket, PunMode};
use dam_solver::formulation::Formulation;
use dam_solver::{
    Backend, BackendError, Clearing, SolveOutcome, SolveSettings, SolverOptions, Strategy,
    Termination,
};
use rstest::*;
use rstest_reuse::{self, *};
use std::cell::Cell;
use std::rc::Rc;

mod all_backends;
use all_backends::all_backends;

// One zone, one period, and two national-price bids: 30 MW at 60 ranked
// first and 30 MW at 40 ranked second.
fn base(supply: &[(f64, f64)]) -> MarketBase {
    let zones = vec![Zone {
        id: ZoneId(1),
        name: "NORD".into(),
        min_price: 0.0,
        max_price: 3000.0,
    }];
    let config = MarketConfig {
        expansion_bits: 6,
        expansion_step: 1.0,
        ..Default::default()
    };
    let mut base = MarketBase::new(DayId(1), zones, Vec::new(), config);
    for &(volume, price) in supply {
        base.submit(Order::Single(StepBid {
            zone: ZoneId(1),
            period: 1,
            volume,
            price,
        }))
        .expect("known zone");
    }
    for (id, merit_order, price) in [(1, 1, 60.0), (2, 2, 40.0)] {
        base.submit(Order::Pun(PunOrder {
            id: PunId(id),
            zone: ZoneId(1),
            period: 1,
            merit_order,
            volume: 30.0,
            price,
        }))
        .expect("known zone");
    }
    base
}

#[fixture]
fn abundant() -> MarketBase {
    base(&[(100.0, 20.0)])
}

// Both bids together would lift the zonal price to 50, above the second bid
#[fixture]
fn scarce() -> MarketBase {
    base(&[(40.0, 20.0), (100.0, 50.0)])
}

// Zones in a chain and two national-price bids tied at 40 for 30 MW each: the
// better-ranked one in the last zone, the other in zone 1. 40 MW at 20 sit in
// zone 1 of two, or in the middle of three. Lines carry 100 MW except the one
// entering the last zone, which carries `last_line`.
fn tied_network(zones: u32, last_line: f64, split: SplitMode) -> MarketBase {
    let supply = if zones == 2 { 1 } else { 2 };
    let line = |from: u32, capacity: f64| Connection {
        id: ConnectionId(from),
        from: ZoneId(from),
        to: ZoneId(from + 1),
        capacity_up: [(1, capacity)].into_iter().collect(),
        capacity_down: [(1, capacity)].into_iter().collect(),
    };
    let connections = (1..zones)
        .map(|from| line(from, if from + 1 == zones { last_line } else { 100.0 }))
        .collect();
    let zones_of_day = (1..=zones)
        .map(|id| Zone {
            id: ZoneId(id),
            name: format!("Z{id}"),
            min_price: 0.0,
            max_price: 3000.0,
        })
        .collect();
    let config = MarketConfig {
        expansion_bits: 6,
        expansion_step: 1.0,
        split,
        transit_zones: vec![ZoneId(2)],
        ..Default::default()
    };

    let mut base = MarketBase::new(DayId(1), zones_of_day, connections, config);
    base.submit(Order::Single(StepBid {
        zone: ZoneId(supply),
        period: 1,
        volume: 40.0,
        price: 20.0,
    }))
    .expect("known zone");
    for (id, zone, merit_order) in [(1, zones, 1), (2, 1, 2)] {
        base.submit(Order::Pun(PunOrder {
            id: PunId(id),
            zone: ZoneId(zone),
            period: 1,
            merit_order,
            volume: 30.0,
            price: 40.0,
        }))
        .expect("known zone");
    }
    base
}

fn acceptance(outcome: &DayOutcome, id: u32) -> f64 {
    outcome
        .pun
        .iter()
        .find(|p| p.order == PunId(id))
        .expect("bid in outcome")
        .acceptance
}

fn clear(backend: impl Backend + 'static, base: MarketBase, strategy: Strategy) -> DayOutcome {
    Clearing::new(backend, SolverOptions::default())
        .clear(base, strategy)
        .expect("day clears")
}

#[apply(all_backends)]
#[rstest]
fn cheap_supply_serves_every_bid(backend: impl Backend + 'static, abundant: MarketBase) {
    let outcome = clear(backend, abundant, Strategy::Simple);

    assert_abs_diff_eq!(acceptance(&outcome, 1), 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(acceptance(&outcome, 2), 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(outcome.price(ZoneId(1), 1).expect("price"), 20.0, epsilon = 1e-6);
    // only pinned down up to the tolerated revenue imbalance
    assert_abs_diff_eq!(outcome.pun_prices[&1], 20.0, epsilon = 0.1);
    assert_abs_diff_eq!(outcome.welfare, 60.0 * 30.0 + 40.0 * 30.0 - 20.0 * 60.0, epsilon = 1e-4);
    assert!(!outcome.expansion);
}

#[apply(all_backends)]
#[rstest]
fn marginal_bid_sets_the_national_price(backend: impl Backend + 'static, scarce: MarketBase) {
    let outcome = clear(backend, scarce, Strategy::Simple);

    assert_abs_diff_eq!(acceptance(&outcome, 1), 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(acceptance(&outcome, 2), 1.0 / 3.0, epsilon = 1e-6);
    assert_abs_diff_eq!(outcome.pun_prices[&1], 40.0, epsilon = 1e-6);
    assert_abs_diff_eq!(outcome.welfare, 60.0 * 30.0 + 40.0 * 10.0 - 20.0 * 40.0, epsilon = 1e-4);

    let national = outcome
        .zones
        .iter()
        .find(|z| z.zone == dam_solver::market::PUN_ZONE)
        .expect("national pseudo-zone");
    assert_abs_diff_eq!(national.demand, 40.0, epsilon = 1e-6);
}

#[apply(all_backends)]
#[rstest]
fn merit_order_is_respected(backend: impl Backend + 'static, #[values(abundant(), scarce())] base: MarketBase) {
    let outcome = clear(backend, base, Strategy::Simple);
    // the better-ranked bid is served at least as fully
    assert!(acceptance(&outcome, 1) + 1e-9 >= acceptance(&outcome, 2));
}

#[apply(all_backends)]
#[rstest]
fn strong_duality_holds_at_the_optimum(
    backend: impl Backend + 'static,
    #[values(PunMode::Relaxed, PunMode::Full)] mode: PunMode,
    scarce: MarketBase,
) {
    let mut market = PunMarket::build(scarce, mode).expect("builds");
    let outcome = market
        .solve(&backend, &SolveSettings::from(&SolverOptions::default()))
        .expect("engine runs");
    assert!(outcome.incumbent.is_some());
    assert_abs_diff_eq!(market.duality_gap().expect("solved"), 0.0, epsilon = 1e-5);
}

#[apply(all_backends)]
#[rstest]
fn advanced_matches_simple(
    backend: impl Backend + Copy + 'static,
    #[values(abundant(), scarce())] base: MarketBase,
) {
    let simple = clear(backend, base.clone(), Strategy::Simple);
    let advanced = clear(backend, base, Strategy::Advanced);

    assert_abs_diff_eq!(advanced.welfare, simple.welfare, epsilon = 1e-4);
    // the final phase runs with every fixing released
    assert_eq!(advanced.binaries, simple.binaries);
}

#[apply(all_backends)]
#[rstest]
fn accepted_ranges_follow_the_solution(backend: impl Backend + 'static, scarce: MarketBase) {
    let mut market = PunMarket::build(scarce, PunMode::Full).expect("builds");
    assert!(market.accepted_price_ranges().is_err());

    market
        .solve(&backend, &SolveSettings::from(&SolverOptions::default()))
        .expect("engine runs");
    // both bids are at least partially served, so the price cannot exceed 40
    let ranges = market.accepted_price_ranges().expect("solved");
    assert_eq!(ranges[&1], (0.0, 40.0));
}

// Runs out of time on any solve with a cutoff, before finding a better point
struct Stalling<B> {
    inner: B,
    stalled: Rc<Cell<usize>>,
}

impl<B: Backend> Backend for Stalling<B> {
    fn name(&self) -> &str {
        "stalling"
    }

    fn solve(
        &self,
        formulation: &Formulation,
        settings: &SolveSettings,
    ) -> Result<SolveOutcome, BackendError> {
        if settings.cutoff.is_none() {
            return self.inner.solve(formulation, settings);
        }
        self.stalled.set(self.stalled.get() + 1);
        Ok(SolveOutcome::without_incumbent(
            Termination::NoSolution,
            settings.time_limit,
        ))
    }
}

#[apply(all_backends)]
#[rstest]
fn heuristic_incumbent_outlives_a_fruitless_final_phase(
    backend: impl Backend + Copy + 'static,
    scarce: MarketBase,
) {
    let stalled = Rc::new(Cell::new(0));
    let stalling = Stalling {
        inner: backend,
        stalled: stalled.clone(),
    };
    let outcome = Clearing::new(stalling, SolverOptions::default())
        .clear(scarce.clone(), Strategy::Advanced)
        .expect("the windowed solution is kept");
    assert_eq!(stalled.get(), 1);

    // the windowed solve may stop within the heuristic gap
    let simple = clear(backend, scarce, Strategy::Simple);
    assert!(outcome.welfare <= simple.welfare + 1e-4);
    assert!(outcome.welfare >= simple.welfare * (1.0 - SolverOptions::default().heuristic_gap) - 1e-4);
    for bid in outcome.pun.iter() {
        assert!((-1e-6..=1.0 + 1e-6).contains(&bid.acceptance));
    }
}

#[apply(all_backends)]
#[rstest]
fn saturated_line_releases_the_better_ranked_bid(
    backend: impl Backend + 'static,
    #[values(SplitMode::Disabled, SplitMode::Direct, SplitMode::MultiHop)] split: SplitMode,
    #[values(2, 3)] zones: u32,
) {
    // only 10 MW reach the better-ranked bid, so the worse-ranked one takes the rest
    let outcome = clear(backend, tied_network(zones, 10.0, split), Strategy::Simple);

    assert_abs_diff_eq!(acceptance(&outcome, 1), 1.0 / 3.0, epsilon = 1e-5);
    assert_abs_diff_eq!(acceptance(&outcome, 2), 1.0, epsilon = 1e-5);
    assert_abs_diff_eq!(outcome.pun_prices[&1], 40.0, epsilon = 1e-5);
    assert_abs_diff_eq!(outcome.welfare, 40.0 * 40.0 - 20.0 * 40.0, epsilon = 1e-4);

    let last = outcome
        .connections
        .iter()
        .find(|c| c.connection == ConnectionId(zones - 1))
        .expect("line into the last zone");
    assert_abs_diff_eq!(last.flow_up, 10.0, epsilon = 1e-5);
}

#[apply(all_backends)]
#[rstest]
fn linked_ties_serve_the_better_rank_first(
    backend: impl Backend + 'static,
    #[values((2, SplitMode::Direct), (2, SplitMode::MultiHop), (3, SplitMode::MultiHop))]
    case: (u32, SplitMode),
) {
    let (zones, split) = case;
    let outcome = clear(backend, tied_network(zones, 100.0, split), Strategy::Simple);

    assert_abs_diff_eq!(acceptance(&outcome, 1), 1.0, epsilon = 1e-5);
    assert_abs_diff_eq!(acceptance(&outcome, 2), 1.0 / 3.0, epsilon = 1e-5);
    assert_abs_diff_eq!(outcome.pun_prices[&1], 40.0, epsilon = 1e-5);
    for zone in 1..=zones {
        assert_abs_diff_eq!(outcome.price(ZoneId(zone), 1).expect("price"), 40.0, epsilon = 1e-5);
    }
}

#[apply(all_backends)]
#[rstest]
fn unlinked_ties_only_share_the_supply(
    backend: impl Backend + 'static,
    #[values((2, SplitMode::Disabled), (3, SplitMode::Disabled), (3, SplitMode::Direct))]
    case: (u32, SplitMode),
) {
    // zones 1 and 3 are not adjacent, so direct splitting leaves them apart
    let (zones, split) = case;
    let outcome = clear(backend, tied_network(zones, 100.0, split), Strategy::Simple);

    let served = 30.0 * (acceptance(&outcome, 1) + acceptance(&outcome, 2));
    assert_abs_diff_eq!(served, 40.0, epsilon = 1e-4);
    assert_abs_diff_eq!(outcome.pun_prices[&1], 40.0, epsilon = 1e-5);
    assert_abs_diff_eq!(outcome.welfare, 40.0 * 40.0 - 20.0 * 40.0, epsilon = 1e-4);
}
