use approx::assert_abs_diff_eq;
use dam_core::models::{
    ComplexId, ComplexOrder, Connection, ConnectionId, DayId, DayOutcome, MarketConfig, Order,
    Side, StepCurve, Zone, ZoneId,
};
use dam_solver::market::MarketBase;
use dam_solver::{Backend, Clearing, SolverOptions, Strategy};
use rstest::*;
use rstest_reuse::{self, *};

mod all_backends;
use all_backends::all_backends;

const PERIODS: u32 = 4;

// Two zones joined by an uncongested line. Price-taking demand of 15 MW in
// zone 1 and 10 MW in zone 2, expensive supply of 100 MW at 50 in zone 2, and
// two complex orders in zone 1 offering 10 MW at 10 in every period. With
// both orders in, the expensive supply stays marginal and every price is 50.
struct Scenario {
    first: (f64, f64, Option<f64>),
    second: (f64, f64),
    // extra price-taking demand in zone 1 during period 3
    peak: f64,
    config: MarketConfig,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            // order 1 cannot cover a fixed term of 1000 with a variable term of 45
            first: (1000.0, 45.0, Some(5.0)),
            second: (1000.0, 20.0),
            peak: 0.0,
            config: MarketConfig::default(),
        }
    }
}

fn zone(id: u32) -> Zone {
    Zone {
        id: ZoneId(id),
        name: format!("Z{id}"),
        min_price: 0.0,
        max_price: 3000.0,
    }
}

fn curve(zone: u32, period: u32, side: Side, quantity: f64, price: f64) -> StepCurve {
    StepCurve::new(ZoneId(zone), period, side, vec![(0.0, price), (quantity, price)])
        .expect("valid curve")
}

fn complex(
    id: u32,
    (fixed_term, variable_term, ramp): (f64, f64, Option<f64>),
    quantities: [f64; 4],
) -> ComplexOrder {
    ComplexOrder {
        id: ComplexId(id),
        zone: ZoneId(1),
        side: Side::Supply,
        curves: (1..=PERIODS)
            .map(|t| (t, curve(1, t, Side::Supply, quantities[t as usize - 1], 10.0)))
            .collect(),
        fixed_term,
        variable_term,
        ramp_up: ramp,
        ramp_down: ramp,
        scheduled_stop_periods: 0,
    }
}

impl Scenario {
    fn base(&self) -> MarketBase {
        let line = Connection {
            id: ConnectionId(1),
            from: ZoneId(1),
            to: ZoneId(2),
            capacity_up: (1..=PERIODS).map(|t| (t, 100.0)).collect(),
            capacity_down: (1..=PERIODS).map(|t| (t, 100.0)).collect(),
        };
        let mut base = MarketBase::new(
            DayId(1),
            vec![zone(1), zone(2)],
            vec![line],
            self.config.clone(),
        );
        for t in 1..=PERIODS {
            base.submit(curve(1, t, Side::Demand, 15.0, 3000.0).into())
                .expect("known zone");
            base.submit(curve(2, t, Side::Demand, 10.0, 3000.0).into())
                .expect("known zone");
            base.submit(curve(2, t, Side::Supply, 100.0, 50.0).into())
                .expect("known zone");
        }
        if self.peak > 0.0 {
            base.submit(curve(1, 3, Side::Demand, self.peak, 3000.0).into())
                .expect("known zone");
        }
        base.submit(Order::Complex(complex(1, self.first, [10.0; 4])))
            .expect("known zone");
        let (fixed_term, variable_term) = self.second;
        base.submit(Order::Complex(complex(2, (fixed_term, variable_term, None), [10.0; 4])))
            .expect("known zone");
        base
    }

    fn clear(&self, backend: impl Backend + 'static) -> DayOutcome {
        Clearing::new(backend, SolverOptions::default())
            .clear(self.base(), Strategy::Simple)
            .expect("day clears")
    }
}

fn acceptance(outcome: &DayOutcome, id: u32) -> f64 {
    outcome
        .complex_order(ComplexId(id))
        .expect("order in outcome")
        .acceptance
}

fn assert_balanced(outcome: &DayOutcome) {
    for t in 1..=PERIODS {
        let net: f64 = outcome
            .zones
            .iter()
            .filter(|z| z.period == t)
            .map(|z| z.supply - z.demand)
            .sum();
        assert_abs_diff_eq!(net, 0.0, epsilon = 1e-6);
    }
}

#[apply(all_backends)]
#[rstest]
fn costly_order_is_rejected(backend: impl Backend + 'static) {
    let outcome = Scenario::default().clear(backend);

    assert_abs_diff_eq!(acceptance(&outcome, 1), 0.0, epsilon = 1e-5);
    assert_abs_diff_eq!(acceptance(&outcome, 2), 1.0, epsilon = 1e-5);
    for t in 1..=PERIODS {
        for z in 1..=2 {
            let price = outcome.price(ZoneId(z), t).expect("price");
            assert_abs_diff_eq!(price, 50.0, epsilon = 1e-6);
        }
    }
    // 25 MW at 3000 against 10 MW at 10 and 15 MW at 50, in four periods
    assert_abs_diff_eq!(outcome.welfare, 4.0 * (75000.0 - 100.0 - 750.0), epsilon = 1e-3);
    assert!(outcome.paradoxically_rejected.is_empty());
    assert_balanced(&outcome);
}

#[apply(all_backends)]
#[rstest]
fn without_income_conditions_both_orders_run(backend: impl Backend + 'static) {
    let scenario = Scenario {
        config: MarketConfig {
            apply_mic: false,
            ..Default::default()
        },
        ..Default::default()
    };
    let outcome = scenario.clear(backend);

    assert_abs_diff_eq!(acceptance(&outcome, 1), 1.0, epsilon = 1e-5);
    assert_abs_diff_eq!(acceptance(&outcome, 2), 1.0, epsilon = 1e-5);
    assert_eq!(outcome.binaries, 0);
    assert_balanced(&outcome);
}

#[apply(all_backends)]
#[rstest]
fn rejection_shifts_between_orders(backend: impl Backend + 'static) {
    let scenario = Scenario {
        first: (1000.0, 10.0, None),
        second: (1000.0, 1000.0),
        ..Default::default()
    };
    let outcome = scenario.clear(backend);

    assert_abs_diff_eq!(acceptance(&outcome, 1), 1.0, epsilon = 1e-5);
    assert_abs_diff_eq!(acceptance(&outcome, 2), 0.0, epsilon = 1e-5);
    assert_balanced(&outcome);
}

#[apply(all_backends)]
#[rstest]
fn shortage_lifts_the_price_to_the_cap(backend: impl Backend + 'static) {
    // 225 MW of demand in period 3 against 120 MW of supply
    let scenario = Scenario {
        peak: 200.0,
        ..Default::default()
    };
    let outcome = scenario.clear(backend);

    for z in 1..=2 {
        for t in 1..=PERIODS {
            let price = outcome.price(ZoneId(z), t).expect("price");
            let expected = if t == 3 { 3000.0 } else { 50.0 };
            assert_abs_diff_eq!(price, expected, epsilon = 1e-6);
        }
    }
    // the scarcity rent covers the fixed and variable terms of both orders
    assert_abs_diff_eq!(acceptance(&outcome, 1), 1.0, epsilon = 1e-5);
    assert_abs_diff_eq!(acceptance(&outcome, 2), 1.0, epsilon = 1e-5);
    assert!(outcome.paradoxically_rejected.is_empty());

    // every megawatt on offer is taken, wherever the demand is served
    let served: f64 = outcome
        .zones
        .iter()
        .filter(|z| z.period == 3)
        .map(|z| z.demand)
        .sum();
    assert_abs_diff_eq!(served, 120.0, epsilon = 1e-5);
    assert_balanced(&outcome);
}

#[apply(all_backends)]
#[rstest]
fn rejected_order_in_the_money_is_paradoxical(backend: impl Backend + 'static) {
    // 30 MW of demand, 20 MW at 30 and 100 MW at 100 of plain supply. Order 1
    // would push the price down to 30 and miss its fixed term of 2000, but at
    // the price of 100 it leaves behind it would earn 4000.
    let mut base = MarketBase::new(DayId(1), vec![zone(1)], Vec::new(), MarketConfig::default());
    for t in 1..=PERIODS {
        base.submit(curve(1, t, Side::Demand, 30.0, 3000.0).into())
            .expect("known zone");
        base.submit(curve(1, t, Side::Supply, 20.0, 30.0).into())
            .expect("known zone");
        base.submit(curve(1, t, Side::Supply, 100.0, 100.0).into())
            .expect("known zone");
    }
    base.submit(Order::Complex(complex(1, (2000.0, 0.0, None), [10.0; 4])))
        .expect("known zone");
    base.submit(Order::Complex(complex(2, (100.0, 0.0, None), [5.0; 4])))
        .expect("known zone");

    let outcome = Clearing::new(backend, SolverOptions::default())
        .clear(base, Strategy::Simple)
        .expect("day clears");

    assert_abs_diff_eq!(acceptance(&outcome, 1), 0.0, epsilon = 1e-5);
    assert_abs_diff_eq!(acceptance(&outcome, 2), 1.0, epsilon = 1e-5);
    for t in 1..=PERIODS {
        assert_abs_diff_eq!(outcome.price(ZoneId(1), t).expect("price"), 100.0, epsilon = 1e-6);
    }
    assert_eq!(outcome.paradoxically_rejected, vec![ComplexId(1)]);
    let first = outcome.complex_order(ComplexId(1)).expect("order in outcome");
    assert!(first.paradoxically_rejected);
    let second = outcome.complex_order(ComplexId(2)).expect("order in outcome");
    assert!(!second.paradoxically_rejected);
    assert_balanced(&outcome);
}

#[apply(all_backends)]
#[rstest]
fn ramp_limits_bound_volume_changes(backend: impl Backend + 'static) {
    let config = MarketConfig {
        apply_mic: false,
        ..Default::default()
    };
    let mut base = MarketBase::new(DayId(1), vec![zone(1)], Vec::new(), config);
    for t in 1..=PERIODS {
        base.submit(curve(1, t, Side::Demand, 25.0, 3000.0).into())
            .expect("known zone");
        base.submit(curve(1, t, Side::Supply, 100.0, 50.0).into())
            .expect("known zone");
    }
    // a dip to 4 MW in period 3 drags its neighbours down by the ramp limit of 2
    base.submit(Order::Complex(complex(
        1,
        (0.0, 0.0, Some(2.0)),
        [10.0, 10.0, 4.0, 10.0],
    )))
    .expect("known zone");

    let outcome = Clearing::new(backend, SolverOptions::default())
        .clear(base, Strategy::Simple)
        .expect("day clears");
    let order = outcome.complex_order(ComplexId(1)).expect("order in outcome");
    let volumes: Vec<f64> = (1..=PERIODS).map(|t| order.volumes[&t]).collect();
    for (actual, expected) in volumes.iter().zip([8.0, 6.0, 4.0, 6.0]) {
        assert_abs_diff_eq!(*actual, expected, epsilon = 1e-5);
    }
    for pair in volumes.windows(2) {
        assert!((pair[1] - pair[0]).abs() <= 2.0 + 1e-6);
    }
    assert_balanced(&outcome);
}

#[test]
fn exported_formulation_is_readable() {
    let options = SolverOptions {
        export_dir: std::env::temp_dir().join("dam-solver-export-test"),
        ..Default::default()
    };
    let clearing = Clearing::new(dam_solver::MilpSolver::default(), options);
    let market = dam_solver::market::Market::build(Scenario::default().base()).expect("builds");

    let path = clearing
        .export(dam_solver::market::MarketModel::formulation(&market), DayId(7))
        .expect("export succeeds");
    assert!(path.ends_with("day_7.lp"));

    let text = std::fs::read_to_string(&path).expect("readable");
    assert!(text.starts_with("\\ complex_day_1"));
    assert!(text.contains("Maximize"));
    assert!(text.contains(" primal_dual:"));
    assert!(text.contains("Binaries\n xc_"));
    assert!(text.trim_end().ends_with("End"));
}
