use super::{MarketBase, MarketModel, Matched, ModelError};
use crate::formulation::{Formulation, LinExpr, Sense, VarId};
use dam_core::models::{
    BidId, BlockOutcome, ComplexId, ComplexOutcome, ConnectionOutcome, DayOutcome, Map, Period,
    Side, ZoneId, ZoneOutcome,
};
use tracing::{Level, event};

// Objective reward per accepted complex order, breaking ties in favour of acceptance
const ACCEPTANCE_REWARD: f64 = 1e-5;
// Largest complementarity slack tolerated by the post-solve audit
const SLACK_TOLERANCE: f64 = 1e-5;

#[derive(Clone, Copy, Debug)]
struct StepVars {
    acceptance: VarId,
    surplus: VarId,
}

#[derive(Clone, Copy, Debug)]
struct BlockVars {
    acceptance: VarId,
    indicator: VarId,
    surplus: VarId,
}

#[derive(Clone, Debug)]
struct OrderVars {
    acceptance: VarId,
    surplus: VarId,
    bids: Vec<(BidId, StepVars)>,
    volumes: Map<Period, VarId>,
}

#[derive(Clone, Copy, Debug)]
struct FlowVars {
    connection: usize,
    period: Period,
    up: VarId,
    down: VarId,
    congestion_up: VarId,
    congestion_down: VarId,
}

/// The single-level primal-dual formulation for days with complex orders.
///
/// Primal acceptance variables and dual price and surplus variables live in
/// one program. Tying the two together with `primal >= dual` makes every
/// feasible point a market equilibrium for the chosen integer decisions:
/// block and complex acceptance are decided by the engine, prices and
/// surpluses follow from duality. Minimum-income and ramping conditions of
/// complex orders enter both sides, the latter through a load-gradient price
/// that shifts the surplus of the sub-bids of an order.
#[derive(Clone, Debug)]
pub struct ComplexMarket {
    base: MarketBase,
    formulation: Formulation,
    prices: Map<(ZoneId, Period), VarId>,
    steps: Map<BidId, StepVars>,
    blocks: Map<BidId, BlockVars>,
    orders: Map<ComplexId, OrderVars>,
    flows: Vec<FlowVars>,
    welfare: LinExpr,
}

impl ComplexMarket {
    /// Build the formulation for a day without national-price orders
    pub fn build(base: MarketBase) -> Result<Self, ModelError> {
        if base.has_pun_orders() {
            return Err(ModelError::Unsupported {
                model: "complex-order",
                what: "national-price orders",
            });
        }

        let (lo, hi) = base.price_cap();
        let periods = base.periods();
        let config = base.config().clone();
        let mut f = Formulation::new(format!("complex_day_{}", base.day()), Sense::Maximise);

        let mut prices = Map::default();
        let mut balance: Map<(ZoneId, Period), LinExpr> = Map::default();
        for zone in base.zones() {
            for &t in periods.iter() {
                prices.insert((zone.id, t), f.continuous(format!("pi_{}_{t}", zone.id), lo, hi));
                balance.insert((zone.id, t), LinExpr::new());
            }
        }
        let price = |zone: ZoneId, period: Period| {
            prices
                .get(&(zone, period))
                .copied()
                .ok_or(ModelError::UnknownZone(zone))
        };

        let mut welfare = LinExpr::new();
        let mut dual = LinExpr::new();

        // Plain step bids
        let mut steps = Map::default();
        for &id in base.steps() {
            let bid = base.step(id)?;
            let pi = price(bid.zone, bid.period)?;
            let acceptance = f.continuous(format!("xs_{id}"), 0.0, 1.0);
            let surplus = f.nonneg(format!("s_{id}"));

            welfare -= bid.price * bid.volume * acceptance;
            *balance.entry((bid.zone, bid.period)).or_default() += bid.volume * acceptance;
            f.ge(
                format!("surplus_{id}"),
                surplus,
                bid.volume * pi - bid.price * bid.volume,
            );
            dual += surplus;
            steps.insert(id, StepVars { acceptance, surplus });
        }

        // Block bids
        let mut blocks = Map::default();
        for &id in base.blocks() {
            let block = base.block(id)?;
            let acceptance = f.continuous(format!("xb_{id}"), 0.0, 1.0);
            let indicator = f.binary(format!("ub_{id}"));
            let surplus = f.nonneg(format!("sb_{id}"));

            f.le(format!("block_max_{id}"), acceptance, indicator);
            f.ge(format!("block_min_{id}"), acceptance, block.min_ratio * indicator);
            welfare -= block.price * block.total_volume() * acceptance;

            let mut realized = LinExpr::new();
            for (&t, &v) in block.volumes.iter() {
                *balance.entry((block.zone, t)).or_default() += v * acceptance;
                realized += v * price(block.zone, t)? - block.price * v;
            }
            let big_m = (hi - lo) * block.absolute_volume();
            f.ge(
                format!("block_surplus_{id}"),
                surplus,
                realized - big_m + big_m * indicator,
            );
            dual += surplus;
            blocks.insert(
                id,
                BlockVars {
                    acceptance,
                    indicator,
                    surplus,
                },
            );
        }

        // Complex orders
        let mut orders = Map::default();
        let mut reward = LinExpr::new();
        for (&order_id, entry) in base.complex().iter() {
            let order = &entry.order;
            let acceptance = f.binary(format!("xc_{order_id}"));
            let surplus = f.nonneg(format!("sc_{order_id}"));
            reward += ACCEPTANCE_REWARD * acceptance;

            let volumes: Map<Period, VarId> = periods
                .iter()
                .map(|&t| (t, f.free(format!("v_{order_id}_{t}"))))
                .collect();

            // Ramping rows and the load-gradient price they induce
            let (ramp_down, ramp_up) = if config.apply_ramping {
                (order.ramp_down, order.ramp_up)
            } else {
                (None, None)
            };
            let mut gradient: Map<Period, LinExpr> =
                periods.iter().map(|&t| (t, LinExpr::new())).collect();
            for pair in periods.windows(2) {
                let (p, q) = (pair[0], pair[1]);
                if let Some(limit) = ramp_down {
                    let delta = f.nonneg(format!("lgd_{order_id}_{p}"));
                    f.le(
                        format!("ramp_down_{order_id}_{p}"),
                        volumes[&p] - volumes[&q],
                        limit * acceptance,
                    );
                    dual += limit * delta;
                    *gradient.entry(p).or_default() -= delta;
                    *gradient.entry(q).or_default() += delta;
                }
                if let Some(limit) = ramp_up {
                    let delta = f.nonneg(format!("lgu_{order_id}_{p}"));
                    f.le(
                        format!("ramp_up_{order_id}_{p}"),
                        volumes[&q] - volumes[&p],
                        limit * acceptance,
                    );
                    dual += limit * delta;
                    *gradient.entry(p).or_default() += delta;
                    *gradient.entry(q).or_default() -= delta;
                }
            }

            let mut volume_of: Map<Period, LinExpr> =
                periods.iter().map(|&t| (t, LinExpr::new())).collect();
            let mut sub_surplus = LinExpr::new();
            let mut stop_surplus = LinExpr::new();
            let mut income = LinExpr::new();
            let mut surplus_big_m = 0.0;
            let mut income_big_m = order.fixed_term;
            let mut bids = Vec::with_capacity(entry.bids.len());

            for &(id, stop) in entry.bids.iter() {
                let bid = base.step(id)?;
                let stop = stop && config.apply_scheduled_stop;
                let pi = price(bid.zone, bid.period)?;
                let bid_acceptance = f.continuous(format!("xs_{id}"), 0.0, 1.0);
                let bid_surplus = f.nonneg(format!("s_{id}"));

                welfare -= bid.price * bid.volume * bid_acceptance;
                *balance.entry((bid.zone, bid.period)).or_default() +=
                    bid.volume * bid_acceptance;
                *volume_of.entry(bid.period).or_default() += bid.volume * bid_acceptance;

                let shift = gradient.get(&bid.period).cloned().unwrap_or_default();
                f.ge(
                    format!("surplus_{id}"),
                    bid_surplus,
                    bid.volume * pi + shift * bid.volume - bid.price * bid.volume,
                );

                if stop {
                    // The first step during a scheduled stop stays available on rejection
                    stop_surplus += bid_surplus;
                    let ceiling = hi.max(order.variable_term);
                    income_big_m += bid.volume.abs() * (ceiling - bid.price).abs();
                } else {
                    f.le(format!("deactivate_{id}"), bid_acceptance, acceptance);
                }

                sub_surplus += bid_surplus;
                income += bid.volume * (bid.price - order.variable_term) * bid_acceptance;
                surplus_big_m += bid.volume.abs()
                    * match order.side {
                        Side::Supply => (hi - bid.price).max(0.0),
                        Side::Demand => (bid.price - lo).max(0.0),
                    };
                bids.push((
                    id,
                    StepVars {
                        acceptance: bid_acceptance,
                        surplus: bid_surplus,
                    },
                ));
            }

            for (t, expr) in volume_of {
                f.eq(format!("volume_{order_id}_{t}"), volumes[&t], expr);
            }

            f.ge(
                format!("complex_surplus_{order_id}"),
                surplus + surplus_big_m - surplus_big_m * acceptance,
                sub_surplus,
            );
            if !stop_surplus.terms().is_empty() {
                f.ge(format!("stop_surplus_{order_id}"), surplus, stop_surplus);
            }
            if config.apply_mic && order.has_income_condition() {
                f.ge(
                    format!("income_{order_id}"),
                    surplus + income + income_big_m - income_big_m * acceptance,
                    order.fixed_term,
                );
            }
            dual += surplus;

            if !config.apply_mic {
                f.fix(acceptance, 1.0);
            }

            orders.insert(
                order_id,
                OrderVars {
                    acceptance,
                    surplus,
                    bids,
                    volumes,
                },
            );
        }

        // Connections
        let mut flows = Vec::new();
        for (index, connection) in base.connections().iter().enumerate() {
            for &t in periods.iter() {
                let capacity_up = connection.capacity_up.get(&t).copied().unwrap_or(0.0);
                let capacity_down = connection.capacity_down.get(&t).copied().unwrap_or(0.0);
                let id = connection.id;
                let up = f.continuous(format!("fu_{id}_{t}"), 0.0, capacity_up);
                let down = f.continuous(format!("fd_{id}_{t}"), 0.0, capacity_down);
                let congestion_up = f.nonneg(format!("cu_{id}_{t}"));
                let congestion_down = f.nonneg(format!("cd_{id}_{t}"));

                *balance.entry((connection.from, t)).or_default() -= up - down;
                *balance.entry((connection.to, t)).or_default() -= down - up;

                let pi_from = price(connection.from, t)?;
                let pi_to = price(connection.to, t)?;
                f.eq(
                    format!("dual_capacity_{id}_{t}"),
                    congestion_up - congestion_down + pi_from - pi_to,
                    0.0,
                );
                dual += capacity_up * congestion_up + capacity_down * congestion_down;

                flows.push(FlowVars {
                    connection: index,
                    period: t,
                    up,
                    down,
                    congestion_up,
                    congestion_down,
                });
            }
        }

        for ((zone, t), expr) in balance {
            if !expr.terms().is_empty() {
                f.eq(format!("balance_{zone}_{t}"), expr, 0.0);
            }
        }

        f.ge("primal_dual", welfare.clone(), dual);
        f.set_objective(welfare.clone() + reward);

        event!(
            Level::DEBUG,
            day = %base.day(),
            variables = f.variables().len(),
            rows = f.rows().len(),
            binaries = f.free_discrete(),
            "built complex-order model"
        );

        Ok(Self {
            base,
            formulation: f,
            prices,
            steps,
            blocks,
            orders,
            flows,
            welfare,
        })
    }

    /// Pin the acceptance of the given orders, releasing all others.
    ///
    /// When minimum-income conditions are disabled every order stays accepted.
    pub fn fix_complex_orders(&mut self, fixed: &Map<ComplexId, f64>) {
        let apply_mic = self.base.config().apply_mic;
        for (id, vars) in self.orders.iter() {
            match fixed.get(id) {
                Some(&value) => self.formulation.fix(vars.acceptance, value),
                None if apply_mic => self.formulation.release(vars.acceptance),
                None => self.formulation.fix(vars.acceptance, 1.0),
            }
        }
    }

    fn price(&self, zone: ZoneId, period: Period) -> f64 {
        self.prices
            .get(&(zone, period))
            .map(|&var| self.formulation.value(var))
            .unwrap_or_default()
    }

    /// Whether a rejected order would have covered its costs at the realized prices
    fn is_paradoxically_rejected(&self, id: ComplexId, vars: &OrderVars) -> Result<bool, ModelError> {
        let tolerance = self.base.config().accepted_tolerance;
        if self.formulation.value(vars.acceptance) >= tolerance {
            return Ok(false);
        }
        let Some(entry) = self.base.complex().get(&id) else {
            return Ok(false);
        };

        let mut volume = 0.0;
        let mut income = 0.0;
        for &(bid_id, _) in entry.bids.iter() {
            let bid = self.base.step(bid_id)?;
            let pi = self.price(bid.zone, bid.period);
            if (pi - bid.price) * bid.volume >= 0.0 {
                volume += bid.volume;
                income += pi * bid.volume;
            }
        }
        let order = &entry.order;
        Ok(volume != 0.0 && income >= order.fixed_term + order.variable_term * volume)
    }

    fn audit_slacks(&self) {
        let f = &self.formulation;
        for (id, vars) in self.steps.iter() {
            let slack = f.value(vars.surplus) * (1.0 - f.value(vars.acceptance));
            if slack.abs() > SLACK_TOLERANCE {
                event!(Level::WARN, bid = %id, slack, "step bid violates complementarity");
            }
        }
        for (id, vars) in self.blocks.iter() {
            let slack = f.value(vars.surplus) * (f.value(vars.indicator) - f.value(vars.acceptance));
            if slack.abs() > SLACK_TOLERANCE {
                event!(Level::WARN, bid = %id, slack, "block bid violates complementarity");
            }
        }
        for (id, vars) in self.orders.iter() {
            let accepted = f.value(vars.acceptance);
            for (bid, sub) in vars.bids.iter() {
                let slack = f.value(sub.surplus) * (accepted - f.value(sub.acceptance));
                if slack.abs() > SLACK_TOLERANCE {
                    event!(
                        Level::WARN,
                        order = %id,
                        bid = %bid,
                        slack,
                        "complex sub-bid violates complementarity"
                    );
                }
            }
            let slack = f.value(vars.surplus) * (1.0 - accepted);
            if slack.abs() > SLACK_TOLERANCE {
                event!(Level::WARN, order = %id, slack, "complex order violates complementarity");
            }
        }
    }
}

impl MarketModel for ComplexMarket {
    fn base(&self) -> &MarketBase {
        &self.base
    }

    fn formulation(&self) -> &Formulation {
        &self.formulation
    }

    fn formulation_mut(&mut self) -> &mut Formulation {
        &mut self.formulation
    }

    fn extract(&mut self) -> Result<DayOutcome, ModelError> {
        if !self.formulation.has_solution() {
            return Err(ModelError::NotSolved);
        }
        self.audit_slacks();

        let f = &self.formulation;
        let base = &self.base;
        let tolerance = base.config().accepted_tolerance;
        let periods = base.periods();

        let mut matched = Matched::default();
        let sub_bids = self.orders.values().flat_map(|vars| vars.bids.iter());
        for (id, vars) in self.steps.iter().chain(sub_bids.map(|(id, vars)| (id, vars))) {
            let bid = base.step(*id)?;
            let x = f.value(vars.acceptance);
            if x > tolerance {
                matched.add(bid.zone, bid.period, bid.volume * x);
            }
        }

        let mut blocks = Vec::with_capacity(self.blocks.len());
        for (&id, vars) in self.blocks.iter() {
            let block = base.block(id)?;
            let x = f.value(vars.acceptance);
            let mut surplus = 0.0;
            for (&t, &v) in block.volumes.iter() {
                if x > tolerance {
                    matched.add(block.zone, t, v * x);
                }
                surplus += (self.price(block.zone, t) - block.price) * v * x;
            }
            blocks.push(BlockOutcome {
                block: block.id,
                acceptance: x,
                surplus,
            });
        }

        let mut zones = Vec::new();
        for zone in base.zones() {
            for &t in periods.iter() {
                let (supply, demand) = matched.get(zone.id, t);
                zones.push(ZoneOutcome {
                    zone: zone.id,
                    name: zone.name.clone(),
                    period: t,
                    price: self.price(zone.id, t),
                    supply,
                    demand,
                });
            }
        }

        let connections = self
            .flows
            .iter()
            .map(|flow| ConnectionOutcome {
                connection: base.connections()[flow.connection].id,
                period: flow.period,
                flow_up: f.value(flow.up),
                flow_down: f.value(flow.down),
                congestion_up: f.value(flow.congestion_up),
                congestion_down: f.value(flow.congestion_down),
            })
            .collect();

        let mut complex = Vec::with_capacity(self.orders.len());
        let mut rejected = Vec::new();
        for (&id, vars) in self.orders.iter() {
            let paradoxically_rejected = self.is_paradoxically_rejected(id, vars)?;
            if paradoxically_rejected {
                let variable_term = base
                    .complex()
                    .get(&id)
                    .map(|entry| entry.order.variable_term)
                    .unwrap_or_default();
                rejected.push((variable_term, id));
            }
            complex.push(ComplexOutcome {
                order: id,
                acceptance: f.value(vars.acceptance),
                surplus: f.value(vars.surplus),
                volumes: vars
                    .volumes
                    .iter()
                    .map(|(&t, &var)| (t, f.value(var)))
                    .collect(),
                paradoxically_rejected,
            });
        }
        rejected.sort_by(|a, b| a.0.total_cmp(&b.0));
        if !rejected.is_empty() {
            event!(
                Level::INFO,
                count = rejected.len(),
                "paradoxically rejected complex orders"
            );
        }

        let outcome = DayOutcome {
            day: base.day(),
            welfare: f.evaluate(&self.welfare),
            binaries: f.free_discrete(),
            zones,
            connections,
            blocks,
            complex,
            paradoxically_rejected: rejected.into_iter().map(|(_, id)| id).collect(),
            ..Default::default()
        };
        self.base.record(&outcome);
        Ok(outcome)
    }
}
