use super::{MarketBase, MarketModel, Matched, ModelError};
use crate::formulation::{Formulation, LinExpr, Sense, VarId};
use dam_core::models::{
    BidId, BlockOutcome, ConnectionOutcome, DayOutcome, Map, Period, PunOrder, PunOutcome, Set,
    Side, SplitMode, ZoneId, ZoneOutcome,
};
use tracing::{Level, event};

mod network;
mod ordering;

use network::Network;

/// The national price is reported as the price of this pseudo-zone
pub const PUN_ZONE: ZoneId = ZoneId(0);

// Keeps bids priced at the cap outside of the default window
const WINDOW_EPSILON: f64 = 1e-6;
// Relative tolerance of the strong-duality audit
const DUALITY_TOLERANCE: f64 = 1e-4;

/// Which formulation of the national-price segment to build
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PunMode {
    /// Continuous acceptance, without the in/at-the-money apparatus
    Relaxed,
    /// The complete discrete formulation
    Full,
}

/// The upper-level variables of a national-price bid
#[derive(Clone, Copy, Debug)]
struct Decision {
    accepted: VarId,
    rationed: VarId,
    itm: VarId,
    atm: VarId,
    dispatch: VarId,
    itm_pun: VarId,
    itm_zone: VarId,
    welfare_dual: VarId,
}

#[derive(Clone, Copy, Debug)]
struct PunVars {
    welfare: VarId,
    volume: VarId,
    decision: Option<Decision>,
}

#[derive(Clone, Copy, Debug)]
struct BlockVars {
    acceptance: VarId,
}

#[derive(Clone, Copy, Debug)]
struct FlowVars {
    connection: usize,
    period: Period,
    flow: VarId,
    congestion_up: VarId,
    congestion_down: VarId,
}

/// The single-level reformulation of the national-price clearing.
///
/// The lower level is the zonal dispatch for given national-price decisions;
/// it is replaced by its primal and dual constraints tied together by strong
/// duality. The upper level decides, per national-price bid, whether it is in
/// the money, at the money and rationed through welfare or dispatch, and
/// defines the national price so that national-price demand pays for its
/// energy at zonal prices. Bilinear terms are linearized with McCormick
/// envelopes on the price cap, and the rationed volume of each zone through a
/// binary expansion.
#[derive(Clone, Debug)]
pub struct PunMarket {
    base: MarketBase,
    mode: PunMode,
    formulation: Formulation,
    prices: Map<(ZoneId, Period), VarId>,
    pun_prices: Map<Period, VarId>,
    steps: Map<BidId, VarId>,
    blocks: Map<BidId, BlockVars>,
    pun: Map<BidId, PunVars>,
    flows: Vec<FlowVars>,
    primal: LinExpr,
    dual: LinExpr,
}

/// `y = u * x` for binary `u` and `x` in `[lo, hi]`
fn mccormick(f: &mut Formulation, name: &str, y: VarId, u: VarId, x: VarId, lo: f64, hi: f64) {
    f.ge(format!("{name}_lo"), y, lo * u);
    f.le(format!("{name}_hi"), y, hi * u);
    f.ge(format!("{name}_x_hi"), y, x - hi + hi * u);
    f.le(format!("{name}_x_lo"), y, x - lo + lo * u);
}

impl PunMarket {
    /// Build the formulation of a day without complex orders.
    ///
    /// The bids priced at the cap start fixed in the money.
    pub fn build(base: MarketBase, mode: PunMode) -> Result<Self, ModelError> {
        if base.has_complex_orders() {
            return Err(ModelError::Unsupported {
                model: "national-price",
                what: "complex orders",
            });
        }

        let full = mode == PunMode::Full;
        let (lo, hi) = base.price_cap();
        let span = hi - lo;
        let periods = base.periods();
        let config = base.config().clone();
        let network = Network::new(base.connections());
        let mut f = Formulation::new(format!("pun_day_{}", base.day()), Sense::Maximise);

        let mut prices = Map::default();
        let mut balance: Map<(ZoneId, Period), LinExpr> = Map::default();
        for zone in base.zones() {
            for &t in periods.iter() {
                prices.insert((zone.id, t), f.continuous(format!("pz_{}_{t}", zone.id), lo, hi));
                balance.insert((zone.id, t), LinExpr::new());
            }
        }
        let price = |zone: ZoneId, period: Period| {
            prices
                .get(&(zone, period))
                .copied()
                .ok_or(ModelError::UnknownZone(zone))
        };

        // Lower-level welfare of the zonal bids, shared by both objectives
        let mut dispatch = LinExpr::new();
        let mut pun_welfare = LinExpr::new();
        let mut dual = LinExpr::new();
        let mut objective = LinExpr::new();

        // Step bids
        let mut steps = Map::default();
        for &id in base.steps() {
            let bid = base.step(id)?;
            let pz = price(bid.zone, bid.period)?;
            let cell = balance.entry((bid.zone, bid.period)).or_default();
            let volume = match bid.side() {
                Side::Demand => {
                    let volume = f.continuous(format!("dk_{id}"), 0.0, -bid.volume);
                    let phi = f.nonneg(format!("phi_{id}"));
                    f.ge(format!("dual_demand_{id}"), phi + pz, bid.price);
                    *cell += volume;
                    dispatch += bid.price * volume;
                    dual += -bid.volume * phi;
                    volume
                }
                Side::Supply => {
                    let volume = f.continuous(format!("sp_{id}"), 0.0, bid.volume);
                    let phi = f.nonneg(format!("phip_{id}"));
                    f.ge(format!("dual_supply_{id}"), phi - pz, -bid.price);
                    *cell -= volume;
                    dispatch -= bid.price * volume;
                    dual += bid.volume * phi;
                    volume
                }
            };
            steps.insert(id, volume);
        }

        // Block bids
        let mut blocks = Map::default();
        for &id in base.blocks() {
            let block = base.block(id)?;
            let acceptance = f.nonneg(format!("rp_{id}"));
            let indicator = f.binary(format!("ubp_{id}"));
            let beta_max = f.nonneg(format!("bmax_{id}"));
            let beta_min = f.nonneg(format!("bmin_{id}"));
            let y_max = f.nonneg(format!("ypmax_{id}"));
            let y_min = f.nonneg(format!("ypmin_{id}"));

            f.le(format!("block_max_{id}"), acceptance, indicator);
            f.ge(format!("block_min_{id}"), acceptance, block.min_ratio * indicator);

            let total = block.total_volume();
            dispatch -= block.price * total * acceptance;

            let mut value = LinExpr::new();
            let mut reduced = beta_max - beta_min;
            for (&t, &v) in block.volumes.iter() {
                let pz = price(block.zone, t)?;
                *balance.entry((block.zone, t)).or_default() -= v * acceptance;
                value += v * pz;
                reduced += v * block.price;
                reduced -= v * pz;
            }
            f.eq(format!("dual_block_{id}"), reduced, 0.0);

            let big_m = span * block.absolute_volume();
            for (name, y, beta) in [("ypmax", y_max, beta_max), ("ypmin", y_min, beta_min)] {
                f.le(format!("{name}_{id}_on"), y, big_m * indicator);
                f.le(format!("{name}_{id}_off"), beta - y + big_m * indicator, big_m);
                f.ge(format!("{name}_{id}_dual"), beta - y, 0.0);
            }
            if full {
                f.ge(
                    format!("block_itm_{id}"),
                    value - block.price * total,
                    big_m * indicator - big_m,
                );
            }
            dual += y_max - block.min_ratio * y_min;

            blocks.insert(id, BlockVars { acceptance });
        }

        // National-price bids
        let mut pun_zones: Set<ZoneId> = Set::default();
        let mut by_period: Map<Period, Vec<(BidId, &PunOrder)>> = Map::default();
        for &id in base.pun() {
            let order = base.pun_order(id)?;
            pun_zones.insert(order.zone);
            by_period.entry(order.period).or_default().push((id, order));
        }

        let pun_prices: Map<Period, VarId> = if full {
            periods
                .iter()
                .map(|&t| (t, f.continuous(format!("pi_{t}"), lo, hi)))
                .collect()
        } else {
            Map::default()
        };

        let mut pun = Map::default();
        let mut definition: Map<Period, (LinExpr, LinExpr)> = Map::default();
        let mut rationed: Map<(ZoneId, Period), LinExpr> = Map::default();
        let m_itm = span + 1.0;
        let m_atm = span;

        for &id in base.pun() {
            let order = base.pun_order(id)?;
            let capped = order.price >= hi;
            let pz = price(order.zone, order.period)?;

            let welfare = if full {
                f.binary(format!("uwk_{id}"))
            } else {
                f.continuous(format!("uwk_{id}"), 0.0, 1.0)
            };
            let volume = f.nonneg(format!("dwk_{id}"));
            let psi = f.continuous(format!("psi_{id}"), 0.0, span);

            if !(full && capped) {
                f.le(format!("pun_welfare_volume_{id}"), volume, order.volume * welfare);
            }
            f.ge(format!("dual_pun_{id}"), psi + pz, order.price);
            pun_welfare += order.price * volume;
            *balance.entry((order.zone, order.period)).or_default() += volume;

            let decision = if full {
                let pi = *pun_prices
                    .get(&order.period)
                    .ok_or(ModelError::UnknownBid(id))?;
                let d = Decision {
                    accepted: f.continuous(format!("dkpi_{id}"), 0.0, order.volume),
                    rationed: f.nonneg(format!("ddk_{id}")),
                    itm: f.binary(format!("ugk_{id}")),
                    atm: f.binary(format!("uek_{id}")),
                    dispatch: f.binary(format!("udk_{id}")),
                    itm_pun: f.nonneg(format!("yugpun_{id}")),
                    itm_zone: f.nonneg(format!("yugpz_{id}")),
                    welfare_dual: f.nonneg(format!("yuw_{id}")),
                };

                if !capped {
                    let eps = config.pun_epsilon;
                    f.ge(format!("itm_ub_{id}"), pi + m_itm * d.itm, order.price);
                    f.le(format!("itm_lb_{id}"), pi + m_itm * d.itm, order.price - eps + m_itm);
                    f.le(format!("atm_ub_{id}"), m_atm * d.atm - pi, m_atm - order.price);
                    f.le(format!("atm_lb_{id}"), pi + m_atm * d.atm, m_atm + order.price);
                }
                f.le(format!("itm_xor_atm_{id}"), d.itm + d.atm, 1.0);
                f.le(format!("atm_welfare_{id}"), welfare, d.atm);
                f.le(format!("atm_dispatch_{id}"), d.dispatch, d.atm);
                f.le(format!("welfare_xor_dispatch_{id}"), d.dispatch + welfare, 1.0);
                f.le(format!("dispatch_volume_{id}"), d.rationed, order.volume * d.dispatch);
                f.eq(
                    format!("pun_quantity_{id}"),
                    d.accepted,
                    order.volume * d.itm + volume + d.rationed,
                );

                mccormick(&mut f, &format!("lin_itm_pun_{id}"), d.itm_pun, d.itm, pi, lo, hi);
                mccormick(&mut f, &format!("lin_itm_pz_{id}"), d.itm_zone, d.itm, pz, lo, hi);
                mccormick(&mut f, &format!("lin_welfare_{id}"), d.welfare_dual, welfare, psi, 0.0, span);

                *balance.entry((order.zone, order.period)).or_default() +=
                    order.volume * d.itm + d.rationed;
                *rationed.entry((order.zone, order.period)).or_default() += d.rationed;

                let (lhs, rhs) = definition.entry(order.period).or_default();
                *lhs += order.volume * d.itm_pun + order.price * d.rationed;
                *rhs += order.volume * d.itm_zone - order.volume * d.welfare_dual;

                dual += order.volume * d.welfare_dual - order.volume * d.itm_zone;
                objective += order.price * d.accepted;
                Some(d)
            } else {
                dual += order.volume * psi;
                objective += order.price * volume;
                None
            };

            pun.insert(
                id,
                PunVars {
                    welfare,
                    volume,
                    decision,
                },
            );
        }

        // Connections
        let mut flows = Vec::new();
        let mut net_flow: Map<(ZoneId, ZoneId, Period), LinExpr> = Map::default();
        for (index, connection) in base.connections().iter().enumerate() {
            let id = connection.id;
            for &t in periods.iter() {
                let capacity_up = connection.capacity_up.get(&t).copied().unwrap_or(0.0);
                let capacity_down = connection.capacity_down.get(&t).copied().unwrap_or(0.0);
                let flow = f.continuous(format!("g_{id}_{t}"), -capacity_down, capacity_up);
                let congestion_up = f.nonneg(format!("du_{id}_{t}"));
                let congestion_down = f.nonneg(format!("dd_{id}_{t}"));

                *balance.entry((connection.from, t)).or_default() += flow;
                *balance.entry((connection.to, t)).or_default() -= flow;

                let pz_from = price(connection.from, t)?;
                let pz_to = price(connection.to, t)?;
                f.eq(
                    format!("dual_flow_{id}_{t}"),
                    pz_from - pz_to + congestion_up - congestion_down,
                    0.0,
                );
                dual += capacity_up * congestion_up + capacity_down * congestion_down;

                *net_flow
                    .entry((connection.from, connection.to, t))
                    .or_default() += flow;
                *net_flow
                    .entry((connection.to, connection.from, t))
                    .or_default() -= flow;

                flows.push(FlowVars {
                    connection: index,
                    period: t,
                    flow,
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

        if full {
            // Binary expansion of the dispatch-rationed volume of each zone
            let step = config.expansion_step;
            for &t in periods.iter() {
                let mut expansion = LinExpr::new();
                for &zone in pun_zones.iter() {
                    let pz = price(zone, t)?;
                    let mut digits = LinExpr::new();
                    for j in 0..config.expansion_bits {
                        let weight = step * 2f64.powi(j as i32);
                        let bit = f.binary(format!("bexp_{t}_{j}_{zone}"));
                        let product = f.nonneg(format!("ybpz_{t}_{j}_{zone}"));
                        mccormick(&mut f, &format!("lin_bexp_{t}_{j}_{zone}"), product, bit, pz, lo, hi);
                        digits += weight * bit;
                        expansion += weight * product;
                    }
                    let total = rationed.get(&(zone, t)).cloned().unwrap_or_default();
                    f.eq(format!("binary_expansion_{t}_{zone}"), digits, total);
                }

                let imbalance = f.continuous(
                    format!("imbalance_{t}"),
                    config.pun_imbalance.0,
                    config.pun_imbalance.1,
                );
                let (lhs, rhs) = definition.get(&t).cloned().unwrap_or_default();
                f.eq(
                    format!("pun_definition_{t}"),
                    lhs,
                    rhs + imbalance + expansion.clone(),
                );
                dual -= expansion;
            }

            // Network utilization indicators
            let mut extended: Vec<ZoneId> = pun_zones.iter().copied().collect();
            for &zone in config.transit_zones.iter() {
                if !extended.contains(&zone) && base.zones().iter().any(|z| z.id == zone) {
                    extended.push(zone);
                }
            }
            let mut utilization: Map<(ZoneId, ZoneId, Period), VarId> = Map::default();
            if config.split != SplitMode::Disabled {
                for &t in periods.iter() {
                    for &i in extended.iter() {
                        for &j in extended.iter() {
                            let forward = network.capacity(i, j, t);
                            if i == j || forward <= 0.0 {
                                continue;
                            }
                            let backward = network.capacity(j, i, t);
                            let uf = f.binary(format!("uf_{i}_{j}_{t}"));
                            let flow = net_flow.get(&(i, j, t)).cloned().unwrap_or_default();
                            f.le(
                                format!("utilization_{i}_{j}_{t}"),
                                (forward + backward) * uf - flow,
                                backward,
                            );
                            utilization.insert((i, j, t), uf);
                        }
                    }
                }
            }
            let hop = |a: ZoneId, b: ZoneId, t: Period| {
                let mut expr = LinExpr::new();
                for key in [(a, b, t), (b, a, t)] {
                    if let Some(&uf) = utilization.get(&key) {
                        expr += uf;
                    }
                }
                expr
            };

            // Orderings between national-price bids of the same period
            for (&t, bids) in by_period.iter() {
                let eligible: Vec<(BidId, &PunOrder)> = bids
                    .iter()
                    .copied()
                    .filter(|(_, order)| order.price < hi)
                    .collect();
                let decision = |id: BidId| {
                    pun.get(&id)
                        .and_then(|vars: &PunVars| vars.decision.map(|d| (*vars, d)))
                        .ok_or(ModelError::UnknownBid(id))
                };

                for (previous, next) in ordering::merit_chain(&eligible) {
                    let (_, a) = decision(previous)?;
                    let (_, b) = decision(next)?;
                    f.ge(format!("merit_order_{previous}_{next}"), a.itm, b.itm);
                }

                for (previous, next) in ordering::price_chain(&eligible) {
                    let (_, a) = decision(previous)?;
                    let (_, b) = decision(next)?;
                    f.le(format!("price_order_{previous}_{next}"), b.atm, a.itm - b.itm);
                }

                for ((h, h_order), (k, k_order)) in ordering::ties(&eligible) {
                    let (h_vars, h_decision) = decision(h)?;
                    let (_, k_decision) = decision(k)?;
                    let (i, j) = (h_order.zone, k_order.zone);

                    let reliefs: Vec<LinExpr> = if i == j {
                        vec![LinExpr::new()]
                    } else if config.split == SplitMode::Disabled {
                        Vec::new()
                    } else if network.connected(i, j, t) {
                        vec![hop(i, j, t)]
                    } else if config.split == SplitMode::MultiHop {
                        network
                            .paths(i, j, t, &extended)
                            .iter()
                            .map(|path| path.windows(2).map(|w| hop(w[0], w[1], t)).sum())
                            .collect()
                    } else {
                        Vec::new()
                    };

                    let volume = h_order.volume;
                    for (n, relief) in reliefs.into_iter().enumerate() {
                        let name = format!("atm_split_{h}_{k}_{n}");
                        f.ge(
                            format!("{name}_volume"),
                            h_vars.volume + h_decision.rationed,
                            volume * k_decision.atm - volume * relief.clone(),
                        );
                        f.ge(
                            format!("{name}_atm"),
                            h_decision.atm,
                            k_decision.atm - relief.clone(),
                        );
                        f.ge(
                            format!("{name}_dispatch"),
                            h_decision.rationed,
                            volume * k_decision.dispatch - volume * relief,
                        );
                    }
                }
            }
        }

        let primal = dispatch.clone() + pun_welfare;
        f.eq("strong_duality", primal.clone(), dual.clone());
        f.set_objective(dispatch + objective);

        let mut market = Self {
            base,
            mode,
            formulation: f,
            prices,
            pun_prices,
            steps,
            blocks,
            pun,
            flows,
            primal,
            dual,
        };
        market.fix_window(None);

        event!(
            Level::DEBUG,
            day = %market.base.day(),
            mode = ?mode,
            variables = market.formulation.variables().len(),
            rows = market.formulation.rows().len(),
            binaries = market.formulation.free_discrete(),
            "built national-price model"
        );
        Ok(market)
    }

    /// The formulation variant
    pub fn mode(&self) -> PunMode {
        self.mode
    }

    /// Fix the national-price bids outside an estimated price window.
    ///
    /// Bids priced above the window of their period are fixed in the money,
    /// bids below it out of the money; all others are released. Without
    /// windows the price cap is used, so only bids priced at the cap stay
    /// fixed. Each bid fixed in the full formulation removes four binaries.
    pub fn fix_window(&mut self, windows: Option<&Map<Period, (f64, f64)>>) {
        let (lo, hi) = self.base.price_cap();
        let default = (lo, hi - WINDOW_EPSILON);
        let f = &mut self.formulation;

        for (&id, vars) in self.pun.iter() {
            let Some(order) = self.base.pun_order(id).ok() else {
                continue;
            };
            let window = windows
                .and_then(|w| w.get(&order.period).copied())
                .unwrap_or(default);
            let state = if order.price >= hi || order.price > window.1 {
                Some(true)
            } else if order.price < window.0 {
                Some(false)
            } else {
                None
            };

            match (vars.decision, state) {
                (Some(d), Some(itm)) => {
                    let on = if itm { 1.0 } else { 0.0 };
                    f.fix(d.accepted, on * order.volume);
                    f.fix(d.itm, on);
                    for var in [d.rationed, d.atm, d.dispatch, vars.welfare, vars.volume] {
                        f.fix(var, 0.0);
                    }
                }
                (Some(d), None) => {
                    for var in [d.accepted, d.rationed, d.itm, d.atm, d.dispatch, vars.welfare, vars.volume] {
                        f.release(var);
                    }
                }
                (None, Some(itm)) => f.fix(vars.welfare, if itm { 1.0 } else { 0.0 }),
                (None, None) => f.release(vars.welfare),
            }
        }
    }

    /// The accepted volume of a national-price bid
    fn accepted(&self, vars: &PunVars) -> f64 {
        let var = vars.decision.map_or(vars.volume, |d| d.accepted);
        self.formulation.value(var)
    }

    /// The (lowest, highest) national price consistent with the accepted bids, by period.
    ///
    /// An accepted bid caps the price at its own price, a rejected one floors it.
    pub fn accepted_price_ranges(&self) -> Result<Map<Period, (f64, f64)>, ModelError> {
        if !self.formulation.has_solution() {
            return Err(ModelError::NotSolved);
        }
        let cap = self.base.price_cap();
        let tolerance = self.base.config().accepted_tolerance;
        let mut ranges: Map<Period, (f64, f64)> =
            self.base.periods().into_iter().map(|t| (t, cap)).collect();

        for (&id, vars) in self.pun.iter() {
            let order = self.base.pun_order(id)?;
            let range = ranges.entry(order.period).or_insert(cap);
            if self.accepted(vars) / order.volume > tolerance {
                range.1 = range.1.min(order.price);
            } else {
                range.0 = range.0.max(order.price);
            }
        }
        Ok(ranges)
    }

    /// The step of the national-price demand curve containing a price, by period
    pub fn price_step(&self, prices: &Map<Period, f64>) -> Result<Map<Period, (f64, f64)>, ModelError> {
        let cap = self.base.price_cap();
        let mut steps = Map::default();
        for t in self.base.periods() {
            let mut range = cap;
            let Some(&price) = prices.get(&t) else {
                steps.insert(t, range);
                continue;
            };

            let mut orders = Vec::new();
            for &id in self.base.pun() {
                let order = self.base.pun_order(id)?;
                if order.period == t {
                    orders.push(order.price);
                }
            }
            orders.sort_by(|a, b| b.total_cmp(a));

            for bid_price in orders {
                if bid_price > price {
                    range.1 = bid_price;
                } else if bid_price < price {
                    range.0 = bid_price;
                    break;
                } else {
                    range = (bid_price, bid_price);
                    break;
                }
            }
            steps.insert(t, range);
        }
        Ok(steps)
    }

    /// Primal minus dual objective of the lower level at the loaded solution
    pub fn duality_gap(&self) -> Option<f64> {
        self.formulation.has_solution().then(|| {
            self.formulation.evaluate(&self.primal) - self.formulation.evaluate(&self.dual)
        })
    }

    fn price(&self, zone: ZoneId, period: Period) -> f64 {
        self.prices
            .get(&(zone, period))
            .map(|&var| self.formulation.value(var))
            .unwrap_or_default()
    }
}

impl MarketModel for PunMarket {
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

        let f = &self.formulation;
        let base = &self.base;
        let tolerance = base.config().accepted_tolerance;
        let periods = base.periods();

        if let Some(gap) = self.duality_gap() {
            let scale = 1.0 + f.evaluate(&self.primal).abs();
            if gap.abs() > DUALITY_TOLERANCE * scale {
                event!(Level::WARN, day = %base.day(), gap, "strong duality does not hold");
            }
        }

        let mut matched = Matched::default();
        for (&id, &var) in self.steps.iter() {
            let bid = base.step(id)?;
            let volume = f.value(var);
            if volume > tolerance {
                matched.add(bid.zone, bid.period, bid.side().sign() * volume);
            }
        }

        let mut pun = Vec::with_capacity(self.pun.len());
        let mut pun_matched: Map<(ZoneId, Period), f64> = Map::default();
        let mut expansion = false;
        for (&id, vars) in self.pun.iter() {
            let order = base.pun_order(id)?;
            let volume = self.accepted(vars);
            if volume > tolerance {
                matched.add(order.zone, order.period, -volume);
                *pun_matched.entry((order.zone, order.period)).or_default() += volume;
            }
            if let Some(d) = vars.decision {
                expansion |= f.value(d.dispatch) > 0.5;
            }
            pun.push(PunOutcome {
                order: order.id,
                period: order.period,
                acceptance: volume / order.volume,
            });
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

        let mut pun_prices = Map::default();
        for &t in periods.iter() {
            let price = match self.pun_prices.get(&t) {
                Some(&var) => f.value(var),
                None => {
                    let mut volume = 0.0;
                    let mut weighted = 0.0;
                    for (&(zone, period), &matched) in pun_matched.iter() {
                        if period == t {
                            volume += matched;
                            weighted += matched * self.price(zone, t);
                        }
                    }
                    if volume > 0.0 {
                        weighted / volume
                    } else {
                        // nothing matched: fall back to the plain average over the bids
                        let mut plain = Vec::new();
                        for &id in self.pun.keys() {
                            let order = base.pun_order(id)?;
                            if order.period == t {
                                plain.push(self.price(order.zone, t));
                            }
                        }
                        if plain.is_empty() {
                            continue;
                        }
                        plain.iter().sum::<f64>() / plain.len() as f64
                    }
                }
            };
            pun_prices.insert(t, price);
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
        for (&t, &price) in pun_prices.iter() {
            let demand = pun_matched
                .iter()
                .filter(|((_, period), _)| *period == t)
                .map(|(_, volume)| volume)
                .sum();
            zones.push(ZoneOutcome {
                zone: PUN_ZONE,
                name: "PUN".into(),
                period: t,
                price,
                supply: 0.0,
                demand,
            });
        }

        let connections = self
            .flows
            .iter()
            .map(|flow| {
                let g = f.value(flow.flow);
                ConnectionOutcome {
                    connection: base.connections()[flow.connection].id,
                    period: flow.period,
                    flow_up: g.max(0.0),
                    flow_down: (-g).max(0.0),
                    congestion_up: f.value(flow.congestion_up),
                    congestion_down: f.value(flow.congestion_down),
                }
            })
            .collect();

        let outcome = DayOutcome {
            day: base.day(),
            welfare: f.evaluate(f.objective()),
            binaries: f.free_discrete(),
            expansion,
            zones,
            connections,
            blocks,
            pun,
            pun_prices,
            ..Default::default()
        };
        self.base.record(&outcome);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dam_core::models::{DayId, MarketConfig, Order, PunId, StepBid, Zone};

    fn base(config: MarketConfig) -> MarketBase {
        let zones = vec![Zone {
            id: ZoneId(1),
            name: "NORD".into(),
            min_price: 0.0,
            max_price: 3000.0,
        }];
        let mut base = MarketBase::new(DayId(1), zones, Vec::new(), config);
        base.submit(Order::Single(StepBid {
            zone: ZoneId(1),
            period: 1,
            volume: 100.0,
            price: 20.0,
        }))
        .expect("known zone");
        for (id, merit_order, price) in [(1, 1, 3000.0), (2, 2, 80.0), (3, 3, 60.0), (4, 4, 40.0)] {
            base.submit(Order::Pun(PunOrder {
                id: PunId(id),
                zone: ZoneId(1),
                period: 1,
                merit_order,
                volume: 10.0,
                price,
            }))
            .expect("known zone");
        }
        base
    }

    fn config() -> MarketConfig {
        MarketConfig {
            expansion_bits: 4,
            expansion_step: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn complex_orders_are_unsupported() {
        use dam_core::models::{ComplexId, ComplexOrder};
        let mut base = base(config());
        base.submit(Order::Complex(ComplexOrder {
            id: ComplexId(1),
            zone: ZoneId(1),
            side: Side::Supply,
            curves: Map::default(),
            fixed_term: 0.0,
            variable_term: 0.0,
            ramp_up: None,
            ramp_down: None,
            scheduled_stop_periods: 0,
        }))
        .expect("known zone");
        assert!(matches!(
            PunMarket::build(base, PunMode::Full),
            Err(ModelError::Unsupported { .. })
        ));
    }

    #[test]
    fn windows_fix_four_binaries_per_bid() {
        let mut market = PunMarket::build(base(config()), PunMode::Full).expect("builds");
        // the capped bid starts fixed: 3 free bids with 4 binaries each, plus 4 expansion bits
        let initial = market.formulation().free_discrete();
        assert_eq!(initial, 3 * 4 + 4);

        let windows: Map<Period, (f64, f64)> = [(1, (50.0, 70.0))].into_iter().collect();
        market.fix_window(Some(&windows));
        assert_eq!(market.formulation().free_discrete(), initial - 2 * 4);

        market.fix_window(None);
        assert_eq!(market.formulation().free_discrete(), initial);
    }

    #[test]
    fn relaxed_mode_has_no_national_price_binaries() {
        let market = PunMarket::build(base(config()), PunMode::Relaxed).expect("builds");
        assert_eq!(market.mode(), PunMode::Relaxed);
        assert_eq!(market.formulation().free_discrete(), 0);
        assert!(!market.formulation().rows().iter().any(|r| r.name.starts_with("merit_order")));
    }

    #[test]
    fn chains_skip_capped_bids() {
        let market = PunMarket::build(base(config()), PunMode::Full).expect("builds");
        let names: Vec<&str> = market
            .formulation()
            .rows()
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        // handles: 0 is the supply step, 1 the capped bid
        assert!(names.contains(&"merit_order_2_3"));
        assert!(names.contains(&"merit_order_3_4"));
        assert!(!names.iter().any(|n| n.starts_with("merit_order_1_")));
        assert!(names.contains(&"price_order_2_3"));
        assert!(!names.contains(&"itm_ub_1"));
        assert!(names.contains(&"strong_duality"));
        assert!(names.contains(&"pun_definition_1"));
    }

    #[test]
    fn price_steps_bracket_the_curve() {
        let market = PunMarket::build(base(config()), PunMode::Full).expect("builds");
        let prices: Map<Period, f64> = [(1, 70.0)].into_iter().collect();
        assert_eq!(market.price_step(&prices).expect("known bids")[&1], (60.0, 80.0));
        let prices: Map<Period, f64> = [(1, 60.0)].into_iter().collect();
        assert_eq!(market.price_step(&prices).expect("known bids")[&1], (60.0, 60.0));
        let prices: Map<Period, f64> = [(1, 10.0)].into_iter().collect();
        assert_eq!(market.price_step(&prices).expect("known bids")[&1], (0.0, 40.0));
    }
}
