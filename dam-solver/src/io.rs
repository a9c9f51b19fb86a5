use crate::market::{MarketBase, ModelError};
use dam_core::models::{
    BlockBid, BlockId, ComplexId, ComplexOrder, Connection, ConnectionId, CurveError, CurveId,
    DayId, Map, MarketConfig, Order, Period, PunId, PunOrder, Side, StepCurve, Zone, ZoneId,
};
use serde::{Deserialize, Serialize};

// One row type per persisted table, keyed by the day it belongs to.

/// A row of `DAYS`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DayRow {
    pub day_id: DayId,
    pub n_periods: u32,
}

/// A row of `ZONES`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ZoneRow {
    pub day_id: DayId,
    pub zone_id: ZoneId,
    pub name: String,
    pub min_price: f64,
    pub max_price: f64,
}

/// A row of `LINES`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LineRow {
    pub day_id: DayId,
    pub line_id: ConnectionId,
    pub zone_from: ZoneId,
    pub zone_to: ZoneId,
}

/// A row of `LINE_DATA`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LineDataRow {
    pub day_id: DayId,
    pub line_id: ConnectionId,
    pub period: Period,
    pub capacity_down: f64,
    pub capacity_up: f64,
}

/// A row of `CURVES`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CurveRow {
    pub day_id: DayId,
    pub curve_id: CurveId,
    pub zone_id: ZoneId,
    pub period: Period,
    #[serde(rename = "type")]
    pub kind: String,
}

/// A row of `CURVE_DATA`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CurveDataRow {
    pub day_id: DayId,
    pub curve_id: CurveId,
    pub position: u32,
    pub quantity: f64,
    pub price: f64,
}

/// A row of `BLOCKS`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockRow {
    pub day_id: DayId,
    pub block_id: BlockId,
    pub zone_id: ZoneId,
    pub price: f64,
    #[serde(default)]
    pub min_ratio: f64,
}

/// A row of `BLOCK_DATA`; quantities are positive for supply
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockDataRow {
    pub day_id: DayId,
    pub block_id: BlockId,
    pub period: Period,
    pub quantity: f64,
}

/// A row of `COMPLEXORDERS`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComplexOrderRow {
    pub day_id: DayId,
    pub complex_id: ComplexId,
    pub zone_id: ZoneId,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub fixed_term: f64,
    #[serde(default)]
    pub variable_term: f64,
    #[serde(default)]
    pub ramp_up: Option<f64>,
    #[serde(default)]
    pub ramp_down: Option<f64>,
    #[serde(default)]
    pub scheduled_stop_periods: u32,
}

/// A row of `COMPLEXORDER_DATA`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComplexOrderDataRow {
    pub day_id: DayId,
    pub complex_id: ComplexId,
    pub period: Period,
    pub position: u32,
    pub quantity: f64,
    pub price: f64,
}

/// A row of `PUNORDERS`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PunOrderRow {
    pub day_id: DayId,
    pub pun_id: PunId,
    pub zone_id: ZoneId,
    pub period: Period,
    pub merit_order: u32,
    pub volume: f64,
    pub price: f64,
}

/// The market data of any number of trading days, one field per table.
///
/// Missing tables deserialize as empty.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDataset {
    pub days: Vec<DayRow>,
    pub zones: Vec<ZoneRow>,
    pub lines: Vec<LineRow>,
    pub line_data: Vec<LineDataRow>,
    pub curves: Vec<CurveRow>,
    pub curve_data: Vec<CurveDataRow>,
    pub blocks: Vec<BlockRow>,
    pub block_data: Vec<BlockDataRow>,
    pub complexorders: Vec<ComplexOrderRow>,
    pub complexorder_data: Vec<ComplexOrderDataRow>,
    pub punorders: Vec<PunOrderRow>,
}

fn side(kind: &str) -> Result<Side, InputError> {
    match kind.to_ascii_uppercase().as_str() {
        "SUPPLY" => Ok(Side::Supply),
        "DEMAND" => Ok(Side::Demand),
        _ => Err(InputError::UnsupportedOrderType(kind.to_owned())),
    }
}

impl RawDataset {
    /// Parse a dataset from JSON
    pub fn from_reader(reader: impl std::io::Read) -> Result<Self, InputError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// The days of the dataset, ascending
    pub fn days(&self) -> Vec<DayId> {
        let mut days: Vec<DayId> = self.days.iter().map(|d| d.day_id).collect();
        days.sort_unstable();
        days.dedup();
        days
    }

    /// Assemble one day and submit all of its orders.
    ///
    /// Curve points are ordered by position and demand is negated through
    /// the side of the curve. Disabled market rules zero the corresponding
    /// terms of complex orders.
    pub fn day(&self, day: DayId, config: &MarketConfig) -> Result<MarketBase, InputError> {
        if !self.days.iter().any(|d| d.day_id == day) {
            return Err(InputError::UnknownDay(day));
        }

        let has_complex = self.complexorders.iter().any(|o| o.day_id == day);
        let has_pun = self.punorders.iter().any(|o| o.day_id == day);
        if has_complex && has_pun {
            return Err(InputError::MixedFormulation(day));
        }

        let mut zones: Vec<Zone> = self
            .zones
            .iter()
            .filter(|z| z.day_id == day)
            .map(|z| Zone {
                id: z.zone_id,
                name: z.name.clone(),
                min_price: z.min_price,
                max_price: z.max_price,
            })
            .collect();
        zones.sort_by_key(|z| z.id);

        let mut lines: Vec<&LineRow> = self.lines.iter().filter(|l| l.day_id == day).collect();
        lines.sort_by_key(|l| l.line_id);
        let connections = lines
            .into_iter()
            .map(|line| {
                let mut connection = Connection {
                    id: line.line_id,
                    from: line.zone_from,
                    to: line.zone_to,
                    capacity_up: Map::default(),
                    capacity_down: Map::default(),
                };
                for data in self
                    .line_data
                    .iter()
                    .filter(|d| d.day_id == day && d.line_id == line.line_id)
                {
                    connection.capacity_up.insert(data.period, data.capacity_up);
                    connection.capacity_down.insert(data.period, data.capacity_down);
                }
                connection
            })
            .collect();

        let mut base = MarketBase::new(day, zones, connections, config.clone());

        let mut curves: Vec<&CurveRow> = self.curves.iter().filter(|c| c.day_id == day).collect();
        curves.sort_by_key(|c| c.curve_id);
        for curve in curves {
            let mut points: Vec<&CurveDataRow> = self
                .curve_data
                .iter()
                .filter(|d| d.day_id == day && d.curve_id == curve.curve_id)
                .collect();
            points.sort_by_key(|d| d.position);
            let curve = StepCurve::new(
                curve.zone_id,
                curve.period,
                side(&curve.kind)?,
                points.iter().map(|d| (d.quantity, d.price)).collect(),
            )?;
            base.submit(curve.into())?;
        }

        let mut blocks: Vec<&BlockRow> = self.blocks.iter().filter(|b| b.day_id == day).collect();
        blocks.sort_by_key(|b| b.block_id);
        for block in blocks {
            let volumes = self
                .block_data
                .iter()
                .filter(|d| d.day_id == day && d.block_id == block.block_id)
                .map(|d| (d.period, d.quantity))
                .collect();
            base.submit(Order::Block(BlockBid {
                id: block.block_id,
                zone: block.zone_id,
                price: block.price,
                min_ratio: block.min_ratio,
                volumes,
            }))?;
        }

        let mut complex: Vec<&ComplexOrderRow> = self
            .complexorders
            .iter()
            .filter(|o| o.day_id == day)
            .collect();
        complex.sort_by_key(|o| o.complex_id);
        for order in complex {
            let side = side(&order.kind)?;
            let mut data: Vec<&ComplexOrderDataRow> = self
                .complexorder_data
                .iter()
                .filter(|d| d.day_id == day && d.complex_id == order.complex_id)
                .collect();
            data.sort_by_key(|d| (d.period, d.position));

            let mut points: Map<Period, Vec<(f64, f64)>> = Map::default();
            for d in data {
                points.entry(d.period).or_default().push((d.quantity, d.price));
            }
            let curves = points
                .into_iter()
                .map(|(period, points)| {
                    StepCurve::new(order.zone_id, period, side, points).map(|c| (period, c))
                })
                .collect::<Result<Map<_, _>, _>>()?;

            let (fixed_term, variable_term) = if config.apply_mic {
                (order.fixed_term, order.variable_term)
            } else {
                (0.0, 0.0)
            };
            let scheduled_stop_periods = if config.apply_scheduled_stop {
                order.scheduled_stop_periods
            } else {
                0
            };
            base.submit(Order::Complex(ComplexOrder {
                id: order.complex_id,
                zone: order.zone_id,
                side,
                curves,
                fixed_term,
                variable_term,
                ramp_up: order.ramp_up,
                ramp_down: order.ramp_down,
                scheduled_stop_periods,
            }))?;
        }

        let mut pun: Vec<&PunOrderRow> = self.punorders.iter().filter(|o| o.day_id == day).collect();
        pun.sort_by(|a, b| a.zone_id.cmp(&b.zone_id).then(b.price.total_cmp(&a.price)));
        for order in pun {
            base.submit(Order::Pun(PunOrder {
                id: order.pun_id,
                zone: order.zone_id,
                period: order.period,
                merit_order: order.merit_order,
                volume: order.volume,
                price: order.price,
            }))?;
        }

        Ok(base)
    }
}

/// Errors raised while reading market data
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// The input is not valid JSON of the expected shape
    #[error("malformed input: {0}")]
    Json(#[from] serde_json::Error),
    /// An order has a type other than SUPPLY or DEMAND
    #[error("unsupported order type `{0}`")]
    UnsupportedOrderType(String),
    /// A day holds both complex and national-price orders
    #[error("day {0} mixes complex and national-price orders")]
    MixedFormulation(DayId),
    /// The day is not part of the dataset
    #[error("day {0} is not part of the input")]
    UnknownDay(DayId),
    /// A curve failed validation
    #[error(transparent)]
    Curve(#[from] CurveError),
    /// An order was rejected by the market
    #[error(transparent)]
    Model(#[from] ModelError),
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: &str = r#"{
        "days": [{"day_id": 2, "n_periods": 2}, {"day_id": 1, "n_periods": 1}],
        "zones": [
            {"day_id": 1, "zone_id": 2, "name": "SUD", "min_price": 0, "max_price": 3000},
            {"day_id": 1, "zone_id": 1, "name": "NORD", "min_price": 0, "max_price": 3000}
        ],
        "lines": [{"day_id": 1, "line_id": 1, "zone_from": 1, "zone_to": 2}],
        "line_data": [{"day_id": 1, "line_id": 1, "period": 1, "capacity_down": 5, "capacity_up": 10}],
        "curves": [{"day_id": 1, "curve_id": 1, "zone_id": 1, "period": 1, "type": "DEMAND"}],
        "curve_data": [
            {"day_id": 1, "curve_id": 1, "position": 2, "quantity": 10, "price": 80},
            {"day_id": 1, "curve_id": 1, "position": 1, "quantity": 0, "price": 80}
        ],
        "complexorders": [{"day_id": 1, "complex_id": 4, "zone_id": 2, "type": "SUPPLY",
            "fixed_term": 100, "variable_term": 5, "ramp_up": 3, "scheduled_stop_periods": 1}],
        "complexorder_data": [
            {"day_id": 1, "complex_id": 4, "period": 1, "position": 1, "quantity": 0, "price": 20},
            {"day_id": 1, "complex_id": 4, "period": 1, "position": 2, "quantity": 6, "price": 20}
        ]
    }"#;

    fn dataset() -> RawDataset {
        RawDataset::from_reader(INPUT.as_bytes()).expect("valid input")
    }

    #[test]
    fn days_are_sorted() {
        assert_eq!(dataset().days(), vec![DayId(1), DayId(2)]);
    }

    #[test]
    fn demand_is_negated_and_points_ordered() {
        let base = dataset().day(DayId(1), &MarketConfig::default()).expect("valid day");
        assert_eq!(base.zones()[0].id, ZoneId(1));
        assert_eq!(base.connections()[0].capacity_up[&1], 10.0);

        let demand = base.book().step(dam_core::models::BidId(0)).expect("a step");
        assert_eq!(demand.volume, -10.0);
        assert_eq!(demand.price, 80.0);
    }

    #[test]
    fn disabled_rules_zero_their_terms() {
        let config = MarketConfig {
            apply_mic: false,
            apply_scheduled_stop: false,
            ..Default::default()
        };
        let base = dataset().day(DayId(1), &config).expect("valid day");
        let order = base.complex_orders().next().expect("one complex order");
        assert_eq!(order.fixed_term, 0.0);
        assert_eq!(order.variable_term, 0.0);
        assert_eq!(order.scheduled_stop_periods, 0);
        assert_eq!(order.ramp_up, Some(3.0));
    }

    #[test]
    fn invalid_days_are_rejected() {
        let mut dataset = dataset();
        assert!(matches!(
            dataset.day(DayId(7), &MarketConfig::default()),
            Err(InputError::UnknownDay(DayId(7)))
        ));

        dataset.punorders.push(PunOrderRow {
            day_id: DayId(1),
            pun_id: PunId(1),
            zone_id: ZoneId(1),
            period: 1,
            merit_order: 1,
            volume: 5.0,
            price: 50.0,
        });
        assert!(matches!(
            dataset.day(DayId(1), &MarketConfig::default()),
            Err(InputError::MixedFormulation(DayId(1)))
        ));

        dataset.punorders.clear();
        dataset.curves[0].kind = "BB".into();
        assert!(matches!(
            dataset.day(DayId(1), &MarketConfig::default()),
            Err(InputError::UnsupportedOrderType(_))
        ));
    }
}
