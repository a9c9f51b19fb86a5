use super::{Side, StepBid};
use crate::models::{Period, ZoneId};

/// A single-period step curve of (cumulative quantity, price) points.
///
/// Quantities are stored unsigned and must start at zero and never decrease;
/// the [`Side`] decides the sign of the bids the curve decomposes into. Each
/// segment between consecutive points becomes one bid, priced at the first
/// point of the segment. Vertical segments (equal quantities) carry no volume
/// and are skipped, which lets curves be given either as one point per step or
/// as both corners of every step.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "StepCurveDto", into = "StepCurveDto")
)]
pub struct StepCurve {
    zone: ZoneId,
    period: Period,
    side: Side,
    points: Vec<(f64, f64)>,
}

impl StepCurve {
    /// Creates a new curve, validating all constraints
    pub fn new(
        zone: ZoneId,
        period: Period,
        side: Side,
        points: Vec<(f64, f64)>,
    ) -> Result<Self, CurveError> {
        Self::try_from(StepCurveDto {
            zone,
            period,
            side,
            points,
        })
    }

    /// The zone of the curve
    pub fn zone(&self) -> ZoneId {
        self.zone
    }

    /// The period of the curve
    pub fn period(&self) -> Period {
        self.period
    }

    /// Whether the curve sells or buys
    pub fn side(&self) -> Side {
        self.side
    }

    /// The validated (quantity, price) points
    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// The price of the first step
    pub fn first_price(&self) -> f64 {
        self.points[0].1
    }

    /// The signed cumulative volume at the end of the curve
    pub fn final_volume(&self) -> f64 {
        self.side.sign() * self.points[self.points.len() - 1].0
    }

    /// The atomic bids of the curve, in curve order
    pub fn bids(&self) -> impl Iterator<Item = StepBid> + '_ {
        let sign = self.side.sign();
        self.points.windows(2).filter_map(move |pair| {
            let ((q0, p0), (q1, _)) = (pair[0], pair[1]);
            (q1 > q0).then(|| StepBid {
                zone: self.zone,
                period: self.period,
                volume: sign * (q1 - q0),
                price: p0,
            })
        })
    }
}

/// DTO to ensure that we always validate when we deserialize from an untrusted source
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StepCurveDto {
    /// The zone of the curve
    pub zone: ZoneId,
    /// The period of the curve
    pub period: Period,
    /// Supply or demand
    pub side: Side,
    /// The (cumulative quantity, price) points
    pub points: Vec<(f64, f64)>,
}

impl From<StepCurve> for StepCurveDto {
    fn from(value: StepCurve) -> Self {
        Self {
            zone: value.zone,
            period: value.period,
            side: value.side,
            points: value.points,
        }
    }
}

impl TryFrom<StepCurveDto> for StepCurve {
    type Error = CurveError;

    /// Validates that the points are non-empty and finite, that the first point
    /// has zero quantity, and that quantities never decrease.
    fn try_from(value: StepCurveDto) -> Result<Self, Self::Error> {
        let Some(&(origin, _)) = value.points.first() else {
            return Err(CurveError::Empty);
        };

        for &(quantity, price) in value.points.iter() {
            if quantity.is_nan() || price.is_nan() {
                return Err(CurveError::NaN);
            }
            if quantity.is_infinite() || price.is_infinite() {
                return Err(CurveError::Infinity);
            }
        }

        if origin != 0.0 {
            return Err(CurveError::NonZeroOrigin(origin));
        }

        if value.points.windows(2).any(|pair| pair[1].0 < pair[0].0) {
            return Err(CurveError::NonMonotone);
        }

        Ok(Self {
            zone: value.zone,
            period: value.period,
            side: value.side,
            points: value.points,
        })
    }
}

/// Errors that can occur when constructing a step curve
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CurveError {
    /// The curve has no points
    #[error("no points provided")]
    Empty,
    /// A coordinate is NaN
    #[error("NaN value encountered")]
    NaN,
    /// A coordinate is infinite
    #[error("infinite value encountered")]
    Infinity,
    /// The first point does not start at zero quantity
    #[error("curve starts at quantity {0}, expected 0")]
    NonZeroOrigin(f64),
    /// Cumulative quantities decrease somewhere along the curve
    #[error("cumulative quantity is not monotone")]
    NonMonotone,
}
