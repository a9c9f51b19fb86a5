use super::{Zone, ZoneId};

/// How far at-the-money rationing may be redistributed between zones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum SplitMode {
    /// Ties in different zones are not linked
    Disabled,
    /// Ties are linked across directly connected zones only
    Direct,
    /// Ties are linked along paths of up to four intermediate zones
    #[default]
    MultiHop,
}

/// The market rules a model is built with.
///
/// Every toggle is read once, when a model is built; changing the config of an
/// existing model has no effect.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct MarketConfig {
    /// Below this acceptance a bid or order counts as rejected
    pub accepted_tolerance: f64,
    /// Overrides the price cap derived from the zones
    pub price_cap: Option<(f64, f64)>,
    /// Enforce the ramp limits of complex orders
    pub apply_ramping: bool,
    /// Honour the scheduled stop of complex orders
    pub apply_scheduled_stop: bool,
    /// Enforce the minimum income condition of complex orders
    pub apply_mic: bool,
    /// Linking of at-the-money ties across zones
    pub split: SplitMode,
    /// Zones without national-price demand that may still carry rationing paths
    pub transit_zones: Vec<ZoneId>,
    /// Bounds of the revenue imbalance tolerated by the national price definition
    pub pun_imbalance: (f64, f64),
    /// Resolution of the binary expansion of dispatch-rationed volumes
    pub expansion_step: f64,
    /// Number of binary digits of that expansion
    pub expansion_bits: u32,
    /// Strict margin separating in-the-money bids from the national price
    pub pun_epsilon: f64,
    /// Half-width of the price window estimated by the relaxed solve
    pub window_margin: f64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            accepted_tolerance: 1e-4,
            price_cap: None,
            apply_ramping: true,
            apply_scheduled_stop: true,
            apply_mic: true,
            split: SplitMode::default(),
            transit_zones: Vec::new(),
            pun_imbalance: (-1.0, 5.0),
            expansion_step: 1e-3,
            expansion_bits: 24,
            pun_epsilon: 1e-8,
            window_margin: 1.0,
        }
    }
}

impl MarketConfig {
    /// The (min, max) price cap of a day: the configured override, or else the
    /// widest range admitted by any zone
    pub fn price_cap(&self, zones: &[Zone]) -> (f64, f64) {
        if let Some(cap) = self.price_cap {
            return cap;
        }
        let lower = zones.iter().map(|z| z.min_price).fold(f64::INFINITY, f64::min);
        let upper = zones.iter().map(|z| z.max_price).fold(f64::NEG_INFINITY, f64::max);
        if lower.is_finite() && upper.is_finite() {
            (lower, upper)
        } else {
            (0.0, 3000.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(id: u32, min_price: f64, max_price: f64) -> Zone {
        Zone {
            id: ZoneId(id),
            name: format!("Z{id}"),
            min_price,
            max_price,
        }
    }

    #[test]
    fn cap_spans_all_zones() {
        let config = MarketConfig::default();
        let zones = [zone(1, 0.0, 3000.0), zone(2, -500.0, 4000.0)];
        assert_eq!(config.price_cap(&zones), (-500.0, 4000.0));
        assert_eq!(config.price_cap(&[]), (0.0, 3000.0));
    }

    #[test]
    fn override_wins() {
        let config = MarketConfig {
            price_cap: Some((0.0, 100.0)),
            ..Default::default()
        };
        assert_eq!(config.price_cap(&[zone(1, -10.0, 10.0)]), (0.0, 100.0));
    }

    #[test]
    fn partial_config_deserializes() {
        let config: MarketConfig =
            serde_json::from_str(r#"{"apply_mic": false, "split": "direct"}"#).expect("valid");
        assert!(!config.apply_mic);
        assert_eq!(config.split, SplitMode::Direct);
        assert_eq!(config.expansion_bits, 24);
    }
}
