macro_rules! id_wrapper {
    ($struct: ident, $doc: literal) => {
        #[doc = $doc]
        #[derive(Debug, Default, Hash, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
        #[cfg_attr(
            feature = "serde",
            derive(serde::Serialize, serde::Deserialize),
            serde(transparent)
        )]
        #[repr(transparent)]
        pub struct $struct(pub u32);

        impl From<u32> for $struct {
            fn from(value: u32) -> Self {
                Self(value)
            }
        }

        impl From<$struct> for u32 {
            fn from(value: $struct) -> Self {
                value.0
            }
        }

        impl std::fmt::Display for $struct {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_wrapper!(DayId, "Identifies a trading day");
id_wrapper!(ZoneId, "Identifies a bidding zone");
id_wrapper!(ConnectionId, "Identifies an inter-zone connection");
id_wrapper!(CurveId, "Identifies a plain step curve");
id_wrapper!(BlockId, "Identifies a block bid");
id_wrapper!(ComplexId, "Identifies a complex order");
id_wrapper!(PunId, "Identifies a national-price (PUN) order");
