/// Implementation over the MILP engines reachable through `good_lp`
#[cfg(any(feature = "microlp", feature = "highs"))]
pub mod milp;

/// Implementation delegating to a remote solve service
#[cfg(feature = "remote")]
pub mod remote;
