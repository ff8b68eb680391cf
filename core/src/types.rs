//! Shared primitive types used across the host.

/// One iteration of the host loop.
pub type Tick = u64;

/// Counts engine instances built by the host. Generation 0 is the instance
/// built at start-up; every successful reset bumps it by one.
pub type Generation = u64;

/// Identifier attached to every engine instance for log correlation.
pub type RunId = String;
