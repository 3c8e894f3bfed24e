use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// A single metered reading: numeric magnitude plus unit.
///
/// Values carrying the metric kilo prefix are normalised on parse: the
/// magnitude is multiplied by 1000 and the prefix is stripped from the
/// unit, so `1234.567*kWh` is stored as `1234567.0` / `"Wh"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub value: f64,
    pub unit: String,
}

/// Timestamp as transmitted by dutch smart meters: local wall-clock time
/// in the CET/CEST zone, with the UTC offset taken from the telegram's
/// DST indicator rather than computed from calendar rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timestamp(pub DateTime<FixedOffset>);

/// Gas meter reading: the gas meter samples independently from the
/// electricity meter, so its value travels with its own capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasMeterValue {
    pub timestamp: Timestamp,
    pub value: Value,
}
