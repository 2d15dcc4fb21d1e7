use std::fmt;

use serde::{Deserialize, Serialize};

/// A measured quantity recorded for every sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Voltage,
    Position,
    Speed,
    SupplyCurrent,
    StatorCurrent,
}

impl Metric {
    pub const fn column(self) -> &'static str {
        match self {
            Metric::Voltage => "voltage",
            Metric::Position => "position",
            Metric::Speed => "speed",
            Metric::SupplyCurrent => "supply_current",
            Metric::StatorCurrent => "stator_current",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Metric::Voltage => "Voltage (V)",
            Metric::Position => "Position",
            Metric::Speed => "Speed",
            Metric::SupplyCurrent => "Supply Current (A)",
            Metric::StatorCurrent => "Stator Current (A)",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}
