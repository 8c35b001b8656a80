//! Argument types shared by the CLI commands.

use clap::ValueEnum;
use valhalla_bridge_lib::{Coordinate, Costing, RebuildPolicy, Units};

/// Parse a `LAT,LON` pair such as `39.10,-77.20`.
pub fn parse_coordinate(raw: &str) -> Result<Coordinate, String> {
    let (lat, lon) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON but got '{raw}'"))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|_| format!("invalid latitude '{}' in '{raw}'", lat.trim()))?;
    let lon: f64 = lon
        .trim()
        .parse()
        .map_err(|_| format!("invalid longitude '{}' in '{raw}'", lon.trim()))?;
    Coordinate::new(lat, lon).map_err(|err| err.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CostingArg {
    #[default]
    Auto,
    Bicycle,
    Pedestrian,
    Truck,
}

impl From<CostingArg> for Costing {
    fn from(value: CostingArg) -> Self {
        match value {
            CostingArg::Auto => Costing::Auto,
            CostingArg::Bicycle => Costing::Bicycle,
            CostingArg::Pedestrian => Costing::Pedestrian,
            CostingArg::Truck => Costing::Truck,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum UnitsArg {
    #[default]
    Miles,
    Kilometers,
}

impl From<UnitsArg> for Units {
    fn from(value: UnitsArg) -> Self {
        match value {
            UnitsArg::Miles => Units::Miles,
            UnitsArg::Kilometers => Units::Kilometers,
        }
    }
}

/// When to rebuild tiles from the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RebuildArg {
    /// On every route request.
    #[default]
    Always,
    /// Only when the dataset file changed since the last build.
    WhenChanged,
}

impl From<RebuildArg> for RebuildPolicy {
    fn from(value: RebuildArg) -> Self {
        match value {
            RebuildArg::Always => RebuildPolicy::Always,
            RebuildArg::WhenChanged => RebuildPolicy::WhenDatasetChanged,
        }
    }
}
