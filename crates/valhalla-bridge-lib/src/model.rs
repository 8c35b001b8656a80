//! Trip model produced from routing engine replies.
//!
//! Values here are plain data: they are built once by the response parser (or
//! by callers assembling a request) and then only read.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    /// Create a coordinate, rejecting out-of-range or non-finite values.
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        let coordinate = Self { lat, lon };
        if coordinate.is_valid() {
            Ok(coordinate)
        } else {
            Err(Error::InvalidCoordinate { lat, lon })
        }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lon)
    }
}

/// How the engine treats a location along the route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    /// Stop; starts a new leg and allows u-turns.
    Break,
    /// Pass through without starting a new leg.
    Through,
    /// Pass through, u-turns allowed.
    Via,
    /// Starts a new leg but u-turns are not allowed.
    BreakThrough,
}

/// Side of the street the location should be approached from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Same,
    Opposite,
    Either,
}

/// Road classification used by the engine's candidate filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoadClass {
    Motorway,
    Trunk,
    Primary,
    Secondary,
    Tertiary,
    Unclassified,
    Residential,
    ServiceOther,
}

/// Filters applied when snapping a location to the road network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_tunnel: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_bridge: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_ramp: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_closures: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_road_class: Option<RoadClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_road_class: Option<RoadClass>,
}

/// A routing waypoint: a position plus optional routing hints and display
/// metadata.
///
/// Unset hints are left out of engine requests so the engine applies its own
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub location_type: Option<LocationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading_tolerance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub way_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_reachability: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank_candidates: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_side: Option<Side>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_lon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_cutoff: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_snap_tolerance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_side_tolerance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_side_max_distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_side_cutoff: Option<RoadClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_filter: Option<SearchFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_layer: Option<i32>,

    // Display metadata, echoed back by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting: Option<f64>,
}

impl Location {
    /// A location with no routing hints.
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            lat: coordinate.lat,
            lon: coordinate.lon,
            location_type: None,
            heading: None,
            heading_tolerance: None,
            street: None,
            way_id: None,
            minimum_reachability: None,
            radius: None,
            rank_candidates: None,
            preferred_side: None,
            display_lat: None,
            display_lon: None,
            search_cutoff: None,
            node_snap_tolerance: None,
            street_side_tolerance: None,
            street_side_max_distance: None,
            street_side_cutoff: None,
            search_filter: None,
            preferred_layer: None,
            name: None,
            city: None,
            state: None,
            postal_code: None,
            country: None,
            phone: None,
            url: None,
            waiting: None,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            lat: self.lat,
            lon: self.lon,
        }
    }

    pub fn with_type(mut self, location_type: LocationType) -> Self {
        self.location_type = Some(location_type);
        self
    }

    /// Preferred heading in degrees from north, with an allowed deviation.
    pub fn with_heading(mut self, heading: f64, tolerance: f64) -> Self {
        self.heading = Some(heading);
        self.heading_tolerance = Some(tolerance);
        self
    }

    /// Search radius in meters.
    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = Some(radius);
        self
    }

    pub fn with_preferred_side(mut self, side: Side) -> Self {
        self.preferred_side = Some(side);
        self
    }

    pub fn with_minimum_reachability(mut self, nodes: u32) -> Self {
        self.minimum_reachability = Some(nodes);
        self
    }

    pub fn with_search_filter(mut self, filter: SearchFilter) -> Self {
        self.search_filter = Some(filter);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl From<Coordinate> for Location {
    fn from(coordinate: Coordinate) -> Self {
        Location::new(coordinate)
    }
}

/// Kind of a maneuver, in the engine's ordinal order.
///
/// Ordinals the engine may add in future versions surface as
/// [`ManeuverType::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManeuverType {
    None,
    Start,
    StartRight,
    StartLeft,
    Destination,
    DestinationRight,
    DestinationLeft,
    Becomes,
    Continue,
    SlightRight,
    Right,
    SharpRight,
    UturnRight,
    UturnLeft,
    SharpLeft,
    Left,
    SlightLeft,
    RampStraight,
    RampRight,
    RampLeft,
    ExitRight,
    ExitLeft,
    StayStraight,
    StayRight,
    StayLeft,
    Merge,
    RoundaboutEnter,
    RoundaboutExit,
    FerryEnter,
    FerryExit,
    Transit,
    TransitTransfer,
    TransitRemainOn,
    TransitConnectionStart,
    TransitConnectionTransfer,
    TransitConnectionDestination,
    PostTransitConnectionDestination,
    MergeRight,
    MergeLeft,
    ElevatorEnter,
    StepsEnter,
    EscalatorEnter,
    BuildingEnter,
    BuildingExit,
    Unknown(u32),
}

impl ManeuverType {
    const KNOWN: [ManeuverType; 44] = [
        ManeuverType::None,
        ManeuverType::Start,
        ManeuverType::StartRight,
        ManeuverType::StartLeft,
        ManeuverType::Destination,
        ManeuverType::DestinationRight,
        ManeuverType::DestinationLeft,
        ManeuverType::Becomes,
        ManeuverType::Continue,
        ManeuverType::SlightRight,
        ManeuverType::Right,
        ManeuverType::SharpRight,
        ManeuverType::UturnRight,
        ManeuverType::UturnLeft,
        ManeuverType::SharpLeft,
        ManeuverType::Left,
        ManeuverType::SlightLeft,
        ManeuverType::RampStraight,
        ManeuverType::RampRight,
        ManeuverType::RampLeft,
        ManeuverType::ExitRight,
        ManeuverType::ExitLeft,
        ManeuverType::StayStraight,
        ManeuverType::StayRight,
        ManeuverType::StayLeft,
        ManeuverType::Merge,
        ManeuverType::RoundaboutEnter,
        ManeuverType::RoundaboutExit,
        ManeuverType::FerryEnter,
        ManeuverType::FerryExit,
        ManeuverType::Transit,
        ManeuverType::TransitTransfer,
        ManeuverType::TransitRemainOn,
        ManeuverType::TransitConnectionStart,
        ManeuverType::TransitConnectionTransfer,
        ManeuverType::TransitConnectionDestination,
        ManeuverType::PostTransitConnectionDestination,
        ManeuverType::MergeRight,
        ManeuverType::MergeLeft,
        ManeuverType::ElevatorEnter,
        ManeuverType::StepsEnter,
        ManeuverType::EscalatorEnter,
        ManeuverType::BuildingEnter,
        ManeuverType::BuildingExit,
    ];

    /// Map a wire ordinal to a maneuver type.
    pub fn from_ordinal(ordinal: u32) -> Self {
        Self::KNOWN
            .get(ordinal as usize)
            .copied()
            .unwrap_or(ManeuverType::Unknown(ordinal))
    }

    pub fn ordinal(&self) -> u32 {
        match self {
            ManeuverType::Unknown(ordinal) => *ordinal,
            known => Self::KNOWN
                .iter()
                .position(|candidate| candidate == known)
                .map(|index| index as u32)
                .unwrap_or_default(),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ManeuverType::Unknown(_))
    }
}

/// One navigation instruction within a leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Maneuver {
    pub maneuver_type: ManeuverType,
    pub instruction: String,
    pub verbal_transition_instruction: String,
    pub verbal_pre_transition_instruction: String,
    pub verbal_post_transition_instruction: String,
    /// Seconds.
    pub time: f64,
    /// In the requested units.
    pub length: f64,
    pub cost: f64,
    /// First point of the leg shape covered by this maneuver.
    pub begin_shape_index: usize,
    /// Last point (inclusive) of the leg shape covered by this maneuver.
    pub end_shape_index: usize,
    pub verbal_multi_cue: bool,
    pub travel_mode: String,
    pub travel_type: String,
}

/// Aggregate flags and totals for a trip or a leg.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub has_time_restrictions: bool,
    pub has_toll: bool,
    pub has_highway: bool,
    pub has_ferry: bool,
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
    pub time: f64,
    pub length: f64,
    pub cost: f64,
}

impl Summary {
    /// South-west and north-east corners of the bounding box.
    pub fn bounds(&self) -> (Coordinate, Coordinate) {
        (
            Coordinate {
                lat: self.min_lat,
                lon: self.min_lon,
            },
            Coordinate {
                lat: self.max_lat,
                lon: self.max_lon,
            },
        )
    }
}

/// Route segment between two consecutive break locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub maneuvers: Vec<Maneuver>,
    pub summary: Summary,
    /// Decoded geometry as alternating latitude/longitude values.
    pub shape: Vec<f64>,
}

impl Leg {
    /// Number of points in the decoded shape.
    pub fn point_count(&self) -> usize {
        self.shape.len() / 2
    }

    pub fn points(&self) -> impl Iterator<Item = Coordinate> + '_ {
        self.shape.chunks_exact(2).map(|pair| Coordinate {
            lat: pair[0],
            lon: pair[1],
        })
    }

    /// Shape values (alternating lat/lon) covered by `maneuver`.
    pub fn maneuver_shape(&self, maneuver: &Maneuver) -> Option<&[f64]> {
        let start = maneuver.begin_shape_index.checked_mul(2)?;
        let end = maneuver.end_shape_index.checked_add(1)?.checked_mul(2)?;
        self.shape.get(start..end)
    }
}

/// A complete route as computed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    /// Locations as resolved by the engine. Entries it echoed in an
    /// unrecognised shape are omitted.
    pub locations: Vec<Location>,
    pub legs: Vec<Leg>,
    pub summary: Summary,
}

impl Trip {
    pub fn maneuvers(&self) -> impl Iterator<Item = &Maneuver> + '_ {
        self.legs.iter().flat_map(|leg| leg.maneuvers.iter())
    }
}

/// Result of a successful exchange with the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RouteOutcome {
    /// The engine found a route.
    Trip(Trip),
    /// The engine could not connect the locations.
    NoRoute { message: String },
}

impl RouteOutcome {
    pub fn trip(&self) -> Option<&Trip> {
        match self {
            RouteOutcome::Trip(trip) => Some(trip),
            RouteOutcome::NoRoute { .. } => None,
        }
    }

    pub fn into_trip(self) -> Option<Trip> {
        match self {
            RouteOutcome::Trip(trip) => Some(trip),
            RouteOutcome::NoRoute { .. } => None,
        }
    }

    pub fn is_no_route(&self) -> bool {
        matches!(self, RouteOutcome::NoRoute { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_bounds_are_enforced() {
        assert!(Coordinate::new(90.0, -180.0).is_ok());
        assert!(Coordinate::new(90.1, 0.0).is_err());
        assert!(Coordinate::new(0.0, 180.5).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn maneuver_ordinals_round_trip() {
        assert_eq!(ManeuverType::from_ordinal(0), ManeuverType::None);
        assert_eq!(ManeuverType::from_ordinal(10), ManeuverType::Right);
        assert_eq!(ManeuverType::from_ordinal(43), ManeuverType::BuildingExit);
        assert_eq!(ManeuverType::from_ordinal(44), ManeuverType::Unknown(44));
        for ordinal in 0..50 {
            assert_eq!(ManeuverType::from_ordinal(ordinal).ordinal(), ordinal);
        }
    }

    #[test]
    fn bare_location_serializes_to_lat_lon_only() {
        let location = Location::new(Coordinate { lat: 1.5, lon: 2.5 });
        let json = serde_json::to_value(&location).expect("serialize");
        assert_eq!(json, serde_json::json!({ "lat": 1.5, "lon": 2.5 }));
    }

    #[test]
    fn routing_hints_use_engine_names() {
        let location = Location::new(Coordinate { lat: 1.0, lon: 2.0 })
            .with_type(LocationType::BreakThrough)
            .with_preferred_side(Side::Opposite);
        let json = serde_json::to_value(&location).expect("serialize");
        assert_eq!(json["type"], "break_through");
        assert_eq!(json["preferred_side"], "opposite");
    }
}
