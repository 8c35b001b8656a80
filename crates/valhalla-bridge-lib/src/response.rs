//! Translation of routing engine replies into the trip model.
//!
//! Everything that knows about the engine's JSON field names lives in this
//! module. The `Wire*` types mirror the reply shape and are converted into the
//! public model once validated.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::{Leg, Location, Maneuver, ManeuverType, RouteOutcome, Summary, Trip};
use crate::polyline::{self, PRECISION_6};

/// Status reported by the engine for a successful request.
pub const STATUS_SUCCESS: i64 = 200;

/// Engine error code meaning the locations could not be connected.
pub const ERROR_NO_ROUTE: i64 = 442;

const DEFAULT_NO_ROUTE_MESSAGE: &str = "no route found";

/// Parse a raw engine reply.
///
/// A "no route" reply is a regular [`RouteOutcome::NoRoute`]; any other
/// non-success status is an [`Error::EngineStatus`] carrying the raw reply.
pub fn parse_route_response(raw: &str) -> Result<RouteOutcome> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|err| Error::malformed(format!("reply is not JSON: {err}"), raw))?;
    if !value.is_object() {
        return Err(Error::malformed("reply is not a JSON object", raw));
    }

    let error_code = value.get("error_code").and_then(Value::as_i64);
    let status_code = value.get("status_code").and_then(Value::as_i64);

    if error_code == Some(ERROR_NO_ROUTE) || status_code == Some(ERROR_NO_ROUTE) {
        let message = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_NO_ROUTE_MESSAGE)
            .to_string();
        debug!(%message, "engine found no route");
        return Ok(RouteOutcome::NoRoute { message });
    }

    if let Some(code) = error_code {
        return Err(Error::EngineStatus {
            code,
            raw: raw.to_string(),
        });
    }
    if let Some(code) = status_code.filter(|code| *code != STATUS_SUCCESS) {
        return Err(Error::EngineStatus {
            code,
            raw: raw.to_string(),
        });
    }

    let trip = value
        .get("trip")
        .ok_or_else(|| Error::malformed("reply has no trip", raw))?;
    let wire = WireTrip::deserialize(trip)
        .map_err(|err| Error::malformed(format!("invalid trip: {err}"), raw))?;

    let trip = wire.into_trip(raw)?;
    debug!(
        legs = trip.legs.len(),
        locations = trip.locations.len(),
        "parsed engine trip"
    );
    Ok(RouteOutcome::Trip(trip))
}

#[derive(Debug, Deserialize)]
struct WireTrip {
    #[serde(default)]
    locations: Vec<Value>,
    legs: Vec<WireLeg>,
    summary: WireSummary,
}

impl WireTrip {
    fn into_trip(self, raw: &str) -> Result<Trip> {
        let locations = self
            .locations
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| match Location::deserialize(&value) {
                Ok(location) => Some(location),
                Err(error) => {
                    debug!(index, %error, "dropping unrecognised location in engine reply");
                    None
                }
            })
            .collect();

        let legs = self
            .legs
            .into_iter()
            .enumerate()
            .map(|(index, leg)| leg.into_leg(index, raw))
            .collect::<Result<Vec<_>>>()?;

        Ok(Trip {
            locations,
            legs,
            summary: self.summary.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireLeg {
    #[serde(default)]
    maneuvers: Vec<WireManeuver>,
    shape: String,
    summary: WireSummary,
}

impl WireLeg {
    fn into_leg(self, index: usize, raw: &str) -> Result<Leg> {
        let shape = polyline::decode_with_precision(&self.shape, PRECISION_6)
            .map_err(|err| Error::malformed(format!("leg {index} shape: {err}"), raw))?;
        let point_count = shape.len() / 2;

        let maneuvers = self
            .maneuvers
            .into_iter()
            .enumerate()
            .map(|(position, maneuver)| {
                if maneuver.begin_shape_index > maneuver.end_shape_index
                    || maneuver.end_shape_index >= point_count
                {
                    return Err(Error::malformed(
                        format!(
                            "leg {index} maneuver {position} covers shape points {}..={} but the shape has {point_count}",
                            maneuver.begin_shape_index, maneuver.end_shape_index
                        ),
                        raw,
                    ));
                }
                Ok(Maneuver::from(maneuver))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Leg {
            maneuvers,
            summary: self.summary.into(),
            shape,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireManeuver {
    #[serde(rename = "type")]
    maneuver_type: u32,
    #[serde(default)]
    instruction: Option<String>,
    #[serde(default)]
    verbal_succinct_transition_instruction: Option<String>,
    #[serde(default)]
    verbal_pre_transition_instruction: Option<String>,
    #[serde(default)]
    verbal_post_transition_instruction: Option<String>,
    time: f64,
    length: f64,
    cost: f64,
    begin_shape_index: usize,
    end_shape_index: usize,
    #[serde(default)]
    verbal_multi_cue: Option<bool>,
    #[serde(default)]
    travel_mode: Option<String>,
    #[serde(default)]
    travel_type: Option<String>,
}

impl From<WireManeuver> for Maneuver {
    fn from(wire: WireManeuver) -> Self {
        let maneuver_type = ManeuverType::from_ordinal(wire.maneuver_type);
        if !maneuver_type.is_known() {
            warn!(
                ordinal = wire.maneuver_type,
                "engine reported an unknown maneuver type"
            );
        }

        Maneuver {
            maneuver_type,
            instruction: wire.instruction.unwrap_or_default(),
            verbal_transition_instruction: wire
                .verbal_succinct_transition_instruction
                .unwrap_or_default(),
            verbal_pre_transition_instruction: wire
                .verbal_pre_transition_instruction
                .unwrap_or_default(),
            verbal_post_transition_instruction: wire
                .verbal_post_transition_instruction
                .unwrap_or_default(),
            time: wire.time,
            length: wire.length,
            cost: wire.cost,
            begin_shape_index: wire.begin_shape_index,
            end_shape_index: wire.end_shape_index,
            verbal_multi_cue: wire.verbal_multi_cue.unwrap_or(false),
            travel_mode: wire.travel_mode.unwrap_or_default(),
            travel_type: wire.travel_type.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireSummary {
    #[serde(default)]
    has_time_restrictions: Option<bool>,
    #[serde(default)]
    has_toll: Option<bool>,
    #[serde(default)]
    has_highway: Option<bool>,
    #[serde(default)]
    has_ferry: Option<bool>,
    min_lat: f64,
    min_lon: f64,
    max_lat: f64,
    max_lon: f64,
    time: f64,
    length: f64,
    cost: f64,
}

impl From<WireSummary> for Summary {
    fn from(wire: WireSummary) -> Self {
        Summary {
            has_time_restrictions: wire.has_time_restrictions.unwrap_or(false),
            has_toll: wire.has_toll.unwrap_or(false),
            has_highway: wire.has_highway.unwrap_or(false),
            has_ferry: wire.has_ferry.unwrap_or(false),
            min_lat: wire.min_lat,
            min_lon: wire.min_lon,
            max_lat: wire.max_lat,
            max_lon: wire.max_lon,
            time: wire.time,
            length: wire.length,
            cost: wire.cost,
        }
    }
}
