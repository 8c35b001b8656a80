//! Issuing route queries against the local engine.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::artifacts::{build_artifacts, engine_command, ensure_engine_config, RebuildPolicy};
use crate::command::CommandRunner;
use crate::error::{Error, Result};
use crate::model::{Location, RouteOutcome};
use crate::progress::{CancellationToken, ProgressSink};
use crate::provision::{directory_lock, Provisioner};
use crate::response::parse_route_response;

pub const SERVICE_TOOL: &str = "valhalla_service";

/// Turns a host dataset into an engine interchange file on disk.
pub trait DatasetExporter<S: ?Sized> {
    fn export(&self, source: &S) -> Result<PathBuf>;
}

/// Exporter for datasets that already are interchange files, such as
/// `.osm.pbf` extracts. The file is used in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathExporter;

impl DatasetExporter<Path> for PathExporter {
    fn export(&self, source: &Path) -> Result<PathBuf> {
        if source.is_file() {
            Ok(source.to_path_buf())
        } else {
            Err(Error::DatasetNotFound {
                path: source.to_path_buf(),
            })
        }
    }
}

/// Travel mode the engine costs the route for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Costing {
    #[default]
    Auto,
    Bicycle,
    Pedestrian,
    Truck,
}

impl fmt::Display for Costing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Costing::Auto => "auto",
            Costing::Bicycle => "bicycle",
            Costing::Pedestrian => "pedestrian",
            Costing::Truck => "truck",
        };
        f.write_str(name)
    }
}

/// Distance units used in maneuver lengths and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Units {
    #[default]
    Miles,
    Kilometers,
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Units::Miles => f.write_str("miles"),
            Units::Kilometers => f.write_str("kilometers"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouteOptions {
    pub costing: Costing,
    pub units: Units,
}

#[derive(Serialize)]
struct DirectionsOptions {
    units: Units,
}

#[derive(Serialize)]
struct RouteRequest<'a> {
    costing: Costing,
    directions_options: DirectionsOptions,
    locations: &'a [Location],
}

/// Serialise the engine's `route` request body.
pub fn build_request(locations: &[Location], options: &RouteOptions) -> Result<String> {
    let request = RouteRequest {
        costing: options.costing,
        directions_options: DirectionsOptions {
            units: options.units,
        },
        locations,
    };
    Ok(serde_json::to_string(&request)?)
}

/// Computes routes with the locally installed engine, installing it first
/// when needed.
pub struct RouteClient {
    provisioner: Provisioner,
    runner: Arc<dyn CommandRunner>,
    options: RouteOptions,
    rebuild: RebuildPolicy,
}

impl fmt::Debug for RouteClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteClient")
            .field("provisioner", &self.provisioner)
            .field("options", &self.options)
            .field("rebuild", &self.rebuild)
            .finish_non_exhaustive()
    }
}

impl RouteClient {
    pub fn new(provisioner: Provisioner, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            provisioner,
            runner,
            options: RouteOptions::default(),
            rebuild: RebuildPolicy::default(),
        }
    }

    pub fn with_options(mut self, options: RouteOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_rebuild_policy(mut self, rebuild: RebuildPolicy) -> Self {
        self.rebuild = rebuild;
        self
    }

    pub fn provisioner(&self) -> &Provisioner {
        &self.provisioner
    }

    pub fn options(&self) -> &RouteOptions {
        &self.options
    }

    /// Route through `locations` in order over the dataset `source`.
    ///
    /// A reply saying no route exists is returned as
    /// [`RouteOutcome::NoRoute`], not as an error.
    pub fn generate_route<S: ?Sized>(
        &self,
        exporter: &dyn DatasetExporter<S>,
        source: &S,
        locations: &[Location],
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RouteOutcome> {
        validate_locations(locations)?;

        if self.provisioner.needs_setup() {
            self.provisioner.perform_setup(progress, cancel)?;
        }

        let config = self.provisioner.config();
        let layout = config.layout();
        let lock = directory_lock(&config.cache_root);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let config_file = ensure_engine_config(&layout, self.runner.as_ref())?;
        let dataset = exporter.export(source)?;
        build_artifacts(
            &layout,
            self.runner.as_ref(),
            &config_file,
            &dataset,
            self.rebuild,
            cancel,
        )?;
        cancel.check()?;

        let request = build_request(locations, &self.options)?;
        debug!(%request, "route request");
        info!(
            locations = locations.len(),
            costing = %self.options.costing,
            units = %self.options.units,
            "requesting route"
        );

        let command = engine_command(&layout, SERVICE_TOOL)
            .arg(&config_file)
            .arg("route")
            .arg(&request);
        let output = self.runner.run(&command)?;

        let reply = String::from_utf8_lossy(&output.stdout);
        if !output.success() && reply.trim().is_empty() {
            return Err(Error::EngineFailed {
                status: output.status().to_string(),
                stderr: output.stderr_tail,
            });
        }

        let outcome = parse_route_response(&reply)?;
        match &outcome {
            RouteOutcome::Trip(trip) => info!(
                legs = trip.legs.len(),
                time = trip.summary.time,
                length = trip.summary.length,
                "route computed"
            ),
            RouteOutcome::NoRoute { message } => info!(%message, "engine found no route"),
        }
        Ok(outcome)
    }
}

fn validate_locations(locations: &[Location]) -> Result<()> {
    if locations.len() < 2 {
        return Err(Error::TooFewLocations {
            count: locations.len(),
        });
    }
    for location in locations {
        if !location.coordinate().is_valid() {
            return Err(Error::InvalidCoordinate {
                lat: location.lat,
                lon: location.lon,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Coordinate, LocationType};
    use serde_json::json;

    fn location(lat: f64, lon: f64) -> Location {
        Location::new(Coordinate::new(lat, lon).unwrap())
    }

    #[test]
    fn default_request_matches_engine_contract() {
        let request = build_request(
            &[location(39.1, -77.2), location(39.2, -77.3)],
            &RouteOptions::default(),
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "costing": "auto",
                "directions_options": {"units": "miles"},
                "locations": [
                    {"lat": 39.1, "lon": -77.2},
                    {"lat": 39.2, "lon": -77.3}
                ]
            })
        );
    }

    #[test]
    fn request_carries_hints_and_options() {
        let options = RouteOptions {
            costing: Costing::Bicycle,
            units: Units::Kilometers,
        };
        let locations = [
            location(1.0, 2.0).with_type(LocationType::Via),
            location(3.0, 4.0).with_radius(25.0),
        ];
        let value: serde_json::Value =
            serde_json::from_str(&build_request(&locations, &options).unwrap()).unwrap();
        assert_eq!(value["costing"], "bicycle");
        assert_eq!(value["directions_options"]["units"], "kilometers");
        assert_eq!(value["locations"][0]["type"], "via");
        assert_eq!(value["locations"][1]["radius"], 25.0);
    }

    #[test]
    fn route_needs_two_valid_locations() {
        assert!(matches!(
            validate_locations(&[location(0.0, 0.0)]),
            Err(Error::TooFewLocations { count: 1 })
        ));

        let mut bad = location(0.0, 0.0);
        bad.lat = 91.0;
        assert!(matches!(
            validate_locations(&[location(0.0, 0.0), bad]),
            Err(Error::InvalidCoordinate { .. })
        ));
    }
}
