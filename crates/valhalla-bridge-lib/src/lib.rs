//! Valhalla routing engine integration.
//!
//! This crate installs a local Valhalla build into a cache directory, derives
//! the engine's artifacts from an exported map dataset, runs route queries
//! through the engine executable and parses the replies into a [`Trip`].
//! Front-ends (the CLI, editor plugins) should go through [`RouteClient`] and
//! [`Provisioner`] instead of driving the engine tools themselves.
//!

#![deny(warnings)]

pub mod artifacts;
pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod layout;
pub mod model;
pub mod polyline;
pub mod progress;
pub mod provision;
pub mod release;
pub mod response;

pub use artifacts::{build_artifacts, ensure_engine_config, ArtifactBuild, RebuildPolicy};
pub use client::{
    build_request, Costing, DatasetExporter, PathExporter, RouteClient, RouteOptions, Units,
};
pub use command::{CommandOutput, CommandRunner, EngineCommand, SystemCommandRunner};
pub use config::{EngineConfig, EngineRelease, Platform};
pub use error::{Error, ErrorKind, Result};
pub use layout::CacheLayout;
pub use model::{
    Coordinate, Leg, Location, LocationType, Maneuver, ManeuverType, RouteOutcome, Side, Summary,
    Trip,
};
pub use progress::{CancellationToken, LogProgress, NoProgress, ProgressSink};
pub use provision::{EngineState, Provisioner, SetupOutcome};
pub use release::{default_archive_source, ArchiveSource, HttpArchiveSource, LocalArchiveSource};
pub use response::parse_route_response;
