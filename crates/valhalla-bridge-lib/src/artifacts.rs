//! Derived engine artifacts: configuration, timezone and admin databases,
//! compiled tiles and the tile extract.
//!
//! Every step shells out to one of the engine's build tools through a
//! [`CommandRunner`]. The configuration and timezone database depend only on
//! the engine install and are generated once; everything derived from the
//! dataset is rebuilt according to the [`RebuildPolicy`].

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::command::{describe, CommandOutput, CommandRunner, EngineCommand};
use crate::error::{Error, Result};
use crate::layout::CacheLayout;
use crate::progress::CancellationToken;
use crate::provision::write_atomically;

pub const BUILD_CONFIG_TOOL: &str = "valhalla_build_config";
pub const BUILD_TIMEZONES_TOOL: &str = "valhalla_build_timezones";
pub const BUILD_ADMINS_TOOL: &str = "valhalla_build_admins";
pub const BUILD_TILES_TOOL: &str = "valhalla_build_tiles";
pub const BUILD_EXTRACT_TOOL: &str = "valhalla_build_extract";

/// When dataset-derived artifacts are rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebuildPolicy {
    /// Rebuild admins, tiles and extract for every query.
    #[default]
    Always,
    /// Skip the rebuild when the exported dataset is byte-identical to the
    /// one the current tiles were built from.
    WhenDatasetChanged,
}

/// Whether [`build_artifacts`] ran the dataset steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactBuild {
    Rebuilt,
    Reused,
}

/// Generate `valhalla.json` unless it already exists. Returns its path.
pub fn ensure_engine_config(layout: &CacheLayout, runner: &dyn CommandRunner) -> Result<PathBuf> {
    let config_file = layout.config_file();
    if config_file.is_file() {
        return Ok(config_file);
    }

    fs::create_dir_all(layout.tiles_dir())?;
    let command = engine_command(layout, BUILD_CONFIG_TOOL)
        .arg("--mjolnir-tile-dir")
        .arg(layout.tiles_dir())
        .arg("--mjolnir-tile-extract")
        .arg(layout.tile_extract())
        .arg("--mjolnir-timezone")
        .arg(layout.timezone_db())
        .arg("--mjolnir-admin")
        .arg(layout.admin_db());
    let output = run_step(runner, &command)?;

    serde_json::from_slice::<serde_json::Value>(&output.stdout).map_err(|err| {
        Error::InvalidEngineConfig {
            path: config_file.clone(),
            message: err.to_string(),
        }
    })?;
    write_atomically(&config_file, &output.stdout)?;
    info!(path = %config_file.display(), "generated engine configuration");
    Ok(config_file)
}

/// Bring every artifact the engine needs for `dataset` up to date.
///
/// `config_file` is the engine configuration returned by
/// [`ensure_engine_config`].
pub fn build_artifacts(
    layout: &CacheLayout,
    runner: &dyn CommandRunner,
    config_file: &Path,
    dataset: &Path,
    policy: RebuildPolicy,
    cancel: &CancellationToken,
) -> Result<ArtifactBuild> {
    if !dataset.is_file() {
        return Err(Error::DatasetNotFound {
            path: dataset.to_path_buf(),
        });
    }

    cancel.check()?;
    ensure_timezones(layout, runner)?;

    let fingerprint = dataset_fingerprint(dataset)?;
    if policy == RebuildPolicy::WhenDatasetChanged
        && layout.tile_extract().is_file()
        && recorded_fingerprint(layout).as_deref() == Some(fingerprint.as_str())
    {
        info!(
            dataset = %dataset.display(),
            fingerprint = %fingerprint,
            "dataset unchanged, reusing compiled tiles"
        );
        return Ok(ArtifactBuild::Reused);
    }

    let steps = [
        engine_command(layout, BUILD_ADMINS_TOOL)
            .arg("--config")
            .arg(config_file)
            .arg(dataset),
        engine_command(layout, BUILD_TILES_TOOL)
            .arg("--config")
            .arg(config_file)
            .arg(dataset),
        engine_command(layout, BUILD_EXTRACT_TOOL)
            .arg("--config")
            .arg(config_file)
            .arg("--overwrite"),
    ];
    for step in &steps {
        cancel.check()?;
        run_step(runner, step)?;
    }

    write_atomically(&layout.dataset_fingerprint(), fingerprint.as_bytes())?;
    info!(dataset = %dataset.display(), "engine tiles rebuilt");
    Ok(ArtifactBuild::Rebuilt)
}

fn ensure_timezones(layout: &CacheLayout, runner: &dyn CommandRunner) -> Result<()> {
    let timezone_db = layout.timezone_db();
    if timezone_db.is_file() {
        return Ok(());
    }

    let output = run_step(runner, &engine_command(layout, BUILD_TIMEZONES_TOOL))?;
    write_atomically(&timezone_db, &output.stdout)?;
    debug!(path = %timezone_db.display(), bytes = output.stdout.len(), "timezone database written");
    Ok(())
}

/// Command for an engine tool run from the routing directory.
pub(crate) fn engine_command(layout: &CacheLayout, tool: &str) -> EngineCommand {
    EngineCommand::new(layout.executable(tool)).current_dir(layout.routing_dir())
}

fn run_step(runner: &dyn CommandRunner, command: &EngineCommand) -> Result<CommandOutput> {
    let step = command.tool_name();
    info!(step = %step, "running engine build step");
    debug!(command = %describe(command));

    let output = runner.run(command)?;
    if !output.success() {
        return Err(Error::BuildStepFailed {
            step,
            status: output.status().to_string(),
        });
    }
    Ok(output)
}

/// Hex SHA-256 of the dataset file.
pub fn dataset_fingerprint(dataset: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut file = File::open(dataset)?;
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn recorded_fingerprint(layout: &CacheLayout) -> Option<String> {
    fs::read_to_string(layout.dataset_fingerprint())
        .ok()
        .map(|contents| contents.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fingerprint_is_sha256_hex() {
        let dir = tempdir().unwrap();
        let dataset = dir.path().join("empty.osm.pbf");
        fs::write(&dataset, b"").unwrap();
        assert_eq!(
            dataset_fingerprint(&dataset).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
