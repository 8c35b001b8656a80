//! On-disk layout of the engine install and its derived artifacts.
//!
//! ```text
//! <cache_root>/routing/
//!     valhalla.json
//!     valhalla_tiles/        timezones.sqlite, admins.sqlite, compiled tiles
//!     valhalla_tiles.tar
//!     bin/valhalla/          version, bin/<executables>
//! ```

use std::path::{Path, PathBuf};

use crate::config::Platform;

const ROUTING_DIR: &str = "routing";
const CONFIG_FILE: &str = "valhalla.json";
const TILES_DIR: &str = "valhalla_tiles";
const TILE_EXTRACT: &str = "valhalla_tiles.tar";
const TIMEZONE_DB: &str = "timezones.sqlite";
const ADMIN_DB: &str = "admins.sqlite";
const FINGERPRINT_FILE: &str = "dataset.sha256";
const VERSION_MARKER: &str = "version";

/// Resolved paths under one cache root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    routing_dir: PathBuf,
    platform: Platform,
}

impl CacheLayout {
    pub fn new(cache_root: &Path, platform: Platform) -> Self {
        Self {
            routing_dir: cache_root.join(ROUTING_DIR),
            platform,
        }
    }

    pub fn routing_dir(&self) -> &Path {
        &self.routing_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.routing_dir.join(CONFIG_FILE)
    }

    pub fn tiles_dir(&self) -> PathBuf {
        self.routing_dir.join(TILES_DIR)
    }

    pub fn tile_extract(&self) -> PathBuf {
        self.routing_dir.join(TILE_EXTRACT)
    }

    pub fn timezone_db(&self) -> PathBuf {
        self.tiles_dir().join(TIMEZONE_DB)
    }

    pub fn admin_db(&self) -> PathBuf {
        self.tiles_dir().join(ADMIN_DB)
    }

    /// Fingerprint of the dataset the current tiles were built from.
    pub fn dataset_fingerprint(&self) -> PathBuf {
        self.tiles_dir().join(FINGERPRINT_FILE)
    }

    /// Directory the release archive is unpacked into.
    pub fn install_dir(&self) -> PathBuf {
        self.routing_dir.join("bin").join("valhalla")
    }

    pub fn version_marker(&self) -> PathBuf {
        self.install_dir().join(VERSION_MARKER)
    }

    pub fn executable_dir(&self) -> PathBuf {
        if self.platform.has_executable_dir() {
            self.install_dir().join("bin")
        } else {
            self.install_dir()
        }
    }

    /// Full path of an engine tool such as `valhalla_service`.
    pub fn executable(&self, tool: &str) -> PathBuf {
        self.executable_dir()
            .join(self.platform.executable_name(tool))
    }
}
