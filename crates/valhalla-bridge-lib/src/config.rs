use std::env;
use std::fmt;
use std::path::PathBuf;

use directories::BaseDirs;

use crate::error::{Error, Result};
use crate::layout::CacheLayout;

pub const DEFAULT_ENGINE_NAME: &str = "valhalla";
pub const DEFAULT_ENGINE_VERSION: &str = "3.5.1";
pub const DEFAULT_RELEASE_BASE: &str = "https://github.com/JOSM/valhalla-static";

const CACHE_DIR_NAME: &str = "valhalla-bridge";
const CACHE_DIR_ENV: &str = "VALHALLA_BRIDGE_CACHE_DIR";
const ENGINE_VERSION_ENV: &str = "VALHALLA_BRIDGE_ENGINE_VERSION";
const RELEASE_BASE_ENV: &str = "VALHALLA_BRIDGE_RELEASE_BASE";

/// Operating system family the engine release is built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    Darwin,
    Linux,
    Windows,
    /// Any other OS; setup fails for these.
    Unsupported(String),
}

impl Platform {
    /// The platform this process is running on.
    pub fn current() -> Self {
        match env::consts::OS {
            "macos" => Platform::Darwin,
            "linux" => Platform::Linux,
            "windows" => Platform::Windows,
            other => Platform::Unsupported(other.to_string()),
        }
    }

    /// Tag used in release archive names.
    pub fn tag(&self) -> Result<&'static str> {
        match self {
            Platform::Darwin => Ok("Darwin"),
            Platform::Linux => Ok("Linux"),
            Platform::Windows => Ok("Windows"),
            Platform::Unsupported(os) => Err(Error::UnsupportedPlatform { os: os.clone() }),
        }
    }

    /// Whether release archives keep executables in a `bin/` subdirectory.
    ///
    /// Windows archives ship the executables next to their DLLs at the top of
    /// the archive instead.
    pub fn has_executable_dir(&self) -> bool {
        matches!(self, Platform::Darwin | Platform::Linux)
    }

    pub fn executable_name(&self, tool: &str) -> String {
        match self {
            Platform::Windows => format!("{tool}.exe"),
            _ => tool.to_string(),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Unsupported(os) => write!(f, "unsupported ({os})"),
            supported => f.write_str(supported.tag().unwrap_or("unknown")),
        }
    }
}

/// Which release channel the engine archive is fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineRelease {
    /// The release tagged `v<engine_version>`.
    #[default]
    Pinned,
    /// Whatever the release server currently marks as latest. The archive is
    /// still named after `engine_version`.
    Latest,
}

impl fmt::Display for EngineRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineRelease::Pinned => write!(f, "pinned"),
            EngineRelease::Latest => write!(f, "latest"),
        }
    }
}

/// Everything the provisioner and client need to know about where the engine
/// lives and which build to install.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub cache_root: PathBuf,
    pub engine_name: String,
    pub engine_version: String,
    pub release: EngineRelease,
    pub release_base: String,
    pub platform: Platform,
}

impl EngineConfig {
    /// Configuration with default engine settings rooted at `cache_root`.
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            engine_name: DEFAULT_ENGINE_NAME.to_string(),
            engine_version: DEFAULT_ENGINE_VERSION.to_string(),
            release: EngineRelease::default(),
            release_base: DEFAULT_RELEASE_BASE.to_string(),
            platform: Platform::current(),
        }
    }

    /// Resolve configuration from the environment.
    ///
    /// The cache root comes from `VALHALLA_BRIDGE_CACHE_DIR` when set and
    /// otherwise from the OS cache directory. `VALHALLA_BRIDGE_ENGINE_VERSION`
    /// and `VALHALLA_BRIDGE_RELEASE_BASE` override the engine defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new(default_cache_root()?);
        if let Some(version) = non_empty_env(ENGINE_VERSION_ENV) {
            config.engine_version = version;
        }
        if let Some(base) = non_empty_env(RELEASE_BASE_ENV) {
            config.release_base = base;
        }
        Ok(config)
    }

    pub fn with_engine_version(mut self, version: impl Into<String>) -> Self {
        self.engine_version = version.into();
        self
    }

    pub fn with_release(mut self, release: EngineRelease) -> Self {
        self.release = release;
        self
    }

    pub fn with_release_base(mut self, base: impl Into<String>) -> Self {
        self.release_base = base.into();
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn layout(&self) -> CacheLayout {
        CacheLayout::new(&self.cache_root, self.platform.clone())
    }

    /// `<engineName>-<version>-<platformTag>.tar.gz`
    pub fn archive_name(&self) -> Result<String> {
        Ok(format!(
            "{}-{}-{}.tar.gz",
            self.engine_name,
            self.engine_version,
            self.platform.tag()?
        ))
    }

    /// Download URL of the release archive for this configuration.
    pub fn archive_url(&self) -> Result<String> {
        let base = self.release_base.trim_end_matches('/');
        let name = self.archive_name()?;
        Ok(match self.release {
            EngineRelease::Latest => format!("{base}/releases/latest/download/{name}"),
            EngineRelease::Pinned => format!(
                "{base}/releases/download/v{version}/{name}",
                version = self.engine_version
            ),
        })
    }
}

fn default_cache_root() -> Result<PathBuf> {
    if let Some(override_dir) = env::var_os(CACHE_DIR_ENV) {
        return Ok(PathBuf::from(override_dir));
    }

    let dirs = BaseDirs::new().ok_or(Error::CacheDirsUnavailable)?;
    Ok(dirs.cache_dir().join(CACHE_DIR_NAME))
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
