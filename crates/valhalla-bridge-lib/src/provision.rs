//! Installing the routing engine into the cache directory.
//!
//! The [`Provisioner`] owns the engine's lifecycle: it decides whether an
//! install is current, and when it is not, removes the stale install, unpacks
//! the release archive for this platform and records the installed version.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::Lazy;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::progress::{CancellationToken, ProgressSink};
use crate::release::{extract_archive, ArchiveSource};

static DIRECTORY_LOCKS: Lazy<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Mutex shared by every caller working under `root` in this process.
pub(crate) fn directory_lock(root: &Path) -> Arc<Mutex<()>> {
    let mut locks = DIRECTORY_LOCKS
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    Arc::clone(locks.entry(root.to_path_buf()).or_default())
}

/// Lifecycle of the engine install as seen by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No usable install; setup is required before routing.
    Unconfigured,
    /// Setup is running.
    Installing,
    /// The configured engine version is installed.
    Ready,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Unconfigured => write!(f, "setup required"),
            EngineState::Installing => write!(f, "installing"),
            EngineState::Ready => write!(f, "ready"),
        }
    }
}

/// What [`Provisioner::perform_setup`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupOutcome {
    Installed,
    /// Another caller finished setup while this one waited for the lock.
    AlreadyCurrent,
}

pub struct Provisioner {
    config: EngineConfig,
    archives: Box<dyn ArchiveSource>,
    installing: AtomicBool,
}

impl fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provisioner")
            .field("config", &self.config)
            .field("installing", &self.installing)
            .finish_non_exhaustive()
    }
}

impl Provisioner {
    pub fn new(config: EngineConfig, archives: Box<dyn ArchiveSource>) -> Self {
        Self {
            config,
            archives,
            installing: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        if self.installing.load(Ordering::SeqCst) {
            EngineState::Installing
        } else if self.needs_setup() {
            EngineState::Unconfigured
        } else {
            EngineState::Ready
        }
    }

    /// Whether the engine must be (re)installed before it can be used.
    pub fn needs_setup(&self) -> bool {
        let layout = self.config.layout();
        if !layout.routing_dir().is_dir() {
            return true;
        }

        match read_version_marker(&layout.version_marker()) {
            Some(installed) if installed == self.config.engine_version => {}
            Some(installed) => {
                debug!(
                    installed = %installed,
                    expected = %self.config.engine_version,
                    "installed engine version is stale"
                );
                return true;
            }
            None => return true,
        }

        self.config.platform.has_executable_dir() && !layout.executable_dir().is_dir()
    }

    /// Install the configured engine release.
    ///
    /// Holds the cache root's directory lock for the whole install. Cancellation
    /// is honoured between deleted and extracted items; a cancelled or failed
    /// setup never writes the version marker.
    pub fn perform_setup(
        &self,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<SetupOutcome> {
        let lock = directory_lock(&self.config.cache_root);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if !self.needs_setup() {
            debug!(version = %self.config.engine_version, "engine already installed");
            return Ok(SetupOutcome::AlreadyCurrent);
        }

        let _installing = InstallingFlag::raise(&self.installing);
        cancel.check()?;

        let url = self.config.archive_url()?;
        let layout = self.config.layout();
        let install_dir = layout.install_dir();

        if install_dir.exists() {
            let total = count_entries(&install_dir)?;
            progress.task("Removing previous routing engine", Some(total));
            info!(path = %install_dir.display(), "removing previous engine install");
            remove_tree(&install_dir, progress, cancel)?;
        }

        progress.task("Installing routing engine", None);
        let reader = self.archives.open(&url)?;
        let entries = extract_archive(reader, &install_dir, progress, cancel)?;

        cancel.check()?;
        write_atomically(
            &layout.version_marker(),
            self.config.engine_version.as_bytes(),
        )?;

        info!(
            version = %self.config.engine_version,
            %url,
            entries,
            path = %install_dir.display(),
            "routing engine installed"
        );
        Ok(SetupOutcome::Installed)
    }
}

struct InstallingFlag<'a>(&'a AtomicBool);

impl<'a> InstallingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InstallingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn read_version_marker(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(contents) => Some(contents.trim().to_string()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "unreadable engine version marker");
            None
        }
    }
}

/// Replace `path` with `contents` via a temporary file in the same directory.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

fn count_entries(dir: &Path) -> Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        total += 1;
        if entry.file_type()?.is_dir() {
            total += count_entries(&entry.path())?;
        }
    }
    Ok(total)
}

/// Depth-first removal reporting one unit per removed file or directory.
fn remove_tree(dir: &Path, progress: &dyn ProgressSink, cancel: &CancellationToken) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        cancel.check()?;
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            remove_tree(&path, progress, cancel)?;
        } else {
            fs::remove_file(&path)?;
            progress.worked(&path.to_string_lossy(), 1);
        }
    }

    cancel.check()?;
    fs::remove_dir(dir)?;
    progress.worked(&dir.to_string_lossy(), 1);
    Ok(())
}
