//! Fetching and unpacking engine release archives.

use std::env;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use tar::Archive;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::progress::{CancellationToken, ProgressSink};

const ARCHIVE_SOURCE_ENV: &str = "VALHALLA_ARCHIVE_SOURCE";

/// Something that can hand out the bytes of a release archive.
pub trait ArchiveSource: Send + Sync {
    /// Open the archive published at `url` for streaming.
    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>>;
}

/// Downloads release archives over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpArchiveSource {
    client: Client,
}

impl HttpArchiveSource {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client()?,
        })
    }
}

impl ArchiveSource for HttpArchiveSource {
    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>> {
        info!(%url, "downloading engine release");
        let response = self.client.get(url).send()?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().unwrap_or_default();
            return Err(Error::ReleaseDownload {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(Box::new(response))
    }
}

/// Reads a release archive from the local filesystem regardless of the URL.
///
/// Used for offline installs and tests.
#[derive(Debug, Clone)]
pub struct LocalArchiveSource {
    path: PathBuf,
}

impl LocalArchiveSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ArchiveSource for LocalArchiveSource {
    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>> {
        info!(
            %url,
            source_path = %self.path.display(),
            "using local engine archive override"
        );
        Ok(Box::new(File::open(&self.path)?))
    }
}

/// Archive source honouring the `VALHALLA_ARCHIVE_SOURCE` override, falling
/// back to HTTP downloads.
pub fn default_archive_source() -> Result<Box<dyn ArchiveSource>> {
    if let Some(path) = env::var_os(ARCHIVE_SOURCE_ENV) {
        return Ok(Box::new(LocalArchiveSource::new(path)));
    }
    Ok(Box::new(HttpArchiveSource::new()?))
}

fn build_client() -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(15 * 60))
        .user_agent(user_agent())
        .build()
        .map_err(Error::Http)
}

fn user_agent() -> String {
    format!(
        "valhalla-bridge-lib/{version} ({repo})",
        version = env!("CARGO_PKG_VERSION"),
        repo = "https://github.com/valhalla-bridge/valhalla-bridge"
    )
}

/// Stream a gzip-compressed tar archive into `destination`.
///
/// Cancellation is checked before every entry. Regular files below a `bin`
/// directory are made executable. Returns the number of entries written.
pub fn extract_archive(
    reader: impl Read,
    destination: &Path,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<u64> {
    fs::create_dir_all(destination)?;

    let mut archive = Archive::new(GzDecoder::new(reader));
    let entries = archive.entries().map_err(|source| Error::ArchiveExtract {
        path: destination.to_path_buf(),
        source,
    })?;

    let mut written = 0u64;
    for entry in entries {
        cancel.check()?;

        let mut entry = entry.map_err(|source| Error::ArchiveExtract {
            path: destination.to_path_buf(),
            source,
        })?;
        let raw_path = entry
            .path()
            .map_err(|source| Error::ArchiveExtract {
                path: destination.to_path_buf(),
                source,
            })?
            .into_owned();

        let relative = match enclosed_path(&raw_path) {
            Some(path) if path.as_os_str().is_empty() => continue,
            Some(path) => path,
            None => {
                warn!(
                    entry = %raw_path.display(),
                    "skipping archive entry with unsafe path"
                );
                continue;
            }
        };

        let target = destination.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::ArchiveExtract {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        entry
            .unpack(&target)
            .map_err(|source| Error::ArchiveExtract {
                path: target.clone(),
                source,
            })?;

        if entry.header().entry_type().is_file() && is_in_bin_dir(&relative) {
            make_executable(&target)?;
        }

        written += 1;
        progress.worked(&relative.to_string_lossy(), 1);
    }

    debug!(entries = written, path = %destination.display(), "engine archive extracted");
    Ok(written)
}

/// Strip `.` components and reject anything escaping the destination.
fn enclosed_path(path: &Path) -> Option<PathBuf> {
    let mut enclosed = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => enclosed.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(enclosed)
}

fn is_in_bin_dir(path: &Path) -> bool {
    path.parent()
        .map(|parent| {
            parent
                .components()
                .any(|component| component.as_os_str() == "bin")
        })
        .unwrap_or(false)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|source| {
        Error::ArchiveExtract {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
