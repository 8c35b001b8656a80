use std::path::PathBuf;

use thiserror::Error;

/// Convenient result alias for the valhalla-bridge library.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// The host operating system has no published engine build.
    #[error("no routing engine build is published for platform {os}")]
    UnsupportedPlatform { os: String },

    /// The release server answered with a non-success status.
    #[error("failed to download engine release from {url}: HTTP {status}: {body}")]
    ReleaseDownload {
        url: String,
        status: u16,
        body: String,
    },

    /// Unpacking the engine release archive failed.
    #[error("failed to extract engine archive entry into {path}")]
    ArchiveExtract {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Setup was required but the caller cancelled it.
    #[error("routing engine setup was cancelled")]
    SetupCancelled,

    /// No suitable cache directory could be resolved for the engine install.
    #[error("failed to resolve cache directories for the routing engine")]
    CacheDirsUnavailable,

    /// The engine configuration generator produced something other than JSON.
    #[error("generated engine configuration at {path} is not valid JSON: {message}")]
    InvalidEngineConfig { path: PathBuf, message: String },

    /// Raised when a coordinate sequence has an odd number of values.
    #[error("coordinate values must come in lat/lon pairs, got {len} values")]
    OddCoordinateCount { len: usize },

    /// A coordinate is not finite or too large to encode at the precision.
    #[error("coordinate value {value} at index {index} cannot be encoded")]
    UnencodableCoordinate { index: usize, value: f64 },

    /// Raised when an encoded polyline cannot be decoded.
    #[error("invalid polyline at byte {position}: {reason}")]
    InvalidPolyline { position: usize, reason: String },

    /// The engine reported a non-success status other than "no route".
    #[error("routing engine returned status {code}")]
    EngineStatus { code: i64, raw: String },

    /// The engine reply is missing expected fields or is not JSON at all.
    #[error("malformed routing engine reply: {message}")]
    MalformedResponse { message: String, raw: String },

    /// An artifact build tool exited unsuccessfully.
    #[error("engine build step {step} failed with {status}")]
    BuildStepFailed { step: String, status: String },

    /// The query process exited unsuccessfully without producing a reply.
    #[error("routing engine exited with {status}: {stderr}")]
    EngineFailed { status: String, stderr: String },

    /// An engine executable could not be started.
    #[error("failed to launch {program}")]
    EngineLaunch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A route needs a start and an end.
    #[error("a route needs at least two locations, got {count}")]
    TooFewLocations { count: usize },

    /// Raised when a latitude or longitude is out of range or not finite.
    #[error("invalid coordinate ({lat}, {lon})")]
    InvalidCoordinate { lat: f64, lon: f64 },

    /// The exported dataset handed to the engine does not exist.
    #[error("exported dataset not found at {path}")]
    DatasetNotFound { path: PathBuf },

    /// Wrapper for IO errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Wrapper for HTTP client errors.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Wrapper for JSON serialization errors.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of [`Error`] values.
///
/// Callers use this to decide how to present a failure: setup problems ask the
/// user to retry provisioning, protocol problems carry the raw engine reply for
/// a bug report, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Setup,
    Encoding,
    Protocol,
    Engine,
    Input,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedPlatform { .. }
            | Error::ReleaseDownload { .. }
            | Error::ArchiveExtract { .. }
            | Error::SetupCancelled
            | Error::CacheDirsUnavailable
            | Error::InvalidEngineConfig { .. }
            | Error::Http(_) => ErrorKind::Setup,
            Error::OddCoordinateCount { .. }
            | Error::UnencodableCoordinate { .. }
            | Error::InvalidPolyline { .. } => ErrorKind::Encoding,
            Error::EngineStatus { .. } | Error::MalformedResponse { .. } | Error::Json(_) => {
                ErrorKind::Protocol
            }
            Error::BuildStepFailed { .. }
            | Error::EngineFailed { .. }
            | Error::EngineLaunch { .. } => ErrorKind::Engine,
            Error::TooFewLocations { .. }
            | Error::InvalidCoordinate { .. }
            | Error::DatasetNotFound { .. } => ErrorKind::Input,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// Raw engine reply retained for diagnostics, when there is one.
    pub fn raw_reply(&self) -> Option<&str> {
        match self {
            Error::EngineStatus { raw, .. } | Error::MalformedResponse { raw, .. } => Some(raw),
            _ => None,
        }
    }

    pub(crate) fn malformed(message: impl Into<String>, raw: &str) -> Self {
        Error::MalformedResponse {
            message: message.into(),
            raw: raw.to_string(),
        }
    }
}
