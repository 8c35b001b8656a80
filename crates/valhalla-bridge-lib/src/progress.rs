//! Progress reporting and cooperative cancellation for long-running setup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Shared cancellation flag.
///
/// Clones observe the same flag, so a UI thread can keep one clone and hand
/// another to the worker running setup.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with [`Error::SetupCancelled`] once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::SetupCancelled)
        } else {
            Ok(())
        }
    }
}

/// Receives progress updates from the provisioner.
pub trait ProgressSink: Send + Sync {
    /// A new task started. `total` is the number of work units when known.
    fn task(&self, name: &str, total: Option<u64>);

    /// One or more units of work finished; `item` names the last one.
    fn worked(&self, item: &str, units: u64);
}

/// Discards all progress updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn task(&self, _name: &str, _total: Option<u64>) {}

    fn worked(&self, _item: &str, _units: u64) {}
}

/// Forwards progress to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn task(&self, name: &str, total: Option<u64>) {
        info!(task = name, total = ?total, "setup task started");
    }

    fn worked(&self, item: &str, units: u64) {
        debug!(item, units, "setup progress");
    }
}
