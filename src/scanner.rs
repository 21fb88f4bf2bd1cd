//! Directory scanning and the watch loop.
//!
//! One pass walks the source tree, relocates every candidate strictly in
//! order and tallies the outcome. Watching repeats passes with a fixed pause
//! until the `Shutdown` token fires.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::ScanError;
use crate::filesystem::collect_candidates;
use crate::relocate::{RawEntry, Relocator};

/// Cooperative cancellation shared between the signal handler and the driver.
///
/// Checked between files, never in the middle of one.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl Shutdown {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown and wakes a waiting watch loop.
    pub fn trigger(&self) {
        let (lock, condvar) = &*self.state;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        condvar.notify_all();
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        let (lock, _) = &*self.state;
        *lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits up to `timeout` for shutdown. Returns `true` if it was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, condvar) = &*self.state;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = condvar
            .wait_timeout_while(guard, timeout, |triggered| !*triggered)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// Tally of one scan pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub moved: usize,
    pub failed: usize,
    /// Set when shutdown cut the pass short.
    pub interrupted: bool,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} moved, {} failed", self.moved, self.failed)?;
        if self.interrupted {
            write!(f, " (interrupted)")?;
        }
        Ok(())
    }
}

/// Drives discovered files through the `Relocator`.
#[derive(Debug)]
pub struct Scanner {
    source_dir: PathBuf,
    extensions: Vec<String>,
    relocator: Relocator,
}

impl Scanner {
    #[must_use]
    pub fn new(source_dir: PathBuf, extensions: Vec<String>, relocator: Relocator) -> Self {
        Self {
            source_dir,
            extensions,
            relocator,
        }
    }

    /// Runs a single pass over the source directory.
    ///
    /// Per-file failures are logged and counted; they never stop the pass.
    ///
    /// # Errors
    ///
    /// Returns an error, without touching the destination, if the source
    /// directory is missing. Also fails if the destination cannot be
    /// created, either directory cannot be resolved, or the source cannot be
    /// walked.
    pub fn scan_once(&self, shutdown: &Shutdown) -> Result<RunSummary, ScanError> {
        info!("Scanning {}", self.source_dir.display());

        if !self.source_dir.is_dir() {
            return Err(ScanError::SourceMissing {
                path: self.source_dir.clone(),
            });
        }

        let destination = self.relocator.destination();
        fs::create_dir_all(destination).map_err(|source| ScanError::CreateDestination {
            path: destination.to_path_buf(),
            source,
        })?;

        // Compare resolved paths so `./dl` and `dl/lib` are seen as nested.
        let source_dir = resolve(&self.source_dir)?;
        let destination = resolve(destination)?;
        let skip = destination
            .starts_with(&source_dir)
            .then_some(destination.as_path());
        let files = collect_candidates(&source_dir, &self.extensions, skip).map_err(|source| {
            ScanError::Walk {
                path: source_dir.clone(),
                source,
            }
        })?;

        let mut summary = RunSummary::default();
        for path in files {
            if shutdown.is_triggered() {
                warn!("Shutdown requested, stopping scan");
                summary.interrupted = true;
                break;
            }
            if self.process(path) {
                summary.moved += 1;
            } else {
                summary.failed += 1;
            }
        }

        info!("Scan finished: {summary}");
        Ok(summary)
    }

    fn process(&self, path: PathBuf) -> bool {
        let Some(entry) = RawEntry::new(path.clone()) else {
            error!("Skipping {}: file name is not valid UTF-8", path.display());
            return false;
        };

        info!("Processing {}", entry.file_name());
        match self.relocator.relocate(&entry) {
            Ok(relocated) => {
                let via = if relocated.delegated { " (renamed)" } else { "" };
                match relocated.version {
                    Some(version) => info!(
                        "Moved {} -> {}{via} as version {version}",
                        relocated.from.display(),
                        relocated.to.display()
                    ),
                    None => info!(
                        "Moved {} -> {}{via}",
                        relocated.from.display(),
                        relocated.to.display()
                    ),
                }
                true
            }
            Err(e) => {
                error!(
                    "Failed to relocate {} at {} stage: {e}",
                    entry.path().display(),
                    e.stage()
                );
                false
            }
        }
    }

    /// Scans repeatedly, pausing `interval` between passes, until shutdown.
    ///
    /// A failed pass is logged and retried on the next interval.
    pub fn watch(&self, interval: Duration, shutdown: &Shutdown) {
        info!(
            "Watching {} every {}s",
            self.source_dir.display(),
            interval.as_secs()
        );

        loop {
            if let Err(e) = self.scan_once(shutdown) {
                error!("Scan failed: {e}");
            }
            if shutdown.wait_timeout(interval) {
                break;
            }
        }

        info!("Stopped watching {}", self.source_dir.display());
    }
}

fn resolve(path: &Path) -> Result<PathBuf, ScanError> {
    fs::canonicalize(path).map_err(|source| ScanError::Resolve {
        path: path.to_path_buf(),
        source,
    })
}

// ============================================================================
// Tests
// ============================================================================
