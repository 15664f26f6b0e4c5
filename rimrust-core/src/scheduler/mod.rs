//! Batch installation of workshop items through SteamCMD.
//!
//! The scheduler drives one SteamCMD invocation per manifest entry through a
//! bounded worker pool, retries transient failures with exponential backoff
//! and assembles an [`InstallReport`] in manifest order. Individual failures
//! never abort the batch; only the preconditions checked up front do.
//!
//! # Example
//!
//! ```ignore
//! use rimrust_core::scheduler::{InstallScheduler, event_channel};
//!
//! let scheduler = InstallScheduler::new(settings.attempt_limits());
//! let (tx, mut rx) = event_channel();
//!
//! let report = scheduler
//!     .run(&tool, &root, &entries, &settings.scheduler_options(), &cancel, Some(&tx))
//!     .await?;
//! println!("{}", report.summary());
//! ```

pub mod classify;
pub mod events;
pub mod invoker;
pub mod report;
pub mod retry;

pub use events::{event_channel, EventReceiver, EventSender, InstallEvent};
pub use invoker::{DownloadRequest, SteamCmdInvoker, ToolInvoker};
pub use report::{BatchStatus, EntryReport, InstallOutcome, InstallReport};
pub use retry::RetryPolicy;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::RIMWORLD_APP_ID;
use crate::error::ConfigurationError;
use crate::manifest::ManifestEntry;
use crate::steamcmd::acquirer::probe_writable;
use crate::steamcmd::paths;
use crate::steamcmd::process::{ProcessLimits, RunOutcome};
use crate::steamcmd::ToolHandle;

// =============================================================================
// Options
// =============================================================================

/// Per-batch scheduling options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Steam app whose workshop items are downloaded.
    pub app_id: u32,
    /// Maximum number of SteamCMD processes running at once.
    pub concurrency_limit: usize,
    pub retry: RetryPolicy,
    /// Invoke SteamCMD even for items already present on disk.
    pub refresh_existing: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            app_id: RIMWORLD_APP_ID,
            concurrency_limit: 2,
            retry: RetryPolicy::default(),
            refresh_existing: false,
        }
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Runs install batches with a given [`ToolInvoker`].
#[derive(Debug, Clone)]
pub struct InstallScheduler<I = SteamCmdInvoker> {
    invoker: I,
}

impl InstallScheduler<SteamCmdInvoker> {
    /// Scheduler driving the real SteamCMD with the given per-attempt limits.
    pub fn new(limits: ProcessLimits) -> Self {
        Self::with_invoker(SteamCmdInvoker::new(limits))
    }
}

impl<I: ToolInvoker> InstallScheduler<I> {
    pub fn with_invoker(invoker: I) -> Self {
        Self { invoker }
    }

    /// Installs every entry and reports the outcomes in input order.
    ///
    /// # Errors
    ///
    /// Fails only if a batch-wide precondition does not hold: the tool path
    /// is not a file, the root cannot be created or written, or the
    /// concurrency limit is zero. Nothing is invoked in that case.
    pub async fn run(
        &self,
        tool: &ToolHandle,
        install_root: &Path,
        entries: &[ManifestEntry],
        options: &SchedulerOptions,
        cancel: &CancelToken,
        events: Option<&EventSender>,
    ) -> Result<InstallReport, ConfigurationError> {
        if !tool.path().is_file() {
            return Err(ConfigurationError::InvalidToolHandle(tool.path().to_path_buf()));
        }
        if options.concurrency_limit == 0 {
            return Err(ConfigurationError::InvalidConcurrency);
        }
        let root = prepare_root(install_root)?;

        let started_at = Utc::now();
        info!(
            total = entries.len(),
            concurrency = options.concurrency_limit,
            root = %root.display(),
            "Starting install batch"
        );

        let batch = Batch {
            invoker: &self.invoker,
            tool: tool.path(),
            root: &root,
            options,
            cancel,
            events,
            content_dir: OnceCell::new(),
        };
        batch.emit(InstallEvent::BatchStarted {
            total: entries.len(),
        });

        // Completion order is arbitrary; the report follows input order.
        let batch = &batch;
        let mut results: Vec<(usize, EntryReport)> = stream::iter(entries.iter().enumerate())
            .map(move |(index, entry)| async move {
                (index, batch.install_entry(index, entry).await)
            })
            .buffer_unordered(options.concurrency_limit)
            .collect()
            .await;
        results.sort_unstable_by_key(|(index, _)| *index);
        let results: Vec<EntryReport> = results.into_iter().map(|(_, report)| report).collect();

        let report = InstallReport::new(results, started_at);
        batch.emit(InstallEvent::BatchFinished {
            status: report.status,
        });
        info!("Install batch finished: {}", report.summary());

        Ok(report)
    }
}

/// Creates the installation root if needed and checks that it is writable.
///
/// Returns the root as an absolute path, which SteamCMD requires.
pub(crate) fn prepare_root(root: &Path) -> Result<PathBuf, ConfigurationError> {
    let not_writable = |source: io::Error| ConfigurationError::RootNotWritable {
        path: root.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(root).map_err(not_writable)?;
    probe_writable(root).map_err(not_writable)?;
    std::path::absolute(root).map_err(not_writable)
}

// =============================================================================
// Batch execution
// =============================================================================

struct Batch<'a, I> {
    invoker: &'a I,
    tool: &'a Path,
    root: &'a Path,
    options: &'a SchedulerOptions,
    cancel: &'a CancelToken,
    events: Option<&'a EventSender>,
    /// Shared `workshop/content/<app_id>` directory, created once.
    content_dir: OnceCell<()>,
}

impl<I: ToolInvoker> Batch<'_, I> {
    fn emit(&self, event: InstallEvent) {
        if let Some(tx) = self.events {
            let _ = tx.send(event);
        }
    }

    fn finish(
        &self,
        index: usize,
        entry: &ManifestEntry,
        outcome: InstallOutcome,
        attempts: u32,
    ) -> EntryReport {
        let label = entry.label();
        match &outcome {
            InstallOutcome::Succeeded => info!(id = %entry.id, attempts, "Installed {}", label),
            InstallOutcome::Skipped { reason } => {
                info!(id = %entry.id, %reason, "Skipped {}", label)
            }
            other => warn!(id = %entry.id, attempts, "Failed to install {}: {}", label, other),
        }

        self.emit(InstallEvent::EntryFinished {
            index,
            id: entry.id.clone(),
            outcome: outcome.clone(),
        });

        EntryReport {
            entry: entry.clone(),
            outcome,
            attempts,
        }
    }

    async fn ensure_content_dir(&self) -> io::Result<()> {
        let dir = paths::workshop_content_dir(self.root, self.options.app_id);
        self.content_dir
            .get_or_try_init(|| async move { tokio::fs::create_dir_all(&dir).await })
            .await
            .map(|_| ())
    }

    async fn install_entry(&self, index: usize, entry: &ManifestEntry) -> EntryReport {
        if self.cancel.is_cancelled() {
            return self.finish(index, entry, InstallOutcome::cancelled(), 0);
        }

        let item_dir = paths::item_dir(self.root, self.options.app_id, &entry.id);
        if !self.options.refresh_existing && has_content(&item_dir).await {
            debug!(id = %entry.id, "Already present at {}", item_dir.display());
            return self.finish(index, entry, InstallOutcome::Succeeded, 0);
        }

        if let Err(e) = self.ensure_content_dir().await {
            let outcome = InstallOutcome::FailedPermanent {
                reason: format!("cannot create workshop directory: {}", e),
                attempts: 0,
            };
            return self.finish(index, entry, outcome, 0);
        }

        let request = DownloadRequest {
            tool: self.tool,
            root: self.root,
            app_id: self.options.app_id,
            item_id: &entry.id,
        };
        let retry = self.options.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.emit(InstallEvent::EntryStarted {
                index,
                id: entry.id.clone(),
                attempt,
            });
            debug!(id = %entry.id, attempt, "Downloading workshop item");

            let outcome = match self.invoker.download(request, self.cancel).await {
                Err(e) => InstallOutcome::FailedPermanent {
                    reason: format!("failed to run SteamCMD: {}", e),
                    attempts: attempt,
                },
                Ok(RunOutcome::Cancelled { exited_cleanly, .. }) => {
                    let outcome = if exited_cleanly && has_content(&item_dir).await {
                        InstallOutcome::Succeeded
                    } else {
                        InstallOutcome::cancelled()
                    };
                    return self.finish(index, entry, outcome, attempt);
                }
                Ok(run) => classify::classify(&run, has_content(&item_dir).await, attempt),
            };

            let reason = match outcome {
                InstallOutcome::FailedTransient { reason } => reason,
                terminal => return self.finish(index, entry, terminal, attempt),
            };

            if !retry.should_retry(attempt) {
                let outcome = InstallOutcome::FailedPermanent {
                    reason,
                    attempts: attempt,
                };
                return self.finish(index, entry, outcome, attempt);
            }

            let delay = retry.delay_after(attempt);
            warn!(id = %entry.id, attempt, ?delay, %reason, "Transient failure, retrying");
            self.emit(InstallEvent::EntryRetrying {
                index,
                id: entry.id.clone(),
                attempt,
                delay,
                reason,
            });

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => {
                    return self.finish(index, entry, InstallOutcome::cancelled(), attempt);
                }
            }
        }
    }
}

/// Whether `dir` exists and contains at least one entry.
async fn has_content(dir: &Path) -> bool {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}

// =============================================================================
// Tests
// =============================================================================
