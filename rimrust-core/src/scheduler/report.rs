//! Per-entry outcomes and the aggregate batch report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::manifest::ManifestEntry;

// =============================================================================
// Install Outcome
// =============================================================================

/// Result of installing one manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstallOutcome {
    /// The item is on disk.
    Succeeded,
    /// An attempt failed in a way a retry may fix. Never terminal in a report.
    FailedTransient { reason: String },
    /// The item could not be installed.
    FailedPermanent { reason: String, attempts: u32 },
    /// The item was not attempted to completion.
    Skipped { reason: String },
}

impl InstallOutcome {
    pub(crate) fn cancelled() -> Self {
        Self::Skipped {
            reason: "cancelled".to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::FailedTransient { .. } | Self::FailedPermanent { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Succeeded => None,
            Self::FailedTransient { reason }
            | Self::FailedPermanent { reason, .. }
            | Self::Skipped { reason } => Some(reason),
        }
    }
}

impl fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("succeeded"),
            Self::FailedTransient { reason } => write!(f, "failed (transient): {}", reason),
            Self::FailedPermanent { reason, attempts } => {
                write!(f, "failed after {} attempt(s): {}", attempts, reason)
            }
            Self::Skipped { reason } => write!(f, "skipped: {}", reason),
        }
    }
}

// =============================================================================
// Batch Report
// =============================================================================

/// Overall result of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    AllSucceeded,
    PartialFailure,
    TotalFailure,
}

impl BatchStatus {
    /// Aggregates outcomes. An empty batch has trivially succeeded.
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a InstallOutcome>) -> Self {
        let (mut total, mut succeeded, mut failed) = (0usize, 0usize, 0usize);
        for outcome in outcomes {
            total += 1;
            if outcome.is_success() {
                succeeded += 1;
            } else if outcome.is_failure() {
                failed += 1;
            }
        }

        if succeeded == total {
            Self::AllSucceeded
        } else if failed == total {
            Self::TotalFailure
        } else {
            Self::PartialFailure
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AllSucceeded => "all succeeded",
            Self::PartialFailure => "partial failure",
            Self::TotalFailure => "total failure",
        })
    }
}

/// Outcome of one entry together with the entry itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryReport {
    pub entry: ManifestEntry,
    pub outcome: InstallOutcome,
    /// SteamCMD invocations made for this entry; 0 if it was already present.
    pub attempts: u32,
}

/// Result of one `install_mods` batch, entries in manifest order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReport {
    pub status: BatchStatus,
    pub entries: Vec<EntryReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl InstallReport {
    pub fn new(entries: Vec<EntryReport>, started_at: DateTime<Utc>) -> Self {
        let status = BatchStatus::from_outcomes(entries.iter().map(|e| &e.outcome));
        Self {
            status,
            entries,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &InstallOutcome> {
        self.entries.iter().map(|e| &e.outcome)
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes().filter(|o| o.is_failure()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes()
            .filter(|o| matches!(o, InstallOutcome::Skipped { .. }))
            .count()
    }

    /// One-line summary, e.g. `partial failure: 2 succeeded, 1 failed, 0 skipped`.
    pub fn summary(&self) -> String {
        format!(
            "{}: {} succeeded, {} failed, {} skipped",
            self.status,
            self.succeeded(),
            self.failed(),
            self.skipped()
        )
    }
}
