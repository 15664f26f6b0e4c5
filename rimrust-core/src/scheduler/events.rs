//! Progress events emitted while a batch runs.

use std::time::Duration;
use tokio::sync::mpsc;

use super::report::{BatchStatus, InstallOutcome};

/// Progress of an install batch, in the order things happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallEvent {
    /// The batch passed its preconditions.
    BatchStarted { total: usize },

    /// A SteamCMD attempt for an entry is starting.
    EntryStarted {
        index: usize,
        id: String,
        attempt: u32,
    },

    /// An attempt failed transiently and will be retried after `delay`.
    EntryRetrying {
        index: usize,
        id: String,
        attempt: u32,
        delay: Duration,
        reason: String,
    },

    /// An entry reached its final outcome.
    EntryFinished {
        index: usize,
        id: String,
        outcome: InstallOutcome,
    },

    /// Every entry has an outcome.
    BatchFinished { status: BatchStatus },
}

/// Sender for install events.
pub type EventSender = mpsc::UnboundedSender<InstallEvent>;

/// Receiver for install events.
pub type EventReceiver = mpsc::UnboundedReceiver<InstallEvent>;

/// Create a new event channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
