//! Sync progress events.

use serde::Serialize;
use tokio::sync::broadcast;

use super::SyncTable;

const CHANNEL_CAPACITY: usize = 64;

/// Sync status for UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum SyncStatus {
    Idle,
    Syncing { tables: Vec<SyncTable> },
}

/// Counters for one finished table sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub pages: usize,
    pub uploaded: usize,
    pub downloaded: usize,
    /// Watermark stored when the sync finished.
    pub version: i64,
}

/// Published on every state change of a table sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    Started {
        table: SyncTable,
    },
    PageApplied {
        table: SyncTable,
        uploaded: usize,
        downloaded: usize,
    },
    /// One more file of a dictionary snapshot was stored.
    SnapshotLoaded {
        table: SyncTable,
        files_done: usize,
        files_total: usize,
    },
    Completed {
        table: SyncTable,
        report: SyncReport,
    },
    Failed {
        table: SyncTable,
        error: String,
    },
}

/// Fan-out of sync events to any number of subscribers.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    sender: broadcast::Sender<SyncEvent>,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }
}

impl ProgressReporter {
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscriber is not an error.
    pub fn emit(&self, event: SyncEvent) {
        tracing::debug!(?event, "sync event");
        let _ = self.sender.send(event);
    }
}
