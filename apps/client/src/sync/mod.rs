//! Synchronization of the local store with the sync server.

pub mod api;
pub mod init;
pub mod orchestrator;
pub mod progress;
pub mod settings;
pub mod table;
pub mod wordbook;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ExchangeWindow, HttpSyncApi, PullCursor, SyncApi};
pub use orchestrator::{SyncOrchestrator, SyncTable, TableSpec, TransferDirection};
pub use progress::{ProgressReporter, SyncEvent, SyncReport, SyncStatus};

use tokio::sync::watch;

use crate::db::{DbError, SqliteRepository};
use crate::state::{with_store, Store};

/// Sync errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend error: {status} - {message}")]
    Backend { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not authenticated - a session token is required")]
    NotAuthenticated,

    #[error("Sync of {0} already in progress")]
    AlreadyInProgress(SyncTable),

    #[error("Sync cancelled")]
    Cancelled,
}

/// Cancellation signal observed between sync iterations.
///
/// A token is cancelled once the generation counter it was created from moves
/// past the value seen at creation.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<u64>,
    generation: u64,
}

impl CancelToken {
    pub fn new(rx: watch::Receiver<u64>) -> Self {
        let generation = *rx.borrow();
        Self { rx, generation }
    }

    /// Token that is never cancelled.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(0);
        Self::new(rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() != self.generation
    }

    pub fn check(&self) -> Result<(), SyncError> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Everything one table sync needs, borrowed from the orchestrator.
pub struct SyncContext<'a, A> {
    pub api: &'a A,
    pub store: &'a Store,
    pub progress: &'a ProgressReporter,
    pub cancel: &'a CancelToken,
}

impl<A> SyncContext<'_, A> {
    pub(crate) fn with_store<T>(
        &self,
        f: impl FnOnce(&SqliteRepository) -> Result<T, DbError>,
    ) -> Result<T, SyncError> {
        Ok(with_store(self.store, f)?)
    }
}

/// Current time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
