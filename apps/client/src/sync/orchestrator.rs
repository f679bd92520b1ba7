//! Sync orchestration: table registry, in-flight tracking, auto sync.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use wordbook_core::{Article, Lexeme, Word, WordIndex};

use super::init::{load_table, read_meta};
use super::progress::{ProgressReporter, SyncEvent, SyncReport, SyncStatus};
use super::settings::sync_settings;
use super::table::pull_table;
use super::wordbook::sync_word_book;
use super::{CancelToken, SyncApi, SyncContext, SyncError};
use crate::db::MetaRepository;
use crate::state::{with_store, Store};

const HOUR: Duration = Duration::from_secs(60 * 60);
const MINUTE: Duration = Duration::from_secs(60);

/// Tables kept in sync with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SyncTable {
    Word,
    WordIndex,
    Lexeme,
    Article,
    WordBookEntry,
    UserSettings,
}

/// How rows of a table travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    /// Read-only on the client; rows only come down.
    Pull,
    /// Local changes go up and server changes come down.
    TwoWay,
}

/// Static sync parameters of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub batch_size: usize,
    pub auto_sync_interval: Duration,
    pub direction: TransferDirection,
    pub requires_auth: bool,
}

impl SyncTable {
    pub const ALL: [SyncTable; 6] = [
        SyncTable::Word,
        SyncTable::WordIndex,
        SyncTable::Lexeme,
        SyncTable::Article,
        SyncTable::WordBookEntry,
        SyncTable::UserSettings,
    ];

    pub fn spec(self) -> TableSpec {
        match self {
            SyncTable::Word => pull_spec("Word", 2000),
            SyncTable::WordIndex => pull_spec("WordIndex", 2000),
            SyncTable::Lexeme => pull_spec("Lexeme", 2000),
            SyncTable::Article => pull_spec("Article", 100),
            SyncTable::WordBookEntry => TableSpec {
                name: "WordBookEntry",
                batch_size: super::wordbook::BATCH_SIZE,
                auto_sync_interval: MINUTE,
                direction: TransferDirection::TwoWay,
                requires_auth: true,
            },
            SyncTable::UserSettings => TableSpec {
                name: "UserSettings",
                batch_size: 1,
                auto_sync_interval: HOUR,
                direction: TransferDirection::TwoWay,
                requires_auth: true,
            },
        }
    }

    /// Tables moving in `direction`, in registry order.
    pub fn moving(direction: TransferDirection) -> impl Iterator<Item = SyncTable> {
        Self::ALL
            .into_iter()
            .filter(move |table| table.spec().direction == direction)
    }

    /// Table name on the wire and in the local `meta` table.
    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|table| table.name() == name)
    }
}

impl fmt::Display for SyncTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn pull_spec(name: &'static str, batch_size: usize) -> TableSpec {
    TableSpec {
        name,
        batch_size,
        auto_sync_interval: HOUR,
        direction: TransferDirection::Pull,
        requires_auth: false,
    }
}

struct OrchestratorInner<A> {
    api: A,
    store: Store,
    progress: ProgressReporter,
    in_flight: Mutex<BTreeSet<SyncTable>>,
    cancel: watch::Sender<u64>,
}

/// Runs table syncs and publishes their progress.
///
/// Clone-able; all clones share the same in-flight set and event channel.
pub struct SyncOrchestrator<A> {
    inner: Arc<OrchestratorInner<A>>,
}

impl<A> Clone for SyncOrchestrator<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Removes a table from the in-flight set when dropped.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<BTreeSet<SyncTable>>,
    table: SyncTable,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut tables) = self.in_flight.lock() {
            tables.remove(&self.table);
        }
    }
}

impl<A: SyncApi> SyncOrchestrator<A> {
    pub fn new(api: A, store: Store) -> Self {
        let (cancel, _) = watch::channel(0);
        Self {
            inner: Arc::new(OrchestratorInner {
                api,
                store,
                progress: ProgressReporter::default(),
                in_flight: Mutex::new(BTreeSet::new()),
                cancel,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.progress.subscribe()
    }

    /// Get current sync status.
    pub fn status(&self) -> SyncStatus {
        let tables: Vec<SyncTable> = match self.inner.in_flight.lock() {
            Ok(tables) => tables.iter().copied().collect(),
            Err(_) => Vec::new(),
        };
        if tables.is_empty() {
            SyncStatus::Idle
        } else {
            SyncStatus::Syncing { tables }
        }
    }

    /// Abort every running sync at its next iteration boundary. Watermarks
    /// of aborted tables are left untouched.
    pub fn cancel(&self) {
        self.inner.cancel.send_modify(|generation| *generation += 1);
    }

    /// Sync one table. A second sync of a table that is already running
    /// fails with `SyncError::AlreadyInProgress`.
    pub async fn sync_table(&self, table: SyncTable) -> Result<SyncReport, SyncError> {
        let spec = table.spec();
        if spec.requires_auth && !self.inner.api.is_authenticated() {
            return Err(SyncError::NotAuthenticated);
        }

        let _guard = self.begin(table)?;
        let cancel = CancelToken::new(self.inner.cancel.subscribe());
        let ctx = SyncContext {
            api: &self.inner.api,
            store: &self.inner.store,
            progress: &self.inner.progress,
            cancel: &cancel,
        };

        self.inner.progress.emit(SyncEvent::Started { table });
        tracing::info!(%table, "sync started");

        let result = match table {
            SyncTable::Word => pull_table::<Word, A>(&ctx, table).await,
            SyncTable::WordIndex => pull_table::<WordIndex, A>(&ctx, table).await,
            SyncTable::Lexeme => pull_table::<Lexeme, A>(&ctx, table).await,
            SyncTable::Article => pull_table::<Article, A>(&ctx, table).await,
            SyncTable::WordBookEntry => sync_word_book(&ctx, spec.batch_size).await,
            SyncTable::UserSettings => sync_settings(&ctx).await,
        };

        self.finish(table, &result);
        result
    }

    /// Sync the pull-only tables concurrently, then the two-way tables one
    /// after another when a credential is available.
    pub async fn sync_all(&self) -> Vec<(SyncTable, Result<SyncReport, SyncError>)> {
        let pulls = SyncTable::moving(TransferDirection::Pull)
            .map(|table| async move { (table, self.sync_table(table).await) });
        let mut results = join_all(pulls).await;

        if self.inner.api.is_authenticated() {
            for table in SyncTable::moving(TransferDirection::TwoWay) {
                results.push((table, self.sync_table(table).await));
            }
        }
        results
    }

    /// Load the pull-only tables from the snapshot in `dir`. Tables that
    /// already hold a watermark are left to incremental pulls; a table whose
    /// load fails keeps no watermark and is loaded again next time.
    pub async fn bootstrap(&self, dir: &Path) -> Result<Vec<(SyncTable, SyncReport)>, SyncError> {
        let meta = read_meta(dir).await?;
        let synced: HashSet<String> = with_store(&self.inner.store, |repo| repo.watermarks())?
            .into_iter()
            .filter(|watermark| watermark.version > 0)
            .map(|watermark| watermark.table_name)
            .collect();

        let mut loaded = Vec::new();
        for (name, files) in &meta.tables {
            let Some(table) = SyncTable::from_name(name)
                .filter(|table| table.spec().direction == TransferDirection::Pull)
            else {
                tracing::warn!(table = %name, "snapshot table not loadable, skipping");
                continue;
            };
            if synced.contains(name) {
                tracing::debug!(%table, "already synced, snapshot skipped");
                continue;
            }

            let _guard = self.begin(table)?;
            let cancel = CancelToken::new(self.inner.cancel.subscribe());
            let ctx = SyncContext {
                api: &self.inner.api,
                store: &self.inner.store,
                progress: &self.inner.progress,
                cancel: &cancel,
            };

            self.inner.progress.emit(SyncEvent::Started { table });
            tracing::info!(%table, files, version = meta.version, "loading snapshot");
            let result = load_table(&ctx, dir, table, *files, meta.version).await;
            self.finish(table, &result);
            loaded.push((table, result?));
        }
        Ok(loaded)
    }

    /// Sync every table now and then again at its own interval until
    /// `shutdown` flips to true or its sender is dropped.
    pub async fn run_auto_sync(&self, mut shutdown: watch::Receiver<bool>) {
        let authenticated = self.inner.api.is_authenticated();
        let start = Instant::now();
        let mut schedule: Vec<(SyncTable, Instant)> = SyncTable::ALL
            .into_iter()
            .filter(|table| authenticated || !table.spec().requires_auth)
            .map(|table| (table, start))
            .collect();

        loop {
            let Some(&(table, due)) = schedule.iter().min_by_key(|(_, due)| *due) else {
                return;
            };

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("auto sync stopped");
                        return;
                    }
                }
                _ = tokio::time::sleep_until(due) => {
                    match self.sync_table(table).await {
                        Ok(_) | Err(SyncError::AlreadyInProgress(_)) => {}
                        Err(e) => tracing::debug!(%table, error = %e, "auto sync attempt failed"),
                    }
                    let next = Instant::now() + table.spec().auto_sync_interval;
                    if let Some(slot) = schedule.iter_mut().find(|(t, _)| *t == table) {
                        slot.1 = next;
                    }
                }
            }
        }
    }

    fn finish(&self, table: SyncTable, result: &Result<SyncReport, SyncError>) {
        match result {
            Ok(report) => {
                tracing::info!(
                    %table,
                    pages = report.pages,
                    uploaded = report.uploaded,
                    downloaded = report.downloaded,
                    version = report.version,
                    "sync completed"
                );
                self.inner.progress.emit(SyncEvent::Completed {
                    table,
                    report: report.clone(),
                });
            }
            Err(e) => {
                tracing::warn!(%table, error = %e, "sync failed");
                self.inner.progress.emit(SyncEvent::Failed {
                    table,
                    error: e.to_string(),
                });
            }
        }
    }

    fn begin(&self, table: SyncTable) -> Result<InFlightGuard<'_>, SyncError> {
        let mut tables = self
            .inner
            .in_flight
            .lock()
            .map_err(|_| SyncError::Database(crate::db::DbError::Poisoned))?;
        if !tables.insert(table) {
            tracing::debug!(%table, "sync already running, skipping");
            return Err(SyncError::AlreadyInProgress(table));
        }
        Ok(InFlightGuard {
            in_flight: &self.inner.in_flight,
            table,
        })
    }
}
