//! First-run load of the dictionary tables from a snapshot directory.
//!
//! A snapshot is laid out as
//!
//! ```text
//! meta.json            {"version": 1700000000000, "tables": [["Word", 2], ["Lexeme", 1]]}
//! Word/0.json          [ {...}, {...} ]
//! Word/1.json
//! Lexeme/0.json
//! ```
//!
//! Every file holds a JSON array of rows. Once all files of a table are
//! stored, the table's watermark becomes the snapshot `version`, so the next
//! incremental pull only asks for rows changed after the snapshot was cut.

use std::path::Path;

use serde::Deserialize;
use wordbook_core::{Article, Lexeme, Word, WordIndex};

use super::progress::{SyncEvent, SyncReport};
use super::table::PulledRow;
use super::{SyncContext, SyncError, SyncTable};
use crate::db::MetaRepository;

pub const META_FILE: &str = "meta.json";

/// Contents of `meta.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SnapshotMeta {
    /// Server time the snapshot was cut at, in epoch milliseconds.
    pub version: i64,
    /// Table name and number of files, in load order.
    pub tables: Vec<(String, usize)>,
}

pub async fn read_meta(dir: &Path) -> Result<SnapshotMeta, SyncError> {
    let path = dir.join(META_FILE);
    let bytes = tokio::fs::read(&path).await?;
    serde_json::from_slice(&bytes).map_err(|e| SyncError::Parse(format!("{}: {e}", path.display())))
}

/// Store every snapshot file of `table` and move its watermark to `version`.
pub async fn load_table<A>(
    ctx: &SyncContext<'_, A>,
    dir: &Path,
    table: SyncTable,
    files: usize,
    version: i64,
) -> Result<SyncReport, SyncError> {
    match table {
        SyncTable::Word => load_files::<Word, A>(ctx, dir, table, files, version).await,
        SyncTable::WordIndex => load_files::<WordIndex, A>(ctx, dir, table, files, version).await,
        SyncTable::Lexeme => load_files::<Lexeme, A>(ctx, dir, table, files, version).await,
        SyncTable::Article => load_files::<Article, A>(ctx, dir, table, files, version).await,
        SyncTable::WordBookEntry | SyncTable::UserSettings => Err(SyncError::Parse(format!(
            "{table} is per user and cannot come from a snapshot"
        ))),
    }
}

async fn load_files<R: PulledRow, A>(
    ctx: &SyncContext<'_, A>,
    dir: &Path,
    table: SyncTable,
    files: usize,
    version: i64,
) -> Result<SyncReport, SyncError> {
    let mut report = SyncReport::default();
    for index in 0..files {
        ctx.cancel.check()?;

        let path = dir.join(table.name()).join(format!("{index}.json"));
        let bytes = tokio::fs::read(&path).await?;
        let rows: Vec<R> = serde_json::from_slice(&bytes)
            .map_err(|e| SyncError::Parse(format!("{}: {e}", path.display())))?;
        ctx.with_store(|repo| R::put_all(repo, &rows))?;

        report.pages += 1;
        report.downloaded += rows.len();
        ctx.progress.emit(SyncEvent::SnapshotLoaded {
            table,
            files_done: index + 1,
            files_total: files,
        });
    }

    report.version = ctx.with_store(|repo| {
        repo.set_version(table.name(), version)?;
        Ok(repo.get_version(table.name())?.unwrap_or(version))
    })?;
    Ok(report)
}
