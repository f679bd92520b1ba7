//! Incremental pull of read-only dictionary tables.

use serde::de::DeserializeOwned;
use wordbook_core::{Article, Lexeme, Word, WordIndex};

use super::api::PullCursor;
use super::progress::{SyncEvent, SyncReport};
use super::{now_ms, SyncApi, SyncContext, SyncError, SyncTable};
use crate::db::{DbError, DictionaryRepository, MetaRepository, SqliteRepository};

/// A row type pulled from the server and stored by primary key.
pub trait PulledRow: DeserializeOwned + Send {
    /// Idempotent write of one page.
    fn put_all(repo: &SqliteRepository, rows: &[Self]) -> Result<(), DbError>;

    /// `(update_time, id)`, the key the server orders pulls by.
    fn sort_key(&self) -> (i64, &str);
}

impl PulledRow for Word {
    fn put_all(repo: &SqliteRepository, rows: &[Self]) -> Result<(), DbError> {
        repo.bulk_put_words(rows)
    }

    fn sort_key(&self) -> (i64, &str) {
        (self.update_time, &self.id)
    }
}

impl PulledRow for WordIndex {
    fn put_all(repo: &SqliteRepository, rows: &[Self]) -> Result<(), DbError> {
        repo.bulk_put_word_indexes(rows)
    }

    fn sort_key(&self) -> (i64, &str) {
        (self.update_time, &self.id)
    }
}

impl PulledRow for Lexeme {
    fn put_all(repo: &SqliteRepository, rows: &[Self]) -> Result<(), DbError> {
        repo.bulk_put_lexemes(rows)
    }

    fn sort_key(&self) -> (i64, &str) {
        (self.update_time, &self.id)
    }
}

impl PulledRow for Article {
    fn put_all(repo: &SqliteRepository, rows: &[Self]) -> Result<(), DbError> {
        repo.bulk_put_articles(rows)
    }

    fn sort_key(&self) -> (i64, &str) {
        (self.update_time, &self.id)
    }
}

/// Bring `table` up to date with the server.
///
/// The new watermark is the client clock read before the first request, and
/// it is stored only after the last page has been applied. Each page resumes
/// after the `(update_time, id)` of the previous page's last row, so a row
/// rewritten on the server mid-pull moves to the end of the stream instead of
/// shifting the rows behind it out of reach.
pub async fn pull_table<R, A>(ctx: &SyncContext<'_, A>, table: SyncTable) -> Result<SyncReport, SyncError>
where
    R: PulledRow,
    A: SyncApi,
{
    let spec = table.spec();
    let now = now_ms();
    let watermark = ctx
        .with_store(|repo| repo.get_version(spec.name))?
        .unwrap_or(0);

    let mut report = SyncReport::default();
    let mut cursor = PullCursor::starting_at(watermark);
    loop {
        ctx.cancel.check()?;

        let rows: Vec<R> = ctx.api.pull_page(spec.name, &cursor, spec.batch_size).await?;
        let received = rows.len();
        ctx.with_store(|repo| R::put_all(repo, &rows))?;

        report.pages += 1;
        report.downloaded += received;
        ctx.progress.emit(SyncEvent::PageApplied {
            table,
            uploaded: 0,
            downloaded: received,
        });

        match rows.last() {
            Some(last) if received >= spec.batch_size => {
                let (update_time, id) = last.sort_key();
                cursor = PullCursor::after(update_time, id);
            }
            _ => break,
        }
    }

    report.version = ctx.with_store(|repo| {
        repo.set_version(spec.name, now)?;
        Ok(repo.get_version(spec.name)?.unwrap_or(now))
    })?;
    tracing::debug!(table = spec.name, from = watermark, to = report.version, "pull finished");
    Ok(report)
}
