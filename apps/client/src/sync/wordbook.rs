//! Two-way sync of word book entries.

use wordbook_core::WordBookEntry;

use super::api::ExchangeWindow;
use super::progress::{SyncEvent, SyncReport};
use super::{now_ms, SyncApi, SyncContext, SyncError, SyncTable};
use crate::db::{MetaRepository, WordBookRepository};

/// Entries per upload batch and per download page.
pub const BATCH_SIZE: usize = 64;

/// Exchange local and server changes made since the last sync.
///
/// One session timestamp `now` is taken up front. Each round uploads a batch
/// of local entries changed in `[watermark, now)` that are not yet stamped
/// with `now`, stamps them locally while the request is in flight, and merges
/// the page of server rows it gets back. Download pages are keyed on the last
/// entry id received: an upload that overwrites a server row moves that row
/// out of the window, which would shift an offset but cannot move a key. The
/// loop ends when both the upload batch and the download page come back
/// short; only then is the watermark moved to `now`.
pub async fn sync_word_book<A: SyncApi>(
    ctx: &SyncContext<'_, A>,
    batch_size: usize,
) -> Result<SyncReport, SyncError> {
    let table = SyncTable::WordBookEntry;
    let name = table.name();
    let watermark = ctx.with_store(|repo| repo.get_version(name))?.unwrap_or(0);
    let now = now_ms();

    let mut report = SyncReport::default();
    let mut upload_done = false;
    let mut download_done = false;
    let mut download_after: Option<String> = None;

    while !upload_done || !download_done {
        ctx.cancel.check()?;

        let outgoing: Vec<WordBookEntry> = if upload_done {
            Vec::new()
        } else {
            let batch = ctx.with_store(|repo| repo.updated_between(now, watermark, now, batch_size))?;
            upload_done = batch.len() < batch_size;
            batch
                .into_iter()
                .map(|entry| WordBookEntry {
                    sync_at: Some(now),
                    ..entry
                })
                .collect()
        };
        let ids: Vec<String> = outgoing.iter().map(|e| e.id.clone()).collect();
        let window = ExchangeWindow {
            from: watermark,
            to: now,
            limit: batch_size,
            after_id: download_after.clone(),
        };

        let stamp_local = async { ctx.with_store(|repo| repo.mark_entries_synced(&ids, now)) };
        let (stamped, received) =
            tokio::join!(stamp_local, ctx.api.exchange_entries(&outgoing, &window));
        stamped?;
        let received = received?;

        let downloaded = received.len();
        if let Some(last) = received.last() {
            download_after = Some(last.id.clone());
        }
        let incoming: Vec<WordBookEntry> = received
            .into_iter()
            .map(|entry| WordBookEntry {
                sync_at: Some(now),
                ..entry
            })
            .collect();
        let applied = ctx.with_store(|repo| repo.upsert_entries(&incoming))?;

        if downloaded < batch_size {
            download_done = true;
        }

        report.pages += 1;
        report.uploaded += outgoing.len();
        report.downloaded += downloaded;
        tracing::debug!(
            uploaded = outgoing.len(),
            downloaded,
            applied,
            after = download_after.as_deref().unwrap_or_default(),
            "word book round finished"
        );
        ctx.progress.emit(SyncEvent::PageApplied {
            table,
            uploaded: outgoing.len(),
            downloaded,
        });
    }

    report.version = ctx.with_store(|repo| {
        repo.set_version(name, now)?;
        Ok(repo.get_version(name)?.unwrap_or(now))
    })?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteRepository;
    use crate::state::{lock_store, new_store, Store};
    use crate::sync::testing::FakeServer;
    use crate::sync::{CancelToken, ProgressReporter};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn store() -> Store {
        new_store(SqliteRepository::open_in_memory().unwrap())
    }

    async fn sync(server: &FakeServer, store: &Store, batch_size: usize) -> Result<SyncReport, SyncError> {
        let progress = ProgressReporter::default();
        let cancel = CancelToken::never();
        let ctx = SyncContext {
            api: server,
            store,
            progress: &progress,
            cancel: &cancel,
        };
        sync_word_book(&ctx, batch_size).await
    }

    fn remote(id: &str, word_id: &str, update_time: i64, sync_at: i64) -> WordBookEntry {
        WordBookEntry {
            sync_at: Some(sync_at),
            ..WordBookEntry::new(id, word_id, update_time)
        }
    }

    #[tokio::test]
    async fn uploads_local_changes_and_stamps_them() {
        let server = FakeServer::new();
        let store = store();
        {
            let repo = lock_store(&store).unwrap();
            for i in 0..5 {
                repo.insert_entry(&WordBookEntry::new(format!("e{i}"), format!("w{i}"), 100 + i))
                    .unwrap();
            }
        }

        let report = sync(&server, &store, 2).await.unwrap();

        assert_eq!(report.uploaded, 5);
        assert_eq!(report.pages, 3);
        let uploaded: Vec<usize> = server.exchanges().iter().map(|x| x.uploaded.len()).collect();
        assert_eq!(uploaded, vec![2, 2, 1]);
        assert_eq!(server.entries().len(), 5);

        let repo = lock_store(&store).unwrap();
        let version = repo.get_version("WordBookEntry").unwrap().unwrap();
        assert_eq!(report.version, version);
        for entry in repo.all_entries().unwrap() {
            assert_eq!(entry.sync_at, Some(version));
        }
        assert!(server.exchanges().iter().all(|x| x.window.to == version && x.window.from == 0));
    }

    #[tokio::test]
    async fn downloads_all_pages_of_server_changes() {
        let server = FakeServer::new();
        let rows: Vec<_> = (0..5)
            .map(|i| remote(&format!("r{i}"), &format!("w{i}"), 50 + i, 10 + i))
            .collect();
        server.seed_entries(rows);
        let store = store();

        let report = sync(&server, &store, 2).await.unwrap();

        assert_eq!(report.downloaded, 5);
        let keys: Vec<Option<String>> = server
            .exchanges()
            .iter()
            .map(|x| x.window.after_id.clone())
            .collect();
        assert_eq!(keys, vec![None, Some("r1".to_string()), Some("r3".to_string())]);

        let repo = lock_store(&store).unwrap();
        let entries = repo.all_entries().unwrap();
        assert_eq!(entries.len(), 5);
        assert!(entries.iter().all(|e| e.sync_at == Some(report.version)));
    }

    #[tokio::test]
    async fn uploads_overwriting_server_rows_do_not_skip_downloads() {
        let server = FakeServer::new();
        let rows: Vec<_> = (1..=4)
            .map(|i| remote(&format!("s{i}"), &format!("w{i}"), 50, 10))
            .collect();
        server.seed_entries(rows);
        let store = store();
        {
            let repo = lock_store(&store).unwrap();
            repo.insert_entry(&WordBookEntry::new("l5", "w5", 60)).unwrap();
            repo.insert_entry(&WordBookEntry::new("l6", "w6", 70)).unwrap();
            repo.insert_entry(&WordBookEntry::new("s1", "w1", 100)).unwrap();
        }

        // the second round's upload of s1 drops it from the server window
        // before the second page is read
        let report = sync(&server, &store, 2).await.unwrap();

        assert_eq!(report.uploaded, 3);
        let mut words: Vec<String> = lock_store(&store)
            .unwrap()
            .all_entries()
            .unwrap()
            .into_iter()
            .map(|e| e.word_id)
            .collect();
        words.sort();
        assert_eq!(words, vec!["w1", "w2", "w3", "w4", "w5", "w6"]);
        let stored = lock_store(&store).unwrap().get_entry("s1").unwrap().unwrap();
        assert_eq!(stored.update_time, 100);
    }

    #[tokio::test]
    async fn newer_local_entry_wins_on_both_sides() {
        let server = FakeServer::new();
        server.seed_entries(vec![remote("e1", "w1", 10, 5)]);
        let store = store();
        let mut local = WordBookEntry::new("e1", "w1", 20);
        local.passive_review_count = 2;
        lock_store(&store).unwrap().insert_entry(&local).unwrap();

        sync(&server, &store, 64).await.unwrap();

        let stored = lock_store(&store).unwrap().get_entry("e1").unwrap().unwrap();
        assert_eq!(stored.passive_review_count, 2);
        assert_eq!(stored.update_time, 20);
        assert_eq!(server.entries()[0].passive_review_count, 2);
    }

    #[tokio::test]
    async fn newer_server_entry_replaces_local_one() {
        let server = FakeServer::new();
        let mut newer = remote("remote", "w1", 30, 5);
        newer.passive_review_count = 3;
        server.seed_entries(vec![newer]);
        let store = store();
        lock_store(&store)
            .unwrap()
            .set_version("WordBookEntry", 1)
            .unwrap();
        let mut stale = WordBookEntry::new("local", "w1", 0);
        stale.sync_at = Some(0);
        lock_store(&store).unwrap().bulk_update_entries(&[stale]).unwrap();

        sync(&server, &store, 64).await.unwrap();

        let repo = lock_store(&store).unwrap();
        assert_eq!(repo.get_entry("local").unwrap(), None);
        assert_eq!(repo.get_entry_by_word_id("w1").unwrap().unwrap().passive_review_count, 3);
    }

    #[tokio::test]
    async fn tombstones_reach_the_server() {
        let server = FakeServer::new();
        server.seed_entries(vec![remote("e1", "w1", 10, 5)]);
        let store = store();

        let first = sync(&server, &store, 64).await.unwrap();
        lock_store(&store).unwrap().soft_delete_entry("e1", first.version).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = sync(&server, &store, 64).await.unwrap();

        assert_eq!(second.uploaded, 1);
        assert!(server.entries()[0].deleted);
    }

    #[tokio::test]
    async fn failed_exchange_keeps_watermark_and_retries_window() {
        let server = FakeServer::new();
        server.fail_exchange_call(0);
        let store = store();
        {
            let repo = lock_store(&store).unwrap();
            repo.set_version("WordBookEntry", 7).unwrap();
            repo.insert_entry(&WordBookEntry::new("e1", "w1", 8)).unwrap();
        }

        let err = sync(&server, &store, 64).await.unwrap_err();
        assert!(matches!(err, SyncError::Network(_)));
        assert_eq!(
            lock_store(&store).unwrap().get_version("WordBookEntry").unwrap(),
            Some(7)
        );

        // the failed round already stamped e1 with its session time
        tokio::time::sleep(Duration::from_millis(5)).await;
        sync(&server, &store, 64).await.unwrap();
        let last = server.exchanges().last().cloned().unwrap();
        assert_eq!(last.window.from, 7);
        assert_eq!(last.uploaded.len(), 1);
        assert_eq!(server.entries().len(), 1);
    }

    #[tokio::test]
    async fn nothing_to_do_still_advances_watermark() {
        let server = FakeServer::new();
        let store = store();

        let report = sync(&server, &store, 64).await.unwrap();
        assert_eq!(report.pages, 1);
        assert_eq!(server.exchanges().len(), 1);
        assert!(lock_store(&store).unwrap().get_version("WordBookEntry").unwrap().is_some());
    }
}
