//! Sync of the single-row review preferences.

use super::progress::{SyncEvent, SyncReport};
use super::{now_ms, SyncApi, SyncContext, SyncError, SyncTable};
use crate::db::{MetaRepository, SettingsRepository};

/// Send the local settings and keep whichever side changed last.
///
/// The server stores the upload only if it is newer than its copy and
/// answers with the copy it kept. That copy replaces the local one when its
/// `update_time` is strictly greater.
pub async fn sync_settings<A: SyncApi>(ctx: &SyncContext<'_, A>) -> Result<SyncReport, SyncError> {
    let table = SyncTable::UserSettings;
    let now = now_ms();
    ctx.cancel.check()?;

    let local = ctx.with_store(|repo| repo.get_settings())?;
    let kept = ctx.api.exchange_settings(&local).await?;

    let downloaded = if kept.update_time > local.update_time {
        ctx.with_store(|repo| repo.save_settings(&kept))?;
        1
    } else {
        0
    };
    let uploaded = usize::from(kept == local);

    ctx.progress.emit(SyncEvent::PageApplied {
        table,
        uploaded,
        downloaded,
    });
    let version = ctx.with_store(|repo| {
        repo.set_version(table.name(), now)?;
        Ok(repo.get_version(table.name())?.unwrap_or(now))
    })?;
    tracing::debug!(local = local.update_time, kept = kept.update_time, "settings exchanged");

    Ok(SyncReport {
        pages: 1,
        uploaded,
        downloaded,
        version,
    })
}
