//! Review operations on stored entries and the daily review session.

use std::collections::VecDeque;

use chrono::{DateTime, TimeZone};
use rand::Rng;
use uuid::Uuid;
use wordbook_core::schedule::{aggregate_by_day, remaining_today, started_today};
use wordbook_core::{pick, ReviewLadder, ReviewOutcome, ReviewPolicy, WordBookEntry};

use crate::db::{DbError, DictionaryRepository, SettingsRepository, WordBookRepository};
use crate::state::{with_store, Store};

type Result<T> = std::result::Result<T, DbError>;

/// Applies review transitions through the store.
///
/// Every state change names the `update_time` the caller last saw; a
/// mismatch fails with `DbError::StaleEntry`, so a review submitted twice is
/// applied once.
#[derive(Clone)]
pub struct ReviewService {
    store: Store,
    ladder: ReviewLadder,
}

impl ReviewService {
    pub fn new(store: Store, ladder: ReviewLadder) -> Self {
        Self { store, ladder }
    }

    pub fn ladder(&self) -> &ReviewLadder {
        &self.ladder
    }

    /// Track a word in the word book, outside the review rotation.
    pub fn add_word(&self, word_id: &str, now: i64) -> Result<WordBookEntry> {
        let entry = WordBookEntry::new(Uuid::new_v4().to_string(), word_id, now);
        with_store(&self.store, |repo| repo.insert_entry(&entry))?;
        tracing::debug!(id = %entry.id, word_id, "word added");
        Ok(entry)
    }

    pub fn start_review(&self, id: &str, expected_update_time: i64, now: i64) -> Result<WordBookEntry> {
        with_store(&self.store, |repo| {
            repo.compare_and_update(id, expected_update_time, |entry| {
                Ok(self.ladder.add_to_review(entry, now)?)
            })
        })
    }

    pub fn review(
        &self,
        id: &str,
        outcome: ReviewOutcome,
        expected_update_time: i64,
        now: i64,
    ) -> Result<WordBookEntry> {
        let updated = with_store(&self.store, |repo| {
            repo.compare_and_update(id, expected_update_time, |entry| {
                Ok(self.ladder.review(entry, outcome, now)?)
            })
        })?;
        tracing::debug!(
            id,
            ?outcome,
            count = updated.passive_review_count,
            next = updated.next_passive_review_time,
            "review recorded"
        );
        Ok(updated)
    }

    /// Delete an entry. The tombstone stays until the deletion has synced.
    pub fn remove(&self, id: &str, now: i64) -> Result<()> {
        with_store(&self.store, |repo| repo.soft_delete_entry(id, now))
    }

    /// Projected reviews of the next 31 days, one bucket per day.
    pub fn forecast<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<Vec<Vec<WordBookEntry>>> {
        let entries = with_store(&self.store, |repo| repo.in_review())?;
        Ok(aggregate_by_day(&entries, &self.ladder, now))
    }

    /// Start up to the daily quota of new reviews, chosen by the user's
    /// policy. Returns the started entries.
    fn replenish<Tz: TimeZone, R: Rng + ?Sized>(
        &self,
        now: &DateTime<Tz>,
        rng: &mut R,
    ) -> Result<Vec<WordBookEntry>> {
        let now_ms = now.timestamp_millis();
        let settings = with_store(&self.store, |repo| repo.get_settings())?;
        if settings.auto_new_review == ReviewPolicy::None {
            return Ok(Vec::new());
        }

        let in_review = with_store(&self.store, |repo| repo.in_review())?;
        let busy = started_today(&in_review, now).len() + remaining_today(&in_review, &self.ladder, now).len();
        let need = (settings.daily_new_review_count as usize).saturating_sub(busy);
        if need == 0 {
            return Ok(Vec::new());
        }

        let candidates = with_store(&self.store, |repo| repo.not_started())?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let word_ids: Vec<String> = candidates.iter().map(|e| e.word_id.clone()).collect();
        let frequencies = with_store(&self.store, |repo| repo.word_frequencies(&word_ids))?;

        let picked = pick(settings.auto_new_review, candidates, need, &frequencies, rng);
        let mut started = Vec::with_capacity(picked.len());
        for entry in picked {
            match self.start_review(&entry.id, entry.update_time, now_ms) {
                Ok(entry) => started.push(entry),
                // changed by a sync in the meantime; it is picked up next time
                Err(DbError::StaleEntry { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        tracing::info!(
            policy = ?settings.auto_new_review,
            quota = settings.daily_new_review_count,
            started = started.len(),
            "new reviews started"
        );
        Ok(started)
    }
}

/// Queue of entries to review now.
///
/// The due entries are loaded on the first call to `next`. Once the queue
/// runs dry, new entries are promoted into the rotation until today's quota
/// is reached.
pub struct ReviewSession<R> {
    service: ReviewService,
    queue: VecDeque<WordBookEntry>,
    loaded: bool,
    rng: R,
}

impl<R: Rng> ReviewSession<R> {
    pub fn new(service: ReviewService, rng: R) -> Self {
        Self {
            service,
            queue: VecDeque::new(),
            loaded: false,
            rng,
        }
    }

    pub fn next<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Result<Option<WordBookEntry>> {
        if !self.loaded {
            let due = self.due(now)?;
            self.queue.extend(due);
            self.loaded = true;
        }
        if self.queue.is_empty() && !self.service.replenish(now, &mut self.rng)?.is_empty() {
            let due = self.due(now)?;
            self.queue.extend(due);
        }
        Ok(self.queue.pop_front())
    }

    fn due<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<Vec<WordBookEntry>> {
        let terminal = self.service.ladder.terminal_count();
        with_store(&self.service.store, |repo| repo.due_now(now.timestamp_millis(), terminal))
    }
}
