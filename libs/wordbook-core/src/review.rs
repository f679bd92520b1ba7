//! Spaced-repetition state machine for passive review.
//!
//! An entry moves `NotStarted -> Active(0) -> ... -> Active(N-1) -> Done`
//! where `N` is the ladder length. Every transition is a pure function of the
//! entry and the current time; callers persist the returned value.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ReviewError};
use crate::types::{WordBookEntry, DAY_MS, NEVER_DUE, NOT_REVIEWED};

/// Default day offsets of the review schedule.
pub const DEFAULT_LADDER: [i64; 6] = [0, 1, 3, 7, 15, 30];

/// Position of an entry on the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "count", rename_all = "snake_case")]
pub enum ReviewState {
    NotStarted,
    Active(i32),
    Done,
}

impl ReviewState {
    pub fn of(entry: &WordBookEntry, ladder: &ReviewLadder) -> Self {
        let count = entry.passive_review_count;
        if count < 0 {
            Self::NotStarted
        } else if count >= ladder.terminal_count() {
            Self::Done
        } else {
            Self::Active(count)
        }
    }
}

/// Answer given by the user for a due entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    Remembered,
    Forgotten,
    Unsure,
}

/// Ordered day offsets indexed by review count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewLadder {
    days: Vec<i64>,
}

impl Default for ReviewLadder {
    fn default() -> Self {
        Self {
            days: DEFAULT_LADDER.to_vec(),
        }
    }
}

impl ReviewLadder {
    /// Build a ladder from day offsets. The first rung must be 0 and the
    /// offsets must strictly increase.
    pub fn new(days: Vec<i64>) -> Result<Self> {
        let starts_at_zero = days.first() == Some(&0);
        let increasing = days.windows(2).all(|w| w[0] < w[1]);
        if !starts_at_zero || !increasing {
            return Err(ReviewError::InvalidLadder);
        }
        Ok(Self { days })
    }

    pub fn days(&self) -> &[i64] {
        &self.days
    }

    /// Review count that marks an entry as done.
    pub fn terminal_count(&self) -> i32 {
        self.days.len() as i32
    }

    /// Day offset of a rung. Panics on an out-of-range rung; callers check
    /// the count against `terminal_count` first.
    pub fn offset(&self, count: i32) -> i64 {
        self.days[count as usize]
    }

    pub fn is_done(&self, entry: &WordBookEntry) -> bool {
        entry.passive_review_count >= self.terminal_count()
    }

    /// Put a not-yet-started entry into the rotation, due immediately.
    pub fn add_to_review(&self, entry: &WordBookEntry, now: i64) -> Result<WordBookEntry> {
        if entry.passive_review_count != NOT_REVIEWED {
            return Err(invalid("add to review", entry));
        }
        Ok(WordBookEntry {
            passive_review_count: 0,
            next_passive_review_time: now,
            update_time: now,
            ..entry.clone()
        })
    }

    /// Advance one rung. Leaving the last rung marks the entry as done.
    pub fn review_successfully(&self, entry: &WordBookEntry, now: i64) -> Result<WordBookEntry> {
        let count = entry.passive_review_count;
        if count < 0 || count >= self.terminal_count() {
            return Err(invalid("review successfully", entry));
        }
        let next_count = count + 1;
        let next_time = if next_count < self.terminal_count() {
            now + (self.offset(next_count) - self.offset(count)) * DAY_MS
        } else {
            NEVER_DUE
        };
        Ok(WordBookEntry {
            passive_review_count: next_count,
            next_passive_review_time: next_time,
            update_time: now,
            ..entry.clone()
        })
    }

    /// Drop back to rung 1, due again in one day.
    pub fn review_failed(&self, entry: &WordBookEntry, now: i64) -> Result<WordBookEntry> {
        let count = entry.passive_review_count;
        if count < 1 || count >= self.terminal_count() {
            return Err(invalid("fail review of", entry));
        }
        Ok(WordBookEntry {
            passive_review_count: 1,
            next_passive_review_time: now + DAY_MS,
            update_time: now,
            ..entry.clone()
        })
    }

    /// Stay on the current rung and repeat its interval from now.
    pub fn review_unsure(&self, entry: &WordBookEntry, now: i64) -> Result<WordBookEntry> {
        let count = entry.passive_review_count;
        if count < 1 || count >= self.terminal_count() {
            return Err(invalid("mark unsure", entry));
        }
        let interval = self.offset(count) - self.offset(count - 1);
        Ok(WordBookEntry {
            next_passive_review_time: now + interval * DAY_MS,
            update_time: now,
            ..entry.clone()
        })
    }

    pub fn review(
        &self,
        entry: &WordBookEntry,
        outcome: ReviewOutcome,
        now: i64,
    ) -> Result<WordBookEntry> {
        match outcome {
            ReviewOutcome::Remembered => self.review_successfully(entry, now),
            ReviewOutcome::Forgotten => self.review_failed(entry, now),
            ReviewOutcome::Unsure => self.review_unsure(entry, now),
        }
    }
}

fn invalid(action: &'static str, entry: &WordBookEntry) -> ReviewError {
    ReviewError::InvalidTransition {
        action,
        id: entry.id.clone(),
        count: entry.passive_review_count,
    }
}
