//! Projections of the review schedule.
//!
//! Used for the 30-day review forecast and for the daily quota of newly
//! started reviews.

use std::collections::BTreeMap;

use chrono::{DateTime, Days, NaiveTime, TimeZone};

use crate::review::ReviewLadder;
use crate::types::{WordBookEntry, DAY_MS};

/// Number of daily buckets in the forecast: today plus the next 30 days.
pub const FORECAST_DAYS: usize = 31;

/// Estimated times of all remaining reviews of an entry, assuming every
/// future review succeeds on the day it is due.
///
/// Empty for entries that are not started or already done.
pub fn future_review_times(entry: &WordBookEntry, ladder: &ReviewLadder, now: i64) -> Vec<i64> {
    let count = entry.passive_review_count;
    if count < 0 || count >= ladder.terminal_count() {
        return Vec::new();
    }
    let base = entry.next_passive_review_time.max(now) - ladder.offset(count) * DAY_MS;
    ladder.days()[count as usize..]
        .iter()
        .map(|offset| base + offset * DAY_MS)
        .collect()
}

/// Group projected reviews into daily buckets starting today.
///
/// Bucket `i` is centred at local noon of today + `i` days; each projected
/// review after local midnight today goes to the nearest bucket, the earlier
/// one on a tie. An entry appears once per projected review.
pub fn aggregate_by_day<Tz: TimeZone>(
    entries: &[WordBookEntry],
    ladder: &ReviewLadder,
    now: &DateTime<Tz>,
) -> Vec<Vec<WordBookEntry>> {
    let mut buckets: Vec<Vec<WordBookEntry>> = vec![Vec::new(); FORECAST_DAYS];
    let now_ms = now.timestamp_millis();
    let range_start = local_midnight(now);
    let centres = bucket_centres(now);

    for entry in entries.iter().filter(|e| !e.deleted) {
        for time in future_review_times(entry, ladder, now_ms) {
            if time <= range_start {
                continue;
            }
            if let Some(index) = closest_index(time, &centres) {
                buckets[index].push(entry.clone());
            }
        }
    }
    buckets
}

/// Group entries by passive review count.
pub fn aggregate_by_count(entries: &[WordBookEntry]) -> BTreeMap<i32, Vec<WordBookEntry>> {
    let mut groups: BTreeMap<i32, Vec<WordBookEntry>> = BTreeMap::new();
    for entry in entries.iter().filter(|e| !e.deleted) {
        groups
            .entry(entry.passive_review_count)
            .or_default()
            .push(entry.clone());
    }
    groups
}

/// Entries whose review started today: still on rung 0, or on rung 1 with
/// the first success recorded today.
pub fn started_today<'a, Tz: TimeZone>(
    entries: &'a [WordBookEntry],
    now: &DateTime<Tz>,
) -> Vec<&'a WordBookEntry> {
    let today = now.date_naive();
    let tz = now.timezone();
    entries
        .iter()
        .filter(|e| !e.deleted)
        .filter(|e| match e.passive_review_count {
            0 => true,
            1 => tz
                .timestamp_millis_opt(e.next_passive_review_time - DAY_MS)
                .single()
                .map(|t| t.date_naive() == today)
                .unwrap_or(false),
            _ => false,
        })
        .collect()
}

/// Entries past rung 0 that still have to be reviewed before the end of today.
pub fn remaining_today<'a, Tz: TimeZone>(
    entries: &'a [WordBookEntry],
    ladder: &ReviewLadder,
    now: &DateTime<Tz>,
) -> Vec<&'a WordBookEntry> {
    let end_of_today = local_midnight(now) + DAY_MS;
    entries
        .iter()
        .filter(|e| !e.deleted)
        .filter(|e| e.passive_review_count >= 1 && e.passive_review_count < ladder.terminal_count())
        .filter(|e| e.next_passive_review_time < end_of_today)
        .collect()
}

fn local_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> i64 {
    now.timezone()
        .from_local_datetime(&now.date_naive().and_time(NaiveTime::MIN))
        .earliest()
        .map(|t| t.timestamp_millis())
        .unwrap_or_else(|| now.timestamp_millis())
}

fn bucket_centres<Tz: TimeZone>(now: &DateTime<Tz>) -> Vec<i64> {
    let tz = now.timezone();
    let today = now.date_naive();
    let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN);
    (0..FORECAST_DAYS as u64)
        .filter_map(|i| today.checked_add_days(Days::new(i)))
        .filter_map(|day| tz.from_local_datetime(&day.and_time(noon)).earliest())
        .map(|t| t.timestamp_millis())
        .collect()
}

fn closest_index(time: i64, centres: &[i64]) -> Option<usize> {
    let mut best: Option<(usize, i64)> = None;
    for (index, centre) in centres.iter().enumerate() {
        let distance = (time - centre).abs();
        match best {
            Some((_, d)) if d <= distance => {}
            _ => best = Some((index, distance)),
        }
    }
    best.map(|(index, _)| index)
}
