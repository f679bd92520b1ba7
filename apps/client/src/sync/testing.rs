//! In-memory sync server for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use wordbook_core::{UserSettings, WordBookEntry};

use super::api::{ExchangeWindow, PullCursor, SyncApi};
use super::{now_ms, SyncError};

#[derive(Debug, Clone)]
pub struct PullCall {
    pub table: &'static str,
    pub cursor: PullCursor,
    pub limit: usize,
    pub at: i64,
}

#[derive(Debug, Clone)]
pub struct ExchangeCall {
    pub uploaded: Vec<WordBookEntry>,
    pub window: ExchangeWindow,
}

#[derive(Default)]
struct ServerState {
    rows: HashMap<&'static str, Vec<serde_json::Value>>,
    entries: Vec<WordBookEntry>,
    pulls: Vec<PullCall>,
    exchanges: Vec<ExchangeCall>,
    failing_pulls: Vec<usize>,
    failing_exchanges: Vec<usize>,
    rewrites: Vec<Rewrite>,
    settings: Option<UserSettings>,
    settings_calls: Vec<UserSettings>,
}

/// Row edit applied on the server right after a given pull call answers.
struct Rewrite {
    after_call: usize,
    table: &'static str,
    id: String,
    update_time: i64,
}

/// Behaves like the sync server: pulls page by `(update_time, id)`, exchanges
/// merge uploads last-writer-wins and answer from the `sync_at` window keyed
/// by id.
pub struct FakeServer {
    state: Mutex<ServerState>,
    authenticated: bool,
}

impl FakeServer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServerState::default()),
            authenticated: true,
        }
    }

    pub fn unauthenticated(mut self) -> Self {
        self.authenticated = false;
        self
    }

    pub fn seed_rows(&self, table: &'static str, rows: Vec<serde_json::Value>) {
        self.state.lock().unwrap().rows.entry(table).or_default().extend(rows);
    }

    /// Entries must carry the server-side `sync_at`.
    pub fn seed_entries(&self, entries: Vec<WordBookEntry>) {
        self.state.lock().unwrap().entries.extend(entries);
    }

    pub fn seed_settings(&self, settings: UserSettings) {
        self.state.lock().unwrap().settings = Some(settings);
    }

    /// Settings the server currently keeps.
    pub fn settings(&self) -> Option<UserSettings> {
        self.state.lock().unwrap().settings.clone()
    }

    /// Settings bodies received, in order.
    pub fn settings_calls(&self) -> Vec<UserSettings> {
        self.state.lock().unwrap().settings_calls.clone()
    }

    /// Change a row's `update_time` once pull call `after_call` has answered,
    /// as if another writer touched it mid-pull.
    pub fn update_row_after_pull(&self, after_call: usize, table: &'static str, id: &str, update_time: i64) {
        self.state.lock().unwrap().rewrites.push(Rewrite {
            after_call,
            table,
            id: id.to_string(),
            update_time,
        });
    }

    /// Make the pull call with this zero-based index fail.
    pub fn fail_pull_call(&self, index: usize) {
        self.state.lock().unwrap().failing_pulls.push(index);
    }

    /// Make the exchange call with this zero-based index fail.
    pub fn fail_exchange_call(&self, index: usize) {
        self.state.lock().unwrap().failing_exchanges.push(index);
    }

    pub fn pulls(&self) -> Vec<PullCall> {
        self.state.lock().unwrap().pulls.clone()
    }

    pub fn exchanges(&self) -> Vec<ExchangeCall> {
        self.state.lock().unwrap().exchanges.clone()
    }

    pub fn entries(&self) -> Vec<WordBookEntry> {
        self.state.lock().unwrap().entries.clone()
    }

    fn page_of<T: DeserializeOwned>(
        state: &ServerState,
        table: &'static str,
        cursor: &PullCursor,
        limit: usize,
    ) -> Result<Vec<T>, SyncError> {
        let key = |row: &serde_json::Value| {
            (
                row["update_time"].as_i64().unwrap_or(0),
                row["id"].as_str().unwrap_or_default().to_string(),
            )
        };
        let past_cursor = |row: &serde_json::Value| {
            let (update_time, id) = key(row);
            match &cursor.after_id {
                None => update_time > cursor.updated_after,
                Some(after_id) => (update_time, id) > (cursor.updated_after, after_id.clone()),
            }
        };
        let mut rows: Vec<&serde_json::Value> = state
            .rows
            .get(table)
            .map(|rows| rows.iter().filter(|row| past_cursor(row)).collect())
            .unwrap_or_default();
        rows.sort_by_key(|row| key(row));
        rows.into_iter()
            .take(limit)
            .map(|row| serde_json::from_value(row.clone()).map_err(|e| SyncError::Parse(e.to_string())))
            .collect()
    }

    fn apply_rewrites(state: &mut ServerState, call: usize) {
        let (due, pending): (Vec<Rewrite>, Vec<Rewrite>) = std::mem::take(&mut state.rewrites)
            .into_iter()
            .partition(|r| r.after_call == call);
        state.rewrites = pending;
        for rewrite in due {
            if let Some(rows) = state.rows.get_mut(rewrite.table) {
                for row in rows.iter_mut().filter(|row| row["id"] == rewrite.id.as_str()) {
                    row["update_time"] = rewrite.update_time.into();
                }
            }
        }
    }
}

impl SyncApi for FakeServer {
    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    async fn pull_page<T>(
        &self,
        table: &'static str,
        cursor: &PullCursor,
        limit: usize,
    ) -> Result<Vec<T>, SyncError>
    where
        T: DeserializeOwned + Send,
    {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        let index = state.pulls.len();
        state.pulls.push(PullCall {
            table,
            cursor: cursor.clone(),
            limit,
            at: now_ms(),
        });
        if state.failing_pulls.contains(&index) {
            return Err(SyncError::Network("connection reset".to_string()));
        }
        let page = Self::page_of(&state, table, cursor, limit);
        Self::apply_rewrites(&mut state, index);
        page
    }

    async fn exchange_entries(
        &self,
        entries: &[WordBookEntry],
        window: &ExchangeWindow,
    ) -> Result<Vec<WordBookEntry>, SyncError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        let index = state.exchanges.len();
        state.exchanges.push(ExchangeCall {
            uploaded: entries.to_vec(),
            window: window.clone(),
        });
        if state.failing_exchanges.contains(&index) {
            return Err(SyncError::Network("connection reset".to_string()));
        }

        let received_at = now_ms();
        for incoming in entries {
            let stored = WordBookEntry {
                sync_at: Some(received_at),
                ..incoming.clone()
            };
            match state.entries.iter_mut().find(|e| e.word_id == incoming.word_id) {
                Some(existing) if existing.update_time >= incoming.update_time => {}
                Some(existing) => *existing = stored,
                None => state.entries.push(stored),
            }
        }

        let mut changed: Vec<WordBookEntry> = state
            .entries
            .iter()
            .filter(|e| matches!(e.sync_at, Some(at) if at >= window.from && at < window.to))
            .filter(|e| window.after_id.as_ref().map_or(true, |after| e.id > *after))
            .cloned()
            .collect();
        changed.sort_by(|a, b| a.id.cmp(&b.id));
        changed.truncate(window.limit);
        Ok(changed)
    }

    async fn exchange_settings(&self, settings: &UserSettings) -> Result<UserSettings, SyncError> {
        tokio::task::yield_now().await;
        if !self.authenticated {
            return Err(SyncError::NotAuthenticated);
        }
        let mut state = self.state.lock().unwrap();
        state.settings_calls.push(settings.clone());
        match &state.settings {
            Some(kept) if kept.update_time >= settings.update_time => {}
            _ => state.settings = Some(settings.clone()),
        }
        Ok(state.settings.clone().unwrap_or_else(|| settings.clone()))
    }
}
