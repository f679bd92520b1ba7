//! Database rows and API query types

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub use wordbook_core::{
    Article, Lexeme, ReviewPolicy, UserSettings, Word, WordBookEntry, WordIndex,
};

/// Upper bound on `limit` for both pull and exchange requests.
pub const MAX_PAGE_SIZE: i64 = 5000;

// === Query Types ===

/// Query of `GET /api/sync/{table}`. Without `after_id` the page starts
/// strictly after `updated_after`; with it, after the row
/// `(updated_after, after_id)` in `(update_time, id)` order.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PullQuery {
    pub updated_after: i64,
    #[serde(default)]
    pub after_id: Option<String>,
    pub limit: i64,
}

/// Query of `POST /api/sync/WordBookEntry`: the `[from, to)` sync window
/// and the page of it to return, keyed on the last id already received.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeQuery {
    pub from: i64,
    pub to: i64,
    pub limit: i64,
    #[serde(default)]
    pub after_id: Option<String>,
}

/// Session lookup result.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub token: String,
    pub user_email: String,
}

// === Database Entity Types ===

#[derive(Debug, Clone, FromRow)]
pub struct DbWord {
    pub id: String,
    pub lemma: String,
    pub part_of_speech: Option<String>,
    pub phonetic: Option<String>,
    pub phonetic_url: Option<String>,
    pub frequency: Option<i64>,
    pub update_time: i64,
}

impl From<DbWord> for Word {
    fn from(row: DbWord) -> Self {
        Word {
            id: row.id,
            lemma: row.lemma,
            part_of_speech: row.part_of_speech,
            phonetic: row.phonetic,
            phonetic_url: row.phonetic_url,
            frequency: row.frequency,
            update_time: row.update_time,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbWordIndex {
    pub id: String,
    pub word_id: String,
    pub spell: String,
    pub form: Option<String>,
    pub update_time: i64,
}

impl From<DbWordIndex> for WordIndex {
    fn from(row: DbWordIndex) -> Self {
        WordIndex {
            id: row.id,
            word_id: row.word_id,
            spell: row.spell,
            form: row.form,
            update_time: row.update_time,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbLexeme {
    pub id: String,
    pub word_id: String,
    pub definition: String,
    pub example: Option<String>,
    pub example_meaning: Option<String>,
    pub source: String,
    pub update_time: i64,
}

impl From<DbLexeme> for Lexeme {
    fn from(row: DbLexeme) -> Self {
        Lexeme {
            id: row.id,
            word_id: row.word_id,
            definition: row.definition,
            example: row.example,
            example_meaning: row.example_meaning,
            source: row.source,
            update_time: row.update_time,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbArticle {
    pub id: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
    pub voice_url: Option<String>,
    pub update_time: i64,
}

impl From<DbArticle> for Article {
    fn from(row: DbArticle) -> Self {
        Article {
            id: row.id,
            title: row.title,
            content: row.content,
            url: row.url,
            voice_url: row.voice_url,
            update_time: row.update_time,
        }
    }
}

/// Word book entry owned by one user. `sync_at` is when the server
/// received the current version.
#[derive(Debug, Clone, FromRow)]
pub struct DbWordBookEntry {
    pub user_email: String,
    pub id: String,
    pub word_id: String,
    pub passive_review_count: i32,
    pub next_passive_review_time: i64,
    pub active_review_count: i32,
    pub next_active_review_time: i64,
    pub deleted: bool,
    pub update_time: i64,
    pub sync_at: i64,
}

impl DbWordBookEntry {
    pub fn from_entry(user_email: &str, entry: &WordBookEntry, received_at: i64) -> Self {
        Self {
            user_email: user_email.to_string(),
            id: entry.id.clone(),
            word_id: entry.word_id.clone(),
            passive_review_count: entry.passive_review_count,
            next_passive_review_time: entry.next_passive_review_time,
            active_review_count: entry.active_review_count,
            next_active_review_time: entry.next_active_review_time,
            deleted: entry.deleted,
            update_time: entry.update_time,
            sync_at: received_at,
        }
    }
}

impl From<DbWordBookEntry> for WordBookEntry {
    fn from(row: DbWordBookEntry) -> Self {
        WordBookEntry {
            id: row.id,
            word_id: row.word_id,
            passive_review_count: row.passive_review_count,
            next_passive_review_time: row.next_passive_review_time,
            active_review_count: row.active_review_count,
            next_active_review_time: row.next_active_review_time,
            deleted: row.deleted,
            update_time: row.update_time,
            sync_at: Some(row.sync_at),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbUserSettings {
    pub auto_new_review: i16,
    pub daily_new_review_count: i32,
    pub update_time: i64,
}

impl DbUserSettings {
    pub fn from_settings(settings: &UserSettings) -> Self {
        Self {
            auto_new_review: i16::from(settings.auto_new_review.to_value()),
            daily_new_review_count: settings.daily_new_review_count as i32,
            update_time: settings.update_time,
        }
    }

    /// `None` if the stored row holds values no client could have sent.
    pub fn into_settings(self) -> Option<UserSettings> {
        let policy = u8::try_from(self.auto_new_review).ok()?;
        Some(UserSettings {
            auto_new_review: ReviewPolicy::from_value(policy)?,
            daily_new_review_count: u32::try_from(self.daily_new_review_count).ok()?,
            update_time: self.update_time,
        })
    }
}
