//! Database error types.

use thiserror::Error;
use wordbook_core::ReviewError;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("word {word_id} already has entry {existing_id}")]
    Conflict { word_id: String, existing_id: String },

    #[error("entry not found: {0}")]
    EntryNotFound(String),

    #[error("entry {id} changed since it was read (expected update_time {expected}, found {actual})")]
    StaleEntry {
        id: String,
        expected: i64,
        actual: i64,
    },

    #[error(transparent)]
    Review(#[from] ReviewError),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("store lock poisoned")]
    Poisoned,
}
