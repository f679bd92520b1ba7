//! Core word-book library shared by the sync client and the sync server.
//!
//! Provides:
//! - Shared types (WordBookEntry, dictionary rows, settings)
//! - The spaced-repetition state machine driven by a review ladder
//! - Review picker policies for promoting new entries into the rotation
//! - Schedule projections used for review forecasts and daily quotas

pub mod error;
pub mod picker;
pub mod review;
pub mod schedule;
pub mod types;

pub use error::{Result, ReviewError};
pub use picker::pick;
pub use review::{ReviewLadder, ReviewOutcome, ReviewState};
pub use types::{
    Article, Lexeme, ReviewPolicy, SyncWatermark, UserSettings, Word, WordBookEntry, WordIndex,
    DAY_MS, NEVER_DUE, NOT_REVIEWED,
};
