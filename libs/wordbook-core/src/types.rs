//! Core types shared by the client and the sync server.

use serde::{Deserialize, Serialize};

/// Review count of an entry that has not entered the rotation yet.
pub const NOT_REVIEWED: i32 = -1;

/// Due time of an entry that finished the ladder. Equal to 2^53 - 1 so it
/// survives a round trip through JSON numbers on any client.
pub const NEVER_DUE: i64 = 9_007_199_254_740_991;

/// Milliseconds in one day.
pub const DAY_MS: i64 = 86_400_000;

/// A user's tracked word and its review state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordBookEntry {
    pub id: String,
    pub word_id: String,
    pub passive_review_count: i32,
    pub next_passive_review_time: i64,
    pub active_review_count: i32,
    pub next_active_review_time: i64,
    #[serde(default)]
    pub deleted: bool,
    pub update_time: i64,
    #[serde(default)]
    pub sync_at: Option<i64>,
}

impl WordBookEntry {
    /// Fresh entry for a word, outside the review rotation.
    pub fn new(id: impl Into<String>, word_id: impl Into<String>, now: i64) -> Self {
        Self {
            id: id.into(),
            word_id: word_id.into(),
            passive_review_count: NOT_REVIEWED,
            next_passive_review_time: i64::from(NOT_REVIEWED),
            active_review_count: NOT_REVIEWED,
            next_active_review_time: i64::from(NOT_REVIEWED),
            deleted: false,
            update_time: now,
            sync_at: None,
        }
    }

    pub fn is_not_started(&self) -> bool {
        self.passive_review_count < 0
    }
}

/// Dictionary headword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub id: String,
    pub lemma: String,
    #[serde(default)]
    pub part_of_speech: Option<String>,
    #[serde(default)]
    pub phonetic: Option<String>,
    #[serde(default)]
    pub phonetic_url: Option<String>,
    #[serde(default)]
    pub frequency: Option<i64>,
    pub update_time: i64,
}

/// Spelling or inflected form pointing at a word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordIndex {
    pub id: String,
    pub word_id: String,
    pub spell: String,
    #[serde(default)]
    pub form: Option<String>,
    pub update_time: i64,
}

/// One sense of a word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lexeme {
    pub id: String,
    pub word_id: String,
    pub definition: String,
    #[serde(default)]
    pub example: Option<String>,
    #[serde(default)]
    pub example_meaning: Option<String>,
    pub source: String,
    pub update_time: i64,
}

/// Reading article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub voice_url: Option<String>,
    pub update_time: i64,
}

/// Last server version fully applied to a local table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWatermark {
    pub table_name: String,
    pub version: i64,
}

/// How new entries are promoted into the review rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewPolicy {
    None,
    Random,
    MostFrequent,
    FirstCome,
}

impl ReviewPolicy {
    /// Numeric value stored in settings rows.
    pub fn to_value(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Random => 1,
            Self::MostFrequent => 2,
            Self::FirstCome => 3,
        }
    }

    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Random),
            2 => Some(Self::MostFrequent),
            3 => Some(Self::FirstCome),
            _ => None,
        }
    }
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        Self::MostFrequent
    }
}

/// Smallest allowed daily quota of new reviews.
pub const MIN_DAILY_NEW_REVIEWS: u32 = 1;
/// Largest allowed daily quota of new reviews.
pub const MAX_DAILY_NEW_REVIEWS: u32 = 100;

/// Per-user review preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub auto_new_review: ReviewPolicy,
    pub daily_new_review_count: u32,
    pub update_time: i64,
}

impl UserSettings {
    pub fn is_valid(&self) -> bool {
        (MIN_DAILY_NEW_REVIEWS..=MAX_DAILY_NEW_REVIEWS).contains(&self.daily_new_review_count)
    }
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            auto_new_review: ReviewPolicy::default(),
            daily_new_review_count: 20,
            update_time: 0,
        }
    }
}
