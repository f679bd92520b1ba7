//! Test fixtures and factory functions for creating test data.

use uuid::Uuid;

use lass_backend::models::{Article, Word, WordBookEntry};

/// Email unique to one test run.
pub fn unique_email() -> String {
    format!("test-{}@example.com", Uuid::new_v4())
}

/// Id prefix unique to one test run, so dictionary rows of concurrent
/// tests can be told apart.
pub fn unique_prefix() -> String {
    format!("t{}-", Uuid::new_v4().simple())
}

pub fn word(id: &str, update_time: i64) -> Word {
    Word {
        id: id.to_string(),
        lemma: format!("lemma {id}"),
        part_of_speech: Some("n".to_string()),
        phonetic: None,
        phonetic_url: None,
        frequency: Some(42),
        update_time,
    }
}

pub fn article(id: &str, update_time: i64) -> Article {
    Article {
        id: id.to_string(),
        title: Some(format!("title {id}")),
        content: Some("text".to_string()),
        url: None,
        voice_url: None,
        update_time,
    }
}

/// Entry in the review rotation with `count` passive reviews done.
pub fn entry(id: &str, word_id: &str, count: i32, update_time: i64) -> WordBookEntry {
    WordBookEntry {
        passive_review_count: count,
        next_passive_review_time: update_time + 86_400_000,
        ..WordBookEntry::new(id, word_id, update_time)
    }
}
