//! SQLite schema definitions.

/// Current schema version for migrations.
pub const SCHEMA_VERSION: i32 = 1;

/// Complete schema for the local store. Table names match the sync API.
pub const SCHEMA: &str = r#"
-- Dictionary headwords
CREATE TABLE IF NOT EXISTS Word (
    id TEXT PRIMARY KEY,
    lemma TEXT NOT NULL,
    part_of_speech TEXT,
    phonetic TEXT,
    phonetic_url TEXT,
    frequency INTEGER,
    update_time INTEGER NOT NULL
);

-- Spellings and inflected forms
CREATE TABLE IF NOT EXISTS WordIndex (
    id TEXT PRIMARY KEY,
    word_id TEXT NOT NULL,
    spell TEXT NOT NULL,
    form TEXT,
    update_time INTEGER NOT NULL
);

-- Word senses
CREATE TABLE IF NOT EXISTS Lexeme (
    id TEXT PRIMARY KEY,
    word_id TEXT NOT NULL,
    definition TEXT NOT NULL,
    example TEXT,
    example_meaning TEXT,
    source TEXT NOT NULL,
    update_time INTEGER NOT NULL
);

-- Reading articles
CREATE TABLE IF NOT EXISTS Article (
    id TEXT PRIMARY KEY,
    title TEXT,
    content TEXT,
    url TEXT,
    voice_url TEXT,
    update_time INTEGER NOT NULL
);

-- Word book entries (one row per word, tombstones included)
CREATE TABLE IF NOT EXISTS WordBookEntry (
    id TEXT PRIMARY KEY,
    word_id TEXT NOT NULL UNIQUE,
    passive_review_count INTEGER NOT NULL,
    next_passive_review_time INTEGER NOT NULL,
    active_review_count INTEGER NOT NULL,
    next_active_review_time INTEGER NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0,
    update_time INTEGER NOT NULL,
    sync_at INTEGER
);

-- Per-table sync watermarks
CREATE TABLE IF NOT EXISTS meta (
    table_name TEXT PRIMARY KEY,
    version INTEGER NOT NULL
);

-- Review preferences
CREATE TABLE IF NOT EXISTS user_settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    auto_new_review INTEGER NOT NULL DEFAULT 2,
    daily_new_review_count INTEGER NOT NULL DEFAULT 20,
    update_time INTEGER NOT NULL DEFAULT 0
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_word_index_word ON WordIndex(word_id);
CREATE INDEX IF NOT EXISTS idx_word_index_spell ON WordIndex(spell);
CREATE INDEX IF NOT EXISTS idx_lexeme_word ON Lexeme(word_id);
CREATE INDEX IF NOT EXISTS idx_entry_update_time ON WordBookEntry(update_time);
CREATE INDEX IF NOT EXISTS idx_entry_passive_count ON WordBookEntry(passive_review_count);
CREATE INDEX IF NOT EXISTS idx_entry_next_passive ON WordBookEntry(next_passive_review_time);
"#;

/// Initialize user settings if not exists.
pub const INIT_USER_SETTINGS: &str = r#"
INSERT OR IGNORE INTO user_settings (id) VALUES (1);
"#;
