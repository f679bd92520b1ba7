//! Repository pattern for database access.

use std::collections::HashMap;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use wordbook_core::types::{
    Article, Lexeme, ReviewPolicy, SyncWatermark, UserSettings, Word, WordBookEntry, WordIndex,
};

use crate::db::error::DbError;

type Result<T> = std::result::Result<T, DbError>;

const ENTRY_COLUMNS: &str = "id, word_id, passive_review_count, next_passive_review_time,
    active_review_count, next_active_review_time, deleted, update_time, sync_at";

/// Repository for word book entries.
pub trait WordBookRepository {
    /// Add a locally created entry. Fails with `DbError::Conflict` if another
    /// live entry tracks the same word.
    fn insert_entry(&self, entry: &WordBookEntry) -> Result<()>;
    /// Merge an entry received from the server. Last writer wins on
    /// `update_time`; returns whether the entry was written.
    fn upsert_entry(&self, entry: &WordBookEntry) -> Result<bool>;
    /// Merge a batch of server entries in one transaction; returns how many
    /// were written.
    fn upsert_entries(&self, entries: &[WordBookEntry]) -> Result<usize>;
    /// Overwrite entries unconditionally.
    fn bulk_update_entries(&self, entries: &[WordBookEntry]) -> Result<()>;
    /// Stamp entries with the sync session they were uploaded in.
    fn mark_entries_synced(&self, ids: &[String], sync_at: i64) -> Result<()>;
    /// Read an entry, apply `update`, and write the result in one
    /// transaction, provided the stored `update_time` still equals `expected`.
    fn compare_and_update<F>(&self, id: &str, expected: i64, update: F) -> Result<WordBookEntry>
    where
        F: FnOnce(&WordBookEntry) -> Result<WordBookEntry>;
    /// Turn an entry into a tombstone so the deletion syncs.
    fn soft_delete_entry(&self, id: &str, now: i64) -> Result<()>;
    fn get_entry(&self, id: &str) -> Result<Option<WordBookEntry>>;
    fn get_entry_by_word_id(&self, word_id: &str) -> Result<Option<WordBookEntry>>;
    /// Live entries, most recently updated first.
    fn all_entries(&self) -> Result<Vec<WordBookEntry>>;
    /// Live entries in rotation whose review is due at `now`.
    fn due_now(&self, now: i64, terminal_count: i32) -> Result<Vec<WordBookEntry>>;
    /// Live entries that never entered the rotation.
    fn not_started(&self) -> Result<Vec<WordBookEntry>>;
    /// Live entries that entered the rotation, done ones included.
    fn in_review(&self) -> Result<Vec<WordBookEntry>>;
    /// Entries changed in `[from, to)` that were not stamped with `sync_at`.
    ///
    /// Unlike the queries above, this one does not filter on `deleted`:
    /// tombstones are returned so deletions reach the server.
    fn updated_between(&self, sync_at: i64, from: i64, to: i64, limit: usize)
        -> Result<Vec<WordBookEntry>>;
}

/// Repository for the read-only dictionary tables.
pub trait DictionaryRepository {
    fn bulk_put_words(&self, words: &[Word]) -> Result<()>;
    fn bulk_put_word_indexes(&self, indexes: &[WordIndex]) -> Result<()>;
    fn bulk_put_lexemes(&self, lexemes: &[Lexeme]) -> Result<()>;
    fn bulk_put_articles(&self, articles: &[Article]) -> Result<()>;
    fn get_word(&self, id: &str) -> Result<Option<Word>>;
    fn get_article(&self, id: &str) -> Result<Option<Article>>;
    fn lexemes_of(&self, word_id: &str) -> Result<Vec<Lexeme>>;
    /// Frequency scores of the given words; words without a score are absent.
    fn word_frequencies(&self, word_ids: &[String]) -> Result<HashMap<String, i64>>;
}

/// Repository for per-table sync watermarks.
pub trait MetaRepository {
    fn get_version(&self, table_name: &str) -> Result<Option<i64>>;
    /// Store a watermark. A lower value than the stored one is ignored.
    fn set_version(&self, table_name: &str, version: i64) -> Result<()>;
    /// Every stored watermark, by table name.
    fn watermarks(&self) -> Result<Vec<SyncWatermark>>;
}

/// Repository for review preferences.
pub trait SettingsRepository {
    fn get_settings(&self) -> Result<UserSettings>;
    fn save_settings(&self, settings: &UserSettings) -> Result<()>;
}

/// SQLite implementation of repositories.
pub struct SqliteRepository {
    conn: Connection,
}

impl SqliteRepository {
    /// Open database at path, creating if necessary.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let repo = Self { conn };
        repo.initialize()?;
        Ok(repo)
    }

    /// Open in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let repo = Self { conn };
        repo.initialize()?;
        Ok(repo)
    }

    fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(super::schema::SCHEMA)?;
        self.conn.execute_batch(super::schema::INIT_USER_SETTINGS)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            params![super::schema::SCHEMA_VERSION],
        )?;
        Ok(())
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<WordBookEntry> {
        Ok(WordBookEntry {
            id: row.get(0)?,
            word_id: row.get(1)?,
            passive_review_count: row.get(2)?,
            next_passive_review_time: row.get(3)?,
            active_review_count: row.get(4)?,
            next_active_review_time: row.get(5)?,
            deleted: row.get(6)?,
            update_time: row.get(7)?,
            sync_at: row.get(8)?,
        })
    }

    fn query_entries(
        conn: &Connection,
        filter: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<WordBookEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM WordBookEntry WHERE {filter}");
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params, Self::row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn find_by_word_id(conn: &Connection, word_id: &str) -> Result<Option<WordBookEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM WordBookEntry WHERE word_id = ?1");
        conn.query_row(&sql, params![word_id], Self::row_to_entry)
            .optional()
            .map_err(Into::into)
    }

    fn find_by_id(conn: &Connection, id: &str) -> Result<Option<WordBookEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM WordBookEntry WHERE id = ?1");
        conn.query_row(&sql, params![id], Self::row_to_entry)
            .optional()
            .map_err(Into::into)
    }

    fn put_entry(conn: &Connection, entry: &WordBookEntry) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO WordBookEntry (id, word_id, passive_review_count,
                next_passive_review_time, active_review_count, next_active_review_time,
                deleted, update_time, sync_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.id,
                entry.word_id,
                entry.passive_review_count,
                entry.next_passive_review_time,
                entry.active_review_count,
                entry.next_active_review_time,
                entry.deleted,
                entry.update_time,
                entry.sync_at,
            ],
        )?;
        Ok(())
    }

    /// Last-writer-wins merge keyed by `word_id`. An entry for the same word
    /// under another id is replaced, so ids created on two devices converge.
    fn merge_entry(conn: &Connection, entry: &WordBookEntry) -> Result<bool> {
        match Self::find_by_word_id(conn, &entry.word_id)? {
            Some(existing) if existing.update_time >= entry.update_time => Ok(false),
            Some(existing) => {
                if existing.id != entry.id {
                    Self::delete_entry_row(conn, &existing.id)?;
                }
                Self::put_entry(conn, entry)?;
                Ok(true)
            }
            None => {
                Self::put_entry(conn, entry)?;
                Ok(true)
            }
        }
    }

    fn delete_entry_row(conn: &Connection, id: &str) -> Result<()> {
        conn.execute("DELETE FROM WordBookEntry WHERE id = ?1", params![id])?;
        Ok(())
    }
}

impl WordBookRepository for SqliteRepository {
    fn insert_entry(&self, entry: &WordBookEntry) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        if let Some(existing) = Self::find_by_word_id(&tx, &entry.word_id)? {
            if existing.id != entry.id {
                if !existing.deleted {
                    return Err(DbError::Conflict {
                        word_id: entry.word_id.clone(),
                        existing_id: existing.id,
                    });
                }
                // A tombstone for the same word gives way to the new entry.
                Self::delete_entry_row(&tx, &existing.id)?;
            }
        }
        Self::put_entry(&tx, entry)?;
        tx.commit()?;
        Ok(())
    }

    fn upsert_entry(&self, entry: &WordBookEntry) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let applied = Self::merge_entry(&tx, entry)?;
        tx.commit()?;
        Ok(applied)
    }

    fn upsert_entries(&self, entries: &[WordBookEntry]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut applied = 0;
        for entry in entries {
            if Self::merge_entry(&tx, entry)? {
                applied += 1;
            }
        }
        tx.commit()?;
        Ok(applied)
    }

    fn bulk_update_entries(&self, entries: &[WordBookEntry]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for entry in entries {
            Self::put_entry(&tx, entry)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn mark_entries_synced(&self, ids: &[String], sync_at: i64) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare("UPDATE WordBookEntry SET sync_at = ?1 WHERE id = ?2")?;
            for id in ids {
                stmt.execute(params![sync_at, id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn compare_and_update<F>(&self, id: &str, expected: i64, update: F) -> Result<WordBookEntry>
    where
        F: FnOnce(&WordBookEntry) -> Result<WordBookEntry>,
    {
        let tx = self.conn.unchecked_transaction()?;
        let current =
            Self::find_by_id(&tx, id)?.ok_or_else(|| DbError::EntryNotFound(id.to_string()))?;
        if current.update_time != expected {
            return Err(DbError::StaleEntry {
                id: id.to_string(),
                expected,
                actual: current.update_time,
            });
        }
        let updated = update(&current)?;
        if updated.id != current.id || updated.word_id != current.word_id {
            return Err(DbError::InvalidData(format!(
                "update of entry {id} changed its identity"
            )));
        }
        Self::put_entry(&tx, &updated)?;
        tx.commit()?;
        Ok(updated)
    }

    fn soft_delete_entry(&self, id: &str, now: i64) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE WordBookEntry SET deleted = 1, update_time = ?1 WHERE id = ?2 AND deleted = 0",
            params![now, id],
        )?;
        if rows == 0 {
            return Err(DbError::EntryNotFound(id.to_string()));
        }
        Ok(())
    }

    fn get_entry(&self, id: &str) -> Result<Option<WordBookEntry>> {
        Self::find_by_id(&self.conn, id)
    }

    fn get_entry_by_word_id(&self, word_id: &str) -> Result<Option<WordBookEntry>> {
        Ok(Self::find_by_word_id(&self.conn, word_id)?.filter(|e| !e.deleted))
    }

    fn all_entries(&self) -> Result<Vec<WordBookEntry>> {
        Self::query_entries(&self.conn, "deleted = 0 ORDER BY update_time DESC, id", params![])
    }

    fn due_now(&self, now: i64, terminal_count: i32) -> Result<Vec<WordBookEntry>> {
        Self::query_entries(
            &self.conn,
            "next_passive_review_time <= ?1
                AND passive_review_count >= 0 AND passive_review_count < ?2
                AND deleted = 0
             ORDER BY next_passive_review_time, id",
            params![now, terminal_count],
        )
    }

    fn not_started(&self) -> Result<Vec<WordBookEntry>> {
        Self::query_entries(
            &self.conn,
            "passive_review_count < 0 AND deleted = 0 ORDER BY id",
            params![],
        )
    }

    fn in_review(&self) -> Result<Vec<WordBookEntry>> {
        Self::query_entries(
            &self.conn,
            "passive_review_count >= 0 AND deleted = 0 ORDER BY id",
            params![],
        )
    }

    fn updated_between(
        &self,
        sync_at: i64,
        from: i64,
        to: i64,
        limit: usize,
    ) -> Result<Vec<WordBookEntry>> {
        Self::query_entries(
            &self.conn,
            "update_time >= ?1 AND update_time < ?2
                AND (sync_at IS NULL OR sync_at != ?3)
             ORDER BY update_time, id
             LIMIT ?4",
            params![from, to, sync_at, limit as i64],
        )
    }
}

impl DictionaryRepository for SqliteRepository {
    fn bulk_put_words(&self, words: &[Word]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO Word (id, lemma, part_of_speech, phonetic, phonetic_url,
                    frequency, update_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for word in words {
                stmt.execute(params![
                    word.id,
                    word.lemma,
                    word.part_of_speech,
                    word.phonetic,
                    word.phonetic_url,
                    word.frequency,
                    word.update_time,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn bulk_put_word_indexes(&self, indexes: &[WordIndex]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO WordIndex (id, word_id, spell, form, update_time)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for index in indexes {
                stmt.execute(params![
                    index.id,
                    index.word_id,
                    index.spell,
                    index.form,
                    index.update_time,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn bulk_put_lexemes(&self, lexemes: &[Lexeme]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO Lexeme (id, word_id, definition, example, example_meaning,
                    source, update_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for lexeme in lexemes {
                stmt.execute(params![
                    lexeme.id,
                    lexeme.word_id,
                    lexeme.definition,
                    lexeme.example,
                    lexeme.example_meaning,
                    lexeme.source,
                    lexeme.update_time,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn bulk_put_articles(&self, articles: &[Article]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO Article (id, title, content, url, voice_url, update_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for article in articles {
                stmt.execute(params![
                    article.id,
                    article.title,
                    article.content,
                    article.url,
                    article.voice_url,
                    article.update_time,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get_word(&self, id: &str) -> Result<Option<Word>> {
        self.conn
            .query_row(
                "SELECT id, lemma, part_of_speech, phonetic, phonetic_url, frequency, update_time
                 FROM Word WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Word {
                        id: row.get(0)?,
                        lemma: row.get(1)?,
                        part_of_speech: row.get(2)?,
                        phonetic: row.get(3)?,
                        phonetic_url: row.get(4)?,
                        frequency: row.get(5)?,
                        update_time: row.get(6)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    fn get_article(&self, id: &str) -> Result<Option<Article>> {
        self.conn
            .query_row(
                "SELECT id, title, content, url, voice_url, update_time FROM Article WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Article {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        content: row.get(2)?,
                        url: row.get(3)?,
                        voice_url: row.get(4)?,
                        update_time: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    fn lexemes_of(&self, word_id: &str) -> Result<Vec<Lexeme>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, word_id, definition, example, example_meaning, source, update_time
             FROM Lexeme WHERE word_id = ?1 ORDER BY id",
        )?;
        let lexemes = stmt
            .query_map(params![word_id], |row| {
                Ok(Lexeme {
                    id: row.get(0)?,
                    word_id: row.get(1)?,
                    definition: row.get(2)?,
                    example: row.get(3)?,
                    example_meaning: row.get(4)?,
                    source: row.get(5)?,
                    update_time: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(lexemes)
    }

    fn word_frequencies(&self, word_ids: &[String]) -> Result<HashMap<String, i64>> {
        if word_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders: String = word_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT id, frequency FROM Word WHERE frequency IS NOT NULL AND id IN ({})",
            placeholders
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> =
            word_ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
        let frequencies = stmt
            .query_map(params.as_slice(), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;

        Ok(frequencies)
    }
}

impl MetaRepository for SqliteRepository {
    fn get_version(&self, table_name: &str) -> Result<Option<i64>> {
        self.conn
            .query_row(
                "SELECT version FROM meta WHERE table_name = ?1",
                params![table_name],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    fn set_version(&self, table_name: &str, version: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO meta (table_name, version) VALUES (?1, ?2)
             ON CONFLICT(table_name) DO UPDATE SET version = MAX(version, excluded.version)",
            params![table_name, version],
        )?;
        Ok(())
    }

    fn watermarks(&self) -> Result<Vec<SyncWatermark>> {
        let mut stmt = self
            .conn
            .prepare("SELECT table_name, version FROM meta ORDER BY table_name")?;
        let watermarks = stmt
            .query_map([], |row| {
                Ok(SyncWatermark {
                    table_name: row.get(0)?,
                    version: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(watermarks)
    }
}

impl SettingsRepository for SqliteRepository {
    fn get_settings(&self) -> Result<UserSettings> {
        let (policy, count, update_time): (u8, u32, i64) = self.conn.query_row(
            "SELECT auto_new_review, daily_new_review_count, update_time
             FROM user_settings WHERE id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let auto_new_review = ReviewPolicy::from_value(policy)
            .ok_or_else(|| DbError::InvalidData(format!("unknown review policy {policy}")))?;
        Ok(UserSettings {
            auto_new_review,
            daily_new_review_count: count,
            update_time,
        })
    }

    fn save_settings(&self, settings: &UserSettings) -> Result<()> {
        if !settings.is_valid() {
            return Err(DbError::InvalidData(format!(
                "daily new review count {} out of range",
                settings.daily_new_review_count
            )));
        }
        self.conn.execute(
            "UPDATE user_settings SET auto_new_review = ?1, daily_new_review_count = ?2,
                update_time = ?3
             WHERE id = 1",
            params![
                settings.auto_new_review.to_value(),
                settings.daily_new_review_count,
                settings.update_time,
            ],
        )?;
        Ok(())
    }
}
