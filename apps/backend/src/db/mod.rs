//! PostgreSQL database operations

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, FromRow, PgPool};
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::models::*;

/// Database wrapper with connection pool
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

const WORD_COLUMNS: &str = "id, lemma, part_of_speech, phonetic, phonetic_url, frequency, update_time";
const WORD_INDEX_COLUMNS: &str = "id, word_id, spell, form, update_time";
const LEXEME_COLUMNS: &str = "id, word_id, definition, example, example_meaning, source, update_time";
const ARTICLE_COLUMNS: &str = "id, title, content, url, voice_url, update_time";

impl Database {
    /// Connect to PostgreSQL and create connection pool
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // === Session Repository ===

    /// Store a session token for a user. Tokens are issued by the login
    /// flow; this is its write side.
    pub async fn create_session(
        &self,
        user_email: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Session> {
        let token = Uuid::new_v4().to_string();
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (token, user_email, expires_at)
            VALUES ($1, $2, $3)
            RETURNING token, user_email
            "#,
        )
        .bind(&token)
        .bind(user_email)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    /// Get the live session for a token
    pub async fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT token, user_email
            FROM sessions
            WHERE token = $1 AND (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    // === Dictionary Repository ===

    pub async fn words_since(&self, query: &PullQuery) -> Result<Vec<Word>> {
        let rows: Vec<DbWord> = self.changed_rows("words", WORD_COLUMNS, query).await?;
        Ok(rows.into_iter().map(Word::from).collect())
    }

    pub async fn word_indexes_since(&self, query: &PullQuery) -> Result<Vec<WordIndex>> {
        let rows: Vec<DbWordIndex> = self
            .changed_rows("word_indexes", WORD_INDEX_COLUMNS, query)
            .await?;
        Ok(rows.into_iter().map(WordIndex::from).collect())
    }

    pub async fn lexemes_since(&self, query: &PullQuery) -> Result<Vec<Lexeme>> {
        let rows: Vec<DbLexeme> = self.changed_rows("lexemes", LEXEME_COLUMNS, query).await?;
        Ok(rows.into_iter().map(Lexeme::from).collect())
    }

    pub async fn articles_since(&self, query: &PullQuery) -> Result<Vec<Article>> {
        let rows: Vec<DbArticle> = self.changed_rows("articles", ARTICLE_COLUMNS, query).await?;
        Ok(rows.into_iter().map(Article::from).collect())
    }

    /// Rows of a dictionary table past the query's cursor, in
    /// `(update_time, id)` order.
    async fn changed_rows<T>(&self, table: &'static str, columns: &'static str, query: &PullQuery) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let sql = format!(
            "SELECT {columns} FROM {table}
             WHERE update_time > $1
                OR ($2::TEXT IS NOT NULL AND update_time = $1 AND id > $2)
             ORDER BY update_time, id
             LIMIT $3"
        );
        let rows = sqlx::query_as::<_, T>(&sql)
            .bind(query.updated_after)
            .bind(query.after_id.as_deref())
            .bind(query.limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    // === Word Book Repository ===

    /// Merge a user's uploaded entries. An entry replaces the stored one
    /// for the same word only when its `update_time` is strictly newer.
    /// Returns how many rows were written.
    pub async fn save_entries(
        &self,
        user_email: &str,
        entries: &[WordBookEntry],
        received_at: i64,
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for entry in entries {
            let row = DbWordBookEntry::from_entry(user_email, entry, received_at);
            let result = sqlx::query(
                r#"
                INSERT INTO word_book_entries (
                    user_email, word_id, id, passive_review_count, next_passive_review_time,
                    active_review_count, next_active_review_time, deleted, update_time, sync_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (user_email, word_id) DO UPDATE SET
                    id = EXCLUDED.id,
                    passive_review_count = EXCLUDED.passive_review_count,
                    next_passive_review_time = EXCLUDED.next_passive_review_time,
                    active_review_count = EXCLUDED.active_review_count,
                    next_active_review_time = EXCLUDED.next_active_review_time,
                    deleted = EXCLUDED.deleted,
                    update_time = EXCLUDED.update_time,
                    sync_at = EXCLUDED.sync_at
                WHERE word_book_entries.update_time < EXCLUDED.update_time
                "#,
            )
            .bind(&row.user_email)
            .bind(&row.word_id)
            .bind(&row.id)
            .bind(row.passive_review_count)
            .bind(row.next_passive_review_time)
            .bind(row.active_review_count)
            .bind(row.next_active_review_time)
            .bind(row.deleted)
            .bind(row.update_time)
            .bind(row.sync_at)
            .execute(&mut *tx)
            .await?;

            written += result.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    /// A page of the user's entries received in `[from, to)` with ids after
    /// `after_id`, ordered by id.
    pub async fn entries_in_window(
        &self,
        user_email: &str,
        window: &ExchangeQuery,
    ) -> Result<Vec<WordBookEntry>> {
        let rows = sqlx::query_as::<_, DbWordBookEntry>(
            r#"
            SELECT user_email, id, word_id, passive_review_count, next_passive_review_time,
                   active_review_count, next_active_review_time, deleted, update_time, sync_at
            FROM word_book_entries
            WHERE user_email = $1 AND sync_at >= $2 AND sync_at < $3
              AND ($4::TEXT IS NULL OR id > $4)
            ORDER BY id
            LIMIT $5
            "#,
        )
        .bind(user_email)
        .bind(window.from)
        .bind(window.to)
        .bind(window.after_id.as_deref())
        .bind(window.limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(WordBookEntry::from).collect())
    }

    // === Settings Repository ===

    pub async fn get_settings(&self, user_email: &str) -> Result<Option<UserSettings>> {
        let row = sqlx::query_as::<_, DbUserSettings>(
            r#"
            SELECT auto_new_review, daily_new_review_count, update_time
            FROM user_settings
            WHERE user_email = $1
            "#,
        )
        .bind(user_email)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Ok(None),
            Some(row) => row
                .into_settings()
                .map(Some)
                .ok_or_else(|| ApiError::Internal(format!("corrupt settings row for {user_email}"))),
        }
    }

    /// Store the user's settings unless the stored ones are at least as new,
    /// then return whichever version is kept.
    pub async fn save_settings(&self, user_email: &str, settings: &UserSettings) -> Result<UserSettings> {
        let row = DbUserSettings::from_settings(settings);
        let kept = sqlx::query_as::<_, DbUserSettings>(
            r#"
            INSERT INTO user_settings (user_email, auto_new_review, daily_new_review_count, update_time)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_email) DO UPDATE SET
                auto_new_review = EXCLUDED.auto_new_review,
                daily_new_review_count = EXCLUDED.daily_new_review_count,
                update_time = EXCLUDED.update_time
            WHERE user_settings.update_time < EXCLUDED.update_time
            RETURNING auto_new_review, daily_new_review_count, update_time
            "#,
        )
        .bind(user_email)
        .bind(row.auto_new_review)
        .bind(row.daily_new_review_count)
        .bind(row.update_time)
        .fetch_optional(&self.pool)
        .await?;

        match kept.and_then(DbUserSettings::into_settings) {
            Some(settings) => Ok(settings),
            None => self
                .get_settings(user_email)
                .await?
                .ok_or_else(|| ApiError::Internal(format!("settings for {user_email} vanished"))),
        }
    }
}
