//! Common test utilities and fixtures for integration tests.
//!
//! # Requirements
//! Integration tests require a PostgreSQL database (set DATABASE_URL env var).

pub mod fixtures;

use std::sync::Arc;

use axum::Router;
use chrono::{Duration, Utc};

use lass_backend::db::Database;
use lass_backend::models::{Article, Word};
use lass_backend::AppState;

/// Test context containing database connection and router.
pub struct TestContext {
    pub db: Arc<Database>,
    app: Router,
}

impl TestContext {
    /// Create a new test context.
    ///
    /// # Panics
    /// Panics if DATABASE_URL is not set or database connection fails.
    pub async fn new() -> Self {
        dotenvy::dotenv().ok();

        let database_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");

        let db = Database::connect(&database_url)
            .await
            .expect("Failed to connect to test database");

        db.run_migrations()
            .await
            .expect("Failed to run migrations");

        let db = Arc::new(db);
        let app = lass_backend::router(AppState { db: db.clone() });

        Self { db, app }
    }

    /// Get the router for use with axum-test.
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    /// Create a session for a user and return its token.
    pub async fn create_session(&self, user_email: &str) -> String {
        self.db
            .create_session(user_email, None)
            .await
            .expect("Failed to create test session")
            .token
    }

    /// Create a session that expired an hour ago.
    pub async fn create_expired_session(&self, user_email: &str) -> String {
        self.db
            .create_session(user_email, Some(Utc::now() - Duration::hours(1)))
            .await
            .expect("Failed to create test session")
            .token
    }

    /// Format authorization header value.
    pub fn auth_header_value(token: &str) -> String {
        format!("Bearer {}", token)
    }

    pub async fn insert_words(&self, words: &[Word]) {
        for word in words {
            sqlx::query(
                r#"
                INSERT INTO words (id, lemma, part_of_speech, phonetic, phonetic_url, frequency, update_time)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(&word.id)
            .bind(&word.lemma)
            .bind(&word.part_of_speech)
            .bind(&word.phonetic)
            .bind(&word.phonetic_url)
            .bind(word.frequency)
            .bind(word.update_time)
            .execute(self.db.pool())
            .await
            .expect("Failed to insert word");
        }
    }

    pub async fn insert_articles(&self, articles: &[Article]) {
        for article in articles {
            sqlx::query(
                r#"
                INSERT INTO articles (id, title, content, url, voice_url, update_time)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(&article.id)
            .bind(&article.title)
            .bind(&article.content)
            .bind(&article.url)
            .bind(&article.voice_url)
            .bind(article.update_time)
            .execute(self.db.pool())
            .await
            .expect("Failed to insert article");
        }
    }

    /// Remove dictionary rows whose id starts with `prefix`.
    pub async fn cleanup_dictionary(&self, prefix: &str) {
        for table in ["words", "word_indexes", "lexemes", "articles"] {
            let _ = sqlx::query(&format!("DELETE FROM {table} WHERE id LIKE $1"))
                .bind(format!("{prefix}%"))
                .execute(self.db.pool())
                .await;
        }
    }

    /// Remove a user's entries, settings and sessions.
    pub async fn cleanup_user(&self, user_email: &str) {
        for table in ["word_book_entries", "user_settings"] {
            let _ = sqlx::query(&format!("DELETE FROM {table} WHERE user_email = $1"))
                .bind(user_email)
                .execute(self.db.pool())
                .await;
        }

        let _ = sqlx::query("DELETE FROM sessions WHERE user_email = $1")
            .bind(user_email)
            .execute(self.db.pool())
            .await;
    }
}
