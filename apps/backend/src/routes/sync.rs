//! Sync endpoints

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::routes::auth::AuthenticatedUser;
use crate::AppState;

/// Table exchanged through `POST /api/sync/{table}`.
pub const WORD_BOOK_TABLE: &str = "WordBookEntry";

/// GET /api/sync/{table}
/// Dictionary rows past the `(updated_after, after_id)` cursor
pub async fn pull(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(query): Query<PullQuery>,
) -> Result<Response> {
    check_limit(query.limit)?;

    let response = match table.as_str() {
        "Word" => Json(state.db.words_since(&query).await?).into_response(),
        "WordIndex" => Json(state.db.word_indexes_since(&query).await?).into_response(),
        "Lexeme" => Json(state.db.lexemes_since(&query).await?).into_response(),
        "Article" => Json(state.db.articles_since(&query).await?).into_response(),
        WORD_BOOK_TABLE => {
            return Err(ApiError::BadRequest(format!(
                "{WORD_BOOK_TABLE} is exchanged with POST"
            )))
        }
        other => return Err(ApiError::NotFound(format!("table {other}"))),
    };

    tracing::debug!(
        table = %table,
        updated_after = query.updated_after,
        after_id = query.after_id.as_deref().unwrap_or_default(),
        "served pull page"
    );
    Ok(response)
}

/// POST /api/sync/{table}
/// Merge the uploaded entries, then return the page of the caller's
/// entries received in `[from, to)`
pub async fn exchange(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(table): Path<String>,
    Query(window): Query<ExchangeQuery>,
    Json(entries): Json<Vec<WordBookEntry>>,
) -> Result<Json<Vec<WordBookEntry>>> {
    if table != WORD_BOOK_TABLE {
        return Err(ApiError::NotFound(format!("table {table} is read-only")));
    }
    check_limit(window.limit)?;
    if window.from > window.to {
        return Err(ApiError::BadRequest(format!(
            "empty window: from {} is after to {}",
            window.from, window.to
        )));
    }
    if let Some(entry) = entries.iter().find(|e| e.id.is_empty() || e.word_id.is_empty()) {
        return Err(ApiError::BadRequest(format!(
            "entry without id or word_id: {:?}",
            entry.id
        )));
    }

    let received_at = Utc::now().timestamp_millis();
    let written = state
        .db
        .save_entries(&auth.user_email, &entries, received_at)
        .await?;
    let changed = state.db.entries_in_window(&auth.user_email, &window).await?;

    tracing::debug!(
        user = %auth.user_email,
        uploaded = entries.len(),
        written,
        returned = changed.len(),
        from = window.from,
        to = window.to,
        after_id = window.after_id.as_deref().unwrap_or_default(),
        "word book exchanged"
    );
    Ok(Json(changed))
}

/// GET /api/sync/UserSettings
/// The caller's stored settings, or `null` before the first upload
pub async fn get_settings(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<Option<UserSettings>>> {
    Ok(Json(state.db.get_settings(&auth.user_email).await?))
}

/// POST /api/sync/UserSettings
/// Keep the newer of the uploaded and stored settings and return it
pub async fn exchange_settings(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(settings): Json<UserSettings>,
) -> Result<Json<UserSettings>> {
    if !settings.is_valid() {
        return Err(ApiError::BadRequest(format!(
            "daily_new_review_count {} out of range",
            settings.daily_new_review_count
        )));
    }

    let kept = state.db.save_settings(&auth.user_email, &settings).await?;
    tracing::debug!(
        user = %auth.user_email,
        sent = settings.update_time,
        kept = kept.update_time,
        "settings exchanged"
    );
    Ok(Json(kept))
}

fn check_limit(limit: i64) -> Result<()> {
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    Ok(())
}
