//! Client configuration from the environment.

use std::path::PathBuf;

const DEFAULT_SERVER_URL: &str = "http://localhost:3000";

/// Runtime settings of the sync client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the sync server.
    pub server_url: String,
    /// Local SQLite file.
    pub db_path: PathBuf,
    /// Session token identifying the user; word book sync is skipped
    /// without one.
    pub session_token: Option<String>,
    /// Keep running and sync each table on its own interval.
    pub auto_sync: bool,
    /// Dictionary snapshot loaded into tables that were never synced.
    pub snapshot_dir: Option<PathBuf>,
}

impl Config {
    /// Read `LASS_SERVER_URL`, `LASS_DB_PATH`, `LASS_SESSION_TOKEN`,
    /// `LASS_AUTO_SYNC` and `LASS_SNAPSHOT_DIR`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let server_url = lookup("LASS_SERVER_URL")
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let db_path = lookup("LASS_DB_PATH")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_db_path);
        let session_token = lookup("LASS_SESSION_TOKEN").filter(|token| !token.trim().is_empty());
        let auto_sync = lookup("LASS_AUTO_SYNC")
            .map(|value| parse_flag(&value))
            .unwrap_or(false);
        let snapshot_dir = lookup("LASS_SNAPSHOT_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from);

        Self {
            server_url,
            db_path,
            session_token,
            auto_sync,
            snapshot_dir,
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lass")
        .join("lass.db")
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
