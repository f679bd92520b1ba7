//! Local SQLite entry store.

pub mod error;
pub mod repository;
pub mod schema;

pub use error::DbError;
pub use repository::{
    DictionaryRepository, MetaRepository, SettingsRepository, SqliteRepository,
    WordBookRepository,
};
