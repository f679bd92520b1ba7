//! Shared handle to the local store.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::db::{DbError, SqliteRepository};

/// Store handle passed to every component that reads or writes local data.
///
/// The lock is never held across an `.await`.
pub type Store = Arc<Mutex<SqliteRepository>>;

pub fn new_store(repository: SqliteRepository) -> Store {
    Arc::new(Mutex::new(repository))
}

pub fn lock_store(store: &Store) -> Result<MutexGuard<'_, SqliteRepository>, DbError> {
    store.lock().map_err(|_| DbError::Poisoned)
}

/// Run `f` with the store locked.
pub fn with_store<T>(
    store: &Store,
    f: impl FnOnce(&SqliteRepository) -> Result<T, DbError>,
) -> Result<T, DbError> {
    let repo = lock_store(store)?;
    f(&repo)
}
