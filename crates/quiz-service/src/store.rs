//! Transactional access to per-user state.

use std::sync::Arc;

use quiz_db::queries::{answers, state};
use quiz_db::DbError;
use quiz_types::UserState;
use rusqlite::{Connection, TransactionBehavior};
use tokio::sync::Mutex;

use crate::locks::KeyedLocks;

/// Owns the database handle and serializes read-modify-write cycles per
/// user.
#[derive(Clone)]
pub struct UserStateStore {
    db: Arc<Mutex<Connection>>,
    locks: Arc<KeyedLocks>,
}

impl UserStateStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self {
            db,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    pub fn db(&self) -> &Arc<Mutex<Connection>> {
        &self.db
    }

    /// Run `f` against the user's state inside an exclusive transaction.
    ///
    /// The row is created with a random session id when missing. `f` gets
    /// a mutable copy and must call [`state::persist`] for its changes to
    /// stick. The transaction commits only when `f` returns `Ok`; any error
    /// rolls back everything `f` wrote. Once the transaction has begun it
    /// runs to completion without yielding, so a dropped caller cannot
    /// leave it half applied.
    pub async fn with_user_state<T, E, F>(&self, user_id: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection, &mut UserState) -> Result<T, E>,
        E: From<DbError>,
    {
        let _row_lock = self.locks.lock(user_id).await;
        let mut conn = self.db.lock().await;

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(DbError::from)?;
        let mut user_state =
            state::get_or_create(&tx, user_id, &crate::random_id(), crate::unix_now())?;

        let output = f(&tx, &mut user_state)?;
        tx.commit().map_err(DbError::from)?;
        Ok(output)
    }

    /// The stored response for a previously accepted answer, if any.
    pub async fn fetch_idempotent_response(
        &self,
        user_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<String>, DbError> {
        let conn = self.db.lock().await;
        answers::fetch_response(&conn, user_id, idempotency_key)
    }

    /// Run a read-only query without taking any user lock.
    pub async fn read<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        let conn = self.db.lock().await;
        f(&conn)
    }
}
