use sqlx::{Postgres, Transaction};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::StoreResult;

/// Executor wraps a database transaction for use by repositories.
///
/// Every repository call made through a session runs on this one transaction,
/// so row locks taken by `SELECT ... FOR UPDATE` stay held until the session
/// commits or rolls back.
#[derive(Clone, Debug)]
pub struct Executor {
    pub tx: Arc<Mutex<Option<Transaction<'static, Postgres>>>>,
}

impl Executor {
    /// Creates a new Executor from a PostgreSQL transaction.
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
        }
    }

    /// Locks the transaction slot for one statement.
    pub(crate) async fn guard(&self) -> MutexGuard<'_, Option<Transaction<'static, Postgres>>> {
        self.tx.lock().await
    }

    /// Takes ownership of the transaction, leaving None in its place.
    /// This should only be called when committing or rolling back.
    pub(crate) async fn take_transaction(&self) -> StoreResult<Transaction<'static, Postgres>> {
        Ok(self.tx.lock().await.take().ok_or(sqlx::Error::PoolClosed)?)
    }
}
