use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::repository::{OrderRepository, ProductRepository, UserRepository};
use crate::{Executor, StoreResult, TransactionAware};

/// Unit of Work pattern for managing database transactions.
///
/// The UnitOfWork manages the lifecycle of database transactions and provides
/// a factory method to create new transaction sessions.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    type Session: UnitOfWorkSession;

    /// Begin a new transaction session.
    async fn begin(&self) -> StoreResult<Self::Session>;
}

/// Represents a single database transaction session.
///
/// A session exposes the repositories bound to its transaction. Dropping a
/// session without committing rolls the transaction back and releases every
/// row lock it holds.
#[async_trait]
pub trait UnitOfWorkSession:
    UserRepository + ProductRepository + OrderRepository + Send + Sync
{
    /// Register a component that needs to be notified of transaction events.
    fn register_transaction_aware(&self, observer: Arc<dyn TransactionAware>);

    /// Commit the transaction and notify all registered observers.
    ///
    /// Once the transaction is durable this returns `Ok`; observer failures are
    /// logged and never turn a committed transaction into a reported failure.
    async fn commit(self) -> StoreResult<()>;

    /// Rollback the transaction and notify all registered observers.
    async fn rollback(self) -> StoreResult<()>;
}

/// Default implementation of UnitOfWork for PostgreSQL.
pub struct PostgresUnitOfWork {
    pool: Arc<PgPool>,
    lock_timeout: Option<Duration>,
}

impl PostgresUnitOfWork {
    /// Create a new PostgresUnitOfWork with the given connection pool.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self {
            pool,
            lock_timeout: None,
        }
    }

    /// Abort any transaction that waits longer than `timeout` for a row lock.
    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout.filter(|t| !t.is_zero());
        self
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    type Session = PostgresUnitOfWorkSession;

    async fn begin(&self) -> StoreResult<Self::Session> {
        let mut tx = self.pool.begin().await?;
        if let Some(timeout) = self.lock_timeout {
            // is_local = true scopes the setting to this transaction
            sqlx::query("SELECT set_config('lock_timeout', $1, true)")
                .bind(format!("{}ms", timeout.as_millis()))
                .execute(&mut *tx)
                .await?;
        }
        Ok(PostgresUnitOfWorkSession::new(tx))
    }
}

/// Default implementation of UnitOfWorkSession for PostgreSQL.
pub struct PostgresUnitOfWorkSession {
    pub(crate) executor: Executor,
    observers: Arc<RwLock<Vec<Arc<dyn TransactionAware>>>>,
}

impl PostgresUnitOfWorkSession {
    /// Create a new session from a PostgreSQL transaction.
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self {
            executor: Executor::new(tx),
            observers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Get the executor for this session (provides access to the transaction).
    pub fn executor(&self) -> &Executor {
        &self.executor
    }
}

#[async_trait]
impl UnitOfWorkSession for PostgresUnitOfWorkSession {
    fn register_transaction_aware(&self, observer: Arc<dyn TransactionAware>) {
        self.observers.write().push(observer);
    }

    async fn commit(self) -> StoreResult<()> {
        let tx = self.executor.take_transaction().await?;

        // Row locks are released here
        tx.commit().await?;
        debug!("postgres transaction committed");

        let observers = self.observers.read().clone();
        for observer in observers.iter() {
            if let Err(err) = observer.on_commit().await {
                error!(error = %err, "commit observer failed");
            }
        }
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        let tx = self.executor.take_transaction().await?;

        tx.rollback().await?;
        debug!("postgres transaction rolled back");

        let observers = self.observers.read().clone();
        for observer in observers.iter() {
            if let Err(err) = observer.on_rollback().await {
                error!(error = %err, "rollback observer failed");
            }
        }
        Ok(())
    }
}
