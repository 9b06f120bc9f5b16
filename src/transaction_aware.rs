use async_trait::async_trait;

use crate::StoreResult;

/// Trait for components that need to be notified of transaction lifecycle events.
///
/// Observers registered with a session are called once the underlying
/// transaction has finished, so `on_commit` only ever sees durable state.
#[async_trait]
pub trait TransactionAware: Send + Sync {
    /// Called after a successful transaction commit.
    async fn on_commit(&self) -> StoreResult<()>;

    /// Called after a transaction rollback.
    async fn on_rollback(&self) -> StoreResult<()>;
}
