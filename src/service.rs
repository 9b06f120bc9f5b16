//! Transactional entry points used by the request-handling layer.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::model::{PlacedOrder, Product, User};
use crate::order_placement::place_order_in;
use crate::repository::{OrderRepository, ProductRepository, UserRepository};
use crate::unit_of_work::{UnitOfWork, UnitOfWorkSession};
use crate::{StoreError, StoreResult, TransactionAware};

/// Runs each store operation in its own unit-of-work session.
///
/// Every operation either commits fully or rolls back; failed calls leave no
/// durable effect and are safe to repeat.
pub struct StoreService<U: UnitOfWork> {
    uow: U,
    observers: Vec<Arc<dyn TransactionAware>>,
    stock_precheck: bool,
}

impl<U: UnitOfWork> StoreService<U> {
    pub fn new(uow: U) -> Self {
        Self {
            uow,
            observers: Vec::new(),
            stock_precheck: true,
        }
    }

    /// Enables or disables the unlocked availability pre-check run before any
    /// row is locked. The locked decrement enforces stock either way.
    pub fn with_stock_precheck(mut self, enabled: bool) -> Self {
        self.stock_precheck = enabled;
        self
    }

    /// Attaches `observer` to every session this service opens.
    pub fn with_observer(mut self, observer: Arc<dyn TransactionAware>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn unit_of_work(&self) -> &U {
        &self.uow
    }

    async fn begin(&self) -> StoreResult<U::Session> {
        let session = self.uow.begin().await?;
        for observer in &self.observers {
            session.register_transaction_aware(observer.clone());
        }
        Ok(session)
    }

    /// Commits on success, rolls back on failure and returns the original error.
    async fn finish<T>(&self, session: U::Session, result: StoreResult<T>) -> StoreResult<T> {
        match result {
            Ok(value) => {
                session.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = session.rollback().await {
                    error!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn create_user(&self, username: &str) -> StoreResult<User> {
        let session = self.begin().await?;
        let result = session.insert_user(&User::new(username)).await;
        self.finish(session, result).await
    }

    #[instrument(skip(self))]
    pub async fn create_product(
        &self,
        name: &str,
        price: Decimal,
        quantity_in_stock: i32,
    ) -> StoreResult<Product> {
        let product = Product::new(name, price, quantity_in_stock);
        product.validate()?;

        let session = self.begin().await?;
        let result = session.insert_product(&product).await;
        let product = self.finish(session, result).await?;
        info!(product_id = %product.id, "product created");
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> StoreResult<Product> {
        let session = self.begin().await?;
        let result = session
            .find_product(product_id)
            .await
            .and_then(|found| found.ok_or_else(|| StoreError::not_found("Product", product_id)));
        self.finish(session, result).await
    }

    /// Fails with `IntegrityViolation` while any order line references the product.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, product_id: Uuid) -> StoreResult<()> {
        let session = self.begin().await?;
        let result = session.delete_product(product_id).await;
        self.finish(session, result).await
    }

    /// Places one order: one line and one stock decrement per product reference,
    /// all in a single transaction.
    #[instrument(skip(self, product_ids), fields(lines = product_ids.len()))]
    pub async fn place_order(&self, user_id: Uuid, product_ids: &[Uuid]) -> StoreResult<PlacedOrder> {
        let session = self.begin().await?;
        let result = place_order_in(&session, user_id, product_ids, self.stock_precheck).await;
        if let Err(err) = &result {
            warn!(error = %err, "order placement failed, rolling back");
        }
        let placed = self.finish(session, result).await?;
        info!(order_id = %placed.id, "order placed");
        Ok(placed)
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> StoreResult<PlacedOrder> {
        let session = self.begin().await?;
        let result = async {
            let order = session
                .find_order(order_id)
                .await?
                .ok_or_else(|| StoreError::not_found("Order", order_id))?;
            let lines = session.order_lines(order_id).await?;
            Ok::<_, StoreError>(PlacedOrder::from_parts(order, &lines))
        }
        .await;
        self.finish(session, result).await
    }
}
