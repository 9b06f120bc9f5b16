//! Data-access interface shared by every storage backend.
//!
//! Each trait is implemented by a unit-of-work session, so every call runs
//! inside that session's transaction.

use async_trait::async_trait;
use uuid::Uuid;

use crate::model::{Order, OrderLine, Product, User};
use crate::StoreResult;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert_user(&self, user: &User) -> StoreResult<User>;

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    /// Fails with an integrity violation while the user owns orders.
    async fn delete_user(&self, id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Stores a product; the returned copy carries the stored (rounded) price.
    async fn insert_product(&self, product: &Product) -> StoreResult<Product>;

    /// Plain read, no lock taken.
    async fn find_product(&self, id: Uuid) -> StoreResult<Option<Product>>;

    /// Takes an exclusive row lock on the product, held until the session ends,
    /// and returns the row as seen under that lock. Joining a lock the session
    /// already holds returns immediately.
    async fn lock_product(&self, id: Uuid) -> StoreResult<Option<Product>>;

    /// Writes a new stock level. Takes the row lock if not already held; the
    /// storage rejects negative values.
    async fn update_product_stock(&self, id: Uuid, quantity_in_stock: i32) -> StoreResult<()>;

    /// Fails with an integrity violation while order lines reference it.
    async fn delete_product(&self, id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Creates an order header stamped with the creation time.
    async fn insert_order(&self, user_id: Uuid) -> StoreResult<Order>;

    async fn insert_order_line(&self, line: &OrderLine) -> StoreResult<OrderLine>;

    async fn find_order(&self, id: Uuid) -> StoreResult<Option<Order>>;

    /// Lines of an order, ordered by line number.
    async fn order_lines(&self, order_id: Uuid) -> StoreResult<Vec<OrderLine>>;

    /// Fails with an integrity violation while the order has lines.
    async fn delete_order(&self, id: Uuid) -> StoreResult<()>;
}
