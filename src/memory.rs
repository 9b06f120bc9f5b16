//! In-memory unit of work.
//!
//! Behaves like the PostgreSQL backend where order placement can observe it:
//! writes are staged per session and published atomically on commit, row locks
//! are exclusive and held until the session ends, and the table constraints
//! (unique names, non-negative stock and price, restrict-on-delete foreign keys)
//! are enforced on every write and again at commit.
//!
//! One difference is deliberate: committing a session poisoned by a failed
//! write returns `CommitFailed`, where PostgreSQL answers `COMMIT` on an aborted
//! transaction with a silent rollback.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::model::{normalize_price, Order, OrderLine, Product, User};
use crate::repository::{OrderRepository, ProductRepository, UserRepository};
use crate::unit_of_work::{UnitOfWork, UnitOfWorkSession};
use crate::{StoreError, StoreResult, TransactionAware};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    products: HashMap<Uuid, Product>,
    orders: HashMap<Uuid, Order>,
    order_lines: HashMap<Uuid, OrderLine>,
}

#[derive(Debug, Clone)]
enum Write {
    InsertUser(User),
    DeleteUser(Uuid),
    InsertProduct(Product),
    UpdateStock { id: Uuid, quantity_in_stock: i32 },
    DeleteProduct(Uuid),
    InsertOrder(Order),
    InsertOrderLine(OrderLine),
    DeleteOrder(Uuid),
}

impl Tables {
    fn apply(&mut self, write: &Write) {
        match write {
            Write::InsertUser(user) => {
                self.users.insert(user.id, user.clone());
            }
            Write::DeleteUser(id) => {
                self.users.remove(id);
            }
            Write::InsertProduct(product) => {
                self.products.insert(product.id, product.clone());
            }
            Write::UpdateStock {
                id,
                quantity_in_stock,
            } => {
                if let Some(product) = self.products.get_mut(id) {
                    product.quantity_in_stock = *quantity_in_stock;
                }
            }
            Write::DeleteProduct(id) => {
                self.products.remove(id);
            }
            Write::InsertOrder(order) => {
                self.orders.insert(order.id, order.clone());
            }
            Write::InsertOrderLine(line) => {
                self.order_lines.insert(line.id, line.clone());
            }
            Write::DeleteOrder(id) => {
                self.orders.remove(id);
            }
        }
    }

    /// Same constraints as the SQL schema.
    fn check(&self) -> StoreResult<()> {
        let violation = |msg: String| Err(StoreError::IntegrityViolation(msg));

        let mut usernames = HashMap::new();
        for user in self.users.values() {
            if let Some(reason) = user.constraint_violation() {
                return violation(reason);
            }
            if usernames.insert(user.username.as_str(), user.id).is_some() {
                return violation(format!("duplicate username {:?}", user.username));
            }
        }

        let mut names = HashMap::new();
        for product in self.products.values() {
            if let Some(reason) = product.constraint_violation() {
                return violation(reason);
            }
            if names.insert(product.name.as_str(), product.id).is_some() {
                return violation(format!("duplicate product name {:?}", product.name));
            }
        }

        for order in self.orders.values() {
            if !self.users.contains_key(&order.user_id) {
                return violation(format!(
                    "order {} references missing user {}",
                    order.id, order.user_id
                ));
            }
        }

        let mut positions = HashMap::new();
        for line in self.order_lines.values() {
            if !self.orders.contains_key(&line.order_id) {
                return violation(format!(
                    "order line {} references missing order {}",
                    line.id, line.order_id
                ));
            }
            if !self.products.contains_key(&line.product_id) {
                return violation(format!(
                    "order line {} references missing product {}",
                    line.id, line.product_id
                ));
            }
            if positions.insert((line.order_id, line.line_number), line.id).is_some() {
                return violation(format!(
                    "duplicate line number {} in order {}",
                    line.line_number, line.order_id
                ));
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct Shared {
    tables: RwLock<Tables>,
    row_locks: Mutex<HashMap<Uuid, Arc<RowLock<()>>>>,
}

impl Shared {
    fn row_lock(&self, id: Uuid) -> Arc<RowLock<()>> {
        self.row_locks
            .lock()
            .entry(id)
            .or_insert_with(|| Arc::new(RowLock::new(())))
            .clone()
    }

    /// Forgets locks nobody holds or waits on. Waiters clone the lock under
    /// the same map mutex, so a count of one means the map is the only owner.
    fn prune_row_locks(&self, ids: &[Uuid]) {
        let mut row_locks = self.row_locks.lock();
        for id in ids {
            if row_locks.get(id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                row_locks.remove(id);
            }
        }
    }
}

/// Unit of work over process-local tables. Clones share the same data.
#[derive(Clone, Default)]
pub struct InMemoryUnitOfWork {
    shared: Arc<Shared>,
    lock_timeout: Option<Duration>,
}

impl InMemoryUnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort a session that waits longer than `timeout` for a row lock.
    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    /// Committed copy of a product, read outside any session.
    pub fn committed_product(&self, id: Uuid) -> Option<Product> {
        self.shared.tables.read().products.get(&id).cloned()
    }

    pub fn committed_order_count(&self) -> usize {
        self.shared.tables.read().orders.len()
    }

    pub fn committed_order_line_count(&self) -> usize {
        self.shared.tables.read().order_lines.len()
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    type Session = InMemorySession;

    async fn begin(&self) -> StoreResult<Self::Session> {
        Ok(InMemorySession {
            shared: self.shared.clone(),
            lock_timeout: self.lock_timeout,
            state: Mutex::new(SessionState::default()),
            held_locks: Mutex::new(HashMap::new()),
            observers: RwLock::new(Vec::new()),
        })
    }
}

#[derive(Default)]
struct SessionState {
    writes: Vec<Write>,
    aborted: bool,
}

/// One in-memory transaction.
pub struct InMemorySession {
    shared: Arc<Shared>,
    lock_timeout: Option<Duration>,
    state: Mutex<SessionState>,
    held_locks: Mutex<HashMap<Uuid, OwnedMutexGuard<()>>>,
    observers: RwLock<Vec<Arc<dyn TransactionAware>>>,
}

fn aborted() -> StoreError {
    StoreError::TransactionAborted(
        "current transaction is aborted, commands ignored until end of transaction block"
            .to_string(),
    )
}

impl InMemorySession {
    fn ensure_active(&self) -> StoreResult<()> {
        if self.state.lock().aborted {
            return Err(aborted());
        }
        Ok(())
    }

    /// Committed tables with this session's writes applied on top.
    fn view(&self) -> StoreResult<Tables> {
        let state = self.state.lock();
        if state.aborted {
            return Err(aborted());
        }
        let mut tables = self.shared.tables.read().clone();
        for write in &state.writes {
            tables.apply(write);
        }
        Ok(tables)
    }

    /// Stages `write` if the resulting view satisfies every constraint.
    /// A rejected write poisons the session.
    fn stage(&self, write: Write) -> StoreResult<()> {
        let mut state = self.state.lock();
        if state.aborted {
            return Err(aborted());
        }
        let mut tables = self.shared.tables.read().clone();
        for staged in &state.writes {
            tables.apply(staged);
        }
        tables.apply(&write);
        if let Err(err) = tables.check() {
            state.aborted = true;
            return Err(err);
        }
        state.writes.push(write);
        Ok(())
    }

    async fn acquire_row_lock(&self, id: Uuid) -> StoreResult<()> {
        self.ensure_active()?;
        if self.held_locks.lock().contains_key(&id) {
            return Ok(());
        }

        let lock = self.shared.row_lock(id);
        let guard = match self.lock_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, lock.lock_owned()).await {
                Ok(guard) => guard,
                Err(_) => {
                    warn!(%id, ?timeout, "row lock wait timed out");
                    self.state.lock().aborted = true;
                    return Err(StoreError::TransactionAborted(format!(
                        "canceling statement due to lock timeout on row {id}"
                    )));
                }
            },
            None => lock.lock_owned().await,
        };
        self.held_locks.lock().insert(id, guard);
        Ok(())
    }

    fn release_locks(&self) {
        let released = std::mem::take(&mut *self.held_locks.lock());
        if released.is_empty() {
            return;
        }
        debug!(count = released.len(), "releasing row locks");
        let ids: Vec<Uuid> = released.keys().copied().collect();
        // Guards hold a reference to their lock; drop them before pruning
        drop(released);
        self.shared.prune_row_locks(&ids);
    }

    fn observers(&self) -> Vec<Arc<dyn TransactionAware>> {
        self.observers.read().clone()
    }
}

#[async_trait]
impl UserRepository for InMemorySession {
    async fn insert_user(&self, user: &User) -> StoreResult<User> {
        self.stage(Write::InsertUser(user.clone()))?;
        Ok(user.clone())
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.view()?.users.remove(&id))
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<()> {
        if !self.view()?.users.contains_key(&id) {
            return Err(StoreError::not_found("User", id));
        }
        self.stage(Write::DeleteUser(id))
    }
}

#[async_trait]
impl ProductRepository for InMemorySession {
    async fn insert_product(&self, product: &Product) -> StoreResult<Product> {
        let mut stored = product.clone();
        stored.price = normalize_price(product.price);
        self.stage(Write::InsertProduct(stored.clone()))?;
        Ok(stored)
    }

    async fn find_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(self.view()?.products.remove(&id))
    }

    async fn lock_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        self.acquire_row_lock(id).await?;
        Ok(self.view()?.products.remove(&id))
    }

    async fn update_product_stock(&self, id: Uuid, quantity_in_stock: i32) -> StoreResult<()> {
        self.acquire_row_lock(id).await?;
        if !self.view()?.products.contains_key(&id) {
            return Err(StoreError::not_found("Product", id));
        }
        self.stage(Write::UpdateStock {
            id,
            quantity_in_stock,
        })
    }

    async fn delete_product(&self, id: Uuid) -> StoreResult<()> {
        self.acquire_row_lock(id).await?;
        if !self.view()?.products.contains_key(&id) {
            return Err(StoreError::not_found("Product", id));
        }
        self.stage(Write::DeleteProduct(id))
    }
}

#[async_trait]
impl OrderRepository for InMemorySession {
    async fn insert_order(&self, user_id: Uuid) -> StoreResult<Order> {
        let order = Order {
            id: Uuid::new_v4(),
            user_id,
            created_at: Utc::now(),
        };
        self.stage(Write::InsertOrder(order.clone()))?;
        Ok(order)
    }

    async fn insert_order_line(&self, line: &OrderLine) -> StoreResult<OrderLine> {
        self.stage(Write::InsertOrderLine(line.clone()))?;
        Ok(line.clone())
    }

    async fn find_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.view()?.orders.remove(&id))
    }

    async fn order_lines(&self, order_id: Uuid) -> StoreResult<Vec<OrderLine>> {
        let mut lines: Vec<OrderLine> = self
            .view()?
            .order_lines
            .into_values()
            .filter(|line| line.order_id == order_id)
            .collect();
        lines.sort_by_key(|line| line.line_number);
        Ok(lines)
    }

    async fn delete_order(&self, id: Uuid) -> StoreResult<()> {
        if !self.view()?.orders.contains_key(&id) {
            return Err(StoreError::not_found("Order", id));
        }
        self.stage(Write::DeleteOrder(id))
    }
}

#[async_trait]
impl UnitOfWorkSession for InMemorySession {
    fn register_transaction_aware(&self, observer: Arc<dyn TransactionAware>) {
        self.observers.write().push(observer);
    }

    async fn commit(self) -> StoreResult<()> {
        let state = std::mem::take(&mut *self.state.lock());
        if state.aborted {
            self.release_locks();
            return Err(StoreError::CommitFailed(
                "transaction was aborted and has been rolled back".to_string(),
            ));
        }

        {
            let mut committed = self.shared.tables.write();
            let mut candidate = committed.clone();
            for write in &state.writes {
                candidate.apply(write);
            }
            // Concurrent sessions may have committed conflicting rows meanwhile
            if let Err(err) = candidate.check() {
                drop(committed);
                self.release_locks();
                return Err(err);
            }
            *committed = candidate;
        }
        // Locks are released only after the writes are visible
        self.release_locks();

        for observer in self.observers() {
            if let Err(err) = observer.on_commit().await {
                error!(error = %err, "commit observer failed");
            }
        }
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        self.state.lock().writes.clear();
        self.release_locks();

        for observer in self.observers() {
            if let Err(err) = observer.on_rollback().await {
                error!(error = %err, "rollback observer failed");
            }
        }
        Ok(())
    }
}
