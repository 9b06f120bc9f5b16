//! Store Orders
//!
//! Order placement with a lock-protected stock ledger. Every unit ordered
//! removes exactly one unit of stock, inside the same transaction that writes
//! the order, even when orders for the same product arrive concurrently.
//!
//! Storage is reached only through the unit-of-work and repository traits, with
//! a PostgreSQL backend for production and an in-memory backend for tests.

pub mod config;
pub mod error;
pub mod executor;
pub mod memory;
pub mod model;
mod order_placement;
pub mod pg_repository;
pub mod repository;
pub mod schema;
pub mod service;
pub mod stock_ledger;
pub mod telemetry;
pub mod transaction_aware;
pub mod unit_of_work;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use executor::Executor;
pub use memory::{InMemorySession, InMemoryUnitOfWork};
pub use model::{Order, OrderLine, PlacedOrder, Product, User};
pub use repository::{OrderRepository, ProductRepository, UserRepository};
pub use service::StoreService;
pub use transaction_aware::TransactionAware;
pub use unit_of_work::{PostgresUnitOfWork, PostgresUnitOfWorkSession, UnitOfWork, UnitOfWorkSession};
