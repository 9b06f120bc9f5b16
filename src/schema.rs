//! Idempotent DDL for the store relations.

use sqlx::PgPool;
use tracing::info;

use crate::StoreResult;

const CREATE_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        username VARCHAR(150) NOT NULL UNIQUE CHECK (username <> '')
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id UUID PRIMARY KEY,
        name VARCHAR(64) NOT NULL UNIQUE CHECK (name <> ''),
        price NUMERIC(20, 2) NOT NULL CHECK (price >= 0),
        quantity_in_stock INTEGER NOT NULL CHECK (quantity_in_stock >= 0)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS order_lines (
        id UUID PRIMARY KEY,
        order_id UUID NOT NULL REFERENCES orders(id) ON DELETE RESTRICT,
        product_id UUID NOT NULL REFERENCES products(id) ON DELETE RESTRICT,
        line_number INTEGER NOT NULL,
        UNIQUE (order_id, line_number)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS order_lines_product_id_idx ON order_lines(product_id)",
];

const DROP_STATEMENTS: &[&str] = &[
    "DROP TABLE IF EXISTS order_lines CASCADE",
    "DROP TABLE IF EXISTS orders CASCADE",
    "DROP TABLE IF EXISTS products CASCADE",
    "DROP TABLE IF EXISTS users CASCADE",
];

/// Creates the users, products, orders and order_lines tables if missing.
pub async fn create_schema(pool: &PgPool) -> StoreResult<()> {
    for statement in CREATE_STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("store schema ready");
    Ok(())
}

/// Drops every store table. Intended for test teardown.
pub async fn drop_schema(pool: &PgPool) -> StoreResult<()> {
    for statement in DROP_STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
