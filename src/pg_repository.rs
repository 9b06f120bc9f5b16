//! Repository implementations on top of a PostgreSQL session.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::model::{Order, OrderLine, Product, User};
use crate::repository::{OrderRepository, ProductRepository, UserRepository};
use crate::unit_of_work::PostgresUnitOfWorkSession;
use crate::{StoreError, StoreResult};

fn user_from_row(r: &PgRow) -> User {
    User {
        id: r.get("id"),
        username: r.get("username"),
    }
}

fn product_from_row(r: &PgRow) -> Product {
    Product {
        id: r.get("id"),
        name: r.get("name"),
        price: r.get("price"),
        quantity_in_stock: r.get("quantity_in_stock"),
    }
}

fn order_from_row(r: &PgRow) -> Order {
    Order {
        id: r.get("id"),
        user_id: r.get("user_id"),
        created_at: r.get("created_at"),
    }
}

fn order_line_from_row(r: &PgRow) -> OrderLine {
    OrderLine {
        id: r.get("id"),
        order_id: r.get("order_id"),
        product_id: r.get("product_id"),
        line_number: r.get("line_number"),
    }
}

#[async_trait]
impl UserRepository for PostgresUnitOfWorkSession {
    async fn insert_user(&self, user: &User) -> StoreResult<User> {
        let mut tx_guard = self.executor.guard().await;
        let tx = tx_guard.as_mut().ok_or(sqlx::Error::PoolClosed)?;
        let row = sqlx::query("INSERT INTO users (id, username) VALUES ($1, $2) RETURNING id, username")
            .bind(user.id)
            .bind(&user.username)
            .fetch_one(&mut **tx)
            .await?;
        Ok(user_from_row(&row))
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let mut tx_guard = self.executor.guard().await;
        let tx = tx_guard.as_mut().ok_or(sqlx::Error::PoolClosed)?;
        let row = sqlx::query("SELECT id, username FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<()> {
        let mut tx_guard = self.executor.guard().await;
        let tx = tx_guard.as_mut().ok_or(sqlx::Error::PoolClosed)?;
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("User", id));
        }
        Ok(())
    }
}

#[async_trait]
impl ProductRepository for PostgresUnitOfWorkSession {
    async fn insert_product(&self, product: &Product) -> StoreResult<Product> {
        let mut tx_guard = self.executor.guard().await;
        let tx = tx_guard.as_mut().ok_or(sqlx::Error::PoolClosed)?;
        let row = sqlx::query(
            r#"
            INSERT INTO products (id, name, price, quantity_in_stock)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, price, quantity_in_stock
            "#,
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(product.price)
        .bind(product.quantity_in_stock)
        .fetch_one(&mut **tx)
        .await?;
        Ok(product_from_row(&row))
    }

    async fn find_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        let mut tx_guard = self.executor.guard().await;
        let tx = tx_guard.as_mut().ok_or(sqlx::Error::PoolClosed)?;
        let row = sqlx::query("SELECT id, name, price, quantity_in_stock FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row.as_ref().map(product_from_row))
    }

    async fn lock_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        let mut tx_guard = self.executor.guard().await;
        let tx = tx_guard.as_mut().ok_or(sqlx::Error::PoolClosed)?;
        // Blocks while another transaction holds the row
        let row = sqlx::query(
            "SELECT id, name, price, quantity_in_stock FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.as_ref().map(product_from_row))
    }

    async fn update_product_stock(&self, id: Uuid, quantity_in_stock: i32) -> StoreResult<()> {
        let mut tx_guard = self.executor.guard().await;
        let tx = tx_guard.as_mut().ok_or(sqlx::Error::PoolClosed)?;
        let result = sqlx::query("UPDATE products SET quantity_in_stock = $2 WHERE id = $1")
            .bind(id)
            .bind(quantity_in_stock)
            .execute(&mut **tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Product", id));
        }
        Ok(())
    }

    async fn delete_product(&self, id: Uuid) -> StoreResult<()> {
        let mut tx_guard = self.executor.guard().await;
        let tx = tx_guard.as_mut().ok_or(sqlx::Error::PoolClosed)?;
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Product", id));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PostgresUnitOfWorkSession {
    async fn insert_order(&self, user_id: Uuid) -> StoreResult<Order> {
        let mut tx_guard = self.executor.guard().await;
        let tx = tx_guard.as_mut().ok_or(sqlx::Error::PoolClosed)?;
        let row = sqlx::query(
            "INSERT INTO orders (id, user_id) VALUES ($1, $2) RETURNING id, user_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(order_from_row(&row))
    }

    async fn insert_order_line(&self, line: &OrderLine) -> StoreResult<OrderLine> {
        let mut tx_guard = self.executor.guard().await;
        let tx = tx_guard.as_mut().ok_or(sqlx::Error::PoolClosed)?;
        let row = sqlx::query(
            r#"
            INSERT INTO order_lines (id, order_id, product_id, line_number)
            VALUES ($1, $2, $3, $4)
            RETURNING id, order_id, product_id, line_number
            "#,
        )
        .bind(line.id)
        .bind(line.order_id)
        .bind(line.product_id)
        .bind(line.line_number)
        .fetch_one(&mut **tx)
        .await?;
        Ok(order_line_from_row(&row))
    }

    async fn find_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let mut tx_guard = self.executor.guard().await;
        let tx = tx_guard.as_mut().ok_or(sqlx::Error::PoolClosed)?;
        let row = sqlx::query("SELECT id, user_id, created_at FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row.as_ref().map(order_from_row))
    }

    async fn order_lines(&self, order_id: Uuid) -> StoreResult<Vec<OrderLine>> {
        let mut tx_guard = self.executor.guard().await;
        let tx = tx_guard.as_mut().ok_or(sqlx::Error::PoolClosed)?;
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, line_number
            FROM order_lines
            WHERE order_id = $1
            ORDER BY line_number
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(rows.iter().map(order_line_from_row).collect())
    }

    async fn delete_order(&self, id: Uuid) -> StoreResult<()> {
        let mut tx_guard = self.executor.guard().await;
        let tx = tx_guard.as_mut().ok_or(sqlx::Error::PoolClosed)?;
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Order", id));
        }
        Ok(())
    }
}
