//! Stock ledger operations.
//!
//! `decrement_stock` is the only code path that writes `quantity_in_stock`
//! after a product is created. It runs inside the caller's session, so the row
//! lock it takes is held until that session commits or rolls back.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::Product;
use crate::repository::ProductRepository;
use crate::{StoreError, StoreResult};

/// Advisory availability check on an unlocked read.
///
/// A product that passes here can still run out before the caller's locked
/// decrement; only `decrement_stock` is authoritative.
pub async fn ensure_in_stock<R>(repo: &R, product_id: Uuid) -> StoreResult<Product>
where
    R: ProductRepository + ?Sized,
{
    let product = repo
        .find_product(product_id)
        .await?
        .ok_or_else(|| StoreError::not_found("Product", product_id))?;
    if !product.is_in_stock() {
        warn!(%product_id, "product out of stock (pre-check)");
        return Err(StoreError::OutOfStock { product_id });
    }
    Ok(product)
}

/// Removes exactly one unit of stock for one order line.
///
/// Locks the product row, re-reads the quantity under the lock, decrements it
/// by one and writes it back. Concurrent decrements of the same product are
/// serialized by the lock; the last unit goes to whichever session locks first
/// and the others see zero and fail with `OutOfStock`. The storage constraint
/// rejects a negative value even if this check is bypassed.
pub async fn decrement_stock<R>(repo: &R, product_id: Uuid) -> StoreResult<Product>
where
    R: ProductRepository + ?Sized,
{
    let mut product = repo
        .lock_product(product_id)
        .await?
        .ok_or_else(|| StoreError::not_found("Product", product_id))?;

    if !product.is_in_stock() {
        warn!(%product_id, "product out of stock under lock");
        return Err(StoreError::OutOfStock { product_id });
    }

    product.quantity_in_stock -= 1;
    repo.update_product_stock(product_id, product.quantity_in_stock)
        .await?;
    debug!(%product_id, remaining = product.quantity_in_stock, "stock decremented");
    Ok(product)
}
