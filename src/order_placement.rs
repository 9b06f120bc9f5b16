use uuid::Uuid;

use crate::model::{OrderLine, PlacedOrder};
use crate::stock_ledger::{decrement_stock, ensure_in_stock};
use crate::unit_of_work::UnitOfWorkSession;
use crate::{StoreError, StoreResult};

/// Writes one order and its lines into `session`, decrementing stock once per line.
///
/// Nothing is committed here. On error the caller must roll the session back,
/// which discards the order header, any lines already written and every
/// decrement made so far.
pub(crate) async fn place_order_in<S>(
    session: &S,
    user_id: Uuid,
    product_ids: &[Uuid],
    stock_precheck: bool,
) -> StoreResult<PlacedOrder>
where
    S: UnitOfWorkSession,
{
    if product_ids.is_empty() {
        return Err(StoreError::Validation(
            "an order must reference at least one product".to_string(),
        ));
    }
    if session.find_user(user_id).await?.is_none() {
        return Err(StoreError::not_found("User", user_id));
    }

    if stock_precheck {
        for &product_id in product_ids {
            ensure_in_stock(session, product_id).await?;
        }
    }

    // Lock in ascending id order so two orders over the same products never
    // wait on each other in a cycle. Per-line decrements rejoin these locks.
    let mut lock_order = product_ids.to_vec();
    lock_order.sort_unstable();
    lock_order.dedup();
    for &product_id in &lock_order {
        if session.lock_product(product_id).await?.is_none() {
            return Err(StoreError::not_found("Product", product_id));
        }
    }

    let order = session.insert_order(user_id).await?;
    let mut lines = Vec::with_capacity(product_ids.len());
    for (line_number, &product_id) in product_ids.iter().enumerate() {
        let line_number = i32::try_from(line_number)
            .map_err(|_| StoreError::Validation("too many order lines".to_string()))?;
        let line = session
            .insert_order_line(&OrderLine::new(order.id, product_id, line_number))
            .await?;
        decrement_stock(session, product_id).await?;
        lines.push(line);
    }

    Ok(PlacedOrder::from_parts(order, &lines))
}
