use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{StoreError, StoreResult};

/// Maximum product name length, in characters.
pub const PRODUCT_NAME_MAX_LEN: usize = 64;
/// Maximum username length, in characters.
pub const USERNAME_MAX_LEN: usize = 150;
/// Digits kept after the decimal point for stored prices.
pub const PRICE_SCALE: u32 = 2;
/// `NUMERIC(20, 2)` leaves 18 integer digits.
const PRICE_INTEGER_DIGITS: u32 = 18;

/// Owner of orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
        }
    }

    pub(crate) fn constraint_violation(&self) -> Option<String> {
        if self.username.is_empty() {
            return Some("username must not be empty".to_string());
        }
        if self.username.chars().count() > USERNAME_MAX_LEN {
            return Some(format!(
                "username too long (max {USERNAME_MAX_LEN} characters)"
            ));
        }
        None
    }
}

/// A catalog entry together with its stock ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub quantity_in_stock: i32,
}

impl Product {
    pub fn new(name: impl Into<String>, price: Decimal, quantity_in_stock: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            price,
            quantity_in_stock,
        }
    }

    /// Application-level check run before a product reaches storage.
    pub fn validate(&self) -> StoreResult<()> {
        match self.constraint_violation() {
            Some(reason) => Err(StoreError::Validation(reason)),
            None => Ok(()),
        }
    }

    pub fn is_in_stock(&self) -> bool {
        self.quantity_in_stock >= 1
    }

    /// Mirrors the `products` table constraints.
    pub(crate) fn constraint_violation(&self) -> Option<String> {
        if self.name.is_empty() {
            return Some("product name must not be empty".to_string());
        }
        if self.name.chars().count() > PRODUCT_NAME_MAX_LEN {
            return Some(format!(
                "product name too long (max {PRODUCT_NAME_MAX_LEN} characters)"
            ));
        }
        if self.price < Decimal::ZERO {
            return Some(format!("price {} must be non-negative", self.price));
        }
        if normalize_price(self.price) >= Decimal::from(10_i64.pow(PRICE_INTEGER_DIGITS)) {
            return Some(format!("price {} exceeds numeric field precision", self.price));
        }
        if self.quantity_in_stock < 0 {
            return Some(format!(
                "quantity_in_stock {} must be non-negative",
                self.quantity_in_stock
            ));
        }
        None
    }
}

/// Rounds a price the way a `NUMERIC(20, 2)` column stores it.
pub fn normalize_price(price: Decimal) -> Decimal {
    let mut rounded =
        price.round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(PRICE_SCALE);
    rounded
}

/// Order header. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// One unit of one product within an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    /// Position of the product reference in the placing request.
    pub line_number: i32,
}

impl OrderLine {
    pub fn new(order_id: Uuid, product_id: Uuid, line_number: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            product_id,
            line_number,
        }
    }
}

/// Outbound representation of a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub product_ids: Vec<Uuid>,
}

impl PlacedOrder {
    pub fn from_parts(order: Order, lines: &[OrderLine]) -> Self {
        let mut lines: Vec<&OrderLine> = lines.iter().collect();
        lines.sort_by_key(|line| line.line_number);
        Self {
            id: order.id,
            user_id: order.user_id,
            created_at: order.created_at,
            product_ids: lines.iter().map(|line| line.product_id).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn price_is_rounded_to_two_places() {
        assert_eq!(normalize_price(dec("33.463")).to_string(), "33.46");
        assert_eq!(normalize_price(dec("22.1")).to_string(), "22.10");
        assert_eq!(normalize_price(dec("56")).to_string(), "56.00");
        assert_eq!(normalize_price(dec("0.005")).to_string(), "0.01");
    }

    #[test]
    fn product_name_bounds() {
        assert!(Product::new("a".repeat(64), dec("2.10"), 3).validate().is_ok());
        assert!(matches!(
            Product::new("a".repeat(65), dec("2.10"), 3).validate(),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            Product::new("", dec("2.10"), 3).validate(),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn negative_quantity_and_price_rejected() {
        assert!(Product::new("Product1", dec("2.10"), -5).validate().is_err());
        assert!(Product::new("Product1", dec("-0.01"), 3).validate().is_err());
        assert!(Product::new("Product1", dec("0"), 0).validate().is_ok());
    }

    #[test]
    fn price_bounded_by_column_precision() {
        let max = dec("999999999999999999.99");
        assert!(Product::new("Product1", max, 1).validate().is_ok());
        assert!(Product::new("Product1", dec("1000000000000000000"), 1)
            .validate()
            .is_err());
        // Rounds up past the limit once stored with two decimals
        assert!(Product::new("Product1", dec("999999999999999999.995"), 1)
            .validate()
            .is_err());
    }

    #[test]
    fn placed_order_lists_products_in_line_order() {
        let order = Order {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let lines = vec![OrderLine::new(order.id, b, 1), OrderLine::new(order.id, a, 0)];

        let placed = PlacedOrder::from_parts(order, &lines);
        assert_eq!(placed.product_ids, vec![a, b]);
    }
}
