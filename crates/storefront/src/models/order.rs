//! Order domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use printshelf_core::{
    Email, OrderId, OrderItemId, OrderNumber, OrderStatus, PaymentMethod, PaymentStatus, Price,
    ProductId, UserId,
};

/// A placed order with its line items.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub user_id: UserId,
    pub email: Email,
    pub customer_name: String,
    pub amount: Price,
    /// Equal to `amount`; there is no tax or discount model.
    pub total: Price,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Whether the order grants access to its products' files.
    #[must_use]
    pub fn is_fulfilled(&self) -> bool {
        self.status == OrderStatus::Completed && self.payment_status == PaymentStatus::Paid
    }

    /// Whether any line item references `product_id`.
    #[must_use]
    pub fn contains_product(&self, product_id: &ProductId) -> bool {
        self.items
            .iter()
            .any(|item| item.product_id.as_ref() == Some(product_id))
    }
}

/// A line item, with title and price snapshotted at purchase time.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: Option<ProductId>,
    pub title: String,
    pub price: Price,
    #[sqlx(try_from = "i32")]
    pub quantity: u32,
}

/// An order ready to be persisted.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub user_id: UserId,
    pub email: Email,
    pub customer_name: String,
    pub amount: Price,
    pub total: Price,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub items: Vec<NewOrderItem>,
}

/// A line item ready to be persisted.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub id: OrderItemId,
    pub product_id: Option<ProductId>,
    pub title: String,
    pub price: Price,
    pub quantity: u32,
}

/// Page metadata returned alongside listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

impl Pagination {
    /// Build metadata for `total` rows split into pages of `limit`.
    #[must_use]
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let pages = if limit == 0 {
            0
        } else {
            total.div_ceil(u64::from(limit))
        };
        Self {
            page,
            limit,
            total,
            pages,
        }
    }

    /// Rows to skip to reach this page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_pages_round_up() {
        assert_eq!(Pagination::new(1, 20, 0).pages, 0);
        assert_eq!(Pagination::new(1, 20, 20).pages, 1);
        assert_eq!(Pagination::new(1, 20, 21).pages, 2);
        assert_eq!(Pagination::new(3, 20, 41).offset(), 40);
    }
}
