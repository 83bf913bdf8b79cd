//! Order repository.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use printshelf_core::{OrderId, OrderNumber, OrderStatus, PaymentStatus};

use super::{OrderStore, RepositoryError};
use crate::models::{NewOrder, Order, OrderItem};

const ORDER_COLUMNS: &str = "id, order_number, user_id, email, customer_name, amount, total, \
                             status, payment_status, payment_method, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, order_id, product_id, title, price, quantity";

/// `PostgreSQL` order repository.
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load items for a batch of orders and attach them in position order.
    async fn attach_items(&self, orders: &mut [Order]) -> Result<(), RepositoryError> {
        if orders.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = orders.iter().map(|o| o.id.as_str().to_owned()).collect();
        let items = sqlx::query_as::<_, OrderItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) \
             ORDER BY order_id, position"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for item in items {
            by_order.entry(item.order_id.clone()).or_default().push(item);
        }
        for order in orders.iter_mut() {
            order.items = by_order.remove(&order.id).unwrap_or_default();
        }

        Ok(())
    }

    async fn insert_items(
        tx: &mut Transaction<'_, Postgres>,
        order: &NewOrder,
    ) -> Result<Vec<OrderItem>, RepositoryError> {
        let mut items = Vec::with_capacity(order.items.len());
        for (position, item) in (0_i32..).zip(&order.items) {
            let quantity = i32::try_from(item.quantity).map_err(|_| {
                RepositoryError::DataCorruption(format!("quantity {} too large", item.quantity))
            })?;

            let row = sqlx::query_as::<_, OrderItem>(&format!(
                "INSERT INTO order_items (id, order_id, product_id, title, price, quantity, position) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 RETURNING {ITEM_COLUMNS}"
            ))
            .bind(&item.id)
            .bind(&order.id)
            .bind(item.product_id.as_ref())
            .bind(&item.title)
            .bind(item.price)
            .bind(quantity)
            .bind(position)
            .fetch_one(&mut **tx)
            .await?;

            items.push(row);
        }
        Ok(items)
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let mut created = sqlx::query_as::<_, Order>(&format!(
            "INSERT INTO orders (id, order_number, user_id, email, customer_name, amount, total, \
                                 status, payment_status, payment_method) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(&order.id)
        .bind(&order.order_number)
        .bind(&order.user_id)
        .bind(&order.email)
        .bind(&order.customer_name)
        .bind(order.amount)
        .bind(order.total)
        .bind(order.status)
        .bind(order.payment_status)
        .bind(order.payment_method)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_insert(e, "order number"))?;

        created.items = Self::insert_items(&mut tx, order).await?;

        // Dropping `tx` on any error above rolls back the order row too
        tx.commit().await?;

        Ok(created)
    }

    async fn get(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(order) = order else {
            return Ok(None);
        };
        let mut orders = [order];
        self.attach_items(&mut orders).await?;
        let [order] = orders;
        Ok(Some(order))
    }

    async fn get_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1"
        ))
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;

        let Some(order) = order else {
            return Ok(None);
        };
        let mut orders = [order];
        self.attach_items(&mut orders).await?;
        let [order] = orders;
        Ok(Some(order))
    }

    async fn list(
        &self,
        status: Option<OrderStatus>,
        limit: u32,
        offset: u64,
    ) -> Result<(Vec<Order>, u64), RepositoryError> {
        let offset = i64::try_from(offset)
            .map_err(|_| RepositoryError::DataCorruption("offset out of range".to_owned()))?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE ($1::order_status IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let mut orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE ($1::order_status IS NULL OR status = $1) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(status)
        .bind(i64::from(limit))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        self.attach_items(&mut orders).await?;

        Ok((orders, u64::try_from(total).unwrap_or(0)))
    }

    async fn update_status(
        &self,
        id: &OrderId,
        expected: (OrderStatus, PaymentStatus),
        next: (OrderStatus, PaymentStatus),
    ) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders \
             SET status = $4, payment_status = $5, updated_at = NOW() \
             WHERE id = $1 AND status = $2 AND payment_status = $3 \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .bind(expected.0)
        .bind(expected.1)
        .bind(next.0)
        .bind(next.1)
        .fetch_optional(&self.pool)
        .await?;

        let Some(order) = order else {
            return Ok(None);
        };
        let mut orders = [order];
        self.attach_items(&mut orders).await?;
        let [order] = orders;
        Ok(Some(order))
    }

    async fn delete(&self, id: &OrderId) -> Result<bool, RepositoryError> {
        // order_items rows go with the order via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
