//! Order lifecycle: checkout, listing, status transitions and deletion.
//!
//! Checkout re-reads every product from the catalog, totals the order in
//! decimal arithmetic, charges through the payment registry, resolves the
//! guest user and persists the order with its items in one transaction. Once
//! the order is committed, the download-count increments and the confirmation
//! email run concurrently. Their failures are logged and never reach the
//! caller.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, try_join_all};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use printshelf_core::{
    Email, OrderId, OrderItemId, OrderNumber, OrderStatus, PaymentStatus, Price, ProductId,
};

use crate::db::{CatalogStore, OrderStore, RepositoryError, UserStore};
use crate::models::{NewOrder, NewOrderItem, Order, Pagination};
use crate::services::email::Notifier;
use crate::services::payment::{PaymentError, PaymentOutcome, PaymentProviders, PaymentRequest};

/// Fresh order numbers tried after a unique-constraint collision.
const MAX_ORDER_NUMBER_RETRIES: u32 = 3;

/// Upper bound on the confirmation email after an order is committed.
const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// What checkout does when a submitted price disagrees with the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PricePolicy {
    /// Refuse the order.
    #[default]
    Reject,
    /// Charge the catalog price instead.
    Reprice,
}

impl FromStr for PricePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "reprice" => Ok(Self::Reprice),
            other => Err(format!("expected 'reject' or 'reprice', got '{other}'")),
        }
    }
}

/// Checkout tunables.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub order_prefix: String,
    pub price_policy: PricePolicy,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            order_prefix: OrderNumber::DEFAULT_PREFIX.to_string(),
            price_policy: PricePolicy::default(),
        }
    }
}

/// Errors from order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Request failed validation; the message is safe to show the client.
    #[error("{0}")]
    Validation(String),

    /// No order with the given ID or number.
    #[error("order not found")]
    NotFound,

    /// The status table does not allow this edge.
    #[error("cannot change {field} from {from} to {to}")]
    InvalidTransition {
        field: &'static str,
        from: &'static str,
        to: &'static str,
    },

    /// The order changed between read and write.
    #[error("order was modified concurrently, please retry")]
    ConcurrentUpdate,

    /// Payment provider failure.
    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Checkout request body.
///
/// Fields are loosely typed so that missing or malformed values produce
/// validation messages rather than deserialization failures.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub items: Vec<CheckoutItem>,
}

/// One cart line as submitted by the client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub quantity: Option<i64>,
}

/// Requested status change. `None` leaves a field as it is.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusChange {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
}

/// A checkout that passed input validation.
struct ValidCheckout {
    email: Email,
    customer_name: String,
    lines: Vec<ValidLine>,
}

struct ValidLine {
    product_id: ProductId,
    title: Option<String>,
    price: Price,
    quantity: u32,
}

/// Order lifecycle manager.
#[derive(Clone)]
pub struct OrderService {
    catalog: Arc<dyn CatalogStore>,
    users: Arc<dyn UserStore>,
    orders: Arc<dyn OrderStore>,
    notifier: Arc<dyn Notifier>,
    payments: PaymentProviders,
    settings: CheckoutSettings,
}

impl OrderService {
    /// Create a new order service.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        users: Arc<dyn UserStore>,
        orders: Arc<dyn OrderStore>,
        notifier: Arc<dyn Notifier>,
        payments: PaymentProviders,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            catalog,
            users,
            orders,
            notifier,
            payments,
            settings,
        }
    }

    /// Place an order from a cart snapshot.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Validation` for bad input, unknown products or
    /// (under [`PricePolicy::Reject`]) stale prices, and
    /// `OrderError::Repository` if the order cannot be persisted. Nothing is
    /// written in either case.
    #[tracing::instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn create_order(&self, request: CheckoutRequest) -> Result<Order, OrderError> {
        let checkout = validate_checkout(request)?;
        let items = self.price_lines(checkout.lines).await?;

        let amount = items
            .iter()
            .try_fold(Price::ZERO, |sum, item| {
                item.price.times(item.quantity)?.checked_add(sum)
            })
            .map_err(|_| OrderError::Validation("order total is too large".to_string()))?;

        let user = self
            .users
            .find_or_create_guest(&checkout.email, &checkout.customer_name)
            .await?;

        let order_number = OrderNumber::generate(&self.settings.order_prefix);
        let provider = self.payments.for_amount(amount);
        let outcome = provider
            .charge(&PaymentRequest {
                order_number: &order_number,
                email: &checkout.email,
                amount,
            })
            .await?;

        let (status, payment_status) = match outcome {
            PaymentOutcome::Captured => (OrderStatus::Completed, PaymentStatus::Paid),
            PaymentOutcome::Declined { reason } => {
                tracing::warn!(order_number = %order_number, reason = %reason, "Payment declined");
                (OrderStatus::Pending, PaymentStatus::Failed)
            }
        };

        let new_order = NewOrder {
            id: OrderId::generate(),
            order_number,
            user_id: user.id,
            email: checkout.email,
            customer_name: checkout.customer_name,
            amount,
            total: amount,
            status,
            payment_status,
            payment_method: provider.method(),
            items,
        };

        let order = self.insert_with_fresh_numbers(new_order).await?;
        tracing::info!(
            order_number = %order.order_number,
            total = %order.total,
            payment_status = %order.payment_status,
            "Order created"
        );

        if order.payment_status == PaymentStatus::Paid {
            self.after_commit(&order).await;
        }

        Ok(order)
    }

    /// Re-read every product and build the line items to persist.
    async fn price_lines(&self, lines: Vec<ValidLine>) -> Result<Vec<NewOrderItem>, OrderError> {
        let products =
            try_join_all(lines.iter().map(|line| self.catalog.product(&line.product_id))).await?;

        lines
            .into_iter()
            .zip(products)
            .map(|(line, product)| {
                let product = product.ok_or_else(|| {
                    OrderError::Validation(format!("unknown product: {}", line.product_id))
                })?;

                let authoritative = product.checkout_price();
                let price = if line.price == authoritative {
                    line.price
                } else {
                    match self.settings.price_policy {
                        PricePolicy::Reject => {
                            return Err(OrderError::Validation(format!(
                                "price of \"{}\" has changed to {authoritative}",
                                product.title
                            )));
                        }
                        PricePolicy::Reprice => {
                            tracing::info!(
                                product_id = %product.id,
                                submitted = %line.price,
                                charged = %authoritative,
                                "Repriced checkout line"
                            );
                            authoritative
                        }
                    }
                };

                Ok(NewOrderItem {
                    id: OrderItemId::generate(),
                    product_id: Some(product.id),
                    title: line.title.unwrap_or(product.title),
                    price,
                    quantity: line.quantity,
                })
            })
            .collect()
    }

    /// Insert, drawing a fresh order number on each unique-number collision.
    async fn insert_with_fresh_numbers(&self, mut order: NewOrder) -> Result<Order, OrderError> {
        let mut retries = 0;
        loop {
            match self.orders.insert(&order).await {
                Ok(created) => return Ok(created),
                Err(RepositoryError::Conflict(reason)) if retries < MAX_ORDER_NUMBER_RETRIES => {
                    retries += 1;
                    tracing::warn!(
                        order_number = %order.order_number,
                        retry = retries,
                        reason = %reason,
                        "Order number collision, retrying"
                    );
                    order.order_number = OrderNumber::generate(&self.settings.order_prefix);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Count purchased downloads and send the confirmation, concurrently.
    async fn after_commit(&self, order: &Order) {
        let counting = self.count_purchased_downloads(order);
        let confirming = async {
            match tokio::time::timeout(CONFIRMATION_TIMEOUT, self.notifier.order_confirmation(order))
                .await
            {
                Ok(outcome) if outcome.success => {}
                Ok(outcome) => tracing::warn!(
                    order_number = %order.order_number,
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    "Order confirmation email failed"
                ),
                Err(_) => tracing::warn!(
                    order_number = %order.order_number,
                    "Order confirmation email timed out"
                ),
            }
        };

        tokio::join!(counting, confirming);
    }

    async fn count_purchased_downloads(&self, order: &Order) {
        let mut per_product: BTreeMap<&ProductId, u32> = BTreeMap::new();
        for item in &order.items {
            if let Some(product_id) = &item.product_id {
                let count = per_product.entry(product_id).or_default();
                *count = count.saturating_add(item.quantity);
            }
        }

        let results = join_all(per_product.into_iter().map(|(product_id, quantity)| async move {
            (
                product_id,
                self.catalog.increment_downloads(product_id, quantity).await,
            )
        }))
        .await;

        for (product_id, result) in results {
            if let Err(e) = result {
                tracing::warn!(
                    order_number = %order.order_number,
                    product_id = %product_id,
                    error = %e,
                    "Failed to count purchased downloads"
                );
            }
        }
    }

    /// List orders newest first.
    ///
    /// An unrecognized `status` yields an empty page. `page` defaults to 1
    /// and `limit` to 20, clamped to 1..=100.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the database operation fails.
    pub async fn list_orders(
        &self,
        status: Option<&str>,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<(Vec<Order>, Pagination), OrderError> {
        let page = page.unwrap_or(1).max(1);
        let limit = limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        let filter = match status.map(str::trim).filter(|s| !s.is_empty()) {
            None => None,
            Some(raw) => match raw.parse::<OrderStatus>() {
                Ok(status) => Some(status),
                Err(_) => return Ok((Vec::new(), Pagination::new(page, limit, 0))),
            },
        };

        let offset = Pagination::new(page, limit, 0).offset();
        let (orders, total) = self.orders.list(filter, limit, offset).await?;
        Ok((orders, Pagination::new(page, limit, total)))
    }

    /// Look up an order by its human-readable number.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if no such order exists.
    pub async fn get_by_number(&self, number: &str) -> Result<Order, OrderError> {
        let number = OrderNumber::parse(number).ok_or(OrderError::NotFound)?;
        self.orders
            .get_by_number(&number)
            .await?
            .ok_or(OrderError::NotFound)
    }

    /// Apply an admin status change.
    ///
    /// A change that leaves both fields as they are returns the current order
    /// without writing.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` for an unknown ID,
    /// `OrderError::InvalidTransition` when the table forbids an edge, and
    /// `OrderError::ConcurrentUpdate` if the order changed underneath us.
    #[tracing::instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        id: &OrderId,
        change: StatusChange,
    ) -> Result<Order, OrderError> {
        let current = self.orders.get(id).await?.ok_or(OrderError::NotFound)?;

        let next_status = change.status.unwrap_or(current.status);
        let next_payment = change.payment_status.unwrap_or(current.payment_status);

        if !current.status.can_transition_to(next_status) {
            return Err(OrderError::InvalidTransition {
                field: "status",
                from: current.status.as_str(),
                to: next_status.as_str(),
            });
        }
        if !current.payment_status.can_transition_to(next_payment) {
            return Err(OrderError::InvalidTransition {
                field: "paymentStatus",
                from: current.payment_status.as_str(),
                to: next_payment.as_str(),
            });
        }

        if next_status == current.status && next_payment == current.payment_status {
            return Ok(current);
        }

        let updated = self
            .orders
            .update_status(
                id,
                (current.status, current.payment_status),
                (next_status, next_payment),
            )
            .await?
            .ok_or(OrderError::ConcurrentUpdate)?;

        tracing::info!(
            order_number = %updated.order_number,
            status = %updated.status,
            payment_status = %updated.payment_status,
            "Order status updated"
        );
        Ok(updated)
    }

    /// Hard-delete an order and its items.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn delete_order(&self, id: &OrderId) -> Result<(), OrderError> {
        if !self.orders.delete(id).await? {
            return Err(OrderError::NotFound);
        }
        tracing::info!(order_id = %id, "Order deleted");
        Ok(())
    }
}

/// Validate raw checkout input.
fn validate_checkout(request: CheckoutRequest) -> Result<ValidCheckout, OrderError> {
    if request.email.trim().is_empty() {
        return Err(OrderError::Validation("email is required".to_string()));
    }
    let email = Email::parse(&request.email)
        .map_err(|e| OrderError::Validation(format!("invalid email: {e}")))?;

    let customer_name = request.customer_name.trim().to_string();
    if customer_name.is_empty() {
        return Err(OrderError::Validation(
            "customerName is required".to_string(),
        ));
    }

    if request.items.is_empty() {
        return Err(OrderError::Validation(
            "order must contain at least one item".to_string(),
        ));
    }

    let lines = request
        .items
        .into_iter()
        .enumerate()
        .map(|(index, item)| validate_line(index, item))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ValidCheckout {
        email,
        customer_name,
        lines,
    })
}

fn validate_line(index: usize, item: CheckoutItem) -> Result<ValidLine, OrderError> {
    let invalid = |reason: &str| OrderError::Validation(format!("items[{index}]: {reason}"));

    let product_id = item
        .product_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .map(ProductId::new)
        .ok_or_else(|| invalid("productId is required"))?;

    let quantity = item.quantity.ok_or_else(|| invalid("quantity is required"))?;
    if quantity < 1 {
        return Err(invalid("quantity must be at least 1"));
    }
    let quantity = i32::try_from(quantity)
        .ok()
        .and_then(|q| u32::try_from(q).ok())
        .ok_or_else(|| invalid("quantity is too large"))?;

    let price = item.price.ok_or_else(|| invalid("price is required"))?;
    let price = Price::new(price).map_err(|e| invalid(&e.to_string()))?;

    let title = item
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    Ok(ValidLine {
        product_id,
        title,
        price,
        quantity,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn item(product_id: &str, price: &str, quantity: i64) -> CheckoutItem {
        CheckoutItem {
            product_id: Some(product_id.to_string()),
            title: Some("Sleepy Fox".to_string()),
            price: Some(price.parse::<Decimal>().unwrap()),
            quantity: Some(quantity),
        }
    }

    fn request(items: Vec<CheckoutItem>) -> CheckoutRequest {
        CheckoutRequest {
            email: "Parent@Example.com".to_string(),
            customer_name: " Ada ".to_string(),
            items,
        }
    }

    fn validation_message(result: Result<ValidCheckout, OrderError>) -> String {
        match result {
            Err(OrderError::Validation(message)) => message,
            Err(other) => panic!("expected validation error, got {other:?}"),
            Ok(_) => panic!("expected validation error, got Ok"),
        }
    }

    #[test]
    fn test_validate_checkout_normalizes_input() {
        let checkout = validate_checkout(request(vec![item("p1", "9.99", 2)])).unwrap();
        assert_eq!(checkout.email.as_str(), "parent@example.com");
        assert_eq!(checkout.customer_name, "Ada");
        assert_eq!(checkout.lines.len(), 1);
        assert_eq!(checkout.lines[0].quantity, 2);
    }

    #[test]
    fn test_validate_checkout_requires_fields() {
        let mut missing_email = request(vec![item("p1", "1.00", 1)]);
        missing_email.email = "  ".to_string();
        assert_eq!(
            validation_message(validate_checkout(missing_email)),
            "email is required"
        );

        let mut missing_name = request(vec![item("p1", "1.00", 1)]);
        missing_name.customer_name = String::new();
        assert_eq!(
            validation_message(validate_checkout(missing_name)),
            "customerName is required"
        );

        assert_eq!(
            validation_message(validate_checkout(request(vec![]))),
            "order must contain at least one item"
        );
    }

    #[test]
    fn test_validate_checkout_rejects_bad_lines() {
        let message = validation_message(validate_checkout(request(vec![item("p1", "1.00", 0)])));
        assert_eq!(message, "items[0]: quantity must be at least 1");

        let message = validation_message(validate_checkout(request(vec![
            item("p1", "1.00", 1),
            item("p2", "-1.00", 1),
        ])));
        assert_eq!(message, "items[1]: price cannot be negative");

        let mut no_product = item("p1", "1.00", 1);
        no_product.product_id = Some(" ".to_string());
        let message = validation_message(validate_checkout(request(vec![no_product])));
        assert_eq!(message, "items[0]: productId is required");
    }

    #[test]
    fn test_validate_checkout_rejects_unstorable_lines() {
        let message = validation_message(validate_checkout(request(vec![item(
            "p1",
            "1.00",
            3_000_000_000,
        )])));
        assert_eq!(message, "items[0]: quantity is too large");

        let max = i64::from(i32::MAX);
        assert!(validate_checkout(request(vec![item("p1", "1.00", max)])).is_ok());

        let message =
            validation_message(validate_checkout(request(vec![item("p1", "100000000", 1)])));
        assert_eq!(message, "items[0]: price cannot exceed 99999999.99");
    }

    #[test]
    fn test_price_policy_from_str() {
        assert_eq!("reject".parse::<PricePolicy>().unwrap(), PricePolicy::Reject);
        assert_eq!("REPRICE".parse::<PricePolicy>().unwrap(), PricePolicy::Reprice);
        assert!("ignore".parse::<PricePolicy>().is_err());
    }

    #[test]
    fn test_checkout_request_deserializes_camel_case() {
        let request: CheckoutRequest = serde_json::from_str(
            r#"{"email":"a@b.co","customerName":"Ada","items":[{"productId":"p1","title":"Fox","price":"9.99","quantity":2}]}"#,
        )
        .unwrap();
        assert_eq!(request.customer_name, "Ada");
        assert_eq!(request.items[0].price, Some("9.99".parse().unwrap()));
        assert_eq!(request.items[0].quantity, Some(2));
    }
}
