//! Payment providers.
//!
//! Checkout charges through a [`PaymentProvider`] chosen by the order total.
//! Two providers ship: [`FreeProvider`] for zero-total orders and
//! [`MockProvider`] standing in for a real gateway. Both always capture.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use printshelf_core::{Email, OrderNumber, PaymentMethod, Price};

/// What checkout asks a provider to charge.
#[derive(Debug, Clone)]
pub struct PaymentRequest<'a> {
    pub order_number: &'a OrderNumber,
    pub email: &'a Email,
    pub amount: Price,
}

/// Result of a charge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Funds captured; the order is fulfilled immediately.
    Captured,
    /// The customer's payment was declined. The order is kept as unpaid.
    Declined { reason: String },
}

/// Provider failure that is not a decline (gateway down, bad credentials).
#[derive(Debug, Error)]
#[error("payment provider error: {0}")]
pub struct PaymentError(pub String);

/// A way to take payment for an order.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// The method recorded on orders charged through this provider.
    fn method(&self) -> PaymentMethod;

    /// Attempt to charge `request.amount`.
    async fn charge(&self, request: &PaymentRequest<'_>) -> Result<PaymentOutcome, PaymentError>;
}

/// Provider for orders that cost nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreeProvider;

#[async_trait]
impl PaymentProvider for FreeProvider {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Free
    }

    async fn charge(&self, request: &PaymentRequest<'_>) -> Result<PaymentOutcome, PaymentError> {
        if request.amount.is_zero() {
            Ok(PaymentOutcome::Captured)
        } else {
            Err(PaymentError(format!(
                "free provider cannot charge {}",
                request.amount
            )))
        }
    }
}

/// Placeholder gateway that accepts every charge.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockProvider;

#[async_trait]
impl PaymentProvider for MockProvider {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::MockPayment
    }

    async fn charge(&self, request: &PaymentRequest<'_>) -> Result<PaymentOutcome, PaymentError> {
        tracing::info!(
            order_number = %request.order_number,
            amount = %request.amount,
            "Mock payment captured"
        );
        Ok(PaymentOutcome::Captured)
    }
}

/// Selects the provider for an order.
#[derive(Clone)]
pub struct PaymentProviders {
    free: Arc<dyn PaymentProvider>,
    paid: Arc<dyn PaymentProvider>,
}

impl PaymentProviders {
    /// Registry with a custom provider for positive totals.
    #[must_use]
    pub fn new(paid: Arc<dyn PaymentProvider>) -> Self {
        Self {
            free: Arc::new(FreeProvider),
            paid,
        }
    }

    /// Provider responsible for charging `amount`.
    #[must_use]
    pub fn for_amount(&self, amount: Price) -> &dyn PaymentProvider {
        if amount.is_zero() {
            self.free.as_ref()
        } else {
            self.paid.as_ref()
        }
    }
}

impl Default for PaymentProviders {
    fn default() -> Self {
        Self::new(Arc::new(MockProvider))
    }
}

impl std::fmt::Debug for PaymentProviders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentProviders")
            .field("free", &self.free.method())
            .field("paid", &self.paid.method())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn request<'a>(number: &'a OrderNumber, email: &'a Email, cents: u32) -> PaymentRequest<'a> {
        PaymentRequest {
            order_number: number,
            email,
            amount: Price::from_cents(cents),
        }
    }

    #[test]
    fn test_registry_selects_by_amount() {
        let providers = PaymentProviders::default();
        assert_eq!(
            providers.for_amount(Price::ZERO).method(),
            PaymentMethod::Free
        );
        assert_eq!(
            providers.for_amount(Price::from_cents(1)).method(),
            PaymentMethod::MockPayment
        );
    }

    #[tokio::test]
    async fn test_free_provider_refuses_positive_amounts() {
        let number = OrderNumber::generate("ORD");
        let email = Email::parse("kid@example.com").unwrap();

        let outcome = FreeProvider.charge(&request(&number, &email, 0)).await;
        assert_eq!(outcome.unwrap(), PaymentOutcome::Captured);
        assert!(FreeProvider.charge(&request(&number, &email, 99)).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_provider_captures() {
        let number = OrderNumber::generate("ORD");
        let email = Email::parse("kid@example.com").unwrap();

        let outcome = MockProvider.charge(&request(&number, &email, 1998)).await;
        assert_eq!(outcome.unwrap(), PaymentOutcome::Captured);
    }
}
