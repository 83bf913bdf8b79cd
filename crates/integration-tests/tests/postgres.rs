//! `PostgreSQL` repositories against a real database.
//!
//! These tests require a running `PostgreSQL` reachable through
//! `DATABASE_URL`; `#[sqlx::test]` creates and migrates a fresh database for
//! each one.
//!
//! Run with: cargo test -p printshelf-integration-tests --test postgres -- --ignored

#![allow(clippy::unwrap_used)]

use std::collections::HashSet;

use chrono::{TimeDelta, Utc};
use sqlx::PgPool;

use printshelf_core::{
    Email, OrderId, OrderItemId, OrderNumber, OrderStatus, PaymentMethod, PaymentStatus, Price,
    ProductId,
};
use printshelf_storefront::db::{
    CatalogStore, OrderStore, PgCatalogStore, PgOrderStore, PgResetTokenStore, PgUserStore,
    RepositoryError, ResetTokenStore, UserStore,
};
use printshelf_storefront::models::{NewOrder, NewOrderItem, ResetToken, User};

async fn insert_product(pool: &PgPool, slug: &str) -> ProductId {
    let id = ProductId::generate();
    sqlx::query(
        "INSERT INTO products (id, slug, title, price, is_free, pdf_path) \
         VALUES ($1, $2, $2, 3.50, FALSE, $3)",
    )
    .bind(&id)
    .bind(slug)
    .bind(format!("coloring-pages/{slug}.pdf"))
    .execute(pool)
    .await
    .unwrap();
    id
}

async fn guest(pool: &PgPool) -> User {
    PgUserStore::new(pool.clone())
        .find_or_create_guest(&Email::parse("robin@example.com").unwrap(), "Robin Reader")
        .await
        .unwrap()
}

async fn count(pool: &PgPool, table: &str) -> i64 {
    let sql = format!("SELECT COUNT(*) FROM {table}");
    sqlx::query_scalar(&sql).fetch_one(pool).await.unwrap()
}

fn line(product_id: &ProductId, title: &str, quantity: u32) -> NewOrderItem {
    NewOrderItem {
        id: OrderItemId::generate(),
        product_id: Some(product_id.clone()),
        title: title.to_string(),
        price: Price::from_cents(350),
        quantity,
    }
}

fn new_order(user: &User, items: Vec<NewOrderItem>) -> NewOrder {
    let amount = items
        .iter()
        .map(|item| item.price.times(item.quantity).unwrap())
        .sum();
    NewOrder {
        id: OrderId::generate(),
        order_number: OrderNumber::generate("ORD"),
        user_id: user.id.clone(),
        email: user.email.clone(),
        customer_name: "Robin Reader".to_string(),
        amount,
        total: amount,
        status: OrderStatus::Completed,
        payment_status: PaymentStatus::Paid,
        payment_method: PaymentMethod::MockPayment,
        items,
    }
}

// ============================================================================
// Users
// ============================================================================

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_concurrent_guest_creation_converges(pool: PgPool) {
    let users = PgUserStore::new(pool.clone());
    let email = Email::parse("robin@example.com").unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let users = users.clone();
            let email = email.clone();
            tokio::spawn(async move { users.find_or_create_guest(&email, "Robin Reader").await })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap().unwrap().id);
    }

    assert_eq!(ids.len(), 1);
    assert_eq!(count(&pool, "users").await, 1);
}

// ============================================================================
// Catalog counters
// ============================================================================

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_concurrent_download_increments_are_exact(pool: PgPool) {
    let catalog = PgCatalogStore::new(pool.clone());
    let owl = insert_product(&pool, "night-owl").await;

    let handles: Vec<_> = (0..40)
        .map(|_| {
            let catalog = catalog.clone();
            let owl = owl.clone();
            tokio::spawn(async move { catalog.increment_downloads(&owl, 1).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    catalog.increment_downloads(&owl, 3).await.unwrap();
    catalog.increment_views(&owl).await.unwrap();

    let product = catalog.product(&owl).await.unwrap().unwrap();
    assert_eq!(product.downloads, 43);
    assert_eq!(product.views, 1);

    assert!(matches!(
        catalog
            .increment_downloads(&ProductId::new("missing"), 1)
            .await,
        Err(RepositoryError::NotFound)
    ));
}

// ============================================================================
// Orders
// ============================================================================

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_order_insert_is_all_or_nothing(pool: PgPool) {
    let orders = PgOrderStore::new(pool.clone());
    let user = guest(&pool).await;
    let fox = insert_product(&pool, "sleepy-fox").await;

    // The second line breaks the quantity check after the order row is written
    let broken = new_order(&user, vec![line(&fox, "Sleepy Fox", 1), line(&fox, "Sleepy Fox", 0)]);
    assert!(orders.insert(&broken).await.is_err());
    assert_eq!(count(&pool, "orders").await, 0);
    assert_eq!(count(&pool, "order_items").await, 0);

    let order = new_order(&user, vec![line(&fox, "Sleepy Fox", 2), line(&fox, "Fox Again", 1)]);
    let created = orders.insert(&order).await.unwrap();
    assert_eq!(created.total, Price::from_cents(1050));

    let mut duplicate = new_order(&user, vec![line(&fox, "Sleepy Fox", 1)]);
    duplicate.order_number = order.order_number.clone();
    assert!(matches!(
        orders.insert(&duplicate).await,
        Err(RepositoryError::Conflict(_))
    ));
    assert_eq!(count(&pool, "orders").await, 1);
    assert_eq!(count(&pool, "order_items").await, 2);

    let stored = orders
        .get_by_number(&order.order_number)
        .await
        .unwrap()
        .unwrap();
    let titles: Vec<_> = stored.items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, ["Sleepy Fox", "Fox Again"]);
    assert_eq!(stored.items[0].quantity, 2);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_status_update_is_compare_and_set(pool: PgPool) {
    let orders = PgOrderStore::new(pool.clone());
    let user = guest(&pool).await;
    let fox = insert_product(&pool, "sleepy-fox").await;
    let order = orders
        .insert(&new_order(&user, vec![line(&fox, "Sleepy Fox", 1)]))
        .await
        .unwrap();

    let paid = (OrderStatus::Completed, PaymentStatus::Paid);
    let targets = [
        (OrderStatus::Refunded, PaymentStatus::Refunded),
        (OrderStatus::Cancelled, PaymentStatus::Paid),
    ];
    let handles: Vec<_> = targets
        .into_iter()
        .map(|next| {
            let orders = orders.clone();
            let id = order.id.clone();
            tokio::spawn(async move { orders.update_status(&id, paid, next).await })
        })
        .collect();

    let mut winners = Vec::new();
    for handle in handles {
        if let Some(updated) = handle.await.unwrap().unwrap() {
            winners.push((updated.status, updated.payment_status));
        }
    }
    assert_eq!(winners.len(), 1);

    let stored = orders.get(&order.id).await.unwrap().unwrap();
    assert_eq!((stored.status, stored.payment_status), winners[0]);
    assert_eq!(stored.items.len(), 1);

    assert!(
        orders
            .update_status(&OrderId::new("missing"), paid, targets[0])
            .await
            .unwrap()
            .is_none()
    );
}

// ============================================================================
// Reset tokens
// ============================================================================

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_reset_token_is_taken_once(pool: PgPool) {
    let tokens = PgResetTokenStore::new(pool.clone());
    let token = ResetToken {
        email: Email::parse("robin@example.com").unwrap(),
        expires_at: Utc::now() + TimeDelta::hours(1),
    };
    tokens.put("hash-1", &token).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tokens = tokens.clone();
            tokio::spawn(async move { tokens.take("hash-1").await })
        })
        .collect();

    let mut taken = 0;
    for handle in handles {
        if let Some(record) = handle.await.unwrap().unwrap() {
            assert_eq!(record.email, token.email);
            taken += 1;
        }
    }
    assert_eq!(taken, 1);
    assert_eq!(count(&pool, "password_reset_tokens").await, 0);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn test_put_sweeps_expired_tokens(pool: PgPool) {
    let tokens = PgResetTokenStore::new(pool.clone());
    let email = Email::parse("robin@example.com").unwrap();

    let stale = ResetToken {
        email: email.clone(),
        expires_at: Utc::now() - TimeDelta::minutes(1),
    };
    tokens.put("stale", &stale).await.unwrap();
    let fresh = ResetToken {
        email,
        expires_at: Utc::now() + TimeDelta::hours(1),
    };
    tokens.put("fresh", &fresh).await.unwrap();

    assert_eq!(count(&pool, "password_reset_tokens").await, 1);
    assert!(tokens.take("stale").await.unwrap().is_none());
    assert!(tokens.take("fresh").await.unwrap().is_some());
}
