//! Integration test support for Printshelf.
//!
//! Tests run the storefront services and router over in-memory backends, so
//! no database, bucket or SMTP server is needed:
//!
//! - [`MemoryStore`] implements every repository trait behind one lock
//! - [`MemoryStorage`] serves files from a map and signs fake URLs
//! - [`RecordingNotifier`] records every email it is asked to send
//! - [`TestContext`] wires them into an [`AppState`]
//!
//! ```bash
//! cargo test -p printshelf-integration-tests
//! ```
//!
//! The `postgres` test file exercises the `Pg*` repositories against a real
//! database instead. Each test gets a fresh migrated database from
//! `#[sqlx::test]`; those tests are ignored unless asked for:
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/printshelf_test \
//!     cargo test -p printshelf-integration-tests --test postgres -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};

use printshelf_core::{
    CategoryId, Email, OrderId, OrderNumber, OrderStatus, PaymentMethod, PaymentStatus, Price,
    ProductId, UserId,
};
use printshelf_storefront::db::{
    CatalogStore, OrderStore, RepositoryError, ResetTokenStore, UserStore,
};
use printshelf_storefront::models::{
    Category, NewOrder, Order, OrderItem, Product, ResetToken, User,
};
use printshelf_storefront::services::payment::{PaymentError, PaymentOutcome, PaymentRequest};
use printshelf_storefront::services::{
    ContactMessage, Notifier, PaymentProvider, PaymentProviders, SendOutcome,
};
use printshelf_storefront::state::{AppState, Backends, Settings};
use printshelf_storefront::storage::{ObjectStorage, SignedUrl, StorageError, StoredObject};

// ============================================================================
// Repositories
// ============================================================================

#[derive(Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    categories: HashMap<CategoryId, Category>,
    users: HashMap<Email, (User, String)>,
    orders: Vec<Order>,
    tokens: HashMap<String, ResetToken>,
    last_created_at: Option<DateTime<Utc>>,
}

impl Tables {
    /// Strictly increasing creation times keep "newest first" deterministic.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let at = match self.last_created_at {
            Some(last) if now <= last => last + TimeDelta::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(at);
        at
    }
}

/// In-memory implementation of every repository trait.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    /// Number of upcoming order inserts to reject as order-number collisions.
    forced_conflicts: AtomicUsize,
    product_reads: AtomicUsize,
}

impl MemoryStore {
    /// Add a product to the catalog.
    pub fn add_product(&self, slug: &str, title: &str, price: Price, is_free: bool) -> Product {
        let mut tables = self.tables.lock().unwrap();
        let product = Product {
            id: ProductId::generate(),
            slug: slug.to_string(),
            title: title.to_string(),
            price,
            is_free,
            category_id: None,
            pdf_path: Some(format!("coloring-pages/{slug}.pdf")),
            downloads: 0,
            views: 0,
            created_at: tables.next_timestamp(),
        };
        tables.products.insert(product.id.clone(), product.clone());
        product
    }

    /// Add a collection (no parent) or a category under `parent`.
    pub fn add_category(&self, slug: &str, name: &str, parent: Option<&Category>) -> Category {
        let category = Category {
            id: CategoryId::generate(),
            slug: slug.to_string(),
            name: name.to_string(),
            parent_id: parent.map(|p| p.id.clone()),
        };
        self.tables
            .lock()
            .unwrap()
            .categories
            .insert(category.id.clone(), category.clone());
        category
    }

    /// Current download counter of a product.
    pub fn downloads(&self, id: &ProductId) -> i64 {
        self.tables.lock().unwrap().products[id].downloads
    }

    /// Current view counter of a product.
    pub fn views(&self, id: &ProductId) -> i64 {
        self.tables.lock().unwrap().products[id].views
    }

    /// Number of users with any password state.
    pub fn user_count(&self) -> usize {
        self.tables.lock().unwrap().users.len()
    }

    /// Stored password hash for an email.
    pub fn password_hash(&self, email: &Email) -> Option<String> {
        self.tables
            .lock()
            .unwrap()
            .users
            .get(email)
            .map(|(_, hash)| hash.clone())
    }

    /// Every stored order, oldest first.
    pub fn orders(&self) -> Vec<Order> {
        self.tables.lock().unwrap().orders.clone()
    }

    /// Number of product lookups by ID served so far.
    pub fn product_reads(&self) -> usize {
        self.product_reads.load(Ordering::SeqCst)
    }

    /// Number of stored reset tokens, expired or not.
    pub fn token_count(&self) -> usize {
        self.tables.lock().unwrap().tokens.len()
    }

    /// Make the next `n` order inserts fail as duplicate order numbers.
    pub fn force_order_number_conflicts(&self, n: usize) {
        self.forced_conflicts.store(n, Ordering::SeqCst);
    }

    fn take_forced_conflict(&self) -> bool {
        self.forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        self.product_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.tables.lock().unwrap().products.get(id).cloned())
    }

    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .products
            .values()
            .find(|p| p.slug == slug)
            .cloned())
    }

    async fn category(&self, id: &CategoryId) -> Result<Option<Category>, RepositoryError> {
        Ok(self.tables.lock().unwrap().categories.get(id).cloned())
    }

    async fn category_by_slug(&self, slug: &str) -> Result<Option<Category>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .categories
            .values()
            .find(|c| c.slug == slug)
            .cloned())
    }

    async fn increment_downloads(&self, id: &ProductId, by: u32) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().unwrap();
        let product = tables
            .products
            .get_mut(id)
            .ok_or(RepositoryError::NotFound)?;
        product.downloads += i64::from(by);
        Ok(())
    }

    async fn increment_views(&self, id: &ProductId) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().unwrap();
        let product = tables
            .products
            .get_mut(id)
            .ok_or(RepositoryError::NotFound)?;
        product.views += 1;
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .users
            .get(email)
            .map(|(user, _)| user.clone()))
    }

    async fn find_or_create_guest(
        &self,
        email: &Email,
        name: &str,
    ) -> Result<User, RepositoryError> {
        let mut tables = self.tables.lock().unwrap();
        let created_at = tables.next_timestamp();
        let (user, _) = tables.users.entry(email.clone()).or_insert_with(|| {
            (
                User {
                    id: UserId::generate(),
                    email: email.clone(),
                    name: Some(name.to_string()),
                    email_verified: false,
                    created_at,
                },
                "!guest".to_string(),
            )
        });
        Ok(user.clone())
    }

    async fn set_password(
        &self,
        id: &UserId,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().unwrap();
        let (user, hash) = tables
            .users
            .values_mut()
            .find(|(user, _)| &user.id == id)
            .ok_or(RepositoryError::NotFound)?;
        user.email_verified = true;
        *hash = password_hash.to_string();
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        if self.take_forced_conflict() {
            return Err(RepositoryError::Conflict(
                "order number already exists".to_string(),
            ));
        }

        let mut tables = self.tables.lock().unwrap();
        if tables
            .orders
            .iter()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(RepositoryError::Conflict(
                "order number already exists".to_string(),
            ));
        }

        let created_at = tables.next_timestamp();
        let stored = Order {
            id: order.id.clone(),
            order_number: order.order_number.clone(),
            user_id: order.user_id.clone(),
            email: order.email.clone(),
            customer_name: order.customer_name.clone(),
            amount: order.amount,
            total: order.total,
            status: order.status,
            payment_status: order.payment_status,
            payment_method: order.payment_method,
            created_at,
            updated_at: created_at,
            items: order
                .items
                .iter()
                .map(|item| OrderItem {
                    id: item.id.clone(),
                    order_id: order.id.clone(),
                    product_id: item.product_id.clone(),
                    title: item.title.clone(),
                    price: item.price,
                    quantity: item.quantity,
                })
                .collect(),
        };
        tables.orders.push(stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .orders
            .iter()
            .find(|o| &o.id == id)
            .cloned())
    }

    async fn get_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .orders
            .iter()
            .find(|o| &o.order_number == number)
            .cloned())
    }

    async fn list(
        &self,
        status: Option<OrderStatus>,
        limit: u32,
        offset: u64,
    ) -> Result<(Vec<Order>, u64), RepositoryError> {
        let tables = self.tables.lock().unwrap();
        let mut matching: Vec<&Order> = tables
            .orders
            .iter()
            .filter(|o| status.is_none_or(|s| o.status == s))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn update_status(
        &self,
        id: &OrderId,
        expected: (OrderStatus, PaymentStatus),
        next: (OrderStatus, PaymentStatus),
    ) -> Result<Option<Order>, RepositoryError> {
        let mut tables = self.tables.lock().unwrap();
        let Some(order) = tables.orders.iter_mut().find(|o| &o.id == id) else {
            return Ok(None);
        };
        if (order.status, order.payment_status) != expected {
            return Ok(None);
        }
        order.status = next.0;
        order.payment_status = next.1;
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn delete(&self, id: &OrderId) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.orders.len();
        tables.orders.retain(|o| &o.id != id);
        Ok(tables.orders.len() < before)
    }
}

#[async_trait]
impl ResetTokenStore for MemoryStore {
    async fn put(&self, token_hash: &str, token: &ResetToken) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().unwrap();
        let now = Utc::now();
        tables.tokens.retain(|_, t| t.expires_at > now);
        tables.tokens.insert(token_hash.to_string(), token.clone());
        Ok(())
    }

    async fn take(&self, token_hash: &str) -> Result<Option<ResetToken>, RepositoryError> {
        Ok(self.tables.lock().unwrap().tokens.remove(token_hash))
    }

    async fn delete(&self, token_hash: &str) -> Result<(), RepositoryError> {
        self.tables.lock().unwrap().tokens.remove(token_hash);
        Ok(())
    }
}

// ============================================================================
// Object storage
// ============================================================================

/// Bucket served from memory. Signed URLs point at `https://storage.test`.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<String, Bytes>>,
    signed: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryStorage {
    /// Store a file at `path`.
    pub fn put(&self, path: &str, contents: impl Into<Bytes>) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), contents.into());
    }

    /// Number of URLs signed so far.
    pub fn signed_count(&self) -> usize {
        self.signed.load(Ordering::SeqCst)
    }

    /// Make every call fail as if the storage service were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Api {
                status: 503,
                message: "storage unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<SignedUrl, StorageError> {
        self.check_available()?;
        if !self.files.lock().unwrap().contains_key(path) {
            return Err(StorageError::NotFound(path.to_string()));
        }
        self.signed.fetch_add(1, Ordering::SeqCst);
        Ok(SignedUrl {
            url: format!("https://storage.test/signed/{path}?ttl={}", ttl.as_secs()),
            expires_in: ttl,
        })
    }

    async fn fetch(&self, path: &str) -> Result<StoredObject, StorageError> {
        self.check_available()?;
        let contents = self
            .files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?;

        Ok(StoredObject {
            content_type: Some("application/pdf".to_string()),
            content_length: Some(contents.len() as u64),
            body: Box::pin(futures::stream::once(async move {
                Ok::<_, std::io::Error>(contents)
            })),
        })
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// An email the notifier was asked to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentEmail {
    OrderConfirmation { order_number: OrderNumber },
    PasswordReset { to: Email, reset_url: String },
    Contact { from: Email, message: String },
}

/// Notifier that records sends and can be told to fail them.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentEmail>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    /// Everything sent so far, including failed attempts.
    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }

    /// Make every send report failure.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn record(&self, email: SentEmail) -> SendOutcome {
        self.sent.lock().unwrap().push(email);
        if self.failing.load(Ordering::SeqCst) {
            SendOutcome::failed("smtp relay refused the message")
        } else {
            SendOutcome::sent()
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn order_confirmation(&self, order: &Order) -> SendOutcome {
        self.record(SentEmail::OrderConfirmation {
            order_number: order.order_number.clone(),
        })
    }

    async fn password_reset(&self, to: &Email, reset_url: &str) -> SendOutcome {
        self.record(SentEmail::PasswordReset {
            to: to.clone(),
            reset_url: reset_url.to_string(),
        })
    }

    async fn contact_message(&self, message: &ContactMessage) -> SendOutcome {
        self.record(SentEmail::Contact {
            from: message.email.clone(),
            message: message.message.clone(),
        })
    }
}

// ============================================================================
// Payments
// ============================================================================

/// Paid-order provider that declines every charge.
#[derive(Debug, Default)]
pub struct DecliningProvider;

#[async_trait]
impl PaymentProvider for DecliningProvider {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::MockPayment
    }

    async fn charge(&self, _request: &PaymentRequest<'_>) -> Result<PaymentOutcome, PaymentError> {
        Ok(PaymentOutcome::Declined {
            reason: "card declined".to_string(),
        })
    }
}

// ============================================================================
// Context
// ============================================================================

/// A storefront wired to in-memory backends.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub storage: Arc<MemoryStorage>,
    pub notifier: Arc<RecordingNotifier>,
    pub state: AppState,
}

impl TestContext {
    /// Storefront with default settings and the mock payment provider.
    pub fn new() -> Self {
        Self::with(Settings::default(), PaymentProviders::default())
    }

    /// Storefront with custom settings.
    pub fn with_settings(settings: Settings) -> Self {
        Self::with(settings, PaymentProviders::default())
    }

    /// Storefront whose paid orders are charged through `provider`.
    pub fn with_payment_provider(provider: Arc<dyn PaymentProvider>) -> Self {
        Self::with(Settings::default(), PaymentProviders::new(provider))
    }

    fn with(settings: Settings, payments: PaymentProviders) -> Self {
        let store = Arc::new(MemoryStore::default());
        let storage = Arc::new(MemoryStorage::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let state = AppState::from_backends(
            Backends {
                catalog: store.clone(),
                users: store.clone(),
                orders: store.clone(),
                reset_tokens: store.clone(),
                storage: storage.clone(),
                notifier: notifier.clone(),
                payments,
            },
            settings,
        );

        Self {
            store,
            storage,
            notifier,
            state,
        }
    }

    /// The full application router, without rate limiting.
    pub fn router(&self) -> Router {
        printshelf_storefront::app(self.state.clone(), false)
    }

    /// Add a product and upload its file.
    pub fn product(&self, slug: &str, title: &str, price: Price, is_free: bool) -> Product {
        let product = self.store.add_product(slug, title, price, is_free);
        if let Some(path) = &product.pdf_path {
            self.storage
                .put(path, format!("%PDF-1.7 {title}").into_bytes());
        }
        product
    }

    /// A free product with a stored file.
    pub fn free_product(&self, slug: &str) -> Product {
        self.product(slug, slug, Price::ZERO, true)
    }

    /// A paid product with a stored file.
    pub fn paid_product(&self, slug: &str, cents: u32) -> Product {
        self.product(slug, slug, Price::from_cents(cents), false)
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
