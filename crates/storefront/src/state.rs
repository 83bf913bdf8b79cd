//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::db::{
    CachedCatalog, CatalogStore, OrderStore, PgCatalogStore, PgOrderStore, PgResetTokenStore,
    PgUserStore, ResetTokenStore, UserStore,
};
use crate::services::{
    CheckoutSettings, ContactService, DisabledNotifier, DownloadService, EmailError,
    EmailService, Notifier, OrderService, PasswordResetService, PaymentProviders,
};
use crate::storage::{ObjectStorage, StorageError, SupabaseStorage};

/// Error building application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("storage client: {0}")]
    Storage(#[from] StorageError),
    #[error("email service: {0}")]
    Email(#[from] EmailError),
}

/// The collaborators services run against.
#[derive(Clone)]
pub struct Backends {
    pub catalog: Arc<dyn CatalogStore>,
    pub users: Arc<dyn UserStore>,
    pub orders: Arc<dyn OrderStore>,
    pub reset_tokens: Arc<dyn ResetTokenStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub notifier: Arc<dyn Notifier>,
    pub payments: PaymentProviders,
}

/// Service tunables taken from configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: String,
    pub checkout: CheckoutSettings,
    pub download_url_ttl: Duration,
    pub reset_token_ttl: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            checkout: CheckoutSettings::default(),
            download_url_ttl: Duration::from_secs(60),
            reset_token_ttl: Duration::from_secs(60 * 60),
        }
    }
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    catalog: Arc<dyn CatalogStore>,
    orders: OrderService,
    downloads: DownloadService,
    password_reset: PasswordResetService,
    contact: ContactService,
    pool: Option<PgPool>,
}

impl AppState {
    /// Create the production state over `PostgreSQL` and Supabase Storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage or SMTP client cannot be configured.
    pub fn new(config: &StorefrontConfig, pool: PgPool) -> Result<Self, StateError> {
        let catalog: Arc<dyn CatalogStore> = Arc::new(CachedCatalog::new(
            Arc::new(PgCatalogStore::new(pool.clone())),
            config.catalog_cache_ttl,
        ));

        let notifier: Arc<dyn Notifier> = match &config.email {
            Some(email) => Arc::new(EmailService::new(
                email,
                &config.base_url,
                config.reset_token_ttl.as_secs() / 60,
            )?),
            None => {
                tracing::warn!("SMTP not configured, outgoing email is disabled");
                Arc::new(DisabledNotifier)
            }
        };

        let backends = Backends {
            catalog,
            users: Arc::new(PgUserStore::new(pool.clone())),
            orders: Arc::new(PgOrderStore::new(pool.clone())),
            reset_tokens: Arc::new(PgResetTokenStore::new(pool.clone())),
            storage: Arc::new(SupabaseStorage::new(&config.storage)?),
            notifier,
            payments: PaymentProviders::default(),
        };

        let settings = Settings {
            base_url: config.base_url.clone(),
            checkout: CheckoutSettings {
                order_prefix: config.checkout.order_prefix.clone(),
                price_policy: config.checkout.price_policy,
            },
            download_url_ttl: config.download_url_ttl,
            reset_token_ttl: config.reset_token_ttl,
        };

        Ok(Self::build(backends, settings, Some(pool)))
    }

    /// Create state over arbitrary collaborators, without a database pool.
    #[must_use]
    pub fn from_backends(backends: Backends, settings: Settings) -> Self {
        Self::build(backends, settings, None)
    }

    fn build(backends: Backends, settings: Settings, pool: Option<PgPool>) -> Self {
        let orders = OrderService::new(
            Arc::clone(&backends.catalog),
            Arc::clone(&backends.users),
            Arc::clone(&backends.orders),
            Arc::clone(&backends.notifier),
            backends.payments.clone(),
            settings.checkout,
        );
        let downloads = DownloadService::new(
            Arc::clone(&backends.catalog),
            Arc::clone(&backends.orders),
            Arc::clone(&backends.storage),
            settings.download_url_ttl,
        );
        let password_reset = PasswordResetService::new(
            Arc::clone(&backends.users),
            Arc::clone(&backends.reset_tokens),
            Arc::clone(&backends.notifier),
            &settings.base_url,
            settings.reset_token_ttl,
        );
        let contact = ContactService::new(backends.notifier);

        Self {
            inner: Arc::new(AppStateInner {
                catalog: backends.catalog,
                orders,
                downloads,
                password_reset,
                contact,
                pool,
            }),
        }
    }

    /// Get the catalog store.
    #[must_use]
    pub fn catalog(&self) -> &dyn CatalogStore {
        self.inner.catalog.as_ref()
    }

    /// Get the order lifecycle service.
    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }

    /// Get the download fulfillment service.
    #[must_use]
    pub fn downloads(&self) -> &DownloadService {
        &self.inner.downloads
    }

    /// Get the password reset service.
    #[must_use]
    pub fn password_reset(&self) -> &PasswordResetService {
        &self.inner.password_reset
    }

    /// Get the contact form service.
    #[must_use]
    pub fn contact(&self) -> &ContactService {
        &self.inner.contact
    }

    /// Get the database connection pool, if the state is database-backed.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }
}
