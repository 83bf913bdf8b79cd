//! Product and category repository.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use sqlx::PgPool;

use printshelf_core::{CategoryId, ProductId};

use super::{CatalogStore, RepositoryError};
use crate::models::{Category, Product};

const PRODUCT_COLUMNS: &str = "id, slug, title, price, is_free, category_id, pdf_path, \
                               downloads, views, created_at";

/// `PostgreSQL` catalog.
#[derive(Debug, Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    /// Create a new catalog repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    async fn category(&self, id: &CategoryId) -> Result<Option<Category>, RepositoryError> {
        let category = sqlx::query_as::<_, Category>(
            "SELECT id, slug, name, parent_id FROM categories WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(category)
    }

    async fn category_by_slug(&self, slug: &str) -> Result<Option<Category>, RepositoryError> {
        let category = sqlx::query_as::<_, Category>(
            "SELECT id, slug, name, parent_id FROM categories WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(category)
    }

    async fn increment_downloads(&self, id: &ProductId, by: u32) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE products SET downloads = downloads + $2 WHERE id = $1")
                .bind(id)
                .bind(i64::from(by))
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn increment_views(&self, id: &ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE products SET views = views + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }
}

/// Catalog decorator that caches product lookups by ID for a short TTL.
///
/// Counter updates go straight to the inner store and evict the cached entry,
/// so a cached product never hides a price change for longer than the TTL.
pub struct CachedCatalog {
    inner: Arc<dyn CatalogStore>,
    products: Cache<ProductId, Product>,
}

impl CachedCatalog {
    /// Wrap `inner` with a cache holding up to 1,000 products for `ttl`.
    #[must_use]
    pub fn new(inner: Arc<dyn CatalogStore>, ttl: Duration) -> Self {
        Self {
            inner,
            products: Cache::builder()
                .max_capacity(1_000)
                .time_to_live(ttl)
                .build(),
        }
    }
}

#[async_trait]
impl CatalogStore for CachedCatalog {
    async fn product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        if let Some(product) = self.products.get(id).await {
            return Ok(Some(product));
        }

        let product = self.inner.product(id).await?;
        if let Some(ref found) = product {
            self.products.insert(id.clone(), found.clone()).await;
        }
        Ok(product)
    }

    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        self.inner.product_by_slug(slug).await
    }

    async fn category(&self, id: &CategoryId) -> Result<Option<Category>, RepositoryError> {
        self.inner.category(id).await
    }

    async fn category_by_slug(&self, slug: &str) -> Result<Option<Category>, RepositoryError> {
        self.inner.category_by_slug(slug).await
    }

    async fn increment_downloads(&self, id: &ProductId, by: u32) -> Result<(), RepositoryError> {
        self.products.invalidate(id).await;
        self.inner.increment_downloads(id, by).await
    }

    async fn increment_views(&self, id: &ProductId) -> Result<(), RepositoryError> {
        self.products.invalidate(id).await;
        self.inner.increment_views(id).await
    }
}
