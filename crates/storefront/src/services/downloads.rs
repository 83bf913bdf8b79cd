//! Download fulfillment.
//!
//! Every download goes through a [`DownloadGate`] picked from the product:
//! free products are open to anyone and count one download per fulfillment;
//! paid products need the number of a completed, paid order that contains
//! them and are never counted here (checkout already counted them).

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use printshelf_core::{OrderNumber, ProductId};

use crate::db::{CatalogStore, OrderStore, RepositoryError};
use crate::models::Product;
use crate::storage::{ObjectStorage, StorageError, StoredObject, validate_path};

const MAX_FILE_NAME_LEN: usize = 100;

/// Access rule for a product's file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadGate {
    /// Anyone may download; each fulfillment is counted.
    Free,
    /// Requires a fulfilled order containing the product.
    PurchaseVerified,
}

impl DownloadGate {
    /// The gate guarding `product`.
    #[must_use]
    pub const fn for_product(product: &Product) -> Self {
        if product.is_free {
            Self::Free
        } else {
            Self::PurchaseVerified
        }
    }
}

/// Errors from download fulfillment.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Malformed request.
    #[error("{0}")]
    InvalidRequest(String),

    /// Product unknown.
    #[error("product not found")]
    ProductNotFound,

    /// Product has no file, or the file is missing from storage.
    #[error("file not found")]
    FileNotFound,

    /// A paid product was requested without an order.
    #[error("this printable must be purchased before it can be downloaded")]
    PaymentRequired,

    /// The order does not grant access to the product.
    #[error("order does not include this printable")]
    NotEntitled,

    /// Storage could not sign or serve the file.
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<StorageError> for DownloadError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) | StorageError::InvalidPath(_) => Self::FileNotFound,
            other => Self::Storage(other),
        }
    }
}

/// A signed link handed to the client.
#[derive(Debug, Clone)]
pub struct DownloadTicket {
    pub product_id: ProductId,
    pub url: String,
    pub expires_in: Duration,
    pub file_name: String,
}

/// A file being proxied to the client.
#[derive(Debug)]
pub struct DownloadStream {
    pub file_name: String,
    pub object: StoredObject,
}

/// Query of the streaming download endpoint.
#[derive(Debug, Clone, Default)]
pub struct StreamRequest {
    pub product_id: Option<String>,
    pub file: Option<String>,
    pub name: Option<String>,
    pub order: Option<String>,
}

/// Download fulfillment service.
#[derive(Clone)]
pub struct DownloadService {
    catalog: Arc<dyn CatalogStore>,
    orders: Arc<dyn OrderStore>,
    storage: Arc<dyn ObjectStorage>,
    url_ttl: Duration,
}

impl DownloadService {
    /// Create a new download service issuing URLs valid for `url_ttl`.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        orders: Arc<dyn OrderStore>,
        storage: Arc<dyn ObjectStorage>,
        url_ttl: Duration,
    ) -> Self {
        Self {
            catalog,
            orders,
            storage,
            url_ttl,
        }
    }

    /// Sign a URL for a free product and count the download.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::PaymentRequired` for paid products (nothing is
    /// counted or signed), `ProductNotFound`/`FileNotFound` for missing
    /// records, and `Storage` when the storage service cannot sign.
    #[tracing::instrument(skip(self))]
    pub async fn fulfill_free_download(
        &self,
        product_id: &ProductId,
    ) -> Result<DownloadTicket, DownloadError> {
        let product = self.product(product_id).await?;
        self.free_download(&product).await
    }

    /// Sign a URL for a product bought in `order_number`.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::NotEntitled` unless the order exists, is
    /// completed and paid, and contains the product.
    #[tracing::instrument(skip(self))]
    pub async fn fulfill_purchased_download(
        &self,
        product_id: &ProductId,
        order_number: &str,
    ) -> Result<DownloadTicket, DownloadError> {
        let product = self.product(product_id).await?;
        self.purchased_download(&product, order_number).await
    }

    /// Sign a URL through whichever gate guards the product.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::PaymentRequired` for a paid product without an
    /// order number; otherwise as the gate's fulfillment method.
    pub async fn fulfill(
        &self,
        product_id: &ProductId,
        order_number: Option<&str>,
    ) -> Result<DownloadTicket, DownloadError> {
        let product = self.product(product_id).await?;
        match (DownloadGate::for_product(&product), order_number) {
            (DownloadGate::Free, _) => self.free_download(&product).await,
            (DownloadGate::PurchaseVerified, Some(number)) => {
                self.purchased_download(&product, number).await
            }
            (DownloadGate::PurchaseVerified, None) => Err(DownloadError::PaymentRequired),
        }
    }

    /// Open a product's file for proxying.
    ///
    /// `file`, when given, must name the product's own file. Free products
    /// count one download.
    ///
    /// # Errors
    ///
    /// As [`DownloadService::fulfill`], plus `InvalidRequest` without a
    /// product ID.
    #[tracing::instrument(skip(self))]
    pub async fn stream_download(
        &self,
        request: StreamRequest,
    ) -> Result<DownloadStream, DownloadError> {
        let product_id = request
            .product_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(ProductId::new)
            .ok_or_else(|| DownloadError::InvalidRequest("productId is required".to_string()))?;

        let product = self.product(&product_id).await?;
        let gate = DownloadGate::for_product(&product);
        if gate == DownloadGate::PurchaseVerified {
            let order = request
                .order
                .as_deref()
                .ok_or(DownloadError::PaymentRequired)?;
            self.verify_purchase(&product, order).await?;
        }

        let path = product
            .pdf_path
            .as_deref()
            .ok_or(DownloadError::FileNotFound)?;
        if let Some(file) = request.file.as_deref()
            && file != path
        {
            return Err(DownloadError::FileNotFound);
        }

        let object = self.storage.fetch(validate_path(path)?).await?;

        if gate == DownloadGate::Free {
            self.count_free_download(&product.id).await;
        }

        let file_name = match request.name.as_deref() {
            Some(name) => with_extension(&sanitize_file_name(name), &product.download_file_name()),
            None => product.download_file_name(),
        };

        Ok(DownloadStream { file_name, object })
    }

    async fn free_download(&self, product: &Product) -> Result<DownloadTicket, DownloadError> {
        if DownloadGate::for_product(product) != DownloadGate::Free {
            return Err(DownloadError::PaymentRequired);
        }

        let ticket = self.sign(product).await?;
        self.count_free_download(&product.id).await;
        Ok(ticket)
    }

    async fn purchased_download(
        &self,
        product: &Product,
        order_number: &str,
    ) -> Result<DownloadTicket, DownloadError> {
        self.verify_purchase(product, order_number).await?;
        self.sign(product).await
    }

    async fn product(&self, product_id: &ProductId) -> Result<Product, DownloadError> {
        self.catalog
            .product(product_id)
            .await?
            .ok_or(DownloadError::ProductNotFound)
    }

    async fn verify_purchase(
        &self,
        product: &Product,
        order_number: &str,
    ) -> Result<(), DownloadError> {
        let number = OrderNumber::parse(order_number).ok_or(DownloadError::NotEntitled)?;
        let order = self
            .orders
            .get_by_number(&number)
            .await?
            .ok_or(DownloadError::NotEntitled)?;

        if order.is_fulfilled() && order.contains_product(&product.id) {
            Ok(())
        } else {
            tracing::info!(
                order_number = %number,
                product_id = %product.id,
                status = %order.status,
                payment_status = %order.payment_status,
                "Download refused for order"
            );
            Err(DownloadError::NotEntitled)
        }
    }

    async fn sign(&self, product: &Product) -> Result<DownloadTicket, DownloadError> {
        let path = product
            .pdf_path
            .as_deref()
            .ok_or(DownloadError::FileNotFound)?;
        let signed = self.storage.signed_url(path, self.url_ttl).await?;

        Ok(DownloadTicket {
            product_id: product.id.clone(),
            url: signed.url,
            expires_in: signed.expires_in,
            file_name: product.download_file_name(),
        })
    }

    async fn count_free_download(&self, product_id: &ProductId) {
        if let Err(e) = self.catalog.increment_downloads(product_id, 1).await {
            tracing::warn!(product_id = %product_id, error = %e, "Failed to count free download");
        }
    }
}

/// Make a client-supplied name safe for a `Content-Disposition` header.
///
/// Keeps ASCII letters, digits, spaces, `-`, `_` and `.`; everything else
/// becomes `_`. Leading dots are dropped.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_NAME_LEN)
        .collect();

    cleaned.trim_start_matches('.').trim().to_string()
}

/// Use `name`, borrowing the extension of `fallback` if `name` has none.
fn with_extension(name: &str, fallback: &str) -> String {
    if name.is_empty() {
        return fallback.to_string();
    }
    if name.contains('.') {
        return name.to_string();
    }
    match fallback.rsplit_once('.') {
        Some((_, ext)) => format!("{name}.{ext}"),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use printshelf_core::Price;

    use super::*;

    #[test]
    fn test_gate_follows_is_free() {
        let mut product = Product {
            id: ProductId::new("p1"),
            slug: "fox".to_string(),
            title: "Fox".to_string(),
            price: Price::ZERO,
            is_free: true,
            category_id: None,
            pdf_path: Some("fox.pdf".to_string()),
            downloads: 0,
            views: 0,
            created_at: Utc::now(),
        };
        assert_eq!(DownloadGate::for_product(&product), DownloadGate::Free);

        product.is_free = false;
        product.price = Price::from_cents(299);
        assert_eq!(
            DownloadGate::for_product(&product),
            DownloadGate::PurchaseVerified
        );
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("Sleepy Fox.pdf"), "Sleepy Fox.pdf");
        assert_eq!(sanitize_file_name("a\"b\r\nc.pdf"), "a_b__c.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_file_name("...hidden"), "hidden");
        assert_eq!(sanitize_file_name("fée"), "f_e");
    }

    #[test]
    fn test_with_extension() {
        assert_eq!(with_extension("Fox", "fox.pdf"), "Fox.pdf");
        assert_eq!(with_extension("Fox.png", "fox.pdf"), "Fox.png");
        assert_eq!(with_extension("", "fox.pdf"), "fox.pdf");
    }

    #[test]
    fn test_storage_not_found_maps_to_file_not_found() {
        let err = DownloadError::from(StorageError::NotFound("fox.pdf".to_string()));
        assert!(matches!(err, DownloadError::FileNotFound));

        let err = DownloadError::from(StorageError::Api {
            status: 500,
            message: "boom".to_string(),
        });
        assert!(matches!(err, DownloadError::Storage(_)));
    }
}
