//! Catalog domain types: printable products and their categories.

use chrono::{DateTime, Utc};
use serde::Serialize;

use printshelf_core::{CategoryId, CategoryLevel, Price, ProductId};

/// A downloadable printable.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    /// URL slug, unique across products.
    pub slug: String,
    pub title: String,
    /// List price. Always zero when `is_free` is set.
    pub price: Price,
    pub is_free: bool,
    pub category_id: Option<CategoryId>,
    /// Object-storage path of the downloadable PDF.
    #[serde(skip_serializing)]
    pub pdf_path: Option<String>,
    pub downloads: i64,
    pub views: i64,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// The price checkout must charge for one unit.
    ///
    /// Free products charge nothing even if a stale list price is stored.
    #[must_use]
    pub const fn checkout_price(&self) -> Price {
        if self.is_free { Price::ZERO } else { self.price }
    }

    /// Filename offered to the browser for this product's file.
    #[must_use]
    pub fn download_file_name(&self) -> String {
        let extension = self
            .pdf_path
            .as_deref()
            .and_then(|path| path.rsplit('/').next())
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
            .unwrap_or("pdf");
        format!("{}.{extension}", self.slug)
    }
}

/// A collection (top level) or category (second level).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub slug: String,
    pub name: String,
    pub parent_id: Option<CategoryId>,
}

impl Category {
    /// Where this category sits in the two-level hierarchy.
    #[must_use]
    pub const fn level(&self) -> CategoryLevel {
        CategoryLevel::from_parent(self.parent_id.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(is_free: bool, price_cents: u32, pdf_path: Option<&str>) -> Product {
        Product {
            id: ProductId::new("p1"),
            slug: "sleepy-fox".to_string(),
            title: "Sleepy Fox".to_string(),
            price: Price::from_cents(price_cents),
            is_free,
            category_id: None,
            pdf_path: pdf_path.map(String::from),
            downloads: 0,
            views: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_free_product_checkout_price_is_zero() {
        assert!(product(true, 499, None).checkout_price().is_zero());
        assert_eq!(
            product(false, 499, None).checkout_price(),
            Price::from_cents(499)
        );
    }

    #[test]
    fn test_download_file_name() {
        assert_eq!(
            product(true, 0, Some("pages/fox.pdf")).download_file_name(),
            "sleepy-fox.pdf"
        );
        assert_eq!(product(true, 0, None).download_file_name(), "sleepy-fox.pdf");
    }

    #[test]
    fn test_download_file_name_ignores_dots_in_directories() {
        assert_eq!(
            product(true, 0, Some("pages/v1.2/fox")).download_file_name(),
            "sleepy-fox.pdf"
        );
        assert_eq!(
            product(true, 0, Some("pages/v1.2/fox.png")).download_file_name(),
            "sleepy-fox.png"
        );
        assert_eq!(
            product(true, 0, Some("pages/fox.")).download_file_name(),
            "sleepy-fox.pdf"
        );
    }

    #[test]
    fn test_category_level() {
        let collection = Category {
            id: CategoryId::new("c1"),
            slug: "coloring-pages".to_string(),
            name: "Coloring Pages".to_string(),
            parent_id: None,
        };
        assert_eq!(collection.level(), CategoryLevel::Collection);
    }
}
