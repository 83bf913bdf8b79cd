//! Seed the catalog with a sample collection, category and products.
//!
//! Rows are keyed by slug, so running the command twice is harmless.

use printshelf_core::{CategoryId, ProductId, validate_parent};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::info;

use super::CommandError;

const COLLECTION_SLUG: &str = "animals";
const CATEGORY_SLUG: &str = "woodland-animals";

struct SeedProduct {
    slug: &'static str,
    title: &'static str,
    price: Decimal,
    is_free: bool,
    pdf_path: &'static str,
}

const PRODUCTS: [SeedProduct; 2] = [
    SeedProduct {
        slug: "sleepy-fox",
        title: "Sleepy Fox",
        price: Decimal::ZERO,
        is_free: true,
        pdf_path: "coloring-pages/sleepy-fox.pdf",
    },
    SeedProduct {
        slug: "forest-friends-bundle",
        title: "Forest Friends Bundle",
        price: Decimal::from_parts(499, 0, 0, false, 2),
        is_free: false,
        pdf_path: "coloring-pages/forest-friends-bundle.pdf",
    },
];

/// Insert the sample catalog.
pub async fn run(pool: &PgPool) -> Result<(), CommandError> {
    let collection_id = upsert_category(pool, COLLECTION_SLUG, "Animals", None).await?;
    let category_id =
        upsert_category(pool, CATEGORY_SLUG, "Woodland Animals", Some(&collection_id)).await?;

    for product in &PRODUCTS {
        let inserted = sqlx::query(
            r"
            INSERT INTO products (id, slug, title, price, is_free, category_id, pdf_path)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (slug) DO NOTHING
            ",
        )
        .bind(ProductId::generate())
        .bind(product.slug)
        .bind(product.title)
        .bind(product.price)
        .bind(product.is_free)
        .bind(&category_id)
        .bind(product.pdf_path)
        .execute(pool)
        .await?
        .rows_affected();

        info!(slug = product.slug, inserted = inserted > 0, "Seeded product");
    }

    info!("Seeding complete!");
    Ok(())
}

/// Insert a category unless its slug exists, returning its id.
///
/// The parent is checked against the two-level rule before touching the
/// table; the database trigger enforces the same rule.
async fn upsert_category(
    pool: &PgPool,
    slug: &str,
    name: &str,
    parent: Option<&CategoryId>,
) -> Result<CategoryId, CommandError> {
    if let Some(existing) =
        sqlx::query_scalar::<_, CategoryId>("SELECT id FROM categories WHERE slug = $1")
            .bind(slug)
            .fetch_optional(pool)
            .await?
    {
        return Ok(existing);
    }

    if let Some(parent_id) = parent {
        let grandparent: Option<Option<CategoryId>> =
            sqlx::query_scalar("SELECT parent_id FROM categories WHERE id = $1")
                .bind(parent_id)
                .fetch_optional(pool)
                .await?;
        let grandparent =
            grandparent.ok_or_else(|| CommandError::Seed(format!("parent of {slug} missing")))?;
        validate_parent(false, grandparent.is_some(), false)
            .map_err(|e| CommandError::Seed(format!("{slug}: {e}")))?;
    }

    let id = CategoryId::generate();
    sqlx::query("INSERT INTO categories (id, slug, name, parent_id) VALUES ($1, $2, $3, $4)")
        .bind(&id)
        .bind(slug)
        .bind(name)
        .bind(parent)
        .execute(pool)
        .await?;

    info!(%slug, "Seeded category");
    Ok(id)
}
