//! Download fulfillment against in-memory backends.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use futures::StreamExt;

use printshelf_core::{Price, ProductId};
use printshelf_integration_tests::{DecliningProvider, TestContext};
use printshelf_storefront::models::{Order, Product};
use printshelf_storefront::services::DownloadError;
use printshelf_storefront::services::downloads::StreamRequest;
use printshelf_storefront::services::orders::CheckoutItem;
use printshelf_storefront::services::CheckoutRequest;

async fn buy(ctx: &TestContext, product: &Product) -> Order {
    ctx.state
        .orders()
        .create_order(CheckoutRequest {
            email: "robin@example.com".to_string(),
            customer_name: "Robin Reader".to_string(),
            items: vec![CheckoutItem {
                product_id: Some(product.id.to_string()),
                title: None,
                price: Some(product.checkout_price().amount()),
                quantity: Some(1),
            }],
        })
        .await
        .unwrap()
}

// ============================================================================
// Free downloads
// ============================================================================

#[tokio::test]
async fn test_free_download_signs_and_counts() {
    let ctx = TestContext::new();
    let owl = ctx.free_product("night-owl");

    let ticket = ctx
        .state
        .downloads()
        .fulfill_free_download(&owl.id)
        .await
        .unwrap();

    assert!(ticket.url.contains("coloring-pages/night-owl.pdf"));
    assert_eq!(ticket.expires_in.as_secs(), 60);
    assert_eq!(ticket.file_name, "night-owl.pdf");
    assert_eq!(ctx.store.downloads(&owl.id), 1);
}

#[tokio::test]
async fn test_free_download_of_paid_product_is_refused() {
    let ctx = TestContext::new();
    let fox = ctx.paid_product("sleepy-fox", 999);

    let result = ctx.state.downloads().fulfill_free_download(&fox.id).await;

    assert!(matches!(result, Err(DownloadError::PaymentRequired)));
    assert_eq!(ctx.store.downloads(&fox.id), 0);
    assert_eq!(ctx.storage.signed_count(), 0);
}

#[tokio::test]
async fn test_free_download_missing_records() {
    let ctx = TestContext::new();
    let downloads = ctx.state.downloads();

    assert!(matches!(
        downloads
            .fulfill_free_download(&ProductId::new("missing"))
            .await,
        Err(DownloadError::ProductNotFound)
    ));

    let unstored = ctx.store.add_product("no-file", "No File", Price::ZERO, true);
    assert!(matches!(
        downloads.fulfill_free_download(&unstored.id).await,
        Err(DownloadError::FileNotFound)
    ));
    assert_eq!(ctx.store.downloads(&unstored.id), 0);
}

#[tokio::test]
async fn test_storage_outage_is_a_storage_error() {
    let ctx = TestContext::new();
    let owl = ctx.free_product("night-owl");
    ctx.storage.set_unavailable(true);

    let result = ctx.state.downloads().fulfill_free_download(&owl.id).await;

    assert!(matches!(result, Err(DownloadError::Storage(_))));
    assert_eq!(ctx.store.downloads(&owl.id), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_free_downloads_count_exactly() {
    let ctx = TestContext::new();
    let owl = ctx.free_product("night-owl");

    let handles: Vec<_> = (0..40)
        .map(|_| {
            let state = ctx.state.clone();
            let id = owl.id.clone();
            tokio::spawn(async move { state.downloads().fulfill_free_download(&id).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(ctx.store.downloads(&owl.id), 40);
}

// ============================================================================
// Purchased downloads
// ============================================================================

#[tokio::test]
async fn test_purchased_download_requires_fulfilled_order() {
    let ctx = TestContext::new();
    let fox = ctx.paid_product("sleepy-fox", 999);
    let owl = ctx.paid_product("night-owl", 350);
    let order = buy(&ctx, &fox).await;
    let counted = ctx.store.downloads(&fox.id);
    let downloads = ctx.state.downloads();

    let ticket = downloads
        .fulfill_purchased_download(&fox.id, order.order_number.as_str())
        .await
        .unwrap();
    assert!(ticket.url.contains("sleepy-fox.pdf"));
    assert_eq!(ctx.store.downloads(&fox.id), counted);

    assert!(matches!(
        downloads
            .fulfill_purchased_download(&owl.id, order.order_number.as_str())
            .await,
        Err(DownloadError::NotEntitled)
    ));
    assert!(matches!(
        downloads
            .fulfill_purchased_download(&fox.id, "ORD-NOPE-0000")
            .await,
        Err(DownloadError::NotEntitled)
    ));
}

#[tokio::test]
async fn test_declined_order_grants_nothing() {
    let ctx = TestContext::with_payment_provider(Arc::new(DecliningProvider));
    let fox = ctx.paid_product("sleepy-fox", 999);
    let order = buy(&ctx, &fox).await;

    let result = ctx
        .state
        .downloads()
        .fulfill(&fox.id, Some(order.order_number.as_str()))
        .await;

    assert!(matches!(result, Err(DownloadError::NotEntitled)));
    assert_eq!(ctx.storage.signed_count(), 0);
}

#[tokio::test]
async fn test_gate_selects_fulfillment() {
    let ctx = TestContext::new();
    let fox = ctx.paid_product("sleepy-fox", 999);
    let owl = ctx.free_product("night-owl");
    let downloads = ctx.state.downloads();

    downloads.fulfill(&owl.id, None).await.unwrap();
    assert_eq!(ctx.store.downloads(&owl.id), 1);

    assert!(matches!(
        downloads.fulfill(&fox.id, None).await,
        Err(DownloadError::PaymentRequired)
    ));

    let order = buy(&ctx, &fox).await;
    downloads
        .fulfill(&fox.id, Some(order.order_number.as_str()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_gate_loads_product_once() {
    let ctx = TestContext::new();
    let fox = ctx.paid_product("sleepy-fox", 999);
    let owl = ctx.free_product("night-owl");
    let order = buy(&ctx, &fox).await;
    let downloads = ctx.state.downloads();

    let before = ctx.store.product_reads();
    downloads.fulfill(&owl.id, None).await.unwrap();
    assert_eq!(ctx.store.product_reads() - before, 1);

    let before = ctx.store.product_reads();
    downloads
        .fulfill(&fox.id, Some(order.order_number.as_str()))
        .await
        .unwrap();
    assert_eq!(ctx.store.product_reads() - before, 1);
}

// ============================================================================
// Streaming
// ============================================================================

#[tokio::test]
async fn test_stream_free_file() {
    let ctx = TestContext::new();
    let owl = ctx.free_product("night-owl");

    let download = ctx
        .state
        .downloads()
        .stream_download(StreamRequest {
            product_id: Some(owl.id.to_string()),
            file: owl.pdf_path.clone(),
            name: Some("../Night Owl?".to_string()),
            order: None,
        })
        .await
        .unwrap();

    assert_eq!(download.file_name, "_Night Owl_.pdf");
    let chunks: Vec<_> = download.object.body.collect().await;
    let body: Vec<u8> = chunks
        .into_iter()
        .flat_map(|chunk| chunk.unwrap().to_vec())
        .collect();
    assert!(body.starts_with(b"%PDF"));
    assert_eq!(ctx.store.downloads(&owl.id), 1);
}

#[tokio::test]
async fn test_stream_rejects_other_files() {
    let ctx = TestContext::new();
    let owl = ctx.free_product("night-owl");
    let fox = ctx.paid_product("sleepy-fox", 999);

    let result = ctx
        .state
        .downloads()
        .stream_download(StreamRequest {
            product_id: Some(owl.id.to_string()),
            file: fox.pdf_path.clone(),
            ..StreamRequest::default()
        })
        .await;
    assert!(matches!(result, Err(DownloadError::FileNotFound)));

    let result = ctx
        .state
        .downloads()
        .stream_download(StreamRequest::default())
        .await;
    assert!(matches!(result, Err(DownloadError::InvalidRequest(_))));
    assert_eq!(ctx.store.downloads(&owl.id), 0);
}
