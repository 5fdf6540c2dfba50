//! Entity group transaction example
//!
//! Creates a table in the local storage emulator, commits a batch of orders for one
//! customer, then reads one back and pages through the partition.
//!
//! Run with: cargo run --example batch_commit
//! Set TABLESTORE_ACCOUNT / TABLESTORE_KEY to target a real account instead.

use tablestore_http::client::{ClientConfig, QueryOptions, RetryPolicy, TableServiceClient};
use tablestore_http::Entity;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Table Storage Batch Example");
    println!("===========================\n");

    let mut config = ClientConfig::from_env().unwrap_or_else(|_| ClientConfig::development_storage());
    config.retry = RetryPolicy::exponential(3, Duration::from_millis(200));
    println!("Endpoint: {}", config.base_url());

    let service = TableServiceClient::new(&config)?;
    if service.try_create_table("Orders").await? {
        println!("Created table Orders");
    }
    let orders = service.table("Orders")?;

    let mut batch = orders.batch();
    for (row, total) in [("order-1", 19.99), ("order-2", 5.25), ("order-3", 120.0)] {
        let mut order = Entity::new("customer-42", row)?;
        order.set("Total", total)?;
        order.set("Shipped", false)?;
        batch.insert_or_update(order)?;
    }

    if orders.try_commit(&mut batch).await? {
        println!("\nCommitted {} operations:", batch.len());
        for entity in batch.into_entities() {
            println!("  {} -> ETag {:?}", entity, entity.etag());
        }
    } else {
        println!("\nBatch rejected by a precondition, nothing written");
    }

    if let Some(order) = orders.get("customer-42", "order-3").await? {
        println!("\nRead back: {}", order.to_json());
    }

    let options = QueryOptions::new().partition("customer-42").top(2);
    let mut continuation = None;
    let mut page_number = 1;
    loop {
        let page = orders.query_page(&options, continuation.as_ref()).await?;
        println!("\nPage {}:", page_number);
        for entity in &page.entities {
            println!("  {} Total={:?}", entity, entity.get_f64("Total"));
        }
        if page.is_last() {
            break;
        }
        continuation = page.continuation;
        page_number += 1;
    }

    Ok(())
}
