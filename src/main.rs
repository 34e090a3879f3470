//! Loomcart service binary: config → Postgres → services → HTTP.

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use loomcart::api::{self, AppState};
use loomcart::events::EventPublisher;
use loomcart::services::{Catalog, Inventory, OrderService, Profiles};
use loomcart::store::PgStore;
use loomcart::Config;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => Some(client),
            Err(err) => {
                tracing::warn!(error = %err, "NATS unreachable, events disabled");
                None
            }
        },
        None => None,
    };

    // One store handle, injected everywhere; no globals.
    let store = Arc::new(PgStore::new(pool));
    let inventory = Inventory::new(store.clone());
    let catalog = Catalog::new(store.clone(), inventory.clone());
    let profiles = Profiles::new(store.clone(), catalog.clone(), inventory.clone());
    let orders = OrderService::new(
        profiles.clone(),
        catalog.clone(),
        inventory.clone(),
        store.clone(),
        store.clone(),
        EventPublisher::new(nats),
        config.checkout_timeout,
    );

    let app = api::router(AppState {
        catalog,
        inventory,
        profiles,
        orders,
        coupons: store,
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!("loomcart listening on 0.0.0.0:{}", config.port);
    axum::serve(listener, app).await?;
    Ok(())
}
