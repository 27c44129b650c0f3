//! OpenSASE Group Buy - pooled purchasing service

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use opensase_groupbuy::api::{router, AppState};
use opensase_groupbuy::clock::SystemClock;
use opensase_groupbuy::config::Config;
use opensase_groupbuy::publisher::{EventPublisher, LogPublisher, NatsPublisher};
use opensase_groupbuy::store::{Catalog, GroupBuyStore, InMemoryCatalog, InMemoryGroupBuyStore, PgStore};
use opensase_groupbuy::GroupBuyEngine;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;

    let (store, catalog): (Arc<dyn GroupBuyStore>, Arc<dyn Catalog>) = match &config.database_url {
        Some(url) => {
            let pg = Arc::new(PgStore::connect(url, 10).await?);
            pg.migrate().await?;
            (pg.clone() as Arc<dyn GroupBuyStore>, pg as Arc<dyn Catalog>)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, group buys are kept in memory only");
            let catalog = InMemoryCatalog::default();
            if let Some(path) = &config.catalog_path {
                let loaded = catalog.load_json(&tokio::fs::read_to_string(path).await?).await?;
                tracing::info!("Loaded {} products from {}", loaded, path);
            }
            (Arc::new(InMemoryGroupBuyStore::new()) as Arc<dyn GroupBuyStore>, Arc::new(catalog) as Arc<dyn Catalog>)
        }
    };

    let publisher: Arc<dyn EventPublisher> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsPublisher::new(client)),
            Err(e) => {
                tracing::warn!("NATS unavailable ({}), logging events instead", e);
                Arc::new(LogPublisher)
            }
        },
        None => Arc::new(LogPublisher),
    };

    let engine = GroupBuyEngine::new(store, catalog, publisher, Arc::new(SystemClock), config.engine_settings());
    let app = router(AppState { engine: Arc::new(engine) });

    tracing::info!("🚀 OpenSASE Group Buy listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
