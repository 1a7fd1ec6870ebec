use store::{seed::seed_demo_data, PgStore, StoreConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = StoreConfig::from_env()?;
    let store = PgStore::connect(&config).await?;
    store.migrate().await?;

    let summary = seed_demo_data(&store).await?;
    info!(?summary, "Seeding finished");

    store.pool().close().await;
    Ok(())
}
