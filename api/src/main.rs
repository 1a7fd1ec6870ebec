mod config;
mod handler;
mod service;

use axum::{
    routing::{get, post},
    Router,
};
use config::ApiConfig;
use handler::SharedService;
use service::ExchangeService;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use store::{PgStore, StoreConfig};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub(crate) fn build_router(service: SharedService) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/exchange/rate", get(handler::get_exchange_rate))
        .route("/exchange/swap", post(handler::execute_swap))
        .route("/exchange/history/:user_id", get(handler::get_swap_history))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(service)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting currency exchange service");

    let api_config = ApiConfig::from_env()?;
    let store_config = StoreConfig::from_env()?;

    let store = PgStore::connect(&store_config).await?;
    store.migrate().await?;

    let service = Arc::new(ExchangeService::new(Arc::new(store), api_config.spread));
    let app = build_router(service);

    let host: IpAddr = api_config
        .host
        .parse()
        .map_err(|e| format!("Invalid HOST {}: {}", api_config.host, e))?;
    let addr = SocketAddr::new(host, api_config.port);
    info!(%addr, spread = %api_config.spread, "Listening");

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
