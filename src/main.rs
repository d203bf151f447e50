//! OpenSASE Location Stock - multi-location stock service

use anyhow::Result;
use opensase_location_stock::api::{self, AppState};
use opensase_location_stock::domain::events::EventPublisher;
use opensase_location_stock::store::{MemoryStore, PgStore};
use opensase_location_stock::{Backend, Config};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    let config = Config::from_env();

    let nats = match config.nats_url.as_deref() {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, events will only be logged");
                None
            }
        },
        None => None,
    };
    let events = EventPublisher::new(nats);

    match config.database_url.clone() {
        Some(url) => {
            let store = PgStore::connect(&url, config.max_connections).await?;
            store.migrate().await?;
            serve(store, events, config).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            serve(MemoryStore::new(), events, config).await
        }
    }
}

async fn serve<S: Backend>(store: S, events: EventPublisher, config: Config) -> Result<()> {
    let addr = config.bind_addr();
    let app = api::router(AppState::new(store, events, config))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("🚀 OpenSASE Location Stock listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}
