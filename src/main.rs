//! PredictPool - Social Prediction Market Backend
//! Mission: Settle price calls fairly and keep reputation honest

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use predictpool_backend::{
    api::create_router,
    models::Config,
    oracle::create_price_provider,
    store::Store,
};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "predictpool_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing();

    info!("🔮 PredictPool backend starting");

    let store = Arc::new(Store::new(&config.database_path)?);
    let provider = create_price_provider(&config)?;
    info!("💱 Price provider: {}", config.price_provider);

    let app = create_router(store, provider)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("🎯 API server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
