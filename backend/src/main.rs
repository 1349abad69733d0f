//! Field Health Analysis Platform - Backend Server

use std::{net::SocketAddr, sync::Arc};

use field_health_backend::{
    config::Config,
    create_app,
    external::{EarthEngineClient, RemoteSensing},
    services::{AnalysisService, FieldAnalyzer, FieldRefreshConfig, FieldRefresher},
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "field_health_server=debug,field_health_backend=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!("Starting Field Health Analysis Server");
    tracing::info!("Environment: {}", config.environment);

    // Remote sensing session
    let client = EarthEngineClient::from_config(&config.earth_engine)?;
    if client.is_configured() {
        tracing::info!("Earth Engine project: {}", config.earth_engine.project);
    } else {
        tracing::error!(
            "Earth Engine service account is not configured; analyses will fail until \
             FHA__EARTH_ENGINE__SERVICE_ACCOUNT_EMAIL and FHA__EARTH_ENGINE__PRIVATE_KEY are set"
        );
    }
    let backend: Arc<dyn RemoteSensing> = Arc::new(client);

    // Create services
    let analysis = Arc::new(AnalysisService::new(backend, &config.imagery, &config.refresh));
    let analyzer: Arc<dyn FieldAnalyzer> = analysis.clone();
    let refresher = Arc::new(FieldRefresher::spawn(
        analyzer,
        FieldRefreshConfig::from_config(&config),
    ));

    // Create application state
    let state = AppState {
        config: Arc::new(config.clone()),
        analysis,
        refresher: refresher.clone(),
    };

    // Build application
    let app = create_app(state);

    // Start server
    let host: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::from((host, config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    refresher.shutdown().await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
