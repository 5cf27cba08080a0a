use entitlement_orchestrator::{
    routes::create_router, services::navigation::InMemoryNavigator, AppState, Config,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,entitlement_orchestrator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting entitlement orchestrator");

    // Load configuration
    let config = Config::load()?;

    tracing::info!(
        "Loaded configuration - Server: {}:{}, billing: {}",
        config.server.host,
        config.server.port,
        config.billing.base_url
    );

    let state = AppState::new(config.clone())?;
    state.orchestrator.start();

    // A launch URL may carry the checkout-success marker
    if let Ok(location) = std::env::var("ENTITLEMENT_LAUNCH_LOCATION") {
        let navigator = InMemoryNavigator::new(location);
        if state.orchestrator.handle_checkout_return(&navigator) {
            tracing::info!("Launched from checkout return");
        }
    }

    tracing::info!("Initialized application state");

    let orchestrator = state.orchestrator.clone();
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    orchestrator.shutdown();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
