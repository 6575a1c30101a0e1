//! Rolegate Server - Main Entry Point

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use rolegate_server::attestation::AttestationEvaluator;
use rolegate_server::store::{PgStore, Store};
use rolegate_server::{api, config, db};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rolegate_server=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Rolegate Server"
    );

    // Initialize database
    let db_pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&db_pool).await?;
    let store: Arc<dyn Store> = Arc::new(PgStore::new(db_pool));

    // Attestation collaborators (optional - NFT/FARCASTER rules fail closed without them)
    let evaluator = AttestationEvaluator::from_config(store.clone(), &config)?;
    if !config.has_token_oracle() {
        tracing::warn!("TOKEN_ORACLE_URL not set. NFT rules will never pass.");
    }
    if !config.has_identity_resolver() {
        tracing::warn!("IDENTITY_RESOLVER_URL not set. FARCASTER rules will never pass.");
    }
    if config.allow_private_callbacks {
        tracing::warn!("ALLOW_PRIVATE_CALLBACKS is enabled. API rule callbacks are not screened.");
    }

    // Build application state and router
    let state = api::AppState::new(store, evaluator, config.clone());
    let app = api::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");

    // Graceful shutdown handler
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install CTRL+C signal handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, cleaning up...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shutdown complete");

    Ok(())
}
