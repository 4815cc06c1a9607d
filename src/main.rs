use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pictor::config::Config;
use pictor::db::Database;
use pictor::storage::{LocalObjectStore, ObjectStore};
use pictor::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pictor=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting pictor...");

    // Load configuration
    let config = Config::load()?;
    let config = Arc::new(config);
    tracing::info!("Configuration loaded");

    // Initialize database
    let db = Database::new(&config.database.path).await?;
    db.run_migrations().await?;
    tracing::info!("Database initialized");

    // Initialize object store
    let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(
        config.storage.local_path.clone(),
        config.storage.bucket.clone(),
    ));

    // Create app state and router
    let state = AppState::new(db, config.clone(), store);
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
