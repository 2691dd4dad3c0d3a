mod config;
mod db;
mod frame;
mod model;
mod routes;
mod services;
mod state;
mod store;

use std::process::ExitCode;
use std::sync::Arc;

use config::{AppConfig, ConfigError, StoreBackend};
use store::{ChangeFeed, MemoryStore, PgStore, Store};

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database init failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("admin bootstrap failed: {0}")]
    Bootstrap(#[from] services::auth::AuthError),
    #[error("failed to bind port {port}: {source}")]
    Bind { port: u16, source: std::io::Error },
    #[error("server failed: {0}")]
    Serve(std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "ecomguard stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), StartupError> {
    let config = AppConfig::from_env()?;
    let feed = ChangeFeed::new(config.live_channel_capacity);

    let store: Arc<dyn Store> = match (config.backend, config.database_url.as_deref()) {
        (StoreBackend::Postgres, Some(url)) => {
            let pool = db::init_pool(url, config.db_max_connections).await?;
            let pg = PgStore::new(pool, feed);
            // Detached; lives for the whole process.
            let _listener = pg.spawn_change_listener();
            Arc::new(pg)
        }
        (StoreBackend::Postgres, None) => return Err(ConfigError::MissingDatabaseUrl.into()),
        (StoreBackend::Memory, _) => {
            tracing::warn!("using in-memory store; data is lost on exit");
            Arc::new(MemoryStore::new(feed))
        }
    };

    if let (Some(email), Some(password)) = (config.admin_email.as_deref(), config.admin_password.as_deref()) {
        services::auth::bootstrap_admin(store.as_ref(), email, password).await?;
        tracing::info!(%email, "admin account ready");
    }

    let port = config.port;
    let state = state::AppState::new(store, config);
    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .map_err(|source| StartupError::Bind { port, source })?;

    tracing::info!(%port, "ecomguard listening");
    axum::serve(listener, app).await.map_err(StartupError::Serve)
}
