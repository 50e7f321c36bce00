use std::error::Error;

use foodgram::{config::Config, routes, AppState};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::load()?;

    log::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!().run(&pool).await?;
    log::info!("Migrations applied");

    tokio::fs::create_dir_all(&config.media_root).await?;

    let address = config.bind_addr;
    let state = AppState::new(pool, config)?;

    let (bound, server) = warp::serve(routes(state))
        .try_bind_with_graceful_shutdown(address, shutdown_signal())?;
    log::info!("Server running on {bound}");

    server.await;
    log::info!("Server shutting down...");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {e}");
    }
}
