use std::net::SocketAddr;

use sqlx::sqlite::SqlitePoolOptions;
use telemetry_backend::{api_router, config::AppConfig, logging, state::AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env();
    logging::init(&config.log_level);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .after_connect(|conn, _| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON;").execute(conn).await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let addr: SocketAddr = config.bind_addr.parse()?;
    tracing::info!(
        addr = %addr,
        production = config.is_production(),
        "api_listening"
    );

    let state = AppState {
        pool,
        config,
    };
    let app = api_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
