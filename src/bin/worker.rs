use sqlx::sqlite::SqlitePoolOptions;
use telemetry_backend::{
    config::AppConfig,
    jobs::worker::{self, WorkerContext},
    logging,
};
use tracing::info;

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

    let ctx = WorkerContext::new(pool, config)?;

    tokio::select! {
        () = worker::run(&ctx) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("worker_shutdown");
        }
    }

    Ok(())
}
