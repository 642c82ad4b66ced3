use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use costtracker::api::router;
use costtracker::services::{self, ConnectivityMonitor, SyncEngine, SyncTrigger};
use costtracker::sheets::{NoopSheetsClient, SheetsClient, SheetsConfig, SheetsHttpClient};
use costtracker::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "costtracker=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://costtracker.db".to_string());
    let sync_interval_secs: u64 = std::env::var("SYNC_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(30);

    let options = SqliteConnectOptions::from_str(&database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let sheets: Arc<dyn SheetsClient> = match SheetsConfig::from_env() {
        Ok(config) => Arc::new(SheetsHttpClient::new(config)?),
        Err(e) => {
            warn!("sheets backend not configured ({}), deliveries are no-ops", e);
            Arc::new(NoopSheetsClient)
        }
    };

    let (trigger_tx, trigger_rx) = mpsc::channel(8);
    let monitor = Arc::new(ConnectivityMonitor::new(trigger_tx));
    let engine = Arc::new(SyncEngine::new(pool.clone(), sheets, monitor.online_rx()));

    tokio::spawn(services::monitor::run(
        engine.clone(),
        trigger_rx,
        Duration::from_secs(sync_interval_secs),
    ));
    monitor.request(SyncTrigger::Startup);

    let state = AppState {
        db: pool.clone(),
        engine,
        monitor,
    };

    let app = router(state);

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
        .parse()?;
    info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
