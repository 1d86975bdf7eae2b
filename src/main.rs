use std::error::Error;
use std::time::Duration;

use clap::Parser;
use sea_orm::{ConnectOptions, Database};
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use servicepulse::monitoring::global::GlobalHealthMonitor;
use servicepulse::monitoring::monitor::ServiceHealthMonitor;
use servicepulse::server::config::ServerConfig;
use servicepulse::server::status_broadcaster::StatusBroadcaster;
use servicepulse::web::{create_router, AppState};

#[derive(Parser, Debug)]
#[command(name = "servicepulse", about = "Service health monitoring server")]
struct Args {
    /// Address to listen on, overriding LISTEN_ADDR.
    #[arg(long)]
    listen: Option<String>,
}

fn init_logging() {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily("logs", "servicepulse.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();
    init_logging();

    let args = Args::parse();
    let mut config = ServerConfig::from_env().map_err(|e| {
        error!(error = %e, "invalid configuration");
        e
    })?;
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }

    let mut options = ConnectOptions::new(&config.database_url);
    options.max_connections(10);
    let db = Database::connect(options).await?;
    servicepulse::db::init_schema(&db).await?;
    info!("database ready");

    let monitor = ServiceHealthMonitor::new();
    let broadcaster = StatusBroadcaster::new();
    let global_monitor = GlobalHealthMonitor::with_intervals(
        db.clone(),
        monitor.clone(),
        broadcaster.clone(),
        Duration::from_secs(config.resync_interval_secs),
        Duration::from_secs(config.flush_interval_secs),
    );

    global_monitor.start_global_monitoring().await;

    let state = AppState {
        db,
        monitor,
        global_monitor: global_monitor.clone(),
        broadcaster,
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(listen_addr = %config.listen_addr, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
        })
        .await?;

    global_monitor.stop_global_monitoring().await;
    info!("shutdown complete");
    Ok(())
}
