use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use campus_core::CampusConfig;
use campus_scheduler::{SchedulerEngine, SchedulerSettings};
use campus_tasks::SqliteTaskStore;

mod app;
mod http;

/// Campus task API with the recurring-task scheduler.
#[derive(Debug, Parser)]
#[command(name = "campus-gateway", version)]
struct Args {
    /// Config file (falls back to CAMPUS_CONFIG, then ~/.campus/campus.toml).
    #[arg(long, short = 'c')]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "campus_gateway=info,campus_scheduler=info,tower_http=debug".into()
            }),
        )
        .init();

    let args = Args::parse();

    // load config: --config > CAMPUS_CONFIG env > ~/.campus/campus.toml
    let config_path = args.config.or_else(|| std::env::var("CAMPUS_CONFIG").ok());
    let config = CampusConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        CampusConfig::default()
    });

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL;")?;
    let store = SqliteTaskStore::new(db)?;
    info!("database migrations complete");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // scheduler: handle for AppState + engine loop in the background.
    // The engine bootstraps timers from the store before taking commands.
    let (scheduler, engine_task) = if config.scheduler.enabled {
        let settings = SchedulerSettings::from_config(&config.scheduler)?;
        info!(
            utc_offset_minutes = config.scheduler.utc_offset_minutes,
            max_timer_delay_secs = settings.max_timer_delay.as_secs(),
            "starting recurring-task scheduler"
        );
        let (engine, handle) = SchedulerEngine::new(Arc::new(store.clone()), settings);
        let task = tokio::spawn(engine.run(shutdown_rx));
        (Some(handle), Some(task))
    } else {
        info!("recurring-task scheduler disabled by config");
        (None, None)
    };

    let state = Arc::new(app::AppState::new(config, store, scheduler));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("Campus gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // signal scheduler to stop and let it cancel its timers
    let _ = shutdown_tx.send(true);
    if let Some(task) = engine_task {
        if let Err(e) = task.await {
            warn!(error = %e, "scheduler engine task ended abnormally");
        }
    }
    info!("Campus gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
